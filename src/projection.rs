//! Geographic coordinates and the map projection.

use egui::Rect;
use serde::{Deserialize, Serialize};

use crate::TILE_SIZE;

/// A geographical position in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPos {
    /// Longitude in degrees.
    pub lon: f64,

    /// Latitude in degrees.
    pub lat: f64,
}

impl GeoPos {
    /// Creates a new `GeoPos` from latitude and longitude in degrees.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lon, lat }
    }
}

/// The geographical rectangle currently visible in the viewport.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    /// The south-western corner of the rectangle.
    pub south_west: GeoPos,

    /// The north-eastern corner of the rectangle.
    pub north_east: GeoPos,
}

impl GeoBounds {
    /// Returns `true` if the given position lies within the rectangle.
    pub fn contains(&self, pos: GeoPos) -> bool {
        pos.lon >= self.south_west.lon
            && pos.lon <= self.north_east.lon
            && pos.lat >= self.south_west.lat
            && pos.lat <= self.north_east.lat
    }
}

/// Converts longitude to the x-coordinate of a tile at a given zoom level.
pub(crate) fn lon_to_x(lon: f64, zoom: u8) -> f64 {
    (lon + 180.0) / 360.0 * (2.0_f64.powi(zoom as i32))
}

/// Converts latitude to the y-coordinate of a tile at a given zoom level.
pub(crate) fn lat_to_y(lat: f64, zoom: u8) -> f64 {
    (1.0 - lat.to_radians().tan().asinh() / std::f64::consts::PI) / 2.0
        * (2.0_f64.powi(zoom as i32))
}

/// Converts the x-coordinate of a tile to longitude at a given zoom level.
pub(crate) fn x_to_lon(x: f64, zoom: u8) -> f64 {
    x / (2.0_f64.powi(zoom as i32)) * 360.0 - 180.0
}

/// Converts the y-coordinate of a tile to latitude at a given zoom level.
pub(crate) fn y_to_lat(y: f64, zoom: u8) -> f64 {
    let n = std::f64::consts::PI - 2.0 * std::f64::consts::PI * y / (2.0_f64.powi(zoom as i32));
    n.sinh().atan().to_degrees()
}

/// A helper for converting between geographical and screen coordinates.
pub struct MapProjection {
    zoom: u8,
    center: GeoPos,
    widget_rect: Rect,
}

impl MapProjection {
    /// Creates a new `MapProjection` for the given viewport state.
    pub(crate) fn new(zoom: u8, center: GeoPos, widget_rect: Rect) -> Self {
        Self {
            zoom,
            center,
            widget_rect,
        }
    }

    pub(crate) fn zoom(&self) -> u8 {
        self.zoom
    }

    pub(crate) fn center(&self) -> GeoPos {
        self.center
    }

    pub(crate) fn widget_rect(&self) -> Rect {
        self.widget_rect
    }

    /// Projects a geographical coordinate to a screen coordinate.
    pub fn project(&self, geo_pos: GeoPos) -> egui::Pos2 {
        let center_x = lon_to_x(self.center.lon, self.zoom);
        let center_y = lat_to_y(self.center.lat, self.zoom);

        let tile_x = lon_to_x(geo_pos.lon, self.zoom);
        let tile_y = lat_to_y(geo_pos.lat, self.zoom);

        let dx = (tile_x - center_x) * TILE_SIZE as f64;
        let dy = (tile_y - center_y) * TILE_SIZE as f64;

        let widget_center = self.widget_rect.center();
        widget_center + egui::vec2(dx as f32, dy as f32)
    }

    /// Un-projects a screen coordinate to a geographical coordinate.
    pub fn unproject(&self, screen_pos: egui::Pos2) -> GeoPos {
        let rel_pos = screen_pos - self.widget_rect.min;
        let widget_center_x = self.widget_rect.width() as f64 / 2.0;
        let widget_center_y = self.widget_rect.height() as f64 / 2.0;

        let center_x = lon_to_x(self.center.lon, self.zoom);
        let center_y = lat_to_y(self.center.lat, self.zoom);

        let target_x = center_x + (rel_pos.x as f64 - widget_center_x) / TILE_SIZE as f64;
        let target_y = center_y + (rel_pos.y as f64 - widget_center_y) / TILE_SIZE as f64;

        GeoPos {
            lon: x_to_lon(target_x, self.zoom),
            lat: y_to_lat(target_y, self.zoom),
        }
    }

    /// The geographical rectangle currently visible in the widget.
    pub fn bounds(&self) -> GeoBounds {
        // Screen y grows downwards, so the top of the widget is the northern edge.
        GeoBounds {
            south_west: self.unproject(self.widget_rect.left_bottom()),
            north_east: self.unproject(self.widget_rect.right_top()),
        }
    }
}
