#![warn(missing_docs)]

//! A slippy map widget for `egui` with circle markers and custom popup content.
//!
//! This crate provides a `Map` widget that displays a map from a tile server,
//! supports panning and zooming, and exposes a [`Map::center_on`] operation
//! that pans the viewport to a coordinate, drops a circle marker there with
//! custom popup content, and zooms in shortly afterwards.
//!
//! # Example
//!
//! ```no_run
//! use eframe::egui;
//! use egui_marker_map::{Map, config::OpenStreetMapConfig};
//!
//! struct MyApp {
//!     map: Map,
//! }
//!
//! impl Default for MyApp {
//!     fn default() -> Self {
//!         Self {
//!             map: Map::new(OpenStreetMapConfig::default()),
//!         }
//!     }
//! }
//!
//! impl eframe::App for MyApp {
//!     fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
//!         egui::CentralPanel::default()
//!             .frame(egui::Frame::NONE)
//!             .show(ctx, |ui| {
//!                 if ui.button("Center on London").clicked() {
//!                     self.map.center_on(51.5074, -0.1278);
//!                 }
//!                 ui.add(&mut self.map);
//!             });
//!     }
//! }
//! ```

/// Configuration traits and types for the map widget.
pub mod config;
/// Layers drawn on top of the base tiles.
pub mod layers;
/// Popup content shown inside marker popups.
pub mod popup;
/// Geographic coordinates and projection math.
pub mod projection;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use eframe::egui;
use egui::{Color32, Rect, Response, Sense, Ui, Vec2, Widget, pos2};
use eyre::{Context as _, Result};
use log::{debug, error};
use once_cell::sync::Lazy;
use poll_promise::Promise;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::MapConfig;
use crate::layers::Layer;
use crate::layers::marker::{CircleMarker, MarkerLayer};
use crate::popup::PopupContent;
use crate::projection::{GeoBounds, GeoPos, MapProjection, lat_to_y, lon_to_x};

// The size of a map tile in pixels.
pub(crate) const TILE_SIZE: u32 = 256;
/// The smallest zoom level any configuration may allow.
pub const MIN_ZOOM: u8 = 0;
/// The largest zoom level any configuration may allow.
pub const MAX_ZOOM: u8 = 19;

/// The popup text attached to the marker created by [`Map::center_on`].
pub const CENTER_POPUP_TEXT: &str = "Custom Data Injection";

// Parameters of the center_on operation.
const CENTER_MARKER_RADIUS: f32 = 5.0;
const CENTER_ZOOM: u8 = 8;
const CENTER_ZOOM_DELAY: Duration = Duration::from_millis(750);
const PAN_DURATION: Duration = Duration::from_millis(250);

// Reuse the reqwest client for all tile downloads by making it a static variable.
static CLIENT: Lazy<reqwest::blocking::Client> = Lazy::new(|| {
    reqwest::blocking::Client::builder()
        .user_agent(format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .expect("Failed to build reqwest client")
});

/// Errors that can occur while using the map widget.
#[derive(Error, Debug)]
pub enum MapError {
    /// An error occurred while making a web request.
    #[error("Connection error")]
    ConnectionError(#[from] reqwest::Error),

    /// A map tile failed to download.
    #[error("A map tile failed to download. HTTP Status: `{0}`")]
    TileDownloadError(String),

    /// The downloaded tile bytes could not be converted to an image.
    #[error("Unable to convert downloaded map tile bytes as image")]
    TileBytesConversionError(#[from] image::ImageError),
}

/// A unique identifier for a map tile.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TileId {
    /// The zoom level.
    pub z: u8,

    /// The x-coordinate of the tile.
    pub x: u32,

    /// The y-coordinate of the tile.
    pub y: u32,
}

/// The state of a tile in the cache.
enum Tile {
    /// The tile is being downloaded.
    Loading(Promise<Result<egui::ColorImage, Arc<eyre::Report>>>),

    /// The tile is in memory.
    Loaded(egui::TextureHandle),

    /// The tile failed to download.
    Failed(Arc<eyre::Report>),
}

/// A viewport change reported by the map widget.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum MapEvent {
    /// A pan gesture or programmatic pan completed.
    MoveEnd {
        /// The new center of the viewport.
        center: GeoPos,
        /// The visible bounding box after the move.
        bounds: GeoBounds,
    },

    /// The zoom level changed.
    ZoomChanged {
        /// The new zoom level.
        zoom: u8,
        /// The visible bounding box at the new zoom level.
        bounds: GeoBounds,
    },
}

/// An in-flight animated pan of the viewport center.
#[derive(Clone, Copy)]
struct PanAnimation {
    from: GeoPos,
    to: GeoPos,
    start: Instant,
    duration: Duration,
}

/// A zoom level change scheduled for a later point in time.
#[derive(Clone, Copy)]
struct DeferredZoom {
    zoom: u8,
    due: Instant,
}

fn ease_in_out_quad(t: f64) -> f64 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

/// The map widget.
pub struct Map {
    /// The geographical center of the map.
    pub center: GeoPos,

    /// The zoom level of the map.
    pub zoom: u8,

    tiles: HashMap<TileId, Tile>,

    /// The geographical position under the mouse pointer, if any.
    pub mouse_pos: Option<GeoPos>,

    /// Configuration for the map, such as the tile server URL.
    config: Box<dyn MapConfig>,

    markers: MarkerLayer,
    layers: HashMap<String, Box<dyn Layer>>,

    pan: Option<PanAnimation>,
    deferred_zoom: Option<DeferredZoom>,

    events: Vec<MapEvent>,
    last_reported_zoom: u8,
}

impl Map {
    /// Creates a new `Map` widget.
    ///
    /// # Arguments
    ///
    /// * `config` - A type that implements `MapConfig`, which provides configuration for the map.
    pub fn new<C: MapConfig + 'static>(config: C) -> Self {
        let center = config.default_center();
        let zoom = config.default_zoom();
        Self {
            tiles: HashMap::new(),
            mouse_pos: None,
            config: Box::new(config),
            markers: MarkerLayer::new(),
            layers: HashMap::new(),
            pan: None,
            deferred_zoom: None,
            events: Vec::new(),
            last_reported_zoom: zoom,
            center,
            zoom,
        }
    }

    /// Sets the zoom level, clamped to the configured `[min_zoom, max_zoom]` range.
    pub fn set_zoom(&mut self, zoom: u8) {
        self.zoom = zoom.clamp(self.config.min_zoom(), self.config.max_zoom());
    }

    /// Centers the map on the given coordinate.
    ///
    /// Starts an animated pan toward the coordinate, replaces the current
    /// centering marker with a circle marker there whose popup shows
    /// [`CENTER_POPUP_TEXT`], and schedules the zoom level to change to 8
    /// 750 ms after the call, independent of the pan animation's progress.
    ///
    /// Coordinates are not validated; out-of-range values are passed through
    /// to the projection math as-is.
    pub fn center_on(&mut self, lat: f64, lon: f64) {
        let target = GeoPos::new(lat, lon);
        debug!("centering map on lat: {}, lon: {}", lat, lon);

        let now = Instant::now();
        self.pan = Some(PanAnimation {
            from: self.center,
            to: target,
            start: now,
            duration: PAN_DURATION,
        });

        let popup = PopupContent::new(CENTER_POPUP_TEXT);
        let marker = CircleMarker::new(target, CENTER_MARKER_RADIUS).bind_popup(popup);
        self.markers.replace(marker);

        self.deferred_zoom = Some(DeferredZoom {
            zoom: CENTER_ZOOM,
            due: now + CENTER_ZOOM_DELAY,
        });
    }

    /// The marker layer of the map.
    pub fn markers(&self) -> &MarkerLayer {
        &self.markers
    }

    /// The marker layer of the map, mutably.
    pub fn markers_mut(&mut self) -> &mut MarkerLayer {
        &mut self.markers
    }

    /// Adds a named overlay layer on top of the base tiles.
    pub fn add_layer(&mut self, name: impl Into<String>, layer: impl Layer + 'static) {
        self.layers.insert(name.into(), Box::new(layer));
    }

    /// The overlay layers of the map, keyed by name.
    pub fn layers(&self) -> &HashMap<String, Box<dyn Layer>> {
        &self.layers
    }

    /// The overlay layers of the map, keyed by name, mutably.
    pub fn layers_mut(&mut self) -> &mut HashMap<String, Box<dyn Layer>> {
        &mut self.layers
    }

    /// Drains the viewport events recorded since the last call.
    ///
    /// Events accumulate until drained, so callers interested in them should
    /// drain once per frame.
    pub fn take_events(&mut self) -> Vec<MapEvent> {
        std::mem::take(&mut self.events)
    }

    /// The projection for the current viewport state over the given widget rectangle.
    pub fn projection(&self, rect: Rect) -> MapProjection {
        MapProjection::new(self.zoom, self.center, rect)
    }

    /// Handles user input for panning and zooming.
    fn handle_input(&mut self, ui: &Ui, rect: &Rect, response: &Response) {
        // Handle panning
        if response.dragged() {
            // A drag gesture takes over from any programmatic pan.
            self.pan = None;

            let delta = response.drag_delta();
            let center_in_tiles_x = lon_to_x(self.center.lon, self.zoom);
            let center_in_tiles_y = lat_to_y(self.center.lat, self.zoom);

            let mut new_center_x = center_in_tiles_x - (delta.x as f64 / TILE_SIZE as f64);
            let mut new_center_y = center_in_tiles_y - (delta.y as f64 / TILE_SIZE as f64);

            // Clamp the new center to the map boundaries.
            let world_size_in_tiles = 2.0_f64.powi(self.zoom as i32);
            let view_size_in_tiles_x = rect.width() as f64 / TILE_SIZE as f64;
            let view_size_in_tiles_y = rect.height() as f64 / TILE_SIZE as f64;

            let min_center_x = view_size_in_tiles_x / 2.0;
            let max_center_x = world_size_in_tiles - view_size_in_tiles_x / 2.0;
            let min_center_y = view_size_in_tiles_y / 2.0;
            let max_center_y = world_size_in_tiles - view_size_in_tiles_y / 2.0;

            // If the map is smaller than the viewport, center it. Otherwise, clamp the center.
            new_center_x = if min_center_x > max_center_x {
                world_size_in_tiles / 2.0
            } else {
                new_center_x.clamp(min_center_x, max_center_x)
            };
            new_center_y = if min_center_y > max_center_y {
                world_size_in_tiles / 2.0
            } else {
                new_center_y.clamp(min_center_y, max_center_y)
            };

            self.center = GeoPos {
                lon: projection::x_to_lon(new_center_x, self.zoom),
                lat: projection::y_to_lat(new_center_y, self.zoom),
            };
        }

        // Handle double-click to zoom and center
        if response.double_clicked() {
            if let Some(pointer_pos) = response.interact_pointer_pos() {
                let new_zoom =
                    (self.zoom + 1).clamp(self.config.min_zoom(), self.config.max_zoom());

                if new_zoom != self.zoom {
                    // Center the map on the clicked location at the new zoom level.
                    let target = self.projection(*rect).unproject(pointer_pos);
                    self.zoom = new_zoom;
                    self.center = target;
                }
            }
        }

        // Handle zooming and mouse position
        if response.hovered() {
            if let Some(mouse_pos) = response.hover_pos() {
                let target = self.projection(*rect).unproject(mouse_pos);
                self.mouse_pos = Some(target);

                let scroll = ui.input(|i| i.raw_scroll_delta.y);
                if scroll != 0.0 {
                    let old_zoom = self.zoom;
                    let mut new_zoom = (self.zoom as i32 + scroll.signum() as i32)
                        .clamp(self.config.min_zoom() as i32, self.config.max_zoom() as i32)
                        as u8;

                    // If we are zooming out, check if the new zoom level is valid.
                    if scroll < 0.0 {
                        let world_pixel_size = 2.0_f64.powi(new_zoom as i32) * TILE_SIZE as f64;
                        // If the world size would become smaller than the widget size, reject the zoom.
                        if world_pixel_size < rect.width() as f64
                            || world_pixel_size < rect.height() as f64
                        {
                            new_zoom = old_zoom;
                        }
                    }

                    if new_zoom != old_zoom {
                        self.zoom = new_zoom;

                        // Adjust the map center so the geo-coordinate under
                        // the mouse remains the same.
                        let mouse_rel = mouse_pos - rect.min;
                        let widget_center_x = rect.width() as f64 / 2.0;
                        let widget_center_y = rect.height() as f64 / 2.0;

                        let new_target_x = lon_to_x(target.lon, new_zoom);
                        let new_target_y = lat_to_y(target.lat, new_zoom);

                        let new_center_x = new_target_x
                            - (mouse_rel.x as f64 - widget_center_x) / TILE_SIZE as f64;
                        let new_center_y = new_target_y
                            - (mouse_rel.y as f64 - widget_center_y) / TILE_SIZE as f64;

                        self.center = GeoPos {
                            lon: projection::x_to_lon(new_center_x, new_zoom),
                            lat: projection::y_to_lat(new_center_y, new_zoom),
                        };
                    }
                }
            } else {
                self.mouse_pos = None;
            }
        } else {
            self.mouse_pos = None;
        }
    }

    /// Advances the pan animation and the deferred zoom.
    fn step_animations(&mut self, now: Instant, rect: Rect, ctx: &egui::Context) {
        if let Some(pan) = self.pan {
            let t = now.duration_since(pan.start).as_secs_f64() / pan.duration.as_secs_f64();
            if t >= 1.0 {
                self.center = pan.to;
                self.pan = None;
                self.emit_move_end(rect);
            } else {
                let k = ease_in_out_quad(t);
                self.center = GeoPos {
                    lon: pan.from.lon + (pan.to.lon - pan.from.lon) * k,
                    lat: pan.from.lat + (pan.to.lat - pan.from.lat) * k,
                };
                ctx.request_repaint();
            }
        }

        if let Some(deferred) = self.deferred_zoom {
            if now >= deferred.due {
                self.deferred_zoom = None;
                self.set_zoom(deferred.zoom);
            } else {
                ctx.request_repaint_after(deferred.due - now);
            }
        }
    }

    fn emit_move_end(&mut self, rect: Rect) {
        let bounds = self.projection(rect).bounds();
        debug!(
            "move end: center: lat: {}, lon: {}",
            self.center.lat, self.center.lon
        );
        debug!(
            "move end: bounds: {}",
            serde_json::to_string(&bounds).unwrap_or_default()
        );
        self.events.push(MapEvent::MoveEnd {
            center: self.center,
            bounds,
        });
    }

    /// Reports a zoom level change once per effective change, regardless of
    /// which path (scroll, double-click, `set_zoom`, deferred zoom) caused it.
    fn report_zoom_if_changed(&mut self, rect: Rect) {
        if self.zoom == self.last_reported_zoom {
            return;
        }
        self.last_reported_zoom = self.zoom;

        let bounds = self.projection(rect).bounds();
        debug!("zoom changed: level: {}", self.zoom);
        debug!(
            "zoom changed: bounds: {}",
            serde_json::to_string(&bounds).unwrap_or_default()
        );
        self.events.push(MapEvent::ZoomChanged {
            zoom: self.zoom,
            bounds,
        });
    }

    /// Inserts a tile download into the cache if needed and polls its progress.
    fn ensure_tile(&mut self, ctx: &egui::Context, tile_id: TileId) {
        let tile = self.tiles.entry(tile_id).or_insert_with(|| {
            Tile::Loading(spawn_tile_download(self.config.tile_url(&tile_id)))
        });

        // Promote a finished download before drawing, so a tile that has just
        // arrived is shown in the same frame.
        if let Tile::Loading(promise) = tile {
            if let Some(result) = promise.ready() {
                match result {
                    Ok(color_image) => {
                        let texture = ctx.load_texture(
                            format!("tile_{}_{}_{}", tile_id.z, tile_id.x, tile_id.y),
                            color_image.clone(),
                            Default::default(),
                        );
                        *tile = Tile::Loaded(texture);
                    }
                    Err(e) => {
                        error!("{:?}", e);
                        *tile = Tile::Failed(e.clone());
                    }
                }
            }
        }
    }

    /// Draws a single map tile, or a placeholder while it loads or has failed.
    fn paint_tile(&self, ui: &mut Ui, painter: &egui::Painter, tile_id: TileId, tile_pos: egui::Pos2) {
        let tile_rect =
            Rect::from_min_size(tile_pos, Vec2::new(TILE_SIZE as f32, TILE_SIZE as f32));

        match self.tiles.get(&tile_id) {
            Some(Tile::Loaded(texture)) => {
                painter.image(
                    texture.id(),
                    tile_rect,
                    Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                    Color32::WHITE,
                );
            }
            Some(Tile::Loading(_)) => {
                paint_placeholder_tile(painter, tile_rect, "?", Color32::ORANGE);
                // The tile is still loading, so we need to tell egui to repaint.
                ui.ctx().request_repaint();
            }
            Some(Tile::Failed(e)) => {
                paint_placeholder_tile(painter, tile_rect, "!", Color32::RED);
                let response = ui.interact(tile_rect, ui.id().with(tile_id), Sense::hover());
                response.on_hover_text(format!("{}", e));
            }
            None => {}
        }
    }

    /// Returns the tiles visible in the given rectangle with their screen positions.
    fn visible_tiles(&self, rect: &Rect) -> Vec<(TileId, egui::Pos2)> {
        let center_x = lon_to_x(self.center.lon, self.zoom);
        let center_y = lat_to_y(self.center.lat, self.zoom);

        let widget_center_x = rect.width() / 2.0;
        let widget_center_y = rect.height() / 2.0;

        let x_min = (center_x - widget_center_x as f64 / TILE_SIZE as f64).floor() as i32;
        let y_min = (center_y - widget_center_y as f64 / TILE_SIZE as f64).floor() as i32;
        let x_max = (center_x + widget_center_x as f64 / TILE_SIZE as f64).ceil() as i32;
        let y_max = (center_y + widget_center_y as f64 / TILE_SIZE as f64).ceil() as i32;

        let mut tiles = Vec::new();
        for x in x_min..=x_max {
            for y in y_min..=y_max {
                let tile_id = TileId {
                    z: self.zoom,
                    x: x as u32,
                    y: y as u32,
                };
                let screen_x = widget_center_x + (x as f64 - center_x) as f32 * TILE_SIZE as f32;
                let screen_y = widget_center_y + (y as f64 - center_y) as f32 * TILE_SIZE as f32;
                tiles.push((tile_id, rect.min + Vec2::new(screen_x, screen_y)));
            }
        }
        tiles
    }

    /// Draws the base tiles, the layers, and the attribution.
    fn draw_map(&mut self, ui: &mut Ui, rect: &Rect) {
        let painter = ui.painter_at(*rect);
        painter.rect_filled(*rect, 0.0, Color32::from_rgb(220, 220, 220)); // Background

        for (tile_id, tile_pos) in self.visible_tiles(rect) {
            self.ensure_tile(ui.ctx(), tile_id);
            self.paint_tile(ui, &painter, tile_id, tile_pos);
        }

        let projection = self.projection(*rect);
        for layer in self.layers.values() {
            layer.draw(&painter, &projection);
        }
        self.markers.draw(&painter, &projection);

        self.draw_attribution(ui, rect);
    }

    /// Draws the open marker popup, if any, as a floating overlay.
    fn draw_open_popup(&mut self, ui: &mut Ui, rect: Rect) {
        let projection = self.projection(rect);
        let Some(index) = self.markers.open_popup() else {
            return;
        };
        let Some(marker) = self.markers.markers().get(index) else {
            self.markers.close_popup();
            return;
        };
        let Some(popup) = marker.popup() else {
            return;
        };

        let anchor = projection.project(marker.pos) - egui::vec2(0.0, marker.radius + 6.0);
        let (bg_color, stroke_color) = if ui.visuals().dark_mode {
            (Color32::from_gray(40), Color32::from_gray(90))
        } else {
            (Color32::WHITE, Color32::from_gray(180))
        };

        let mut close = false;
        egui::Area::new(ui.id().with("marker_popup"))
            .order(egui::Order::Foreground)
            .fixed_pos(anchor)
            .pivot(egui::Align2::CENTER_BOTTOM)
            .show(ui.ctx(), |ui| {
                egui::Frame::NONE
                    .inner_margin(egui::Margin::same(8))
                    .fill(bg_color)
                    .stroke(egui::Stroke::new(1.0, stroke_color))
                    .corner_radius(6.0)
                    .show(ui, |ui| {
                        ui.horizontal(|ui| {
                            popup.ui(ui);
                            if ui.small_button("×").clicked() {
                                close = true;
                            }
                        });
                    });
            });

        if close {
            self.markers.close_popup();
        }
    }

    /// Draws the attribution text.
    fn draw_attribution(&self, ui: &mut Ui, rect: &Rect) {
        if let Some(attribution) = self.config.attribution() {
            let (_text_color, bg_color) = if ui.visuals().dark_mode {
                (Color32::from_gray(230), Color32::from_black_alpha(150))
            } else {
                (Color32::from_gray(80), Color32::from_white_alpha(150))
            };

            let frame = egui::Frame::NONE
                .inner_margin(egui::Margin::same(5)) // A bit of padding
                .fill(bg_color)
                .corner_radius(3.0);

            egui::Area::new(ui.id().with("attribution"))
                .fixed_pos(rect.left_bottom())
                .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(5.0, -5.0))
                .show(ui.ctx(), |ui| {
                    frame.show(ui, |ui| {
                        ui.style_mut().override_text_style = Some(egui::TextStyle::Small);
                        ui.style_mut().wrap_mode = Some(egui::TextWrapMode::Extend); // Don't wrap attribution text.

                        if let Some(url) = self.config.attribution_url() {
                            ui.hyperlink_to(attribution, url);
                        } else {
                            ui.label(attribution);
                        }
                    });
                });
        }
    }
}

/// Draws a uniform placeholder in place of a tile, with a glyph in the center.
fn paint_placeholder_tile(painter: &egui::Painter, tile_rect: Rect, glyph: &str, color: Color32) {
    painter.rect_filled(tile_rect, 0.0, Color32::from_gray(220));
    painter.rect_stroke(
        tile_rect,
        0.0,
        egui::Stroke::new(1.0, Color32::GRAY),
        egui::StrokeKind::Inside,
    );
    painter.text(
        tile_rect.center(),
        egui::Align2::CENTER_CENTER,
        glyph,
        egui::FontId::proportional(40.0),
        color,
    );
}

/// Starts a background download of a tile image.
fn spawn_tile_download(url: String) -> Promise<Result<egui::ColorImage, Arc<eyre::Report>>> {
    Promise::spawn_thread("download_tile", move || -> Result<_, Arc<eyre::Report>> {
        let result: Result<_, eyre::Report> = (|| -> Result<_, eyre::Report> {
            debug!("Downloading tile from {}", &url);
            let response = CLIENT.get(&url).send().map_err(MapError::from)?;

            if !response.status().is_success() {
                return Err(MapError::TileDownloadError(response.status().to_string()).into());
            }

            let bytes = response.bytes().map_err(MapError::from)?.to_vec();
            let image = image::load_from_memory(&bytes)
                .map_err(MapError::from)?
                .to_rgba8();

            let size = [image.width() as _, image.height() as _];
            let pixels = image.into_raw();
            Ok(egui::ColorImage::from_rgba_unmultiplied(size, &pixels))
        })()
        .with_context(|| format!("Failed to download tile from {}", &url));

        result.map_err(Arc::new)
    })
}

impl Widget for &mut Map {
    fn ui(self, ui: &mut Ui) -> Response {
        let (rect, response) =
            ui.allocate_exact_size(ui.available_size(), Sense::drag().union(Sense::click()));

        // Markers and overlay layers get first chance at the input.
        let projection = self.projection(rect);
        let consumed = self.markers.handle_input(&response, &projection)
            || self
                .layers
                .values_mut()
                .any(|layer| layer.handle_input(&response, &projection));
        if !consumed {
            self.handle_input(ui, &rect, &response);
        }

        if response.drag_stopped() {
            self.emit_move_end(rect);
        }

        self.step_animations(Instant::now(), rect, ui.ctx());
        self.report_zoom_if_changed(rect);

        self.draw_map(ui, &rect);
        self.draw_open_popup(ui, rect);

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenStreetMapConfig;
    use egui::vec2;

    const EPSILON: f64 = 1e-9;

    fn test_rect() -> Rect {
        Rect::from_min_size(pos2(0.0, 0.0), vec2(512.0, 512.0))
    }

    #[test]
    fn map_new_uses_config_defaults() {
        let config = OpenStreetMapConfig::default();
        let map = Map::new(config);

        assert_eq!(map.center, GeoPos::new(49.8282, 8.5795));
        assert_eq!(map.zoom, 4);
        assert!(map.mouse_pos.is_none());
        assert!(map.tiles.is_empty());
        assert!(map.markers().markers().is_empty());
    }

    #[test]
    fn set_zoom_clamps_to_config_bounds() {
        let mut map = Map::new(OpenStreetMapConfig::default());

        map.set_zoom(0);
        assert_eq!(map.zoom, 1);

        map.set_zoom(42);
        assert_eq!(map.zoom, 10);

        map.set_zoom(7);
        assert_eq!(map.zoom, 7);
    }

    #[test]
    fn center_on_creates_marker_with_popup() {
        let mut map = Map::new(OpenStreetMapConfig::default());
        map.center_on(51.5074, -0.1278);

        let markers = map.markers().markers();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].pos, GeoPos::new(51.5074, -0.1278));
        assert_eq!(markers[0].radius, 5.0);
        assert_eq!(
            markers[0].popup().map(|p| p.text()),
            Some("Custom Data Injection")
        );

        // The pan animation targets the coordinate.
        let pan = map.pan.expect("center_on starts a pan");
        assert_eq!(pan.to, GeoPos::new(51.5074, -0.1278));
        assert_eq!(pan.from, GeoPos::new(49.8282, 8.5795));
    }

    #[test]
    fn center_on_replaces_previous_marker() {
        let mut map = Map::new(OpenStreetMapConfig::default());
        map.center_on(51.5074, -0.1278);
        map.center_on(60.16952, 24.93545);

        let markers = map.markers().markers();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].pos, GeoPos::new(60.16952, 24.93545));
    }

    #[test]
    fn deferred_zoom_fires_after_delay() {
        let ctx = egui::Context::default();
        let mut map = Map::new(OpenStreetMapConfig::default());
        map.center_on(51.5074, -0.1278);

        let due = map.deferred_zoom.expect("center_on schedules a zoom").due;

        // Just before the delay elapses nothing happens.
        map.step_animations(due - Duration::from_millis(1), test_rect(), &ctx);
        assert_eq!(map.zoom, 4);
        assert!(map.deferred_zoom.is_some());

        // At the deadline the zoom level changes to 8, exactly once.
        map.step_animations(due, test_rect(), &ctx);
        assert_eq!(map.zoom, 8);
        assert!(map.deferred_zoom.is_none());

        map.report_zoom_if_changed(test_rect());
        let events = map.take_events();
        let zoom_events: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, MapEvent::ZoomChanged { zoom: 8, .. }))
            .collect();
        assert_eq!(zoom_events.len(), 1);

        // No further report without a further change.
        map.report_zoom_if_changed(test_rect());
        assert!(map.take_events().is_empty());
    }

    #[test]
    fn pan_animation_converges_and_reports_move_end() {
        let ctx = egui::Context::default();
        let mut map = Map::new(OpenStreetMapConfig::default());
        map.center_on(51.5074, -0.1278);

        let pan = map.pan.expect("center_on starts a pan");

        // Halfway through, the center is strictly between start and target.
        map.step_animations(pan.start + pan.duration / 2, test_rect(), &ctx);
        assert!(map.center.lat > 49.8282 && map.center.lat < 51.5074);
        assert!(map.pan.is_some());

        // Once the duration has elapsed the center is exactly the target and
        // a single move-end event is reported.
        map.step_animations(pan.start + pan.duration, test_rect(), &ctx);
        assert_eq!(map.center, GeoPos::new(51.5074, -0.1278));
        assert!(map.pan.is_none());

        let events = map.take_events();
        let move_ends: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                MapEvent::MoveEnd { center, bounds } => Some((center, bounds)),
                _ => None,
            })
            .collect();
        assert_eq!(move_ends.len(), 1);
        let (center, bounds) = move_ends[0];
        assert_eq!(*center, GeoPos::new(51.5074, -0.1278));
        assert!(bounds.contains(*center));
    }

    #[test]
    fn move_end_reports_center_and_bounds() {
        let mut map = Map::new(OpenStreetMapConfig::default());
        map.emit_move_end(test_rect());

        let events = map.take_events();
        assert_eq!(events.len(), 1);
        match events[0] {
            MapEvent::MoveEnd { center, bounds } => {
                assert_eq!(center, GeoPos::new(49.8282, 8.5795));
                assert!(bounds.contains(center));
            }
            _ => panic!("expected a move-end event"),
        }

        // Drained.
        assert!(map.take_events().is_empty());
    }

    #[test]
    fn ease_in_out_quad_endpoints_and_shape() {
        assert!((ease_in_out_quad(0.0) - 0.0).abs() < EPSILON);
        assert!((ease_in_out_quad(0.5) - 0.5).abs() < EPSILON);
        assert!((ease_in_out_quad(1.0) - 1.0).abs() < EPSILON);

        // Monotonically increasing.
        let mut prev = 0.0;
        for i in 1..=100 {
            let v = ease_in_out_quad(i as f64 / 100.0);
            assert!(v >= prev);
            prev = v;
        }
    }

    #[test]
    fn visible_tiles_cover_the_viewport() {
        let map = Map::new(OpenStreetMapConfig::default());
        let tiles = map.visible_tiles(&test_rect());

        // A 512x512 viewport spans at least a 2x2 tile grid.
        assert!(tiles.len() >= 4);
        assert!(tiles.iter().all(|(id, _)| id.z == 4));
    }

    #[test]
    fn map_event_serializes_bounds_as_json() {
        let event = MapEvent::ZoomChanged {
            zoom: 8,
            bounds: GeoBounds {
                south_west: GeoPos::new(45.0, 0.0),
                north_east: GeoPos::new(55.0, 17.0),
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("ZoomChanged"));
        assert!(json.contains("south_west"));
        assert!(json.contains("north_east"));
    }
}
