//! Configuration for different map providers.

use std::sync::Arc;

use crate::{MAX_ZOOM, MIN_ZOOM, TileId, projection::GeoPos};

/// Configuration for a map provider.
pub trait MapConfig {
    /// Returns the URL for a given tile.
    fn tile_url(&self, tile: &TileId) -> String;

    /// Returns the attribution text to be displayed on the map. If returns `None`, no attribution is shown.
    fn attribution(&self) -> Option<&String>;

    /// Returns the attribution URL to be linked from the attribution text.
    fn attribution_url(&self) -> Option<&String>;

    /// The default geographical center of the map.
    fn default_center(&self) -> GeoPos;

    /// The default zoom level of the map.
    fn default_zoom(&self) -> u8;

    /// The smallest zoom level the map allows.
    fn min_zoom(&self) -> u8 {
        MIN_ZOOM
    }

    /// The largest zoom level the map allows.
    fn max_zoom(&self) -> u8 {
        MAX_ZOOM
    }
}

/// Configuration for the OpenStreetMap tile server.
///
/// Defaults to a view over Europe with zoom levels restricted to `[1, 10]`.
///
/// # Example
///
/// ```
/// use egui_marker_map::config::OpenStreetMapConfig;
/// let config = OpenStreetMapConfig::default();
/// ```
#[cfg(feature = "openstreetmap")]
#[derive(Clone)]
pub struct OpenStreetMapConfig {
    base_url: String,
    attribution: String,
    attribution_url: String,
    default_center: GeoPos,
    default_zoom: u8,
    min_zoom: u8,
    max_zoom: u8,
}

#[cfg(feature = "openstreetmap")]
impl Default for OpenStreetMapConfig {
    fn default() -> Self {
        Self {
            base_url: "https://tile.openstreetmap.org".to_string(),
            attribution: "© OpenStreetMap".to_string(),
            attribution_url: "http://www.openstreetmap.org/copyright".to_string(),
            default_center: GeoPos::new(49.8282, 8.5795), // Roughly central to Europe
            default_zoom: 4,
            min_zoom: 1,
            max_zoom: 10,
        }
    }
}

#[cfg(feature = "openstreetmap")]
impl MapConfig for OpenStreetMapConfig {
    fn tile_url(&self, tile: &TileId) -> String {
        format!("{}/{}/{}/{}.png", self.base_url, tile.z, tile.x, tile.y)
    }

    fn attribution(&self) -> Option<&String> {
        Some(&self.attribution)
    }

    fn attribution_url(&self) -> Option<&String> {
        Some(&self.attribution_url)
    }

    fn default_center(&self) -> GeoPos {
        self.default_center
    }

    fn default_zoom(&self) -> u8 {
        self.default_zoom
    }

    fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    fn max_zoom(&self) -> u8 {
        self.max_zoom
    }
}

/// A dynamic map configuration that allows defining a custom tile URL function at runtime.
///
/// # Example
///
/// ```
/// use egui_marker_map::config::DynMapConfig;
/// let config = DynMapConfig::new(|tile| format!("https://my-tile-server/{}/{}/{}.png", tile.z, tile.x, tile.y));
/// ```
#[derive(Clone)]
pub struct DynMapConfig {
    tile_url: Arc<dyn Fn(&TileId) -> String + Send + Sync>,
}

impl DynMapConfig {
    /// Creates a new `DynMapConfig` with a custom tile URL function.
    pub fn new(tile_url: impl Fn(&TileId) -> String + Send + Sync + 'static) -> Self {
        Self {
            tile_url: Arc::new(tile_url),
        }
    }
}

impl MapConfig for DynMapConfig {
    fn tile_url(&self, tile: &TileId) -> String {
        (self.tile_url)(tile)
    }

    fn attribution(&self) -> Option<&String> {
        None
    }

    fn attribution_url(&self) -> Option<&String> {
        None
    }

    fn default_center(&self) -> GeoPos {
        GeoPos::new(49.8282, 8.5795)
    }

    fn default_zoom(&self) -> u8 {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TileId;

    #[test]
    #[cfg(feature = "openstreetmap")]
    fn openstreetmap_config_default() {
        let config = OpenStreetMapConfig::default();
        assert_eq!(config.base_url, "https://tile.openstreetmap.org");
        assert_eq!(config.attribution, "© OpenStreetMap");
        assert_eq!(config.default_center(), GeoPos::new(49.8282, 8.5795));
        assert_eq!(config.default_zoom(), 4);
        assert_eq!(config.min_zoom(), 1);
        assert_eq!(config.max_zoom(), 10);
    }

    #[test]
    #[cfg(feature = "openstreetmap")]
    fn openstreetmap_config_tile_url() {
        let config = OpenStreetMapConfig::default();
        let tile_id = TileId {
            z: 10,
            x: 559,
            y: 330,
        };
        assert_eq!(
            config.tile_url(&tile_id),
            "https://tile.openstreetmap.org/10/559/330.png"
        );
    }

    #[test]
    fn dyn_config_tile_url() {
        let config =
            DynMapConfig::new(|tile| format!("https://tiles.test/{}/{}/{}.png", tile.z, tile.x, tile.y));
        let tile_id = TileId { z: 3, x: 1, y: 2 };
        assert_eq!(config.tile_url(&tile_id), "https://tiles.test/3/1/2.png");
        // Dynamic configs carry no attribution.
        assert!(config.attribution().is_none());
        assert!(config.attribution_url().is_none());
    }
}
