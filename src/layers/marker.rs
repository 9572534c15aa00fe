//! A layer for circle markers with attached popup content.

use egui::{Color32, Painter, Pos2, Response, Stroke};
use std::any::Any;

use crate::layers::Layer;
use crate::popup::PopupContent;
use crate::projection::{GeoPos, MapProjection};

/// Extra screen-space tolerance around a marker when hit-testing clicks.
const HIT_TOLERANCE: f32 = 3.0;

/// A point annotation drawn as a circle at a geographical position.
pub struct CircleMarker {
    /// The geographical position of the marker.
    pub pos: GeoPos,

    /// The circle radius in screen points.
    pub radius: f32,

    /// The fill color of the circle.
    pub fill: Color32,

    /// The outline stroke of the circle.
    pub stroke: Stroke,

    popup: Option<PopupContent>,
}

impl CircleMarker {
    /// Creates a new marker at the given position.
    pub fn new(pos: GeoPos, radius: f32) -> Self {
        Self {
            pos,
            radius,
            fill: Color32::from_rgba_unmultiplied(51, 136, 255, 100),
            stroke: Stroke::new(1.5, Color32::from_rgb(51, 136, 255)),
            popup: None,
        }
    }

    /// Binds popup content to the marker, shown when the marker is clicked.
    pub fn bind_popup(mut self, popup: PopupContent) -> Self {
        self.popup = Some(popup);
        self
    }

    /// The bound popup content, if any.
    pub fn popup(&self) -> Option<&PopupContent> {
        self.popup.as_ref()
    }

    /// Releases the bound popup content, if any.
    fn release_popup(&mut self) {
        if let Some(popup) = self.popup.as_mut() {
            popup.release();
        }
        self.popup = None;
    }
}

/// Layer implementation that manages circle markers and their popups.
///
/// Clicking a marker opens its popup; clicking elsewhere on the map closes an
/// open popup. Popup content is released when the owning marker is removed or
/// replaced, not when its popup is merely closed.
#[derive(Default)]
pub struct MarkerLayer {
    markers: Vec<CircleMarker>,
    open: Option<usize>,
}

impl MarkerLayer {
    /// Creates an empty marker layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a marker and returns its index.
    pub fn add(&mut self, marker: CircleMarker) -> usize {
        self.markers.push(marker);
        self.markers.len() - 1
    }

    /// Replaces every marker with the given one, releasing displaced popups.
    pub fn replace(&mut self, marker: CircleMarker) {
        self.clear();
        self.markers.push(marker);
    }

    /// Removes all markers, releasing their popups.
    pub fn clear(&mut self) {
        for marker in &mut self.markers {
            marker.release_popup();
        }
        self.markers.clear();
        self.open = None;
    }

    /// The markers currently on the layer.
    pub fn markers(&self) -> &[CircleMarker] {
        &self.markers
    }

    /// The index of the marker whose popup is open, if any.
    pub fn open_popup(&self) -> Option<usize> {
        self.open
    }

    /// Opens the popup of the marker at `index`, if it has one.
    pub fn show_popup(&mut self, index: usize) {
        if self
            .markers
            .get(index)
            .is_some_and(|marker| marker.popup.is_some())
        {
            self.open = Some(index);
        }
    }

    /// Closes the open popup. The popup content stays bound to its marker.
    pub fn close_popup(&mut self) {
        self.open = None;
    }

    /// Finds the topmost marker under a screen position.
    pub fn find_marker_at(&self, screen_pos: Pos2, projection: &MapProjection) -> Option<usize> {
        self.markers.iter().enumerate().rev().find_map(|(i, marker)| {
            let center = projection.project(marker.pos);
            let reach = marker.radius + HIT_TOLERANCE;
            (center.distance_sq(screen_pos) <= reach * reach).then_some(i)
        })
    }
}

impl Layer for MarkerLayer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn handle_input(&mut self, response: &Response, projection: &MapProjection) -> bool {
        if !response.clicked() {
            return false;
        }
        let Some(pointer_pos) = response.interact_pointer_pos() else {
            return false;
        };

        if let Some(index) = self.find_marker_at(pointer_pos, projection) {
            if self.open == Some(index) {
                self.close_popup();
            } else {
                self.show_popup(index);
            }
            return true;
        }

        // A click elsewhere on the map closes an open popup, but the click
        // itself is left for the map to handle.
        self.close_popup();
        false
    }

    fn draw(&self, painter: &Painter, projection: &MapProjection) {
        for marker in &self.markers {
            let center = projection.project(marker.pos);
            painter.circle(center, marker.radius, marker.fill, marker.stroke);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{Rect, pos2, vec2};
    use std::cell::Cell;
    use std::rc::Rc;

    fn test_projection(center: GeoPos) -> MapProjection {
        MapProjection::new(
            4,
            center,
            Rect::from_min_size(pos2(0.0, 0.0), vec2(512.0, 512.0)),
        )
    }

    #[test]
    fn add_and_replace() {
        let mut layer = MarkerLayer::new();
        layer.add(CircleMarker::new(GeoPos::new(49.8282, 8.5795), 5.0));
        layer.add(CircleMarker::new(GeoPos::new(51.5074, -0.1278), 5.0));
        assert_eq!(layer.markers().len(), 2);

        layer.replace(CircleMarker::new(GeoPos::new(60.16952, 24.93545), 5.0));
        assert_eq!(layer.markers().len(), 1);
        assert_eq!(layer.markers()[0].pos, GeoPos::new(60.16952, 24.93545));
    }

    #[test]
    fn replace_releases_displaced_popups() {
        let released = Rc::new(Cell::new(false));
        let flag = released.clone();

        let mut layer = MarkerLayer::new();
        layer.add(
            CircleMarker::new(GeoPos::new(49.8282, 8.5795), 5.0).bind_popup(
                PopupContent::new("old").with_on_release(move || flag.set(true)),
            ),
        );

        layer.replace(CircleMarker::new(GeoPos::new(51.5074, -0.1278), 5.0));
        assert!(released.get());
    }

    #[test]
    fn find_marker_at_respects_radius() {
        let center = GeoPos::new(49.8282, 8.5795);
        let projection = test_projection(center);

        let mut layer = MarkerLayer::new();
        layer.add(CircleMarker::new(center, 5.0));

        // The marker projects to the widget center.
        let marker_screen = projection.project(center);
        assert_eq!(layer.find_marker_at(marker_screen, &projection), Some(0));
        assert_eq!(
            layer.find_marker_at(marker_screen + vec2(5.0, 0.0), &projection),
            Some(0)
        );
        assert_eq!(
            layer.find_marker_at(marker_screen + vec2(20.0, 0.0), &projection),
            None
        );
    }

    #[test]
    fn popup_open_close() {
        let mut layer = MarkerLayer::new();
        layer.add(
            CircleMarker::new(GeoPos::new(49.8282, 8.5795), 5.0)
                .bind_popup(PopupContent::new("hello")),
        );
        layer.add(CircleMarker::new(GeoPos::new(51.5074, -0.1278), 5.0));

        layer.show_popup(0);
        assert_eq!(layer.open_popup(), Some(0));

        // A marker without a popup cannot be opened.
        layer.close_popup();
        layer.show_popup(1);
        assert_eq!(layer.open_popup(), None);
    }

    #[test]
    fn closing_keeps_popup_bound() {
        let released = Rc::new(Cell::new(false));
        let flag = released.clone();

        let mut layer = MarkerLayer::new();
        layer.add(
            CircleMarker::new(GeoPos::new(49.8282, 8.5795), 5.0).bind_popup(
                PopupContent::new("hello").with_on_release(move || flag.set(true)),
            ),
        );

        layer.show_popup(0);
        layer.close_popup();
        assert!(!released.get());
        assert!(layer.markers()[0].popup().is_some());

        layer.clear();
        assert!(released.get());
    }
}
