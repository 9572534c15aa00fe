//! Popup content shown inside a marker popup.

use egui::Ui;

/// The body of a marker popup: a single externally supplied display string.
///
/// A `PopupContent` is constructed directly and handed to a
/// [`CircleMarker`](crate::layers::marker::CircleMarker). Teardown is an
/// explicit pair: whoever installs the content may register a release
/// callback with [`with_on_release`](Self::with_on_release), and the owner of
/// the popup calls [`release`](Self::release) exactly once when the popup is
/// torn down.
///
/// # Example
///
/// ```
/// use egui_marker_map::popup::PopupContent;
///
/// let mut popup = PopupContent::new("Hello");
/// popup.set_text("World");
/// assert_eq!(popup.text(), "World");
/// ```
pub struct PopupContent {
    text: String,
    on_release: Option<Box<dyn FnOnce()>>,
}

impl PopupContent {
    /// Creates popup content displaying the given text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            on_release: None,
        }
    }

    /// Registers a callback invoked when the popup content is released.
    pub fn with_on_release(mut self, on_release: impl FnOnce() + 'static) -> Self {
        self.on_release = Some(Box::new(on_release));
        self
    }

    /// The display text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replaces the display text. The next render shows the new text.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Renders the popup body.
    pub fn ui(&self, ui: &mut Ui) {
        ui.label(&self.text);
    }

    /// Releases the content, invoking the release callback at most once.
    pub fn release(&mut self) {
        if let Some(on_release) = self.on_release.take() {
            on_release();
        }
    }
}

impl std::fmt::Debug for PopupContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PopupContent")
            .field("text", &self.text)
            .field("has_on_release", &self.on_release.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn text_follows_reassignment() {
        let mut popup = PopupContent::new("X");
        assert_eq!(popup.text(), "X");

        popup.set_text("Y");
        assert_eq!(popup.text(), "Y");
        assert!(!popup.text().contains('X'));
    }

    #[test]
    fn release_fires_exactly_once() {
        let count = Rc::new(Cell::new(0));
        let seen = count.clone();
        let mut popup = PopupContent::new("text").with_on_release(move || {
            seen.set(seen.get() + 1);
        });

        popup.release();
        popup.release();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn release_without_callback_is_a_no_op() {
        let mut popup = PopupContent::new("text");
        popup.release();
        assert_eq!(popup.text(), "text");
    }
}
