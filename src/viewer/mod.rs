//! Capability surface of the deep-zoom viewer the overlays are drawn on.
//!
//! The viewer owns tile rendering, pan/zoom and the viewport projection. The
//! overlay layer only needs the operations in [`ViewerBackend`]; the
//! [`headless`] backend implements them without a display.

pub mod events;
pub mod headless;

use crate::geometry::{ImagePoint, ImageSize, PixelPoint, ViewportPoint};

pub use events::{
    EventAction, OverlayGesture, Subscription, ViewerEvent, ViewerEventKind, ViewerEvents,
};
pub use headless::HeadlessViewer;

/// Opaque handle of an overlay element owned by the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

/// Description of the marker element created for a POI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayElement {
    pub dom_id: String,
    pub classes: Vec<String>,
    pub label: String,
    pub tooltip: String,
}

/// Presentation state applied to an overlay element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub displayed: bool,
    pub opacity: f32,
    /// Whether the element intercepts pointer input; when off, input reaches the canvas.
    pub pointer_events: bool,
}

impl OverlayStyle {
    pub const SHOWN: OverlayStyle = OverlayStyle {
        displayed: true,
        opacity: 1.0,
        pointer_events: true,
    };

    pub const HIDDEN: OverlayStyle = OverlayStyle {
        displayed: false,
        opacity: 0.0,
        pointer_events: false,
    };
}

/// Operations the overlay layer consumes from the viewer.
///
/// Overlays are always centered on their location.
pub trait ViewerBackend {
    fn events(&self) -> &ViewerEvents;

    /// Content size of the loaded image, `None` until the viewer has opened one.
    fn image_size(&self) -> Option<ImageSize>;
    fn viewport_zoom(&self) -> f64;
    fn viewport_to_image_zoom(&self, viewport_zoom: f64) -> f64;
    fn image_to_viewport(&self, point: ImagePoint) -> ViewportPoint;
    fn viewport_to_image(&self, point: ViewportPoint) -> ImagePoint;
    fn pixel_to_viewport(&self, pixel: PixelPoint) -> ViewportPoint;

    fn create_element(&self, element: &OverlayElement) -> ElementId;
    fn release_element(&self, element: ElementId);
    fn set_element_style(&self, element: ElementId, style: OverlayStyle);
    /// Routes pointer input on the element to [`ViewerEvent::OverlayPointer`] and
    /// lets handlers stop it from reaching the canvas.
    fn track_pointer(&self, element: ElementId);
    fn untrack_pointer(&self, element: ElementId);

    fn has_overlay(&self, element: ElementId) -> bool;
    fn add_overlay(&self, element: ElementId, location: ViewportPoint);
    fn update_overlay(&self, element: ElementId, location: ViewportPoint);
    fn remove_overlay(&self, element: ElementId);
}
