use crate::geometry::ViewportPoint;
use crate::poi::PoiRecord;
use crate::viewer::{ElementId, OverlayElement, ViewerBackend};

use super::visibility::Visibility;

const POI_CLASS: &str = "poi";

/// Marker element of one POI plus its pointer tracking, wired once against the backend.
/// Clones refer to the same element; only the manager's copy is ever released.
#[derive(Debug, Clone)]
pub struct InteractiveOverlay {
    element: ElementId,
}

impl InteractiveOverlay {
    /// Creates the element hidden and non-interactive, with pointer tracking enabled.
    pub fn create(backend: &dyn ViewerBackend, poi: &PoiRecord) -> Self {
        let mut classes = vec![POI_CLASS.to_string()];
        classes.extend(poi.classes.iter().cloned());
        let element = backend.create_element(&OverlayElement {
            dom_id: format!("poi-{}", poi.id),
            classes,
            label: poi.title.clone(),
            tooltip: poi.tooltip(),
        });
        backend.set_element_style(element, Visibility::Hidden.style());
        backend.track_pointer(element);
        tracing::debug!(id = %poi.id, ?element, "created POI overlay element");
        Self { element }
    }

    pub const fn element(&self) -> ElementId {
        self.element
    }

    pub fn place(&self, backend: &dyn ViewerBackend, location: ViewportPoint) {
        if backend.has_overlay(self.element) {
            backend.update_overlay(self.element, location);
        } else {
            backend.add_overlay(self.element, location);
        }
    }

    pub fn is_attached(&self, backend: &dyn ViewerBackend) -> bool {
        backend.has_overlay(self.element)
    }

    pub fn set_visibility(&self, backend: &dyn ViewerBackend, visibility: Visibility) {
        backend.set_element_style(self.element, visibility.style());
    }

    pub fn detach(&self, backend: &dyn ViewerBackend) {
        if backend.has_overlay(self.element) {
            backend.remove_overlay(self.element);
        }
    }

    pub fn release(self, backend: &dyn ViewerBackend) {
        self.detach(backend);
        backend.untrack_pointer(self.element);
        backend.release_element(self.element);
    }
}
