//! Routes viewer pointer input to POI clicks, background clicks, and POI creation.

use crate::geometry::PixelPoint;
use crate::notification::{NotificationKind, Notifier};
use crate::overlay::{CreateOutcome, WeakOverlayManager};
use crate::panel::ClickCallback;
use crate::poi::{PoiEditor, PoiRecord};
use crate::storage::PoiStore;
use crate::viewer::{ElementId, EventAction, OverlayGesture, ViewerEvent};

pub struct InteractionRouter {
    manager: WeakOverlayManager,
    on_click: ClickCallback,
    editor: Box<dyn PoiEditor>,
    store: PoiStore,
    notifier: Box<dyn Notifier>,
    hovered: Option<String>,
}

impl InteractionRouter {
    pub fn new(
        manager: WeakOverlayManager,
        on_click: ClickCallback,
        editor: Box<dyn PoiEditor>,
        store: PoiStore,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            manager,
            on_click,
            editor,
            store,
            notifier,
            hovered: None,
        }
    }

    pub fn hovered(&self) -> Option<&str> {
        self.hovered.as_deref()
    }

    pub fn store(&self) -> &PoiStore {
        &self.store
    }

    pub fn handle(&mut self, event: &ViewerEvent) -> EventAction {
        match event {
            ViewerEvent::CanvasClick { target, .. } => self.canvas_click(*target),
            ViewerEvent::OverlayPointer { element, gesture } => {
                self.overlay_pointer(*element, *gesture)
            }
            ViewerEvent::CanvasContextMenu { position } => {
                self.context_menu(*position);
                EventAction::PreventDefault
            }
            _ => EventAction::Default,
        }
    }

    fn poi_for_element(&self, element: ElementId) -> Option<PoiRecord> {
        self.manager.upgrade()?.poi_for_element(element)
    }

    fn canvas_click(&mut self, target: Option<ElementId>) -> EventAction {
        if target.is_some_and(|element| self.poi_for_element(element).is_some()) {
            return EventAction::PreventDefault;
        }
        (self.on_click)(None);
        EventAction::Default
    }

    fn overlay_pointer(&mut self, element: ElementId, gesture: OverlayGesture) -> EventAction {
        let Some(poi) = self.poi_for_element(element) else {
            return EventAction::Default;
        };
        match gesture {
            OverlayGesture::Click => {
                tracing::debug!(id = %poi.id, "POI clicked");
                (self.on_click)(Some(&poi));
            }
            OverlayGesture::Enter => self.hovered = Some(poi.id),
            OverlayGesture::Exit => {
                if self.hovered.as_deref() == Some(poi.id.as_str()) {
                    self.hovered = None;
                }
            }
            OverlayGesture::Press | OverlayGesture::Release => {}
        }
        EventAction::PreventDefault
    }

    fn context_menu(&mut self, position: PixelPoint) {
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        let backend = manager.backend();
        let viewport_point = backend.pixel_to_viewport(position);
        let image_point = backend.viewport_to_image(viewport_point);
        tracing::debug!(?position, ?viewport_point, ?image_point, "context menu on canvas");

        let record = match manager.create_poi_from_point(image_point, &mut *self.editor) {
            Ok(CreateOutcome::Created(record)) => record,
            Ok(CreateOutcome::Cancelled) => return,
            Err(err) => {
                tracing::warn!(%err, "POI creation failed");
                return;
            }
        };

        match self.store.append(&record) {
            Ok(()) => self.notifier.notify(
                NotificationKind::Success,
                &format!("POI \"{}\" created", record.title),
            ),
            Err(err) => {
                tracing::warn!(id = %record.id, ?err, "failed to save POI");
                self.notifier
                    .notify(NotificationKind::Error, "Failed to save the POI");
            }
        }
    }
}
