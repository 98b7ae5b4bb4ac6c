//! Wires the overlay manager and interaction router to a viewer's events.

mod bootstrap;

use std::cell::RefCell;
use std::rc::Rc;

use crate::interaction::InteractionRouter;
use crate::notification::Notifier;
use crate::overlay::{LoadReport, OverlayManager, OverlaySettings};
use crate::panel::ClickCallback;
use crate::poi::{PoiDefaults, PoiEditor, PoiRecord};
use crate::storage::PoiStore;
use crate::viewer::{EventAction, Subscription, ViewerBackend, ViewerEvent};

pub(crate) use bootstrap::{bootstrap_app_runtime, open_poi_store, AppBootstrap};

/// Collaborators the host supplies for clicks, creation, persistence and notices.
pub struct AppServices {
    pub on_click: ClickCallback,
    pub editor: Box<dyn PoiEditor>,
    pub store: PoiStore,
    pub notifier: Box<dyn Notifier>,
}

/// One viewer session: constructed once, torn down on drop.
pub struct AppContext {
    manager: OverlayManager,
    router: Rc<RefCell<InteractionRouter>>,
    defaults: PoiDefaults,
    subscriptions: Vec<Subscription>,
}

impl AppContext {
    pub fn new(
        backend: Rc<dyn ViewerBackend>,
        settings: OverlaySettings,
        defaults: PoiDefaults,
        services: AppServices,
    ) -> Self {
        let manager = OverlayManager::new(Rc::clone(&backend), settings);
        let router = Rc::new(RefCell::new(InteractionRouter::new(
            manager.downgrade(),
            services.on_click,
            services.editor,
            services.store,
            services.notifier,
        )));

        let events = backend.events();
        let weak = manager.downgrade();
        let mut subscriptions = Vec::with_capacity(6);

        subscriptions.push(events.on_open({
            let weak = weak.clone();
            move |_| {
                if let Some(manager) = weak.upgrade() {
                    manager.initialize();
                }
            }
        }));
        subscriptions.push(events.on_zoom_changed({
            let weak = weak.clone();
            move |_| {
                if let Some(manager) = weak.upgrade() {
                    manager.update_visibility();
                }
            }
        }));
        subscriptions.push(events.on_viewport_changed({
            let weak = weak.clone();
            move |_| {
                if let Some(manager) = weak.upgrade() {
                    manager.update_visibility();
                }
            }
        }));
        subscriptions.push(events.on_resize(move |_| {
            if let Some(manager) = weak.upgrade() {
                manager.sync_overlays();
            }
        }));
        subscriptions.push(events.on_failure(log_viewer_failure));
        subscriptions.push(events.on_pointer({
            let router = Rc::clone(&router);
            move |event| match router.try_borrow_mut() {
                Ok(mut router) => router.handle(event),
                Err(_) => {
                    tracing::warn!(?event, "pointer event arrived while router was busy");
                    EventAction::Default
                }
            }
        }));

        manager.initialize();
        tracing::debug!(handlers = subscriptions.len(), "viewer session wired");

        Self {
            manager,
            router,
            defaults,
            subscriptions,
        }
    }

    pub fn manager(&self) -> &OverlayManager {
        &self.manager
    }

    pub fn hovered_poi(&self) -> Option<String> {
        self.router.borrow().hovered().map(str::to_string)
    }

    /// Loads the dataset plus previously saved custom POIs, then initializes.
    pub fn dataset_loaded(&self, records: Vec<PoiRecord>) -> LoadReport {
        let mut report = self.manager.load_pois(records);

        let saved = self.router.borrow().store().load(self.defaults);
        match saved {
            Ok(custom) => {
                let custom_report = self.manager.load_pois(custom.records);
                report.accepted += custom_report.accepted;
                report.rejected += custom_report.rejected + custom.skipped;
            }
            Err(err) => tracing::warn!(?err, "failed to read saved POIs; continuing without them"),
        }

        self.manager.initialize();
        report
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }
}

fn log_viewer_failure(event: &ViewerEvent) {
    match event {
        ViewerEvent::OpenFailed { message } => {
            tracing::error!(%message, "viewer failed to open image")
        }
        ViewerEvent::TileLoadFailed { message } => {
            tracing::warn!(%message, "viewer failed to load tile")
        }
        ViewerEvent::AddItemFailed { message } => {
            tracing::error!(%message, "viewer failed to add image item")
        }
        other => tracing::debug!(event = ?other, "unexpected failure event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{ContainerSize, ImagePoint, ImageSize, PixelPoint};
    use crate::notification::LogNotifier;
    use crate::overlay::Visibility;
    use crate::poi::{PoiDraft, PoiEdit, PoiLocation};
    use crate::storage::MemoryStorage;
    use crate::viewer::headless::ClickDispatch;
    use crate::viewer::{HeadlessViewer, ViewerEventKind};

    fn services(store: PoiStore) -> AppServices {
        AppServices {
            on_click: Box::new(|_: Option<&PoiRecord>| {}),
            editor: Box::new(|_: &PoiDraft| -> Option<PoiEdit> { Some(PoiEdit::default()) }),
            store,
            notifier: Box::new(LogNotifier),
        }
    }

    fn session(store: PoiStore) -> (Rc<HeadlessViewer>, AppContext) {
        let viewer = Rc::new(HeadlessViewer::new(ContainerSize::new(800.0, 400.0)));
        let backend: Rc<dyn ViewerBackend> = viewer.clone();
        let context = AppContext::new(
            backend,
            OverlaySettings::default(),
            PoiDefaults::default(),
            services(store),
        );
        (viewer, context)
    }

    fn memory_store() -> PoiStore {
        PoiStore::new(Box::new(MemoryStorage::new()))
    }

    fn dataset() -> Vec<PoiRecord> {
        vec![
            PoiRecord::new("north", PoiLocation::Geographic { lat: 45.0, lon: 10.0 }, "North"),
            PoiRecord::new("south", PoiLocation::Geographic { lat: -45.0, lon: -10.0 }, "South")
                .with_min_zoom(0.5),
            PoiRecord::new("east", PoiLocation::Geographic { lat: 0.0, lon: 90.0 }, "East"),
        ]
    }

    #[test]
    fn dataset_then_open_and_open_then_dataset_agree() {
        let (late_viewer, late_image) = session(memory_store());
        late_image.dataset_loaded(dataset());
        late_viewer.open(ImageSize::new(4096, 2048));

        let (early_viewer, early_image) = session(memory_store());
        early_viewer.open(ImageSize::new(4096, 2048));
        early_image.dataset_loaded(dataset());

        for context in [&late_image, &early_image] {
            let manager = context.manager();
            assert_eq!(manager.rendered_count(), 3);
            assert_eq!(manager.visibility("north"), Some(Visibility::Visible));
            assert_eq!(manager.visibility("south"), Some(Visibility::Hidden));
            assert_eq!(manager.visibility("east"), Some(Visibility::Visible));
        }
        assert_eq!(late_viewer.events().handler_count(ViewerEventKind::Open), 1);
    }

    #[test]
    fn zoom_events_drive_visibility() {
        let (viewer, context) = session(memory_store());
        viewer.open(ImageSize::new(4096, 2048));
        context.dataset_loaded(dataset());

        viewer.set_image_zoom(0.8);
        assert_eq!(context.manager().visibility("south"), Some(Visibility::Visible));

        viewer.set_image_zoom(0.1);
        assert_eq!(context.manager().visibility("south"), Some(Visibility::Hidden));
        assert_eq!(context.manager().visibility("north"), Some(Visibility::Visible));
    }

    #[test]
    fn resize_keeps_overlays_anchored() {
        let (viewer, context) = session(memory_store());
        viewer.open(ImageSize::new(4096, 2048));
        context.dataset_loaded(dataset());
        let element = context.manager().element_for("east").unwrap();
        let before = viewer.element(element).unwrap().location;

        viewer.resize(ContainerSize::new(1200.0, 600.0));
        assert_eq!(viewer.element(element).unwrap().location, before);
        assert_eq!(context.manager().rendered_count(), 3);
    }

    #[test]
    fn saved_pois_come_back_in_next_session() {
        let storage = Rc::new(MemoryStorage::new());
        let (viewer, context) = session(PoiStore::new(Box::new(SharedStorage(storage.clone()))));
        viewer.open(ImageSize::new(4096, 2048));
        context.dataset_loaded(dataset());
        let pixel = viewer.image_to_pixel(ImagePoint::new(3000.0, 1500.0));
        assert!(viewer.context_menu(pixel));
        assert_eq!(context.manager().len(), 4);
        drop(context);

        let (viewer, context) = session(PoiStore::new(Box::new(SharedStorage(storage))));
        viewer.open(ImageSize::new(4096, 2048));
        let report = context.dataset_loaded(dataset());
        assert_eq!(report.accepted, 4);
        assert_eq!(context.manager().rendered_count(), 4);
    }

    #[test]
    fn hover_is_reported_through_context() {
        let (viewer, context) = session(memory_store());
        viewer.open(ImageSize::new(4096, 2048));
        context.dataset_loaded(dataset());

        let element = context.manager().element_for("north").unwrap();
        viewer.hover(element, true);
        assert_eq!(context.hovered_poi().as_deref(), Some("north"));
        assert_eq!(viewer.click(PixelPoint::new(1.0, 399.0)), ClickDispatch::Canvas);
    }

    #[test]
    fn viewer_failures_leave_session_intact() {
        let (viewer, context) = session(memory_store());
        viewer.fail_open("bad.dzi: 404");
        viewer.fail_add_item("tile source rejected");
        assert!(context.manager().image_size().is_none());

        viewer.open(ImageSize::new(4096, 2048));
        context.dataset_loaded(dataset());
        assert_eq!(context.manager().rendered_count(), 3);
    }

    #[test]
    fn drop_unsubscribes_every_handler() {
        let (viewer, context) = session(memory_store());
        assert!(viewer.events().handler_count(ViewerEventKind::Pointer) > 0);
        drop(context);
        for kind in [
            ViewerEventKind::Open,
            ViewerEventKind::Zoom,
            ViewerEventKind::ViewportChanged,
            ViewerEventKind::Resize,
            ViewerEventKind::Failure,
            ViewerEventKind::Pointer,
        ] {
            assert_eq!(viewer.events().handler_count(kind), 0, "{kind:?}");
        }
        viewer.open(ImageSize::new(64, 64));
    }

    struct SharedStorage(Rc<MemoryStorage>);

    impl crate::storage::StorageBackend for SharedStorage {
        fn get_item(&self, key: &str) -> crate::storage::StorageResult<Option<String>> {
            self.0.get_item(key)
        }

        fn set_item(&self, key: &str, value: &str) -> crate::storage::StorageResult<()> {
            self.0.set_item(key, value)
        }
    }
}
