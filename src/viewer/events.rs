use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::geometry::{ContainerSize, ImageSize, PixelPoint, ViewportPoint};

use super::ElementId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayGesture {
    Press,
    Release,
    Click,
    Enter,
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    Open { image_size: ImageSize },
    OpenFailed { message: String },
    Zoom { zoom: f64 },
    Animation,
    Pan { center: ViewportPoint },
    Resize { container: ContainerSize },
    TileLoadFailed { message: String },
    /// The viewer could not add an image item (tile source) to the world.
    AddItemFailed { message: String },
    /// Click on the canvas. `target` is the overlay element under the pointer, if
    /// that element let the click through.
    CanvasClick {
        position: PixelPoint,
        target: Option<ElementId>,
    },
    CanvasContextMenu { position: PixelPoint },
    OverlayPointer {
        element: ElementId,
        gesture: OverlayGesture,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerEventKind {
    Open,
    Zoom,
    ViewportChanged,
    Resize,
    Failure,
    Pointer,
}

impl ViewerEvent {
    pub const fn kind(&self) -> ViewerEventKind {
        match self {
            Self::Open { .. } => ViewerEventKind::Open,
            Self::Zoom { .. } => ViewerEventKind::Zoom,
            Self::Animation | Self::Pan { .. } => ViewerEventKind::ViewportChanged,
            Self::Resize { .. } => ViewerEventKind::Resize,
            Self::OpenFailed { .. } | Self::TileLoadFailed { .. } | Self::AddItemFailed { .. } => {
                ViewerEventKind::Failure
            }
            Self::CanvasClick { .. }
            | Self::CanvasContextMenu { .. }
            | Self::OverlayPointer { .. } => ViewerEventKind::Pointer,
        }
    }
}

/// Outcome a handler reports back to the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventAction {
    #[default]
    Default,
    /// Suppress the viewer's own handling (propagation to the canvas, native menus).
    PreventDefault,
}

type Handler = Rc<RefCell<dyn FnMut(&ViewerEvent) -> EventAction>>;

struct Registration {
    id: u64,
    kind: ViewerEventKind,
    once: bool,
    /// Shared with the [`Subscription`]; cleared on unsubscribe or once-delivery.
    alive: Rc<Cell<bool>>,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: Cell<u64>,
    registrations: RefCell<Vec<Registration>>,
}

impl Registry {
    fn remove(&self, id: u64) {
        self.registrations
            .borrow_mut()
            .retain(|registration| registration.id != id);
    }
}

/// Named-event subscription hub owned by a viewer backend.
#[derive(Default)]
pub struct ViewerEvents {
    registry: Rc<Registry>,
}

/// Handle returned by every subscription; dropping it keeps the handler registered.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    alive: Rc<Cell<bool>>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.alive.get() && self.registry.strong_count() > 0
    }

    /// Removes the handler, including from an `emit` already in progress; returns
    /// `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let was_active = self.is_active();
        self.alive.set(false);
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
        was_active
    }
}

impl ViewerEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: ViewerEventKind, handler: F) -> Subscription
    where
        F: FnMut(&ViewerEvent) -> EventAction + 'static,
    {
        self.register(kind, false, Rc::new(RefCell::new(handler)))
    }

    /// Registers a handler that is removed right before its first delivery.
    pub fn subscribe_once<F>(&self, kind: ViewerEventKind, handler: F) -> Subscription
    where
        F: FnMut(&ViewerEvent) -> EventAction + 'static,
    {
        self.register(kind, true, Rc::new(RefCell::new(handler)))
    }

    pub fn on_open<F>(&self, mut handler: F) -> Subscription
    where
        F: FnMut(&ViewerEvent) + 'static,
    {
        self.subscribe(ViewerEventKind::Open, move |event| {
            handler(event);
            EventAction::Default
        })
    }

    pub fn on_zoom_changed<F>(&self, mut handler: F) -> Subscription
    where
        F: FnMut(&ViewerEvent) + 'static,
    {
        self.subscribe(ViewerEventKind::Zoom, move |event| {
            handler(event);
            EventAction::Default
        })
    }

    /// Animation frames and pans.
    pub fn on_viewport_changed<F>(&self, mut handler: F) -> Subscription
    where
        F: FnMut(&ViewerEvent) + 'static,
    {
        self.subscribe(ViewerEventKind::ViewportChanged, move |event| {
            handler(event);
            EventAction::Default
        })
    }

    pub fn on_resize<F>(&self, mut handler: F) -> Subscription
    where
        F: FnMut(&ViewerEvent) + 'static,
    {
        self.subscribe(ViewerEventKind::Resize, move |event| {
            handler(event);
            EventAction::Default
        })
    }

    pub fn on_failure<F>(&self, mut handler: F) -> Subscription
    where
        F: FnMut(&ViewerEvent) + 'static,
    {
        self.subscribe(ViewerEventKind::Failure, move |event| {
            handler(event);
            EventAction::Default
        })
    }

    pub fn on_pointer<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&ViewerEvent) -> EventAction + 'static,
    {
        self.subscribe(ViewerEventKind::Pointer, handler)
    }

    pub fn handler_count(&self, kind: ViewerEventKind) -> usize {
        self.registry
            .registrations
            .borrow()
            .iter()
            .filter(|registration| registration.kind == kind)
            .count()
    }

    /// Delivers `event` to every handler of its kind, in registration order.
    pub fn emit(&self, event: &ViewerEvent) -> EventAction {
        let kind = event.kind();
        let deliveries: Vec<(u64, bool, Rc<Cell<bool>>, Handler)> = {
            let mut registrations = self.registry.registrations.borrow_mut();
            let matching = registrations
                .iter()
                .filter(|registration| registration.kind == kind)
                .map(|registration| {
                    (
                        registration.id,
                        registration.once,
                        Rc::clone(&registration.alive),
                        Rc::clone(&registration.handler),
                    )
                })
                .collect();
            registrations.retain(|registration| !(registration.once && registration.kind == kind));
            matching
        };

        let mut action = EventAction::Default;
        for (id, once, alive, handler) in deliveries {
            if !alive.get() {
                continue;
            }
            if once {
                alive.set(false);
            }
            let Ok(mut handler) = handler.try_borrow_mut() else {
                tracing::warn!(?kind, id, "skipping re-entrant viewer event delivery");
                continue;
            };
            if (&mut *handler)(event) == EventAction::PreventDefault {
                action = EventAction::PreventDefault;
            }
        }
        action
    }

    fn register(&self, kind: ViewerEventKind, once: bool, handler: Handler) -> Subscription {
        let id = self.registry.next_id.get();
        self.registry.next_id.set(id.saturating_add(1));
        let alive = Rc::new(Cell::new(true));
        self.registry.registrations.borrow_mut().push(Registration {
            id,
            kind,
            once,
            alive: Rc::clone(&alive),
            handler,
        });
        Subscription {
            id,
            alive,
            registry: Rc::downgrade(&self.registry),
        }
    }
}
