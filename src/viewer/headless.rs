//! Display-less viewer with a deep-zoom viewport model.
//!
//! World coordinates follow the usual deep-zoom convention: the image spans
//! `x` in `[0,1]` and `y` in `[0, height/width]`. A viewport zoom of `1.0` fits
//! the image width to the container.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::geometry::{ContainerSize, ImagePoint, ImageSize, PixelPoint, ViewportPoint};

use super::{
    ElementId, EventAction, OverlayElement, OverlayGesture, OverlayStyle, ViewerBackend,
    ViewerEvent, ViewerEvents,
};

const DEFAULT_MARKER_RADIUS_PX: f64 = 8.0;
const MIN_VIEWPORT_ZOOM: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct ElementSnapshot {
    pub element: OverlayElement,
    pub style: OverlayStyle,
    pub location: Option<ViewportPoint>,
    pub tracked: bool,
}

/// Which handler ended up consuming a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickDispatch {
    Overlay(ElementId),
    Canvas,
}

#[derive(Debug)]
struct ViewportState {
    container: ContainerSize,
    image: Option<ImageSize>,
    zoom: f64,
    center: ViewportPoint,
}

#[derive(Debug, Default)]
struct ElementTable {
    next_id: u64,
    elements: BTreeMap<ElementId, ElementSnapshot>,
}

pub struct HeadlessViewer {
    events: ViewerEvents,
    viewport: RefCell<ViewportState>,
    elements: RefCell<ElementTable>,
    marker_radius_px: f64,
}

impl HeadlessViewer {
    pub fn new(container: ContainerSize) -> Self {
        Self {
            events: ViewerEvents::new(),
            viewport: RefCell::new(ViewportState {
                container,
                image: None,
                zoom: 1.0,
                center: ViewportPoint::new(0.5, 0.5),
            }),
            elements: RefCell::new(ElementTable::default()),
            marker_radius_px: DEFAULT_MARKER_RADIUS_PX,
        }
    }

    pub fn with_marker_radius(mut self, radius_px: f64) -> Self {
        self.marker_radius_px = radius_px.max(0.0);
        self
    }

    /// Loads an image, resets the view to fit it, and fires `Open`.
    pub fn open(&self, image_size: ImageSize) {
        {
            let mut viewport = self.viewport.borrow_mut();
            viewport.image = Some(image_size);
            viewport.zoom = 1.0;
            viewport.center = home_center(image_size);
        }
        tracing::debug!(?image_size, "headless viewer opened image");
        self.events.emit(&ViewerEvent::Open { image_size });
    }

    pub fn fail_open(&self, message: impl Into<String>) {
        self.events.emit(&ViewerEvent::OpenFailed {
            message: message.into(),
        });
    }

    pub fn fail_add_item(&self, message: impl Into<String>) {
        self.events.emit(&ViewerEvent::AddItemFailed {
            message: message.into(),
        });
    }

    pub fn set_zoom(&self, zoom: f64) {
        let zoom = zoom.max(MIN_VIEWPORT_ZOOM);
        self.viewport.borrow_mut().zoom = zoom;
        self.events.emit(&ViewerEvent::Zoom { zoom });
        self.events.emit(&ViewerEvent::Animation);
    }

    /// Sets the viewport zoom that yields the requested image zoom.
    pub fn set_image_zoom(&self, image_zoom: f64) {
        let viewport_zoom = {
            let viewport = self.viewport.borrow();
            let image_width = viewport.image.map_or(1.0, |size| f64::from(size.width));
            image_zoom * image_width / viewport.container.width
        };
        self.set_zoom(viewport_zoom);
    }

    pub fn pan_to(&self, center: ViewportPoint) {
        self.viewport.borrow_mut().center = center;
        self.events.emit(&ViewerEvent::Pan { center });
    }

    pub fn resize(&self, container: ContainerSize) {
        self.viewport.borrow_mut().container = container;
        self.events.emit(&ViewerEvent::Resize { container });
    }

    /// Routes a primary click at `pixel`: a tracked, interactive overlay under the
    /// pointer gets the gesture first and may keep it from reaching the canvas.
    pub fn click(&self, pixel: PixelPoint) -> ClickDispatch {
        let target = self.hit_test(pixel);
        if let Some(element) = target.filter(|element| self.is_tracked(*element)) {
            let mut action = EventAction::Default;
            for gesture in [OverlayGesture::Press, OverlayGesture::Release, OverlayGesture::Click] {
                if self.events.emit(&ViewerEvent::OverlayPointer { element, gesture })
                    == EventAction::PreventDefault
                {
                    action = EventAction::PreventDefault;
                }
            }
            if action == EventAction::PreventDefault {
                return ClickDispatch::Overlay(element);
            }
        }
        self.events.emit(&ViewerEvent::CanvasClick {
            position: pixel,
            target,
        });
        ClickDispatch::Canvas
    }

    /// Fires a context-menu gesture; returns whether the native menu was suppressed.
    pub fn context_menu(&self, pixel: PixelPoint) -> bool {
        self.events
            .emit(&ViewerEvent::CanvasContextMenu { position: pixel })
            == EventAction::PreventDefault
    }

    pub fn hover(&self, element: ElementId, entering: bool) {
        if !self.is_tracked(element) {
            return;
        }
        let gesture = if entering {
            OverlayGesture::Enter
        } else {
            OverlayGesture::Exit
        };
        self.events
            .emit(&ViewerEvent::OverlayPointer { element, gesture });
    }

    /// Topmost attached element that intercepts pointer input at `pixel`.
    pub fn hit_test(&self, pixel: PixelPoint) -> Option<ElementId> {
        let elements = self.elements.borrow();
        elements
            .elements
            .iter()
            .rev()
            .filter(|(_, snapshot)| snapshot.style.displayed && snapshot.style.pointer_events)
            .find_map(|(id, snapshot)| {
                let location = snapshot.location?;
                let center = self.viewport_to_pixel(location);
                let within = (center.x - pixel.x).abs() <= self.marker_radius_px
                    && (center.y - pixel.y).abs() <= self.marker_radius_px;
                within.then_some(*id)
            })
    }

    pub fn viewport_to_pixel(&self, point: ViewportPoint) -> PixelPoint {
        let viewport = self.viewport.borrow();
        let scale = viewport.container.width * viewport.zoom;
        let top_left = top_left(&viewport);
        PixelPoint::new(
            (point.x - top_left.x) * scale,
            (point.y - top_left.y) * scale,
        )
    }

    pub fn image_to_pixel(&self, point: ImagePoint) -> PixelPoint {
        self.viewport_to_pixel(self.image_to_viewport(point))
    }

    pub fn element(&self, element: ElementId) -> Option<ElementSnapshot> {
        self.elements.borrow().elements.get(&element).cloned()
    }

    pub fn element_count(&self) -> usize {
        self.elements.borrow().elements.len()
    }

    pub fn overlay_count(&self) -> usize {
        self.elements
            .borrow()
            .elements
            .values()
            .filter(|snapshot| snapshot.location.is_some())
            .count()
    }

    fn is_tracked(&self, element: ElementId) -> bool {
        self.elements
            .borrow()
            .elements
            .get(&element)
            .is_some_and(|snapshot| snapshot.tracked)
    }

    fn with_element(&self, element: ElementId, update: impl FnOnce(&mut ElementSnapshot)) {
        match self.elements.borrow_mut().elements.get_mut(&element) {
            Some(snapshot) => update(snapshot),
            None => tracing::warn!(?element, "unknown overlay element"),
        }
    }

    fn image_width(&self) -> f64 {
        self.viewport
            .borrow()
            .image
            .map_or(1.0, |size| f64::from(size.width))
    }
}

fn home_center(image_size: ImageSize) -> ViewportPoint {
    let aspect = f64::from(image_size.height) / f64::from(image_size.width.max(1));
    ViewportPoint::new(0.5, aspect / 2.0)
}

fn top_left(viewport: &ViewportState) -> ViewportPoint {
    let width = 1.0 / viewport.zoom;
    let height = viewport.container.height / viewport.container.width / viewport.zoom;
    ViewportPoint::new(
        viewport.center.x - width / 2.0,
        viewport.center.y - height / 2.0,
    )
}

impl ViewerBackend for HeadlessViewer {
    fn events(&self) -> &ViewerEvents {
        &self.events
    }

    fn image_size(&self) -> Option<ImageSize> {
        self.viewport.borrow().image
    }

    fn viewport_zoom(&self) -> f64 {
        self.viewport.borrow().zoom
    }

    fn viewport_to_image_zoom(&self, viewport_zoom: f64) -> f64 {
        viewport_zoom * self.viewport.borrow().container.width / self.image_width()
    }

    fn image_to_viewport(&self, point: ImagePoint) -> ViewportPoint {
        let width = self.image_width();
        ViewportPoint::new(point.x / width, point.y / width)
    }

    fn viewport_to_image(&self, point: ViewportPoint) -> ImagePoint {
        let width = self.image_width();
        ImagePoint::new(point.x * width, point.y * width)
    }

    fn pixel_to_viewport(&self, pixel: PixelPoint) -> ViewportPoint {
        let viewport = self.viewport.borrow();
        let scale = viewport.container.width * viewport.zoom;
        let top_left = top_left(&viewport);
        ViewportPoint::new(top_left.x + pixel.x / scale, top_left.y + pixel.y / scale)
    }

    fn create_element(&self, element: &OverlayElement) -> ElementId {
        let mut table = self.elements.borrow_mut();
        let id = ElementId(table.next_id);
        table.next_id = table.next_id.saturating_add(1);
        table.elements.insert(
            id,
            ElementSnapshot {
                element: element.clone(),
                style: OverlayStyle::HIDDEN,
                location: None,
                tracked: false,
            },
        );
        id
    }

    fn release_element(&self, element: ElementId) {
        self.elements.borrow_mut().elements.remove(&element);
    }

    fn set_element_style(&self, element: ElementId, style: OverlayStyle) {
        self.with_element(element, |snapshot| snapshot.style = style);
    }

    fn track_pointer(&self, element: ElementId) {
        self.with_element(element, |snapshot| snapshot.tracked = true);
    }

    fn untrack_pointer(&self, element: ElementId) {
        self.with_element(element, |snapshot| snapshot.tracked = false);
    }

    fn has_overlay(&self, element: ElementId) -> bool {
        self.elements
            .borrow()
            .elements
            .get(&element)
            .is_some_and(|snapshot| snapshot.location.is_some())
    }

    fn add_overlay(&self, element: ElementId, location: ViewportPoint) {
        self.with_element(element, |snapshot| snapshot.location = Some(location));
    }

    fn update_overlay(&self, element: ElementId, location: ViewportPoint) {
        self.with_element(element, |snapshot| snapshot.location = Some(location));
    }

    fn remove_overlay(&self, element: ElementId) {
        self.with_element(element, |snapshot| snapshot.location = None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn marker(label: &str) -> OverlayElement {
        OverlayElement {
            dom_id: format!("poi-{label}"),
            classes: vec!["poi".to_string()],
            label: label.to_string(),
            tooltip: label.to_string(),
        }
    }

    fn opened_viewer() -> HeadlessViewer {
        let viewer = HeadlessViewer::new(ContainerSize::new(800.0, 400.0));
        viewer.open(ImageSize::new(4000, 2000));
        viewer
    }

    #[test]
    fn home_view_fits_image_width_to_container() {
        let viewer = opened_viewer();
        assert_eq!(viewer.viewport_zoom(), 1.0);
        assert!((viewer.viewport_to_image_zoom(1.0) - 0.2).abs() < 1e-12);

        let center = viewer.image_to_pixel(ImagePoint::new(2000.0, 1000.0));
        assert!((center.x - 400.0).abs() < 1e-9);
        assert!((center.y - 200.0).abs() < 1e-9);
    }

    #[test]
    fn pixel_and_viewport_conversions_are_inverse() {
        let viewer = opened_viewer();
        viewer.set_zoom(3.5);
        viewer.pan_to(ViewportPoint::new(0.3, 0.2));

        let pixel = PixelPoint::new(123.0, 321.0);
        let back = viewer.viewport_to_pixel(viewer.pixel_to_viewport(pixel));
        assert!((back.x - pixel.x).abs() < 1e-9);
        assert!((back.y - pixel.y).abs() < 1e-9);
    }

    #[test]
    fn set_image_zoom_reaches_requested_image_zoom() {
        let viewer = opened_viewer();
        viewer.set_image_zoom(1.5);
        let image_zoom = viewer.viewport_to_image_zoom(viewer.viewport_zoom());
        assert!((image_zoom - 1.5).abs() < 1e-12);
    }

    #[test]
    fn hit_test_ignores_hidden_and_detached_elements() {
        let viewer = opened_viewer();
        let element = viewer.create_element(&marker("a"));
        let location = viewer.image_to_viewport(ImagePoint::new(2000.0, 1000.0));
        let pixel = viewer.viewport_to_pixel(location);

        assert_eq!(viewer.hit_test(pixel), None);
        viewer.add_overlay(element, location);
        assert_eq!(viewer.hit_test(pixel), None);
        viewer.set_element_style(element, OverlayStyle::SHOWN);
        assert_eq!(viewer.hit_test(pixel), Some(element));
        viewer.remove_overlay(element);
        assert_eq!(viewer.hit_test(pixel), None);
    }

    #[test]
    fn tracked_overlay_consumes_click_when_handler_prevents_default() {
        let viewer = opened_viewer();
        let element = viewer.create_element(&marker("a"));
        let location = viewer.image_to_viewport(ImagePoint::new(1000.0, 500.0));
        viewer.add_overlay(element, location);
        viewer.set_element_style(element, OverlayStyle::SHOWN);
        viewer.track_pointer(element);

        let canvas_clicks = Rc::new(Cell::new(0));
        let seen = Rc::clone(&canvas_clicks);
        let _subscription = viewer.events().on_pointer(move |event| match event {
            ViewerEvent::OverlayPointer { .. } => EventAction::PreventDefault,
            ViewerEvent::CanvasClick { .. } => {
                seen.set(seen.get() + 1);
                EventAction::Default
            }
            _ => EventAction::Default,
        });

        let pixel = viewer.viewport_to_pixel(location);
        assert_eq!(viewer.click(pixel), ClickDispatch::Overlay(element));
        assert_eq!(canvas_clicks.get(), 0);

        assert_eq!(viewer.click(PixelPoint::new(5.0, 5.0)), ClickDispatch::Canvas);
        assert_eq!(canvas_clicks.get(), 1);
    }

    #[test]
    fn context_menu_reports_suppression() {
        let viewer = opened_viewer();
        assert!(!viewer.context_menu(PixelPoint::new(1.0, 1.0)));
        let _subscription = viewer.events().on_pointer(|_| EventAction::PreventDefault);
        assert!(viewer.context_menu(PixelPoint::new(1.0, 1.0)));
    }
}
