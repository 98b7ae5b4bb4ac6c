//! Owns the POI list and keeps one overlay per POI placed and styled on the viewer.

mod handle;
pub mod visibility;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::coords::{
    image_point_from_normalized, image_zoom, lat_lon_from_normalized,
    normalized_from_image_point, tile_address_from_image_point, viewport_point_from_image_point,
    Bounds, CoordsError,
};
use crate::geometry::{ImagePoint, ImageSize};
use crate::poi::{CoordinateMode, PoiDraft, PoiEditor, PoiLocation, PoiRecord};
use crate::viewer::{EventAction, ElementId, Subscription, ViewerBackend, ViewerEventKind};

pub use handle::InteractiveOverlay;
pub use visibility::{Visibility, VisibilityPolicy, DEFAULT_HYSTERESIS};

const CREATED_MIN_ZOOM: f64 = 0.0;

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("POI id is empty")]
    EmptyId,
    #[error("POI {id}: coordinates are not finite numbers")]
    InvalidCoordinates { id: String },
    #[error("POI {id} already exists")]
    DuplicateId { id: String },
    #[error("POI {id}: expected {expected:?} coordinates, found {found:?}")]
    CoordinateModeMismatch {
        id: String,
        expected: CoordinateMode,
        found: CoordinateMode,
    },
    #[error("no image is open in the viewer")]
    ImageNotReady,
    #[error("point ({x}, {y}) is outside the {width}x{height} image")]
    PointOutsideImage {
        x: f64,
        y: f64,
        width: u32,
        height: u32,
    },
    #[error(transparent)]
    Coords(#[from] CoordsError),
}

pub type OverlayResult<T> = std::result::Result<T, OverlayError>;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OverlaySettings {
    pub coordinate_mode: CoordinateMode,
    pub bounds: Bounds,
    pub policy: VisibilityPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    pub accepted: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(PoiRecord),
    Cancelled,
}

#[derive(Default)]
struct OverlayState {
    image_size: Option<ImageSize>,
    pois: Vec<PoiRecord>,
    overlays: HashMap<String, InteractiveOverlay>,
    visibility: HashMap<String, Visibility>,
}

struct ManagerShared {
    backend: Rc<dyn ViewerBackend>,
    settings: OverlaySettings,
    state: RefCell<OverlayState>,
    pending_open: RefCell<Option<Subscription>>,
}

/// Cheap-to-clone handle; clones share the same POI set.
#[derive(Clone)]
pub struct OverlayManager {
    shared: Rc<ManagerShared>,
}

/// Non-owning handle for viewer callbacks, which must not keep the manager alive.
#[derive(Clone)]
pub struct WeakOverlayManager {
    shared: Weak<ManagerShared>,
}

impl WeakOverlayManager {
    pub fn upgrade(&self) -> Option<OverlayManager> {
        self.shared.upgrade().map(|shared| OverlayManager { shared })
    }
}

impl OverlayManager {
    pub fn new(backend: Rc<dyn ViewerBackend>, settings: OverlaySettings) -> Self {
        Self {
            shared: Rc::new(ManagerShared {
                backend,
                settings,
                state: RefCell::new(OverlayState::default()),
                pending_open: RefCell::new(None),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakOverlayManager {
        WeakOverlayManager {
            shared: Rc::downgrade(&self.shared),
        }
    }

    pub fn settings(&self) -> &OverlaySettings {
        &self.shared.settings
    }

    pub fn backend(&self) -> &Rc<dyn ViewerBackend> {
        &self.shared.backend
    }

    /// Syncs against the open image, or defers once until the viewer opens one.
    pub fn initialize(&self) {
        let Some(size) = self.shared.backend.image_size() else {
            self.defer_until_open();
            return;
        };
        if let Some(pending) = self.shared.pending_open.borrow_mut().take() {
            pending.unsubscribe();
        }
        self.shared.state.borrow_mut().image_size = Some(size);
        tracing::debug!(?size, "overlay manager initialized");
        self.sync_overlays();
    }

    fn defer_until_open(&self) {
        let mut pending = self.shared.pending_open.borrow_mut();
        if pending.as_ref().is_some_and(Subscription::is_active) {
            return;
        }
        let weak = self.downgrade();
        *pending = Some(self.shared.backend.events().subscribe_once(
            ViewerEventKind::Open,
            move |_| {
                if let Some(manager) = weak.upgrade() {
                    manager.initialize();
                }
                EventAction::Default
            },
        ));
        tracing::debug!("no image yet; overlay initialization deferred to open");
    }

    /// Places every in-range POI. Backend calls run with no state borrow held, so a
    /// backend that emits events from inside them may call back into the manager.
    pub fn sync_overlays(&self) {
        let backend = &*self.shared.backend;
        let bounds = self.shared.settings.bounds;
        let (size, pois) = {
            let state = self.shared.state.borrow();
            let Some(size) = state.image_size else {
                tracing::debug!("skipping overlay sync; image size unknown");
                return;
            };
            (size, state.pois.clone())
        };

        for poi in &pois {
            let normalized = match poi.location.normalized(&bounds) {
                Ok(point) => point,
                Err(err) => {
                    tracing::warn!(id = %poi.id, %err, "cannot place POI");
                    continue;
                }
            };
            if !normalized.is_within_unit_square() {
                tracing::warn!(
                    id = %poi.id,
                    x = normalized.x,
                    y = normalized.y,
                    "POI lies outside the image; overlay skipped"
                );
                if let Some(overlay) = self.overlay(&poi.id) {
                    overlay.detach(backend);
                }
                continue;
            }

            let overlay = match self.overlay(&poi.id) {
                Some(overlay) => overlay,
                None => match self.create_overlay(poi) {
                    Some(overlay) => overlay,
                    None => continue,
                },
            };
            let image_point = image_point_from_normalized(normalized, size);
            let location = viewport_point_from_image_point(backend, image_point);
            overlay.place(backend, location);
            tracing::debug!(id = %poi.id, ?image_point, ?location, "placed POI overlay");
        }
        self.update_visibility();
    }

    fn overlay(&self, id: &str) -> Option<InteractiveOverlay> {
        self.shared.state.borrow().overlays.get(id).cloned()
    }

    /// Creates and records the overlay of `poi`. Returns the overlay that ends up
    /// recorded, or `None` if the POI was removed while the element was being built.
    fn create_overlay(&self, poi: &PoiRecord) -> Option<InteractiveOverlay> {
        let backend = &*self.shared.backend;
        let created = InteractiveOverlay::create(backend, poi);
        let recorded = {
            let mut state = self.shared.state.borrow_mut();
            if state.pois.iter().any(|listed| listed.id == poi.id) {
                Some(
                    state
                        .overlays
                        .entry(poi.id.clone())
                        .or_insert_with(|| created.clone())
                        .clone(),
                )
            } else {
                None
            }
        };
        if recorded.as_ref().map(InteractiveOverlay::element) != Some(created.element()) {
            created.release(backend);
        }
        recorded
    }

    pub fn update_visibility(&self) {
        let backend = &*self.shared.backend;
        let policy = self.shared.settings.policy;
        if self.image_size().is_none() {
            return;
        }
        let zoom = image_zoom(backend);
        let (updates, total) = {
            let mut state = self.shared.state.borrow_mut();
            let OverlayState {
                pois,
                overlays,
                visibility,
                ..
            } = &mut *state;

            let mut updates = Vec::with_capacity(overlays.len());
            for poi in pois.iter() {
                let Some(overlay) = overlays.get(&poi.id) else {
                    continue;
                };
                let current = visibility.get(&poi.id).copied().unwrap_or_default();
                let next = policy.next_state(current, poi.min_zoom, zoom);
                visibility.insert(poi.id.clone(), next);
                updates.push((overlay.clone(), next));
            }
            (updates, pois.len())
        };

        let mut visible = 0;
        for (overlay, next) in &updates {
            overlay.set_visibility(backend, *next);
            if next.is_visible() {
                visible += 1;
            }
        }
        tracing::debug!(zoom, visible, total, "visibility pass");
    }

    pub fn add_poi(&self, record: PoiRecord) -> OverlayResult<()> {
        if let Err(err) = self.validate(&record) {
            tracing::warn!(id = %record.id, %err, "rejected POI");
            return Err(err);
        }
        self.shared.state.borrow_mut().pois.push(record);
        self.sync_overlays();
        Ok(())
    }

    /// Adds every valid record, then syncs once.
    pub fn load_pois(&self, records: impl IntoIterator<Item = PoiRecord>) -> LoadReport {
        let mut report = LoadReport::default();
        for record in records {
            match self.validate(&record) {
                Ok(()) => {
                    self.shared.state.borrow_mut().pois.push(record);
                    report.accepted += 1;
                }
                Err(err) => {
                    tracing::warn!(id = %record.id, %err, "skipping POI");
                    report.rejected += 1;
                }
            }
        }
        tracing::info!(
            accepted = report.accepted,
            rejected = report.rejected,
            "loaded POIs"
        );
        self.sync_overlays();
        report
    }

    pub fn remove_poi(&self, id: &str) -> bool {
        let overlay = {
            let mut state = self.shared.state.borrow_mut();
            let Some(index) = state.pois.iter().position(|poi| poi.id == id) else {
                tracing::debug!(id, "remove ignored; unknown POI");
                return false;
            };
            state.pois.remove(index);
            state.visibility.remove(id);
            state.overlays.remove(id)
        };
        if let Some(overlay) = overlay {
            overlay.release(&*self.shared.backend);
        }
        tracing::info!(id, "removed POI");
        true
    }

    /// Proposes a POI at `point` without adding it.
    pub fn draft_poi_at(&self, point: ImagePoint) -> OverlayResult<PoiDraft> {
        let size = self
            .image_size()
            .or_else(|| self.shared.backend.image_size())
            .ok_or(OverlayError::ImageNotReady)?;
        if !point.x.is_finite() || !point.y.is_finite() || !size.contains(point) {
            return Err(OverlayError::PointOutsideImage {
                x: point.x,
                y: point.y,
                width: size.width,
                height: size.height,
            });
        }

        let normalized = normalized_from_image_point(point, size);
        let (location, title) = match self.shared.settings.coordinate_mode {
            CoordinateMode::Geographic => {
                let lat_lon = lat_lon_from_normalized(normalized, &self.shared.settings.bounds);
                let (lat, lon) = (round_to(lat_lon.lat, 4), round_to(lat_lon.lon, 4));
                (
                    PoiLocation::Geographic { lat, lon },
                    format!("POI {lat:.2}°, {lon:.2}°"),
                )
            }
            CoordinateMode::Normalized => {
                let (x, y) = (round_to(normalized.x, 6), round_to(normalized.y, 6));
                (
                    PoiLocation::Normalized { x, y },
                    format!("POI ({x:.4}, {y:.4})"),
                )
            }
        };

        let tile = tile_address_from_image_point(point, size, image_zoom(&*self.shared.backend));
        let record = PoiRecord::new(self.unique_id(), location, title)
            .with_description(format!("Created at tile {}", tile.path()))
            .with_min_zoom(CREATED_MIN_ZOOM)
            .with_tile(tile);
        Ok(PoiDraft { record })
    }

    /// Drafts a POI at `point`, asks `editor` to confirm it, and adds it on confirmation.
    pub fn create_poi_from_point(
        &self,
        point: ImagePoint,
        editor: &mut dyn PoiEditor,
    ) -> OverlayResult<CreateOutcome> {
        let draft = self.draft_poi_at(point)?;
        let Some(edit) = editor.confirm(&draft) else {
            tracing::debug!(id = %draft.record.id, "POI creation cancelled");
            return Ok(CreateOutcome::Cancelled);
        };
        let record = draft.finish(edit);
        self.add_poi(record.clone())?;
        tracing::info!(id = %record.id, title = %record.title, "created POI");
        Ok(CreateOutcome::Created(record))
    }

    pub fn image_size(&self) -> Option<ImageSize> {
        self.shared.state.borrow().image_size
    }

    pub fn pois(&self) -> Vec<PoiRecord> {
        self.shared.state.borrow().pois.clone()
    }

    pub fn poi(&self, id: &str) -> Option<PoiRecord> {
        self.shared
            .state
            .borrow()
            .pois
            .iter()
            .find(|poi| poi.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.shared.state.borrow().pois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overlay elements created so far, placed or not.
    pub fn overlay_count(&self) -> usize {
        self.shared.state.borrow().overlays.len()
    }

    /// Overlays currently attached to the viewer.
    pub fn rendered_count(&self) -> usize {
        let backend = &*self.shared.backend;
        let overlays: Vec<InteractiveOverlay> =
            self.shared.state.borrow().overlays.values().cloned().collect();
        overlays
            .iter()
            .filter(|overlay| overlay.is_attached(backend))
            .count()
    }

    pub fn visibility(&self, id: &str) -> Option<Visibility> {
        self.shared.state.borrow().visibility.get(id).copied()
    }

    pub fn element_for(&self, id: &str) -> Option<ElementId> {
        self.shared
            .state
            .borrow()
            .overlays
            .get(id)
            .map(InteractiveOverlay::element)
    }

    pub fn poi_for_element(&self, element: ElementId) -> Option<PoiRecord> {
        let state = self.shared.state.borrow();
        let (id, _) = state
            .overlays
            .iter()
            .find(|(_, overlay)| overlay.element() == element)?;
        state.pois.iter().find(|poi| &poi.id == id).cloned()
    }

    fn validate(&self, record: &PoiRecord) -> OverlayResult<()> {
        if record.id.trim().is_empty() {
            return Err(OverlayError::EmptyId);
        }
        if !record.location.is_finite() {
            return Err(OverlayError::InvalidCoordinates {
                id: record.id.clone(),
            });
        }
        let expected = self.shared.settings.coordinate_mode;
        let found = record.location.mode();
        if found != expected {
            return Err(OverlayError::CoordinateModeMismatch {
                id: record.id.clone(),
                expected,
                found,
            });
        }
        record.location.normalized(&self.shared.settings.bounds)?;
        if self.contains(&record.id) {
            return Err(OverlayError::DuplicateId {
                id: record.id.clone(),
            });
        }
        Ok(())
    }

    fn contains(&self, id: &str) -> bool {
        self.shared.state.borrow().pois.iter().any(|poi| poi.id == id)
    }

    fn unique_id(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis());
        let base = format!("poi_{millis}");
        if !self.contains(&base) {
            return base;
        }
        (2u32..)
            .map(|suffix| format!("{base}_{suffix}"))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or(base)
    }
}

impl Drop for ManagerShared {
    fn drop(&mut self) {
        if let Some(pending) = self.pending_open.get_mut().take() {
            pending.unsubscribe();
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
