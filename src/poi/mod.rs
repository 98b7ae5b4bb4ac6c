//! POI records and the rules that turn loosely-typed JSON entries into them.

mod dataset;
mod draft;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::coords::{normalized_from_lat_lon, Bounds, CoordsResult, TileAddress};
use crate::geometry::NormalizedPoint;

pub(crate) use dataset::collect_records;
pub use dataset::{load_dataset, parse_dataset, DatasetLoad};
pub use draft::{PoiDraft, PoiEdit, PoiEditor};

pub const DEFAULT_MIN_ZOOM: f64 = 0.05;

pub type PoiResult<T> = std::result::Result<T, PoiError>;

#[derive(Debug, Error)]
pub enum PoiError {
    #[error("POI entry has no id")]
    MissingId,
    #[error("POI {id}: field `{field}` is not a finite number")]
    NonNumericCoordinate { id: String, field: &'static str },
    #[error("POI {id}: no location (expected lat/lon or x/y)")]
    MissingLocation { id: String },
    #[error("POI {id}: both lat/lon and x/y are present")]
    MixedLocation { id: String },
    #[error("POI {id}: malformed entry: {source}")]
    MalformedEntry {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate POI id {id}")]
    DuplicateId { id: String },
    #[error("POI dataset must be a JSON array")]
    NotAnArray,
    #[error("failed to read POI dataset: {path}")]
    ReadDataset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse POI dataset")]
    ParseDataset(#[from] serde_json::Error),
}

/// How a deployment expresses POI positions. Never mixed within one POI set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateMode {
    #[default]
    Geographic,
    Normalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PoiLocation {
    Geographic { lat: f64, lon: f64 },
    Normalized { x: f64, y: f64 },
}

impl PoiLocation {
    pub const fn mode(&self) -> CoordinateMode {
        match self {
            Self::Geographic { .. } => CoordinateMode::Geographic,
            Self::Normalized { .. } => CoordinateMode::Normalized,
        }
    }

    pub fn is_finite(&self) -> bool {
        match *self {
            Self::Geographic { lat, lon } => lat.is_finite() && lon.is_finite(),
            Self::Normalized { x, y } => x.is_finite() && y.is_finite(),
        }
    }

    pub fn normalized(&self, bounds: &Bounds) -> CoordsResult<NormalizedPoint> {
        match *self {
            Self::Geographic { lat, lon } => normalized_from_lat_lon(lat, lon, bounds),
            Self::Normalized { x, y } => Ok(NormalizedPoint::new(x, y)),
        }
    }

    fn describe(&self) -> String {
        match *self {
            Self::Geographic { lat, lon } => format!("{lat}°, {lon}°"),
            Self::Normalized { x, y } => format!("{x}, {y}"),
        }
    }
}

/// Defaults applied to optional dataset fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoiDefaults {
    pub min_zoom: f64,
}

impl Default for PoiDefaults {
    fn default() -> Self {
        Self {
            min_zoom: DEFAULT_MIN_ZOOM,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoiRecord {
    pub id: String,
    pub location: PoiLocation,
    pub title: String,
    /// Markup shown in the detail panel.
    pub description: Option<String>,
    pub min_zoom: f64,
    pub classes: Vec<String>,
    pub tile: Option<TileAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPoi {
    title: Option<String>,
    #[serde(alias = "description")]
    desc: Option<String>,
    min_zoom: Option<f64>,
    #[serde(default)]
    classes: Vec<String>,
    tile_info: Option<Value>,
}

impl PoiRecord {
    pub fn new(id: impl Into<String>, location: PoiLocation, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location,
            title: title.into(),
            description: None,
            min_zoom: DEFAULT_MIN_ZOOM,
            classes: Vec::new(),
            tile: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_min_zoom(mut self, min_zoom: f64) -> Self {
        self.min_zoom = min_zoom;
        self
    }

    pub fn with_classes(mut self, classes: Vec<String>) -> Self {
        self.classes = classes;
        self
    }

    pub fn with_tile(mut self, tile: TileAddress) -> Self {
        self.tile = Some(tile);
        self
    }

    pub fn tooltip(&self) -> String {
        format!("{} ({})", self.title, self.location.describe())
    }

    /// Builds a record from a dataset or storage entry, resolving every optional field.
    pub fn from_value(value: &Value, defaults: PoiDefaults) -> PoiResult<Self> {
        let id = match value.get("id") {
            Some(raw) => match serde_json::from_value::<RawId>(raw.clone()) {
                Ok(RawId::Text(text)) if !text.trim().is_empty() => text,
                Ok(RawId::Number(number)) => number.to_string(),
                _ => return Err(PoiError::MissingId),
            },
            None => return Err(PoiError::MissingId),
        };

        let location = location_from_value(&id, value)?;
        let raw: RawPoi = serde_json::from_value(value.clone()).map_err(|source| {
            PoiError::MalformedEntry {
                id: id.clone(),
                source,
            }
        })?;

        let tile = raw.tile_info.and_then(|tile| {
            serde_json::from_value::<TileAddress>(tile)
                .map_err(|err| tracing::debug!(id = %id, ?err, "dropping unreadable tile metadata"))
                .ok()
        });
        let min_zoom = raw
            .min_zoom
            .filter(|zoom| zoom.is_finite())
            .unwrap_or(defaults.min_zoom);

        Ok(Self {
            title: raw.title.unwrap_or_else(|| id.clone()),
            id,
            location,
            description: raw.desc.filter(|desc| !desc.is_empty()),
            min_zoom,
            classes: raw.classes,
            tile,
        })
    }
}

fn location_from_value(id: &str, value: &Value) -> PoiResult<PoiLocation> {
    let has = |field: &str| value.get(field).is_some_and(|v| !v.is_null());
    let geographic = has("lat") || has("lon");
    let normalized = has("x") || has("y");

    match (geographic, normalized) {
        (true, true) => Err(PoiError::MixedLocation { id: id.to_string() }),
        (true, false) => Ok(PoiLocation::Geographic {
            lat: finite_field(id, value, "lat")?,
            lon: finite_field(id, value, "lon")?,
        }),
        (false, true) => Ok(PoiLocation::Normalized {
            x: finite_field(id, value, "x")?,
            y: finite_field(id, value, "y")?,
        }),
        (false, false) => Err(PoiError::MissingLocation { id: id.to_string() }),
    }
}

fn finite_field(id: &str, value: &Value, field: &'static str) -> PoiResult<f64> {
    value
        .get(field)
        .and_then(Value::as_f64)
        .filter(|number| number.is_finite())
        .ok_or_else(|| PoiError::NonNumericCoordinate {
            id: id.to_string(),
            field,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn geographic_entry_resolves_defaults() {
        let record = PoiRecord::from_value(
            &json!({"id": "olympus", "lat": 18.65, "lon": -133.8, "title": "Olympus Mons"}),
            PoiDefaults::default(),
        )
        .expect("entry should parse");

        assert_eq!(record.id, "olympus");
        assert_eq!(
            record.location,
            PoiLocation::Geographic {
                lat: 18.65,
                lon: -133.8
            }
        );
        assert_eq!(record.min_zoom, DEFAULT_MIN_ZOOM);
        assert!(record.description.is_none());
        assert!(record.classes.is_empty());
    }

    #[test]
    fn normalized_entry_keeps_optional_fields() {
        let record = PoiRecord::from_value(
            &json!({
                "id": 7,
                "x": 0.25,
                "y": 0.75,
                "desc": "<b>Nebula</b>",
                "minZoom": 1.5,
                "classes": ["nebula", "bright"]
            }),
            PoiDefaults { min_zoom: 0.2 },
        )
        .expect("entry should parse");

        assert_eq!(record.id, "7");
        assert_eq!(record.title, "7");
        assert_eq!(record.location, PoiLocation::Normalized { x: 0.25, y: 0.75 });
        assert_eq!(record.description.as_deref(), Some("<b>Nebula</b>"));
        assert_eq!(record.min_zoom, 1.5);
        assert_eq!(record.classes, vec!["nebula", "bright"]);
    }

    #[test]
    fn string_coordinates_are_rejected() {
        let err = PoiRecord::from_value(
            &json!({"id": "a", "lat": "12.5", "lon": 3.0}),
            PoiDefaults::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PoiError::NonNumericCoordinate { field: "lat", .. }
        ));
    }

    #[test]
    fn missing_and_mixed_locations_are_rejected() {
        assert!(matches!(
            PoiRecord::from_value(&json!({"id": "a", "title": "t"}), PoiDefaults::default()),
            Err(PoiError::MissingLocation { .. })
        ));
        assert!(matches!(
            PoiRecord::from_value(
                &json!({"id": "a", "lat": 1.0, "lon": 2.0, "x": 0.1, "y": 0.2}),
                PoiDefaults::default()
            ),
            Err(PoiError::MixedLocation { .. })
        ));
        assert!(matches!(
            PoiRecord::from_value(&json!({"lat": 1.0, "lon": 2.0}), PoiDefaults::default()),
            Err(PoiError::MissingId)
        ));
    }

    #[test]
    fn unreadable_tile_metadata_is_dropped_not_fatal() {
        let record = PoiRecord::from_value(
            &json!({"id": "a", "lat": 1.0, "lon": 2.0, "tileInfo": {"level": "deep"}}),
            PoiDefaults::default(),
        )
        .expect("entry should parse");
        assert!(record.tile.is_none());
    }

    #[test]
    fn location_serializes_flat() {
        let value = serde_json::to_value(PoiLocation::Geographic { lat: 1.0, lon: 2.0 }).unwrap();
        assert_eq!(value, json!({"lat": 1.0, "lon": 2.0}));
    }
}
