//! Conversions between normalized, image, geographic and viewport coordinates.
//!
//! Geographic positions use an equirectangular mapping: longitude grows left to
//! right across the image and latitude decreases top to bottom, so the northern
//! edge of the map sits at `y = 0`.

mod tile;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{ImagePoint, ImageSize, LatLon, NormalizedPoint, ViewportPoint};
use crate::viewer::ViewerBackend;

pub use tile::{tile_address_from_image_point, tile_exists, TileAddress, TILE_FORMAT, TILE_SIZE};

const EARTH_RADIUS_KM: f64 = 6371.0;
const SUSPICIOUS_MARGIN: f64 = 0.1;

pub type CoordsResult<T> = std::result::Result<T, CoordsError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordsError {
    #[error("lat/lon must be finite numbers (lat={lat}, lon={lon})")]
    NonFinite { lat: f64, lon: f64 },
    #[error("latitude span is empty or inverted: {min}..{max}")]
    InvalidLatitudeSpan { min: f64, max: f64 },
    #[error("longitude span is empty or inverted: {min}..{max}")]
    InvalidLongitudeSpan { min: f64, max: f64 },
}

/// Convention the dataset longitudes are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LonRange {
    #[default]
    #[serde(rename = "[-180,180]")]
    Signed180,
    #[serde(rename = "[0,360]")]
    Unsigned360,
}

/// Geographic extent covered by the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBounds", into = "RawBounds")]
pub struct Bounds {
    lat_min: f64,
    lat_max: f64,
    lon_min: f64,
    lon_max: f64,
    lon_range: LonRange,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawBounds {
    #[serde(default = "default_lat_min", alias = "latMin")]
    lat_min: f64,
    #[serde(default = "default_lat_max", alias = "latMax")]
    lat_max: f64,
    #[serde(default = "default_lon_min", alias = "lonMin")]
    lon_min: f64,
    #[serde(default = "default_lon_max", alias = "lonMax")]
    lon_max: f64,
    #[serde(default, alias = "lonRange")]
    lon_range: LonRange,
}

const fn default_lat_min() -> f64 {
    -90.0
}

const fn default_lat_max() -> f64 {
    90.0
}

const fn default_lon_min() -> f64 {
    -180.0
}

const fn default_lon_max() -> f64 {
    180.0
}

impl TryFrom<RawBounds> for Bounds {
    type Error = CoordsError;

    fn try_from(raw: RawBounds) -> Result<Self, Self::Error> {
        Bounds::new(raw.lat_min, raw.lat_max, raw.lon_min, raw.lon_max, raw.lon_range)
    }
}

impl From<Bounds> for RawBounds {
    fn from(bounds: Bounds) -> Self {
        Self {
            lat_min: bounds.lat_min,
            lat_max: bounds.lat_max,
            lon_min: bounds.lon_min,
            lon_max: bounds.lon_max,
            lon_range: bounds.lon_range,
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::GLOBE
    }
}

impl Bounds {
    pub const GLOBE: Bounds = Bounds {
        lat_min: -90.0,
        lat_max: 90.0,
        lon_min: -180.0,
        lon_max: 180.0,
        lon_range: LonRange::Signed180,
    };

    pub fn new(
        lat_min: f64,
        lat_max: f64,
        lon_min: f64,
        lon_max: f64,
        lon_range: LonRange,
    ) -> CoordsResult<Self> {
        if !(lat_min.is_finite() && lat_max.is_finite() && lat_max > lat_min) {
            return Err(CoordsError::InvalidLatitudeSpan {
                min: lat_min,
                max: lat_max,
            });
        }
        if !(lon_min.is_finite() && lon_max.is_finite() && lon_max > lon_min) {
            return Err(CoordsError::InvalidLongitudeSpan {
                min: lon_min,
                max: lon_max,
            });
        }
        Ok(Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
            lon_range,
        })
    }

    pub const fn with_lon_range(mut self, lon_range: LonRange) -> Self {
        self.lon_range = lon_range;
        self
    }

    pub const fn lat_min(&self) -> f64 {
        self.lat_min
    }

    pub const fn lat_max(&self) -> f64 {
        self.lat_max
    }

    pub const fn lon_min(&self) -> f64 {
        self.lon_min
    }

    pub const fn lon_max(&self) -> f64 {
        self.lon_max
    }

    pub const fn lon_range(&self) -> LonRange {
        self.lon_range
    }

    fn lat_span(&self) -> f64 {
        self.lat_max - self.lat_min
    }

    fn lon_span(&self) -> f64 {
        self.lon_max - self.lon_min
    }

    /// Brings a longitude from the dataset convention into the map extent convention.
    fn wrap_longitude(&self, lon: f64) -> f64 {
        match self.lon_range {
            LonRange::Unsigned360 if self.lon_min <= -180.0 && self.lon_max >= 180.0 => {
                (lon + 180.0).rem_euclid(360.0) - 180.0
            }
            LonRange::Signed180 if self.lon_min >= 0.0 && self.lon_max >= 180.0 => {
                if lon < 0.0 {
                    lon + 360.0
                } else {
                    lon
                }
            }
            _ => lon,
        }
    }
}

pub fn normalized_from_lat_lon(lat: f64, lon: f64, bounds: &Bounds) -> CoordsResult<NormalizedPoint> {
    if !lat.is_finite() || !lon.is_finite() {
        tracing::warn!(lat, lon, "lat/lon must be finite numbers");
        return Err(CoordsError::NonFinite { lat, lon });
    }

    let wrapped_lon = bounds.wrap_longitude(lon);
    let x = (wrapped_lon - bounds.lon_min) / bounds.lon_span();
    let y = 1.0 - (lat - bounds.lat_min) / bounds.lat_span();

    let lower = -SUSPICIOUS_MARGIN;
    let upper = 1.0 + SUSPICIOUS_MARGIN;
    if !(lower..=upper).contains(&x) || !(lower..=upper).contains(&y) {
        tracing::warn!(lat, lon, x, y, "coordinates likely outside the map");
    }

    Ok(NormalizedPoint::new(x, y))
}

pub fn lat_lon_from_normalized(point: NormalizedPoint, bounds: &Bounds) -> LatLon {
    let lon = bounds.lon_min + point.x * bounds.lon_span();
    let lat = bounds.lat_max - point.y * bounds.lat_span();
    LatLon::new(lat, lon)
}

pub fn image_point_from_normalized(point: NormalizedPoint, size: ImageSize) -> ImagePoint {
    ImagePoint::new(
        point.x * f64::from(size.width),
        point.y * f64::from(size.height),
    )
}

pub fn normalized_from_image_point(point: ImagePoint, size: ImageSize) -> NormalizedPoint {
    NormalizedPoint::new(
        point.x / f64::from(size.width),
        point.y / f64::from(size.height),
    )
}

pub fn viewport_point_from_image_point(
    viewer: &dyn ViewerBackend,
    point: ImagePoint,
) -> ViewportPoint {
    viewer.image_to_viewport(point)
}

/// Current zoom as screen pixels per image pixel; `1.0` shows the image at native resolution.
pub fn image_zoom(viewer: &dyn ViewerBackend) -> f64 {
    viewer.viewport_to_image_zoom(viewer.viewport_zoom())
}

pub fn haversine_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}
