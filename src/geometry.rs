//! Point and size primitives for the coordinate spaces the overlays move through.

use serde::{Deserialize, Serialize};

/// Position as fractions of the image width and height; `[0,1]²` covers the image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_within_unit_square(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

/// Position in image pixels, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImagePoint {
    pub x: f64,
    pub y: f64,
}

impl ImagePoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Position in viewer world units, where the image spans `x` in `[0,1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportPoint {
    pub x: f64,
    pub y: f64,
}

impl ViewportPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Position in screen pixels relative to the viewer container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, point: ImagePoint) -> bool {
        point.x >= 0.0
            && point.x < f64::from(self.width)
            && point.y >= 0.0
            && point.y < f64::from(self.height)
    }

    pub fn longest_side(&self) -> u32 {
        self.width.max(self.height)
    }
}

/// Viewer container size in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerSize {
    pub width: f64,
    pub height: f64,
}

impl ContainerSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_size_contains_is_half_open() {
        let size = ImageSize::new(100, 50);
        assert!(size.contains(ImagePoint::new(0.0, 0.0)));
        assert!(size.contains(ImagePoint::new(99.9, 49.9)));
        assert!(!size.contains(ImagePoint::new(100.0, 10.0)));
        assert!(!size.contains(ImagePoint::new(10.0, 50.0)));
        assert!(!size.contains(ImagePoint::new(-0.1, 10.0)));
    }

    #[test]
    fn unit_square_check_includes_edges() {
        assert!(NormalizedPoint::new(0.0, 1.0).is_within_unit_square());
        assert!(!NormalizedPoint::new(1.0001, 0.5).is_within_unit_square());
        assert!(!NormalizedPoint::new(0.5, f64::NAN).is_within_unit_square());
    }
}
