use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::geometry::{ImagePoint, ImageSize};

pub const TILE_SIZE: u32 = 256;
pub const TILE_FORMAT: &str = "jpg";
const TILE_SIZE_LOG2: f64 = 8.0;
const ZOOM_LEVEL_OFFSET: f64 = 2.0;

/// Deep-zoom pyramid tile holding an image point. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileAddress {
    pub level: u32,
    pub col: u32,
    pub row: u32,
    pub tile_x: u32,
    pub tile_y: u32,
    pub tiles_wide: u32,
    pub tiles_high: u32,
    pub level_width: u32,
    pub level_height: u32,
    pub image_point: ImagePoint,
}

impl TileAddress {
    /// Path of the tile relative to the pyramid directory, e.g. `12/40_17.jpg`.
    pub fn path(&self) -> String {
        format!("{}/{}_{}.{TILE_FORMAT}", self.level, self.col, self.row)
    }

    pub fn url(&self, dzi_base: &str) -> String {
        format!("{dzi_base}_files/{}", self.path())
    }
}

pub fn tile_address_from_image_point(
    point: ImagePoint,
    size: ImageSize,
    image_zoom: f64,
) -> TileAddress {
    let max_level = (f64::from(size.longest_side().max(1)).log2().ceil() - TILE_SIZE_LOG2).max(0.0);
    let implied = image_zoom.log2().floor() + max_level - ZOOM_LEVEL_OFFSET;
    let level = if implied.is_nan() {
        0.0
    } else {
        implied.clamp(0.0, max_level)
    };

    let scale = (level - max_level).exp2();
    let level_width = (f64::from(size.width) * scale).ceil();
    let level_height = (f64::from(size.height) * scale).ceil();
    let scaled_x = point.x * scale;
    let scaled_y = point.y * scale;
    let tile = f64::from(TILE_SIZE);

    TileAddress {
        level: level as u32,
        col: (scaled_x / tile).floor() as u32,
        row: (scaled_y / tile).floor() as u32,
        tile_x: scaled_x.rem_euclid(tile).floor() as u32,
        tile_y: scaled_y.rem_euclid(tile).floor() as u32,
        tiles_wide: (level_width / tile).ceil() as u32,
        tiles_high: (level_height / tile).ceil() as u32,
        level_width: level_width as u32,
        level_height: level_height as u32,
        image_point: point,
    }
}

/// Checks a local pyramid laid out as `<base>_files/<level>/<col>_<row>.jpg`.
pub fn tile_exists(dzi_base: &Path, address: &TileAddress) -> bool {
    let mut files_dir = OsString::from(dzi_base.as_os_str());
    files_dir.push("_files");
    let path = PathBuf::from(files_dir)
        .join(address.level.to_string())
        .join(format!("{}_{}.{TILE_FORMAT}", address.col, address.row));
    let exists = path.is_file();
    if !exists {
        tracing::debug!(path = %path.display(), "tile not found in local pyramid");
    }
    exists
}
