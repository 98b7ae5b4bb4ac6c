use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::coords::Bounds;
use crate::overlay::{OverlaySettings, VisibilityPolicy, DEFAULT_HYSTERESIS};
use crate::poi::{CoordinateMode, PoiDefaults, DEFAULT_MIN_ZOOM};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfigPathError {
    MissingHomeDirectory,
}

pub(crate) const APP_DIR: &str = "poimap";
const APP_CONFIG_FILE: &str = "config.json";

/// Application-level settings from `config.json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) coordinate_mode: CoordinateMode,
    pub(crate) bounds: Bounds,
    pub(crate) default_min_zoom: f64,
    pub(crate) hysteresis: f64,
    pub(crate) dataset_path: Option<PathBuf>,
    pub(crate) storage_path: Option<PathBuf>,
    pub(crate) notifications: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            coordinate_mode: CoordinateMode::default(),
            bounds: Bounds::default(),
            default_min_zoom: DEFAULT_MIN_ZOOM,
            hysteresis: DEFAULT_HYSTERESIS,
            dataset_path: None,
            storage_path: None,
            notifications: true,
        }
    }
}

impl AppConfig {
    pub(crate) fn overlay_settings(&self) -> OverlaySettings {
        OverlaySettings {
            coordinate_mode: self.coordinate_mode,
            bounds: self.bounds,
            policy: VisibilityPolicy::new(self.hysteresis),
        }
    }

    pub(crate) fn poi_defaults(&self) -> PoiDefaults {
        if self.default_min_zoom.is_finite() && self.default_min_zoom >= 0.0 {
            return PoiDefaults {
                min_zoom: self.default_min_zoom,
            };
        }
        tracing::warn!(
            default_min_zoom = self.default_min_zoom,
            "invalid default_min_zoom; using {DEFAULT_MIN_ZOOM}"
        );
        PoiDefaults::default()
    }
}

pub(crate) fn load_app_config() -> AppConfig {
    let (xdg_config_home, home) = config_env_dirs();
    load_app_config_with(xdg_config_home.as_deref(), home.as_deref())
}

fn load_app_config_with(xdg_config_home: Option<&Path>, home: Option<&Path>) -> AppConfig {
    let path = match app_config_path(APP_DIR, APP_CONFIG_FILE, xdg_config_home, home) {
        Ok(p) => p,
        Err(_) => return AppConfig::default(),
    };
    if !path.exists() {
        return AppConfig::default();
    }
    load_app_config_from(&path)
}

/// Reads an explicit config file; unreadable or invalid files fall back to defaults.
pub(crate) fn load_app_config_from(path: &Path) -> AppConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(?err, ?path, "failed to parse config.json; using defaults");
            AppConfig::default()
        }),
        Err(err) => {
            tracing::warn!(?err, ?path, "failed to read config.json; using defaults");
            AppConfig::default()
        }
    }
}

pub(crate) fn config_env_dirs() -> (Option<PathBuf>, Option<PathBuf>) {
    (
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

pub(crate) fn app_config_path(
    app_dir: &str,
    file_name: &str,
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    let mut path = config_root(xdg_config_home, home)?;
    path.push(app_dir);
    path.push(file_name);
    Ok(path)
}

fn config_root(
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    if let Some(xdg) = xdg_config_home.filter(|path| !path.as_os_str().is_empty()) {
        return Ok(xdg.to_path_buf());
    }

    let home = home.ok_or(ConfigPathError::MissingHomeDirectory)?;
    Ok(home.join(".config"))
}
