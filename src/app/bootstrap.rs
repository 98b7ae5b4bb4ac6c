use std::path::Path;

use crate::config::{load_app_config, load_app_config_from, AppConfig};
use crate::notification::{DesktopNotifier, LogNotifier, Notifier};
use crate::overlay::OverlaySettings;
use crate::poi::PoiDefaults;
use crate::storage::{FileStorage, MemoryStorage, PoiStore};

pub(crate) struct AppBootstrap {
    pub(crate) config: AppConfig,
    pub(crate) settings: OverlaySettings,
    pub(crate) defaults: PoiDefaults,
}

impl AppBootstrap {
    pub(crate) fn notifier(&self) -> Box<dyn Notifier> {
        if self.config.notifications {
            Box::new(DesktopNotifier)
        } else {
            Box::new(LogNotifier)
        }
    }
}

pub(crate) fn bootstrap_app_runtime(config_path: Option<&Path>) -> AppBootstrap {
    let config = match config_path {
        Some(path) => load_app_config_from(path),
        None => load_app_config(),
    };
    let settings = config.overlay_settings();
    let defaults = config.poi_defaults();
    tracing::info!(
        coordinate_mode = ?settings.coordinate_mode,
        bounds = ?settings.bounds,
        hysteresis = settings.policy.hysteresis(),
        default_min_zoom = defaults.min_zoom,
        "loaded app config"
    );

    AppBootstrap {
        config,
        settings,
        defaults,
    }
}

/// File-backed store, or an in-memory one when no data directory is available.
pub(crate) fn open_poi_store(config: &AppConfig) -> PoiStore {
    let storage = match &config.storage_path {
        Some(path) => Ok(FileStorage::with_path(path.clone())),
        None => FileStorage::with_default_path(),
    };
    match storage {
        Ok(storage) => {
            tracing::debug!(path = %storage.path().display(), "using file storage");
            PoiStore::new(Box::new(storage))
        }
        Err(err) => {
            tracing::warn!(?err, "no storage location; saved POIs will not persist");
            PoiStore::new(Box::new(MemoryStorage::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poi::{CoordinateMode, PoiLocation, PoiRecord};

    #[test]
    fn explicit_config_path_drives_settings() {
        let path = std::env::temp_dir().join("poimap-bootstrap-config.json");
        std::fs::write(
            &path,
            r#"{"coordinate_mode": "normalized", "default_min_zoom": 0.3, "notifications": false}"#,
        )
        .expect("config should be written");

        let bootstrap = bootstrap_app_runtime(Some(&path));
        assert_eq!(bootstrap.settings.coordinate_mode, CoordinateMode::Normalized);
        assert_eq!(bootstrap.defaults.min_zoom, 0.3);
        assert!(!bootstrap.config.notifications);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn configured_storage_path_is_used() {
        let path = std::env::temp_dir().join("poimap-bootstrap-store/storage.json");
        let _ = std::fs::remove_file(&path);
        let config = AppConfig {
            storage_path: Some(path.clone()),
            ..AppConfig::default()
        };

        let store = open_poi_store(&config);
        let record = PoiRecord::new("saved", PoiLocation::Normalized { x: 0.1, y: 0.2 }, "Saved");
        store.append_at(&record, 5).expect("append should succeed");
        assert!(path.exists());

        let reopened = open_poi_store(&config);
        let load = reopened
            .load(PoiDefaults::default())
            .expect("saved POIs should load");
        assert_eq!(load.records[0].id, "saved");

        let _ = std::fs::remove_file(path);
    }
}
