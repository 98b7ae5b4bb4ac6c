use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::coords::TileAddress;
use crate::poi::{DatasetLoad, PoiDefaults, PoiLocation, PoiRecord};

pub const CUSTOM_POIS_KEY: &str = "custom_pois";

const APP_DIR: &str = "poimap";
const STORAGE_FILE: &str = "storage.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("missing HOME environment variable")]
    MissingHomeDirectory,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("stored value under `{key}` is corrupt")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize value for `{key}`")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// String key/value persistence, shaped like browser local storage.
pub trait StorageBackend {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;
}

/// All keys in one JSON object file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn with_default_path() -> StorageResult<Self> {
        let xdg_data_home = std::env::var_os("XDG_DATA_HOME").map(PathBuf::from);
        let home = std::env::var_os("HOME").map(PathBuf::from);
        let path = data_file_path(xdg_data_home.as_deref(), home.as_deref())?;
        Ok(Self::with_path(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> StorageResult<BTreeMap<String, String>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(StorageError::Io(err)),
        };
        serde_json::from_str(&contents).map_err(|source| StorageError::Corrupt {
            key: self.path.display().to_string(),
            source,
        })
    }
}

impl StorageBackend for FileStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut items = self.read_all()?;
        items.insert(key.to_string(), value.to_string());
        let contents =
            serde_json::to_string_pretty(&items).map_err(|source| StorageError::Serialize {
                key: key.to_string(),
                source,
            })?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RefCell<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredPoi<'a> {
    id: &'a str,
    #[serde(flatten)]
    location: PoiLocation,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    desc: Option<&'a str>,
    min_zoom: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    tile_info: Option<&'a TileAddress>,
    created_at: u64,
}

/// User-created POIs kept under [`CUSTOM_POIS_KEY`].
pub struct PoiStore {
    backend: Box<dyn StorageBackend>,
}

impl PoiStore {
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn append(&self, record: &PoiRecord) -> StorageResult<()> {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        self.append_at(record, created_at)
    }

    pub fn append_at(&self, record: &PoiRecord, created_at: u64) -> StorageResult<()> {
        let mut entries = self.entries()?;
        let stored = StoredPoi {
            id: &record.id,
            location: record.location,
            title: &record.title,
            desc: record.description.as_deref(),
            min_zoom: record.min_zoom,
            tile_info: record.tile.as_ref(),
            created_at,
        };
        entries.push(serde_json::to_value(stored).map_err(|source| StorageError::Serialize {
            key: CUSTOM_POIS_KEY.to_string(),
            source,
        })?);
        let serialized =
            serde_json::to_string(&entries).map_err(|source| StorageError::Serialize {
                key: CUSTOM_POIS_KEY.to_string(),
                source,
            })?;
        self.backend.set_item(CUSTOM_POIS_KEY, &serialized)?;
        tracing::info!(id = %record.id, total = entries.len(), "saved custom POI");
        Ok(())
    }

    /// Stored POIs that still parse; broken entries are skipped with a warning.
    pub fn load(&self, defaults: PoiDefaults) -> StorageResult<DatasetLoad> {
        let entries = self.entries()?;
        let load = crate::poi::collect_records(&entries, defaults);
        tracing::debug!(
            loaded = load.records.len(),
            skipped = load.skipped,
            "read custom POIs from storage"
        );
        Ok(load)
    }

    fn entries(&self) -> StorageResult<Vec<Value>> {
        let Some(raw) = self.backend.get_item(CUSTOM_POIS_KEY)? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
            key: CUSTOM_POIS_KEY.to_string(),
            source,
        })
    }
}

pub(crate) fn data_file_path(
    xdg_data_home: Option<&Path>,
    home: Option<&Path>,
) -> StorageResult<PathBuf> {
    let mut path = match xdg_data_home.filter(|path| !path.as_os_str().is_empty()) {
        Some(xdg) => xdg.to_path_buf(),
        None => home
            .ok_or(StorageError::MissingHomeDirectory)?
            .join(".local/share"),
    };
    path.push(APP_DIR);
    path.push(STORAGE_FILE);
    Ok(path)
}
