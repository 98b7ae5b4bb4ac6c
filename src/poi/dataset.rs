use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;

use super::{PoiDefaults, PoiError, PoiRecord, PoiResult};

/// Records accepted from a dataset plus how many entries were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetLoad {
    pub records: Vec<PoiRecord>,
    pub skipped: usize,
}

pub fn load_dataset(path: &Path, defaults: PoiDefaults) -> PoiResult<DatasetLoad> {
    let contents = std::fs::read_to_string(path).map_err(|source| PoiError::ReadDataset {
        path: path.to_path_buf(),
        source,
    })?;
    let load = parse_dataset(&contents, defaults)?;
    tracing::info!(
        path = %path.display(),
        accepted = load.records.len(),
        skipped = load.skipped,
        "loaded POI dataset"
    );
    Ok(load)
}

/// Parses a JSON array of POI entries, skipping malformed or duplicate entries.
pub fn parse_dataset(json: &str, defaults: PoiDefaults) -> PoiResult<DatasetLoad> {
    let value: Value = serde_json::from_str(json)?;
    let Value::Array(entries) = value else {
        return Err(PoiError::NotAnArray);
    };
    Ok(collect_records(&entries, defaults))
}

pub(crate) fn collect_records(entries: &[Value], defaults: PoiDefaults) -> DatasetLoad {
    let mut load = DatasetLoad::default();
    let mut seen = HashSet::new();

    for (index, entry) in entries.iter().enumerate() {
        let record = match PoiRecord::from_value(entry, defaults) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(index, %err, "skipping malformed POI entry");
                load.skipped += 1;
                continue;
            }
        };
        if !seen.insert(record.id.clone()) {
            let err = PoiError::DuplicateId {
                id: record.id.clone(),
            };
            tracing::warn!(index, %err, "skipping duplicate POI entry");
            load.skipped += 1;
            continue;
        }
        load.records.push(record);
    }

    load
}
