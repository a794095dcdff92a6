//! CSV export of a persisted index

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{ReconError, Result};
use crate::record::FileRecord;
use crate::store::IndexStore;

const EXPORT_STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Export every record of `store` to a CSV file in `out_dir`.
///
/// The file is named `<YYYY-MM-DD>_<dbname>.csv` and holds one row per
/// record, enumerated with the store's paged cursor. Returns the path of
/// the written file.
pub fn export_csv(store: &IndexStore, out_dir: &Path) -> Result<PathBuf> {
    let db_name = store
        .path()
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .unwrap_or("recon")
        .to_string();

    let file_name = format!("{}_{}.csv", Utc::now().format("%Y-%m-%d"), db_name);
    let out_path = out_dir.join(file_name);

    let mut writer = csv::Writer::from_path(&out_path).map_err(|e| {
        ReconError::report_error(format!(
            "Failed to create export file '{}': {}",
            out_path.display(),
            e
        ))
    })?;

    writer
        .write_record(["id", "name", "fingerprint", "type", "key", "created", "updated"])
        .map_err(|e| export_write_error(&out_path, e))?;

    store.for_each(|record| {
        let row = csv_row(&record);
        writer
            .write_record(&row)
            .map_err(|e| export_write_error(&out_path, e))
    })?;

    writer
        .flush()
        .map_err(|e| ReconError::report_error(format!(
            "Failed to flush export file '{}': {}",
            out_path.display(),
            e
        )))?;

    info!("Exported index to: {}", out_path.display());

    Ok(out_path)
}

fn csv_row(record: &FileRecord) -> [String; 7] {
    [
        record.id.map(|id| id.to_string()).unwrap_or_default(),
        record.name.clone(),
        record.fingerprint.clone(),
        record.content_type.clone().unwrap_or_default(),
        record.key.clone(),
        record.created_at.format(EXPORT_STAMP_FORMAT).to_string(),
        record
            .updated_at
            .map(|t| t.format(EXPORT_STAMP_FORMAT).to_string())
            .unwrap_or_default(),
    ]
}

fn export_write_error(path: &Path, err: csv::Error) -> ReconError {
    ReconError::report_error(format!(
        "Failed to write export file '{}': {}",
        path.display(),
        err
    ))
}
