//! Flat-file persistence. Every dataset is a CSV file with a header row and is
//! always rewritten whole.

pub mod location_cache;

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.tmp"))
}

/// Writes `path` through a sibling temporary file that is renamed into place,
/// so readers never observe a partially written file.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let tmp = temp_path_for(path);
    let result = (|| -> Result<()> {
        let mut file = File::create(&tmp)
            .with_context(|| format!("Failed to create file: {}", tmp.display()))?;
        write(&mut file)?;
        file.flush()?;
        file.sync_all()
            .with_context(|| format!("Failed to sync file: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace file: {}", path.display()))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Reads every row of a CSV file into `T`, matching columns by header name.
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .with_context(|| format!("Failed to parse file: {}", path.display()))?;
    debug!(rows = rows.len(), path = %path.display(), "Read CSV");
    Ok(rows)
}

/// Parses externally supplied CSV rows already held in memory. Rows may have
/// fewer fields than the header; the missing trailing columns read as absent.
pub fn parse_csv<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);
    reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .context("Failed to parse CSV rows")
}

/// Overwrites `path` with `header` followed by one line per row. The header is
/// written even when `rows` is empty.
pub fn write_csv<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<()> {
    write_atomic(path, |file| {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(header)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    })
    .with_context(|| format!("Failed to write file: {}", path.display()))?;
    debug!(rows = rows.len(), path = %path.display(), "Wrote CSV");
    Ok(())
}
