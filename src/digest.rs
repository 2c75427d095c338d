//! Per-day digest files
//!
//! The front end loads a whole day at once from `<root>/YYYY/MM/DD.json`:
//!
//! ```json
//! { "06": { "megido": { "noaa": {...}, "ims": {...} } } }
//! ```
//!
//! A digest is rebuilt from every hour file under the day directory, so it
//! also carries artifacts written by earlier runs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

use crate::error::AirsoundsError;
use crate::storage::{ArtifactWriter, PathResolver};

/// hour -> location -> source -> record
pub type DayDigest = BTreeMap<String, BTreeMap<String, BTreeMap<String, Value>>>;

/// Collect all artifacts of one target-zone day
pub fn collect_day(resolver: &PathResolver, day: NaiveDate) -> Result<DayDigest, AirsoundsError> {
    let mut digest = DayDigest::new();
    let day_dir = resolver.day_dir(day);

    for hour_dir in sorted_entries(&day_dir)? {
        if !hour_dir.is_dir() {
            continue;
        }
        let Some(hour) = file_name(&hour_dir) else {
            continue;
        };

        for file in sorted_entries(&hour_dir)? {
            if file.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some((source, location)) = split_artifact_name(&file) else {
                continue;
            };
            let record = read_json(&file)?;
            digest
                .entry(hour.clone())
                .or_default()
                .entry(location)
                .or_default()
                .insert(source, record);
        }
    }

    Ok(digest)
}

/// Rebuild and write the digest of `day`, returning its path
pub fn rebuild_day(
    resolver: &PathResolver,
    writer: &ArtifactWriter,
    day: NaiveDate,
) -> Result<PathBuf, AirsoundsError> {
    let digest = collect_day(resolver, day)?;
    let path = resolver.digest_path(day);
    writer.write(&path, &digest)?;
    debug!("Rebuilt digest {} with {} hours", path.display(), digest.len());
    Ok(path)
}

/// `noaa-megido.json` -> ("noaa", "megido"). Only the first `-` separates,
/// location names may contain more.
fn split_artifact_name(path: &Path) -> Option<(String, String)> {
    let stem = path.file_stem()?.to_str()?;
    let (source, location) = stem.split_once('-')?;
    Some((source.to_string(), location.to_string()))
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()?.to_str().map(str::to_string)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, AirsoundsError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| AirsoundsError::digest(format!("Cannot list {}: {e}", dir.display())))?;
    let mut paths = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AirsoundsError::digest(format!("Cannot list {}: {e}", dir.display())))?;
    paths.sort();
    Ok(paths)
}

fn read_json(path: &Path) -> Result<Value, AirsoundsError> {
    let bytes = fs::read(path)
        .map_err(|e| AirsoundsError::digest(format!("Cannot read {}: {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AirsoundsError::digest(format!("Invalid JSON in {}: {e}", path.display())))
}
