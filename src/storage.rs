//! Date-partitioned artifact storage
//!
//! Artifacts live under `<root>/<YYYY>/<MM>/<DD>/<HH>/<source>-<location>.json`
//! where the date and hour are wall-clock values in the configured target
//! zone. Stored timestamps stay in UTC; the zone is applied only here.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::AirsoundsError;
use crate::models::SourceKind;

const EXTENSION: &str = "json";

/// Maps (source, location, timestamp) to an artifact path
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    timezone: Tz,
}

impl PathResolver {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, timezone: Tz) -> Self {
        Self {
            root: root.into(),
            timezone,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Artifact path for a record. Records of the same source and location
    /// within one target-zone hour share a path; the later write wins.
    #[must_use]
    pub fn resolve(&self, source: SourceKind, location: &str, time: DateTime<Utc>) -> PathBuf {
        let local = time.with_timezone(&self.timezone);
        self.day_dir(local.date_naive())
            .join(local.format("%H").to_string())
            .join(format!("{source}-{location}.{EXTENSION}"))
    }

    /// Calendar day of `time` in the target zone
    #[must_use]
    pub fn local_day(&self, time: DateTime<Utc>) -> NaiveDate {
        time.with_timezone(&self.timezone).date_naive()
    }

    /// Directory holding all hour partitions of a day
    #[must_use]
    pub fn day_dir(&self, day: NaiveDate) -> PathBuf {
        self.root
            .join(format!("{:04}", day.year()))
            .join(format!("{:02}", day.month()))
            .join(format!("{:02}", day.day()))
    }

    /// Per-day digest file, a sibling of the day directory
    #[must_use]
    pub fn digest_path(&self, day: NaiveDate) -> PathBuf {
        self.root
            .join(format!("{:04}", day.year()))
            .join(format!("{:02}", day.month()))
            .join(format!("{:02}.{EXTENSION}", day.day()))
    }
}

/// Writes JSON documents with overwrite semantics
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactWriter;

impl ArtifactWriter {
    /// Stable, diff-friendly encoding: pretty printed with a trailing newline.
    /// Key order is deterministic for `serde_json::Value` and derived structs.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec_pretty(value)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Serialize `value` to `path`, creating parent directories and
    /// truncating any previous content.
    pub fn write<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), AirsoundsError> {
        let bytes = Self::encode(value).map_err(|e| AirsoundsError::encode(path, e))?;
        self.write_bytes(path, &bytes)
    }

    pub fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<(), AirsoundsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| AirsoundsError::write(parent, e))?;
        }
        fs::write(path, bytes).map_err(|e| AirsoundsError::write(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use tempfile::TempDir;

    fn resolver() -> PathResolver {
        PathResolver::new("data", chrono_tz::Asia::Jerusalem)
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_partitions_by_target_zone_hour() {
        // 04:00 UTC is 06:00 in Israel standard time (UTC+2)
        let path = resolver().resolve(SourceKind::Noaa, "megido", utc(2024, 3, 1, 4, 0));
        assert_eq!(path, PathBuf::from("data/2024/03/01/06/noaa-megido.json"));
    }

    #[test]
    fn test_date_rolls_over_in_target_zone() {
        // 22:30 UTC on Feb 29 is already March 1st in Israel
        let path = resolver().resolve(SourceKind::Uwyo, "40179", utc(2024, 2, 29, 22, 30));
        assert_eq!(path, PathBuf::from("data/2024/03/01/00/uwyo-40179.json"));
    }

    #[rstest]
    #[case(utc(2024, 3, 1, 4, 0), utc(2024, 3, 1, 4, 59), true)]
    #[case(utc(2024, 3, 1, 4, 0), utc(2024, 3, 1, 5, 0), false)]
    #[case(utc(2024, 3, 1, 4, 0), utc(2024, 3, 2, 4, 0), false)]
    // Clocks go back at 02:00 IDT on 2024-10-27: both instants read 01:xx locally
    #[case(utc(2024, 10, 26, 22, 10), utc(2024, 10, 26, 23, 10), true)]
    fn test_same_path_iff_same_local_hour(
        #[case] a: DateTime<Utc>,
        #[case] b: DateTime<Utc>,
        #[case] same: bool,
    ) {
        let r = resolver();
        assert_eq!(
            r.resolve(SourceKind::Ims, "zefat", a) == r.resolve(SourceKind::Ims, "zefat", b),
            same
        );
    }

    #[test]
    fn test_source_and_location_distinguish_paths() {
        let r = resolver();
        let t = utc(2024, 3, 1, 4, 0);
        assert_ne!(
            r.resolve(SourceKind::Ims, "zefat", t),
            r.resolve(SourceKind::Noaa, "zefat", t)
        );
        assert_ne!(
            r.resolve(SourceKind::Ims, "zefat", t),
            r.resolve(SourceKind::Ims, "megido", t)
        );
    }

    #[test]
    fn test_digest_path_is_day_sibling() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(resolver().day_dir(day), PathBuf::from("data/2024/03/01"));
        assert_eq!(resolver().digest_path(day), PathBuf::from("data/2024/03/01.json"));
    }

    #[test]
    fn test_write_creates_dirs_and_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("2024/03/01/06/noaa-megido.json");

        ArtifactWriter
            .write(&path, &serde_json::json!({"Temp": [1.0, 2.0], "Height": [10]}))
            .unwrap();
        ArtifactWriter
            .write(&path, &serde_json::json!({"Temp": [3.0]}))
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\n  \"Temp\": [\n    3.0\n  ]\n}\n");
    }

    #[test]
    fn test_encoding_is_stable() {
        let value = serde_json::json!({"b": 1, "a": {"d": 2, "c": 3}});
        let first = ArtifactWriter::encode(&value).unwrap();
        let second = ArtifactWriter::encode(&value.clone()).unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with(b"}\n"));
    }
}
