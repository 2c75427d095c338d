//! Rolling coverage index
//!
//! The index records, per source, the earliest and latest valid time ever
//! written and when the source was last refreshed, together with a snapshot
//! of the monitored locations. It is loaded once per run, passed by value
//! through the pipelines and rewritten in full at the end.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AirsoundsError;
use crate::models::{Location, SourceKind};
use crate::storage::ArtifactWriter;

/// Time range covered by one source plus its last refresh time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Coverage {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
}

impl Coverage {
    /// Widen the range to include `time`. An unset bound adopts `time`.
    pub fn fold(&mut self, time: DateTime<Utc>) {
        self.start = Some(self.start.map_or(time, |start| start.min(time)));
        self.end = Some(self.end.map_or(time, |end| end.max(time)));
    }

    pub fn stamp(&mut self, now: DateTime<Utc>) {
        self.last_update = Some(now);
    }

    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Persisted aggregate describing the whole data tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(into = "IndexDocument", from = "IndexDocument")]
pub struct Index {
    pub noaa: Coverage,
    pub ims: Coverage,
    pub uwyo: Coverage,
    pub locations: Vec<Location>,
}

impl Index {
    pub fn coverage_mut(&mut self, source: SourceKind) -> &mut Coverage {
        match source {
            SourceKind::Noaa => &mut self.noaa,
            SourceKind::Ims => &mut self.ims,
            SourceKind::Uwyo => &mut self.uwyo,
        }
    }

    /// Fold one record timestamp into a source's range
    pub fn fold(&mut self, source: SourceKind, time: DateTime<Utc>) {
        self.coverage_mut(source).fold(time);
    }

    /// Record that a source was refreshed at `now`
    pub fn stamp(&mut self, source: SourceKind, now: DateTime<Utc>) {
        self.coverage_mut(source).stamp(now);
    }

    /// Load the index. A missing file is an empty index; anything that
    /// exists but cannot be read or parsed is fatal.
    pub fn load(path: &Path) -> Result<Self, AirsoundsError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No index at {}, starting from an empty one", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(AirsoundsError::index_corrupt(path, e.to_string())),
        };

        let index: Self = serde_json::from_slice(&bytes)
            .map_err(|e| AirsoundsError::index_corrupt(path, e.to_string()))?;
        debug!("Loaded index from {}", path.display());
        Ok(index)
    }

    /// Rewrite the index in full. Returns whether the stored bytes changed.
    pub fn persist(&self, path: &Path) -> Result<bool, AirsoundsError> {
        let bytes = ArtifactWriter::encode(self).map_err(|e| AirsoundsError::encode(path, e))?;
        let changed = fs::read(path).map_or(true, |previous| previous != bytes);
        ArtifactWriter.write_bytes(path, &bytes)?;
        debug!("Persisted index to {} (changed: {})", path.display(), changed);
        Ok(changed)
    }
}

/// On-disk layout of the index, flat field names as read by the front end
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IndexDocument {
    #[serde(rename = "NoaaStart", default, with = "zero_time", skip_serializing_if = "Option::is_none")]
    noaa_start: Option<DateTime<Utc>>,
    #[serde(rename = "NoaaEnd", default, with = "zero_time", skip_serializing_if = "Option::is_none")]
    noaa_end: Option<DateTime<Utc>>,
    #[serde(rename = "NoaaLastUpdate", default, with = "zero_time", skip_serializing_if = "Option::is_none")]
    noaa_last_update: Option<DateTime<Utc>>,
    #[serde(rename = "IMSStart", default, with = "zero_time", skip_serializing_if = "Option::is_none")]
    ims_start: Option<DateTime<Utc>>,
    #[serde(rename = "IMSEnd", default, with = "zero_time", skip_serializing_if = "Option::is_none")]
    ims_end: Option<DateTime<Utc>>,
    #[serde(rename = "IMSLastUpdate", default, with = "zero_time", skip_serializing_if = "Option::is_none")]
    ims_last_update: Option<DateTime<Utc>>,
    #[serde(rename = "UWYOStart", default, with = "zero_time", skip_serializing_if = "Option::is_none")]
    uwyo_start: Option<DateTime<Utc>>,
    #[serde(rename = "UWYOEnd", default, with = "zero_time", skip_serializing_if = "Option::is_none")]
    uwyo_end: Option<DateTime<Utc>>,
    #[serde(rename = "UWYOLastUpdate", default, with = "zero_time", skip_serializing_if = "Option::is_none")]
    uwyo_last_update: Option<DateTime<Utc>>,
    #[serde(rename = "Locations", default)]
    locations: Option<Vec<Location>>,
}

impl From<Index> for IndexDocument {
    fn from(index: Index) -> Self {
        Self {
            noaa_start: index.noaa.start,
            noaa_end: index.noaa.end,
            noaa_last_update: index.noaa.last_update,
            ims_start: index.ims.start,
            ims_end: index.ims.end,
            ims_last_update: index.ims.last_update,
            uwyo_start: index.uwyo.start,
            uwyo_end: index.uwyo.end,
            uwyo_last_update: index.uwyo.last_update,
            locations: Some(index.locations),
        }
    }
}

impl From<IndexDocument> for Index {
    fn from(doc: IndexDocument) -> Self {
        Self {
            noaa: Coverage {
                start: doc.noaa_start,
                end: doc.noaa_end,
                last_update: doc.noaa_last_update,
            },
            ims: Coverage {
                start: doc.ims_start,
                end: doc.ims_end,
                last_update: doc.ims_last_update,
            },
            uwyo: Coverage {
                start: doc.uwyo_start,
                end: doc.uwyo_end,
                last_update: doc.uwyo_last_update,
            },
            locations: doc.locations.unwrap_or_default(),
        }
    }
}

/// RFC 3339 timestamps where `null`, a missing field, or the year-1 zero
/// time written by older index files all mean "unset".
mod zero_time {
    use chrono::{DateTime, Datelike, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let time = DateTime::parse_from_rfc3339(&raw).map_err(D::Error::custom)?;
        if time.year() <= 1 {
            return Ok(None);
        }
        Ok(Some(time.with_timezone(&Utc)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::default_locations;
    use chrono::TimeZone;
    use rstest::rstest;
    use tempfile::TempDir;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_fold_into_unset_sets_both_bounds() {
        let mut index = Index::default();
        assert!(index.noaa.is_unset());

        index.fold(SourceKind::Noaa, at(6));
        assert_eq!(index.noaa.start, Some(at(6)));
        assert_eq!(index.noaa.end, Some(at(6)));
    }

    #[test]
    fn test_earlier_fold_moves_only_start() {
        let mut index = Index::default();
        index.fold(SourceKind::Noaa, at(6));
        index.fold(SourceKind::Noaa, at(4));
        assert_eq!(index.noaa.start, Some(at(4)));
        assert_eq!(index.noaa.end, Some(at(6)));
        // other sources are untouched
        assert!(index.ims.is_unset());
        assert!(index.uwyo.is_unset());
    }

    #[test]
    fn test_fold_is_idempotent() {
        let mut once = Coverage::default();
        once.fold(at(6));
        let mut twice = once;
        twice.fold(at(6));
        assert_eq!(once, twice);
    }

    #[rstest]
    #[case(vec![3, 9, 6, 1])]
    #[case(vec![1, 3, 6, 9])]
    #[case(vec![9, 6, 3, 1])]
    #[case(vec![6, 1, 9, 3, 3, 9])]
    fn test_fold_is_order_independent(#[case] hours: Vec<u32>) {
        let mut coverage = Coverage::default();
        for h in hours {
            coverage.fold(at(h));
        }
        assert_eq!(coverage.start, Some(at(1)));
        assert_eq!(coverage.end, Some(at(9)));
    }

    #[test]
    fn test_missing_file_loads_empty_index() {
        let temp_dir = TempDir::new().unwrap();
        let index = Index::load(&temp_dir.path().join("index.json")).unwrap();
        assert_eq!(index, Index::default());
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.json");
        fs::write(&path, "{\"NoaaStart\": ").unwrap();

        let err = Index::load(&path).unwrap_err();
        assert!(matches!(err, AirsoundsError::IndexCorrupt { .. }));
    }

    #[test]
    fn test_persist_then_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.json");

        let mut index = Index {
            locations: default_locations(),
            ..Index::default()
        };
        index.fold(SourceKind::Noaa, at(4));
        index.fold(SourceKind::Noaa, at(9));
        index.stamp(SourceKind::Noaa, at(10));
        index.fold(SourceKind::Uwyo, at(0));

        assert!(index.persist(&path).unwrap());
        let loaded = Index::load(&path).unwrap();
        assert_eq!(loaded, index);

        // rewriting identical content reports no change
        assert!(!loaded.persist(&path).unwrap());
    }

    #[test]
    fn test_reads_zero_time_and_offsets() {
        let json = r#"{
            "NoaaStart": "2024-03-01T08:00:00+02:00",
            "NoaaEnd": "2024-03-05T02:00:00+02:00",
            "NoaaLastUpdate": "2024-03-01T07:12:44.123+02:00",
            "IMSStart": "0001-01-01T00:00:00Z",
            "IMSEnd": "0001-01-01T00:00:00Z",
            "IMSLastUpdate": "0001-01-01T00:00:00Z",
            "Locations": null,
            "UWYOStart": "0001-01-01T00:00:00Z",
            "UWYOEnd": "0001-01-01T00:00:00Z"
        }"#;
        let index: Index = serde_json::from_str(json).unwrap();
        assert_eq!(index.noaa.start, Some(at(6)));
        assert!(index.ims.is_unset());
        assert!(index.ims.last_update.is_none());
        assert!(index.uwyo.is_unset());
        assert!(index.locations.is_empty());
    }

    #[test]
    fn test_written_field_names() {
        let mut index = Index::default();
        index.fold(SourceKind::Ims, at(4));
        let json = serde_json::to_value(&index).unwrap();
        assert_eq!(json["IMSStart"], "2024-03-01T04:00:00Z");
        assert_eq!(json["IMSEnd"], "2024-03-01T04:00:00Z");
        assert!(json.get("NoaaStart").is_none());
        assert_eq!(json["Locations"], serde_json::json!([]));
    }
}
