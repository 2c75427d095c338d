//! Forecast payloads returned by the providers
//!
//! Field names follow the JSON documents the front end reads, so the
//! structs serialize in PascalCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A provider payload that can be written as an artifact.
///
/// The pipeline only needs the timestamp the record is valid for; the rest
/// of the record is passed through untouched.
pub trait ForecastRecord: Serialize {
    fn valid_time(&self) -> DateTime<Utc>;
}

/// Vertical atmospheric profile, either forecast (NOAA) or observed (UWYO)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Sounding {
    pub time: DateTime<Utc>,
    /// Pressure in hPa
    pub pressure: Vec<f64>,
    /// Geopotential height in meters
    pub height: Vec<f64>,
    /// Temperature in Celsius
    pub temp: Vec<f64>,
    /// Dew point in Celsius
    pub dew: Vec<f64>,
    /// Wind direction in degrees
    pub wind_dir: Vec<f64>,
    /// Wind speed in knots
    pub wind_speed: Vec<f64>,
}

/// One level of a sounding, used while parsing provider tables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundingLevel {
    pub pressure: f64,
    pub height: f64,
    pub temp: f64,
    pub dew: f64,
    pub wind_dir: f64,
    pub wind_speed: f64,
}

impl Sounding {
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time,
            ..Self::default()
        }
    }

    /// Build a sounding from levels, ordered surface first (decreasing pressure)
    #[must_use]
    pub fn from_levels(time: DateTime<Utc>, mut levels: Vec<SoundingLevel>) -> Self {
        levels.sort_by(|a, b| b.pressure.total_cmp(&a.pressure));
        let mut sounding = Self::new(time);
        for level in levels {
            sounding.push_level(level);
        }
        sounding
    }

    pub fn push_level(&mut self, level: SoundingLevel) {
        self.pressure.push(level.pressure);
        self.height.push(level.height);
        self.temp.push(level.temp);
        self.dew.push(level.dew);
        self.wind_dir.push(level.wind_dir);
        self.wind_speed.push(level.wind_speed);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pressure.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pressure.is_empty()
    }
}

impl ForecastRecord for Sounding {
    fn valid_time(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Timestamp wrapper kept for the `{"Time": {"Time": ...}}` document shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationTime {
    #[serde(rename = "Time")]
    pub time: DateTime<Utc>,
}

/// Hourly surface forecast at an IMS station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StationForecast {
    pub time: StationTime,
    /// Temperature in Celsius
    pub temp: f64,
    /// Relative humidity in percent
    pub rel_hum: f64,
    /// Wind speed in km/h
    pub wind_speed: f64,
    /// Wind direction in degrees
    pub wind_dir: f64,
}

impl ForecastRecord for StationForecast {
    fn valid_time(&self) -> DateTime<Utc> {
        self.time.time
    }
}

/// All forecasts the IMS feed carries for one of its stations
#[derive(Debug, Clone, PartialEq)]
pub struct StationBatch {
    /// Station name as labelled by the provider
    pub label: String,
    pub forecasts: Vec<StationForecast>,
}

/// A record ready to be written: where it belongs, when it is valid, and
/// the serialized payload.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRecord {
    /// Local location name, or station id for station-keyed sources
    pub target: String,
    pub valid_time: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl FetchedRecord {
    pub fn new<R: ForecastRecord>(
        target: impl Into<String>,
        record: &R,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            target: target.into(),
            valid_time: record.valid_time(),
            payload: serde_json::to_value(record)?,
        })
    }
}
