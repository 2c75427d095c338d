//! IMS station forecasts
//!
//! The Israel Meteorological Service publishes one XML document with hourly
//! forecasts for all of its stations. Forecast times are local wall-clock
//! times in the target zone.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use quick_xml::de::from_str;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::{FetchContext, ProviderError, SourcePipeline, StampPolicy, get_text};
use crate::config::ImsConfig;
use crate::models::{FetchedRecord, SourceKind, StationBatch, StationForecast, StationTime};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Client returning forecasts for every station the provider knows
#[async_trait]
pub trait StationForecastClient: Send + Sync {
    async fn fetch(&self) -> Result<Vec<StationBatch>, ProviderError>;
}

/// HTTP implementation against the IMS XML feed
#[derive(Debug, Clone)]
pub struct ImsClient {
    client: Client,
    config: ImsConfig,
    timezone: Tz,
}

impl ImsClient {
    #[must_use]
    pub fn new(client: Client, config: ImsConfig, timezone: Tz) -> Self {
        Self {
            client,
            config,
            timezone,
        }
    }
}

#[async_trait]
impl StationForecastClient for ImsClient {
    #[instrument(name = "ims_fetch", skip(self))]
    async fn fetch(&self) -> Result<Vec<StationBatch>, ProviderError> {
        let body = get_text(&self.client, &self.config.url).await?;
        let batches = parse_ims(&body, self.timezone)?;
        debug!("Parsed IMS forecasts for {} stations", batches.len());
        Ok(batches)
    }
}

/// IMS XML structure for deserialization
#[derive(Debug, Deserialize)]
struct ImsXml {
    #[serde(rename = "Location", default)]
    locations: Vec<ImsLocation>,
}

#[derive(Debug, Deserialize)]
struct ImsLocation {
    #[serde(rename = "LocationMetaData")]
    meta: ImsLocationMeta,
    #[serde(rename = "LocationData")]
    data: ImsLocationData,
}

#[derive(Debug, Deserialize)]
struct ImsLocationMeta {
    #[serde(rename = "LocationNameEng")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ImsLocationData {
    #[serde(rename = "Forecast", default)]
    forecasts: Vec<ImsForecast>,
}

#[derive(Debug, Deserialize)]
struct ImsForecast {
    #[serde(rename = "ForecastTime")]
    time: String,
    #[serde(rename = "Temperature")]
    temperature: f64,
    #[serde(rename = "RelativeHumidity")]
    relative_humidity: f64,
    #[serde(rename = "WindSpeed")]
    wind_speed: f64,
    #[serde(rename = "WindDirection")]
    wind_direction: f64,
}

impl ImsForecast {
    fn into_station_forecast(self, timezone: Tz) -> Result<StationForecast, ProviderError> {
        let naive = NaiveDateTime::parse_from_str(self.time.trim(), TIME_FORMAT)
            .map_err(|e| ProviderError::parse(format!("Invalid forecast time '{}': {e}", self.time)))?;

        Ok(StationForecast {
            time: StationTime {
                time: local_to_utc(timezone, naive),
            },
            temp: self.temperature,
            rel_hum: self.relative_humidity,
            wind_speed: self.wind_speed,
            wind_dir: self.wind_direction,
        })
    }
}

/// Ambiguous local times take the earlier instant. Times skipped by a
/// spring-forward gap shift to the first valid time after the gap.
fn local_to_utc(timezone: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    timezone
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| timezone.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
        .map_or_else(|| naive.and_utc(), |local| local.with_timezone(&Utc))
}

/// Parse the IMS XML feed into one batch per station
pub fn parse_ims(xml: &str, timezone: Tz) -> Result<Vec<StationBatch>, ProviderError> {
    let document: ImsXml = from_str(xml)?;
    document
        .locations
        .into_iter()
        .map(|location| {
            let forecasts = location
                .data
                .forecasts
                .into_iter()
                .map(|f| f.into_station_forecast(timezone))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(StationBatch {
                label: location.meta.name.trim().to_string(),
                forecasts,
            })
        })
        .collect()
}

/// Single batch for all stations, mapped to local location names
#[derive(Debug)]
pub struct ImsPipeline<C> {
    client: C,
}

impl<C: StationForecastClient> ImsPipeline<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: StationForecastClient> SourcePipeline for ImsPipeline<C> {
    fn source(&self) -> SourceKind {
        SourceKind::Ims
    }

    fn stamp_policy(&self) -> StampPolicy {
        StampPolicy::PerBatch
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<Vec<FetchedRecord>, ProviderError> {
        let names: HashMap<&str, &str> = ctx
            .locations
            .iter()
            .filter_map(|l| l.ims_name.as_deref().map(|ims| (ims, l.name.as_str())))
            .collect();

        let batches = self.client.fetch().await?;
        let mut records = Vec::new();
        for batch in &batches {
            let Some(name) = names.get(batch.label.as_str()) else {
                warn!("Skipping unmapped location: {:?}", batch.label);
                continue;
            };
            for forecast in &batch.forecasts {
                records.push(FetchedRecord::new(*name, forecast)?);
            }
        }
        Ok(records)
    }
}
