//! NOAA model soundings
//!
//! Forecast profiles are requested from the NOAA sounding service in the
//! ASCII GSD format. A response holds one block per forecast hour:
//!
//! ```text
//! GFS analysis valid for grid point 7.9 nm / 230 deg from 32.6,35.2:
//! GFS         12      1      Mar    2024
//!    CAPE      0    CIN      0  Helic  99999     PW  99999
//!       1  23062  99999  32.60 -35.23  99999  99999
//!       ...
//!       9  10130     51    182    151    284      8
//!       4  10000    162    171    141    279     10
//! ```
//!
//! Data lines carry `type pressure height temp dewpt wind_dir wind_speed`
//! with pressure and temperatures in tenths and `99999` for missing values.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use reqwest::Client;
use tracing::{debug, instrument};

use super::{FetchContext, ProviderError, SourcePipeline, StampPolicy, get_text, window_hours};
use crate::config::NoaaConfig;
use crate::models::{FetchedRecord, Sounding, SoundingLevel, SourceKind};

const MISSING: i64 = 99999;

/// Line types holding a full pressure level: mandatory, significant, surface
const LEVEL_TYPES: [i64; 3] = [4, 5, 9];

/// Client for forecast soundings over a time window at a point
#[async_trait]
pub trait SoundingForecastClient: Send + Sync {
    async fn fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<Sounding>, ProviderError>;
}

/// HTTP implementation against the NOAA sounding service
#[derive(Debug, Clone)]
pub struct NoaaClient {
    client: Client,
    config: NoaaConfig,
}

impl NoaaClient {
    #[must_use]
    pub fn new(client: Client, config: NoaaConfig) -> Self {
        Self { client, config }
    }

    fn build_url(&self, start: DateTime<Utc>, end: DateTime<Utc>, latitude: f64, longitude: f64) -> String {
        format!(
            "{}/get_soundings.cgi?data_source={}&start=latest&startSecs={}&endSecs={}&n_hrs={}&fcst_len=shortest&airport={}&text={}&hydrometeors=false",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.model),
            start.timestamp(),
            end.timestamp(),
            window_hours(start, end),
            urlencoding::encode(&format!("{latitude:.4},{longitude:.4}")),
            urlencoding::encode("Ascii text (GSD format)"),
        )
    }
}

#[async_trait]
impl SoundingForecastClient for NoaaClient {
    #[instrument(name = "noaa_fetch", skip(self))]
    async fn fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<Sounding>, ProviderError> {
        let url = self.build_url(start, end, latitude, longitude);
        let body = get_text(&self.client, &url).await?;
        let soundings = parse_gsd(&body)?;
        debug!("Parsed {} NOAA soundings", soundings.len());
        Ok(soundings)
    }
}

/// Parse every sounding block of a GSD response
pub fn parse_gsd(text: &str) -> Result<Vec<Sounding>, ProviderError> {
    let mut soundings = Vec::new();
    let mut current: Option<(DateTime<Utc>, Vec<SoundingLevel>)> = None;

    for line in text.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }

        if let Some(time) = parse_block_header(&tokens) {
            if let Some((time, levels)) = current.take() {
                soundings.push(Sounding::from_levels(time, levels));
            }
            current = Some((time, Vec::new()));
            continue;
        }

        let Some((_, levels)) = current.as_mut() else {
            continue;
        };
        if let Some(level) = parse_level(&tokens) {
            levels.push(level);
        }
    }

    if let Some((time, levels)) = current {
        soundings.push(Sounding::from_levels(time, levels));
    }

    if soundings.is_empty() && !text.trim().is_empty() {
        return Err(ProviderError::parse("no GSD sounding blocks in response"));
    }
    Ok(soundings.into_iter().filter(|s| !s.is_empty()).collect())
}

/// `<model> <hour> <day> <Mon> <year>` starts a block
fn parse_block_header(tokens: &[&str]) -> Option<DateTime<Utc>> {
    let [_, hour, day, month, year] = tokens else {
        return None;
    };
    let hour: u32 = hour.parse().ok()?;
    let date = NaiveDate::parse_from_str(&format!("{day} {month} {year}"), "%d %b %Y").ok()?;
    Some(date.and_hms_opt(hour, 0, 0)?.and_utc())
}

fn parse_level(tokens: &[&str]) -> Option<SoundingLevel> {
    if tokens.len() != 7 {
        return None;
    }
    let values = tokens
        .iter()
        .map(|t| t.parse::<i64>().ok())
        .collect::<Option<Vec<_>>>()?;
    if !LEVEL_TYPES.contains(&values[0]) || values[1..].contains(&MISSING) {
        return None;
    }
    Some(SoundingLevel {
        pressure: tenths(values[1]),
        height: values[2] as f64,
        temp: tenths(values[3]),
        dew: tenths(values[4]),
        wind_dir: values[5] as f64,
        wind_speed: values[6] as f64,
    })
}

fn tenths(value: i64) -> f64 {
    value as f64 / 10.0
}

/// Forecast window per monitored location, starting at local midnight
#[derive(Debug)]
pub struct NoaaPipeline<C> {
    client: C,
    window: TimeDelta,
}

impl<C: SoundingForecastClient> NoaaPipeline<C> {
    pub fn new(client: C, forecast_hours: u32) -> Self {
        Self {
            client,
            window: TimeDelta::hours(forecast_hours.into()),
        }
    }
}

#[async_trait]
impl<C: SoundingForecastClient> SourcePipeline for NoaaPipeline<C> {
    fn source(&self) -> SourceKind {
        SourceKind::Noaa
    }

    fn stamp_policy(&self) -> StampPolicy {
        StampPolicy::PerRecord
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<Vec<FetchedRecord>, ProviderError> {
        let start = ctx.start_of_day();
        let end = start + self.window;
        let mut records = Vec::new();
        for location in ctx.locations {
            let soundings = self
                .client
                .fetch(start, end, location.latitude, location.longitude)
                .await?;
            debug!("NOAA returned {} soundings for {}", soundings.len(), location.name);
            for sounding in &soundings {
                records.push(FetchedRecord::new(&location.name, sounding)?);
            }
        }
        Ok(records)
    }
}
