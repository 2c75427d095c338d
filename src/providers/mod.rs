//! Upstream forecast providers
//!
//! Each provider has a low level client trait (one HTTP implementation,
//! swappable in tests) and a [`SourcePipeline`] that turns the monitored
//! locations into client calls and normalized [`FetchedRecord`]s:
//! - [`noaa`]: forecast window per location
//! - [`ims`]: one batch for all stations, mapped back to local names
//! - [`uwyo`]: one call per distinct radiosonde station

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::models::{FetchedRecord, Location, SourceKind};

pub mod ims;
pub mod noaa;
pub mod uwyo;

pub use ims::{ImsClient, ImsPipeline, StationForecastClient};
pub use noaa::{NoaaClient, NoaaPipeline, SoundingForecastClient};
pub use uwyo::{SoundingArchiveClient, UwyoClient, UwyoPipeline};

/// Provider client errors
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport level failure
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// Provider answered but the body is not what we expect
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }
}

/// When a source's last-update time is stamped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampPolicy {
    /// Every time a record is processed
    PerRecord,
    /// Once after a successful fetch, even if it returned nothing
    PerBatch,
}

/// Inputs shared by every pipeline in one run
#[derive(Debug, Clone, Copy)]
pub struct FetchContext<'a> {
    pub locations: &'a [Location],
    pub now: DateTime<Utc>,
    pub timezone: Tz,
}

impl FetchContext<'_> {
    /// Midnight of the current day in the target zone
    #[must_use]
    pub fn start_of_day(&self) -> DateTime<Utc> {
        let local_now = self.now.with_timezone(&self.timezone);
        let midnight = local_now.date_naive().and_time(chrono::NaiveTime::MIN);
        self.timezone
            .from_local_datetime(&midnight)
            .earliest()
            .map_or(self.now, |t| t.with_timezone(&Utc))
    }
}

/// Uniform fetch step of a source; provider quirks live in the implementation
#[async_trait]
pub trait SourcePipeline: Send + Sync {
    fn source(&self) -> SourceKind;

    fn stamp_policy(&self) -> StampPolicy;

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<Vec<FetchedRecord>, ProviderError>;
}

/// Build the HTTP client shared by the provider implementations
pub fn http_client(timeout: Duration) -> Result<Client, ProviderError> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(concat!("airsounds/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// GET `url` and return the body, treating non-2xx answers as errors
pub(crate) async fn get_text(client: &Client, url: &str) -> Result<String, ProviderError> {
    debug!("GET {}", url);
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response.text().await?)
}

/// Whole hours in a window, rounded up
pub(crate) fn window_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let span = end - start;
    let hours = span.num_hours();
    if span > TimeDelta::hours(hours) {
        hours + 1
    } else {
        hours
    }
}
