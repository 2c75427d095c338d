//! University of Wyoming radiosonde archive
//!
//! The archive serves an HTML page with one `<h2>` title and one `<pre>`
//! fixed-width table per observed sounding:
//!
//! ```text
//! <h2>40179 LLBD Bet Dagan Observations at 00Z 01 Mar 2024</h2>
//! <pre>
//! -----------------------------------------------------------------------------
//!    PRES   HGHT   TEMP   DWPT   RELH   MIXR   DRCT   SKNT   THTA   THTE   THTV
//!     hPa     m      C      C      %    g/kg    deg   knot     K      K      K
//! -----------------------------------------------------------------------------
//!  1011.0     35   18.2   10.2     60   7.73    250      6  290.4  312.6  291.8
//! ```

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Timelike, Utc};
use reqwest::Client;
use tracing::{debug, instrument};

use super::{FetchContext, ProviderError, SourcePipeline, StampPolicy, get_text};
use crate::config::UwyoConfig;
use crate::models::{FetchedRecord, Location, Sounding, SoundingLevel, SourceKind};

const COLUMN_WIDTH: usize = 7;
const PRES: usize = 0;
const HGHT: usize = 1;
const TEMP: usize = 2;
const DWPT: usize = 3;
const DRCT: usize = 6;
const SKNT: usize = 7;

/// Client for observed soundings of one station
#[async_trait]
pub trait SoundingArchiveClient: Send + Sync {
    async fn fetch(&self, station: u32, reference: DateTime<Utc>) -> Result<Vec<Sounding>, ProviderError>;
}

/// HTTP implementation against the UWYO sounding archive
#[derive(Debug, Clone)]
pub struct UwyoClient {
    client: Client,
    config: UwyoConfig,
}

impl UwyoClient {
    #[must_use]
    pub fn new(client: Client, config: UwyoConfig) -> Self {
        Self { client, config }
    }

    /// The archive takes a single YEAR/MONTH, so the lookback window is
    /// clipped to the month of the reference time.
    fn build_url(&self, station: u32, reference: DateTime<Utc>) -> String {
        let lookback = TimeDelta::hours(self.config.lookback_hours.into());
        let mut from = reference - lookback;
        if from.month() != reference.month() || from.year() != reference.year() {
            from = reference
                .with_day(1)
                .and_then(|t| t.with_hour(0))
                .unwrap_or(reference);
        }
        format!(
            "{}/cgi-bin/sounding?region={}&TYPE=TEXT%3ALIST&YEAR={}&MONTH={:02}&FROM={:02}{:02}&TO={:02}{:02}&STNM={}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.region),
            reference.year(),
            reference.month(),
            from.day(),
            from.hour(),
            reference.day(),
            reference.hour(),
            station,
        )
    }
}

#[async_trait]
impl SoundingArchiveClient for UwyoClient {
    #[instrument(name = "uwyo_fetch", skip(self))]
    async fn fetch(&self, station: u32, reference: DateTime<Utc>) -> Result<Vec<Sounding>, ProviderError> {
        let url = self.build_url(station, reference);
        let body = get_text(&self.client, &url).await?;
        let soundings = parse_uwyo(&body)?;
        debug!("Parsed {} UWYO soundings for station {}", soundings.len(), station);
        Ok(soundings)
    }
}

/// Parse all soundings on an archive page
pub fn parse_uwyo(html: &str) -> Result<Vec<Sounding>, ProviderError> {
    let mut soundings = Vec::new();
    let mut rest = html;

    while let Some((title, after_title)) = between(rest, "<h2>", "</h2>") {
        let time = parse_title_time(title)?;
        let (table, after_table) = between(after_title, "<pre>", "</pre>")
            .ok_or_else(|| ProviderError::parse(format!("No table after '{title}'")))?;
        let levels = table.lines().filter_map(parse_row).collect();
        soundings.push(Sounding::from_levels(time, levels));
        rest = after_table;
    }

    if soundings.is_empty() && !html.contains("Can't get") {
        return Err(ProviderError::parse("no soundings on archive page"));
    }
    Ok(soundings)
}

/// Text between the next `open`/`close` pair, and what follows it
fn between<'a>(text: &'a str, open: &str, close: &str) -> Option<(&'a str, &'a str)> {
    let start = text.find(open)? + open.len();
    let len = text[start..].find(close)?;
    Some((&text[start..start + len], &text[start + len + close.len()..]))
}

/// "40179 LLBD Bet Dagan Observations at 12Z 01 Mar 2024"
fn parse_title_time(title: &str) -> Result<DateTime<Utc>, ProviderError> {
    let invalid = || ProviderError::parse(format!("Invalid sounding title '{title}'"));
    let (_, when) = title.split_once("Observations at ").ok_or_else(invalid)?;
    let (hour, date) = when.trim().split_once(' ').ok_or_else(invalid)?;
    let hour: u32 = hour.trim_end_matches('Z').parse().map_err(|_| invalid())?;
    let date = NaiveDate::parse_from_str(date.trim(), "%d %b %Y").map_err(|_| invalid())?;
    Ok(date.and_hms_opt(hour, 0, 0).ok_or_else(invalid)?.and_utc())
}

fn parse_row(line: &str) -> Option<SoundingLevel> {
    let column = |i: usize| -> Option<f64> {
        line.get(i * COLUMN_WIDTH..(i + 1) * COLUMN_WIDTH)
            .or_else(|| line.get(i * COLUMN_WIDTH..))
            .and_then(|cell| cell.trim().parse().ok())
    };
    Some(SoundingLevel {
        pressure: column(PRES)?,
        height: column(HGHT)?,
        temp: column(TEMP)?,
        dew: column(DWPT)?,
        wind_dir: column(DRCT)?,
        wind_speed: column(SKNT)?,
    })
}

/// Distinct radiosonde stations of the monitored locations, in ascending order
#[must_use]
pub fn distinct_stations(locations: &[Location]) -> Vec<u32> {
    locations
        .iter()
        .filter_map(|l| l.uwyo_station)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// One archive request per distinct station, keyed by station id
#[derive(Debug)]
pub struct UwyoPipeline<C> {
    client: C,
}

impl<C: SoundingArchiveClient> UwyoPipeline<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: SoundingArchiveClient> SourcePipeline for UwyoPipeline<C> {
    fn source(&self) -> SourceKind {
        SourceKind::Uwyo
    }

    fn stamp_policy(&self) -> StampPolicy {
        StampPolicy::PerBatch
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<Vec<FetchedRecord>, ProviderError> {
        let mut records = Vec::new();
        for station in distinct_stations(ctx.locations) {
            let soundings = self.client.fetch(station, ctx.now).await?;
            for sounding in &soundings {
                records.push(FetchedRecord::new(station.to_string(), sounding)?);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PAGE: &str = "<HTML>
<TITLE>University of Wyoming - Radiosonde Data</TITLE>
<BODY BGCOLOR=\"white\">
<h2>40179 LLBD Bet Dagan Observations at 00Z 01 Mar 2024</h2>
<pre>
-----------------------------------------------------------------------------
   PRES   HGHT   TEMP   DWPT   RELH   MIXR   DRCT   SKNT   THTA   THTE   THTV
    hPa     m      C      C      %    g/kg    deg   knot     K      K      K
-----------------------------------------------------------------------------
 1011.0     35   18.2   10.2     60   7.73    250      6  290.4  312.6  291.8
 1000.0    127   16.4    9.4     63   7.30    255      8  289.5  310.5  290.8
  925.0    808   12.0    3.0     54   5.11    275     12  291.9  306.9  292.8
  900.0   1046   10.4                                        292.6
</pre><h3>Station information and sounding indices</h3><pre>
                         Station identifier: LLBD
                             Station number: 40179
</pre>
<h2>40179 LLBD Bet Dagan Observations at 12Z 01 Mar 2024</h2>
<pre>
-----------------------------------------------------------------------------
   PRES   HGHT   TEMP   DWPT   RELH   MIXR   DRCT   SKNT   THTA   THTE   THTV
-----------------------------------------------------------------------------
 1010.0     35   21.0    9.0     46   7.10    290     10  293.2  313.9  294.5
</pre>
</BODY></HTML>";

    #[test]
    fn test_parse_archive_page() {
        let soundings = parse_uwyo(PAGE).unwrap();
        assert_eq!(soundings.len(), 2);

        let first = &soundings[0];
        assert_eq!(first.time, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        // the 900 hPa row lacks dew point and wind and is skipped
        assert_eq!(first.pressure, vec![1011.0, 1000.0, 925.0]);
        assert_eq!(first.height, vec![35.0, 127.0, 808.0]);
        assert_eq!(first.dew, vec![10.2, 9.4, 3.0]);
        assert_eq!(first.wind_dir, vec![250.0, 255.0, 275.0]);
        assert_eq!(first.wind_speed, vec![6.0, 8.0, 12.0]);

        assert_eq!(soundings[1].time, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        assert_eq!(soundings[1].temp, vec![21.0]);
    }

    #[test]
    fn test_no_data_page_is_empty() {
        let page = "<HTML><BODY>Can't get 40179 LLBD Bet Dagan Observations at 12Z 01 Mar 2024.</BODY></HTML>";
        assert!(parse_uwyo(page).unwrap().is_empty());
    }

    #[test]
    fn test_busy_page_is_an_error() {
        let page = "<HTML><BODY>Sorry, the server is too busy to process your request.</BODY></HTML>";
        assert!(matches!(parse_uwyo(page), Err(ProviderError::Parse(_))));
    }

    #[test]
    fn test_distinct_stations() {
        let locations = vec![
            Location::new("p", 32.0, 35.0, 200).with_uwyo_station(111),
            Location::new("q", 31.0, 34.0, 656).with_uwyo_station(111),
            Location::new("r", 30.0, 34.0, 10).with_uwyo_station(40),
            Location::new("s", 30.0, 34.0, 10),
        ];
        assert_eq!(distinct_stations(&locations), vec![40, 111]);
    }

    #[test]
    fn test_build_url_clips_to_month() {
        let client = UwyoClient::new(Client::new(), UwyoConfig::default());
        let reference = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
        let url = client.build_url(40179, reference);
        assert_eq!(
            url,
            "http://weather.uwyo.edu/cgi-bin/sounding?region=mideast&TYPE=TEXT%3ALIST&YEAR=2024&MONTH=03&FROM=0100&TO=0106&STNM=40179"
        );

        let reference = Utc.with_ymd_and_hms(2024, 3, 15, 13, 0, 0).unwrap();
        assert!(client.build_url(40179, reference).contains("FROM=1413&TO=1513"));
    }
}
