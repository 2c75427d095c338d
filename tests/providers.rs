//! Integration tests for the provider HTTP clients (wiremock-based)

use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use airsounds::config::{ImsConfig, NoaaConfig, UwyoConfig};
use airsounds::providers::{
    ImsClient, NoaaClient, ProviderError, SoundingArchiveClient, SoundingForecastClient, StationForecastClient,
    UwyoClient, http_client,
};

const fn sample_gsd() -> &'static str {
    "GFS analysis valid for grid point 3.1 nm / 120 deg from 32.6,35.2:
GFS         0      1      Mar    2024
   CAPE      0    CIN      0  Helic  99999     PW  99999
      1  23062  99999  32.60 -35.23  99999  99999
      9  10130     51    182    151    284      8
      4  10000    162    171    141    279     10
"
}

const fn sample_ims_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<HourlyLocationsForecast>
    <Location>
        <LocationMetaData>
            <LocationNameEng>BEER SHEVA</LocationNameEng>
        </LocationMetaData>
        <LocationData>
            <Forecast>
                <ForecastTime>2024-07-10 12:00:00</ForecastTime>
                <Temperature>34</Temperature>
                <RelativeHumidity>30</RelativeHumidity>
                <WindSpeed>18</WindSpeed>
                <WindDirection>300</WindDirection>
            </Forecast>
        </LocationData>
    </Location>
</HourlyLocationsForecast>"#
}

const fn sample_uwyo_html() -> &'static str {
    "<HTML><BODY>
<h2>40179 LLBD Bet Dagan Observations at 00Z 10 Jul 2024</h2>
<pre>
-----------------------------------------------------------------------------
   PRES   HGHT   TEMP   DWPT   RELH   MIXR   DRCT   SKNT   THTA   THTE   THTV
-----------------------------------------------------------------------------
 1006.0     35   25.6   21.6     79  16.50    330      3  298.2  345.8  301.2
</pre>
</BODY></HTML>"
}

fn client() -> reqwest::Client {
    http_client(Duration::from_secs(5)).unwrap()
}

fn utc(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

#[tokio::test]
async fn noaa_client_requests_window_and_parses_gsd() {
    let server = MockServer::start().await;
    let start = Utc.with_ymd_and_hms(2024, 2, 29, 22, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/get_soundings.cgi"))
        .and(query_param("data_source", "GFS"))
        .and(query_param("n_hrs", "96"))
        .and(query_param("startSecs", start.timestamp().to_string()))
        .and(query_param("airport", "32.6000,35.2000"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sample_gsd()))
        .expect(1)
        .mount(&server)
        .await;

    let config = NoaaConfig {
        base_url: server.uri(),
        ..NoaaConfig::default()
    };
    let soundings = NoaaClient::new(client(), config)
        .fetch(start, start + TimeDelta::hours(96), 32.6, 35.2)
        .await
        .unwrap();

    assert_eq!(soundings.len(), 1);
    assert_eq!(soundings[0].time, utc("2024-03-01T00:00:00Z"));
    assert_eq!(soundings[0].pressure, vec![1013.0, 1000.0]);
}

#[tokio::test]
async fn noaa_client_fails_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let config = NoaaConfig {
        base_url: server.uri(),
        ..NoaaConfig::default()
    };
    let start = utc("2024-03-01T00:00:00Z");
    let err = NoaaClient::new(client(), config)
        .fetch(start, start + TimeDelta::hours(96), 32.6, 35.2)
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Status { status: 502, .. }));
}

#[tokio::test]
async fn ims_client_converts_local_times() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forecasts/isr_cities.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sample_ims_xml()))
        .mount(&server)
        .await;

    let config = ImsConfig {
        url: format!("{}/forecasts/isr_cities.xml", server.uri()),
    };
    let batches = ImsClient::new(client(), config, chrono_tz::Asia::Jerusalem)
        .fetch()
        .await
        .unwrap();

    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].label, "BEER SHEVA");
    // local noon in summer time is 09:00 UTC
    assert_eq!(batches[0].forecasts[0].time.time, utc("2024-07-10T09:00:00Z"));
    assert_eq!(batches[0].forecasts[0].wind_dir, 300.0);
}

#[tokio::test]
async fn uwyo_client_requests_lookback_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cgi-bin/sounding"))
        .and(query_param("TYPE", "TEXT:LIST"))
        .and(query_param("YEAR", "2024"))
        .and(query_param("MONTH", "07"))
        .and(query_param("FROM", "0906"))
        .and(query_param("TO", "1006"))
        .and(query_param("STNM", "40179"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sample_uwyo_html()))
        .expect(1)
        .mount(&server)
        .await;

    let config = UwyoConfig {
        base_url: server.uri(),
        ..UwyoConfig::default()
    };
    let soundings = UwyoClient::new(client(), config)
        .fetch(40179, utc("2024-07-10T06:00:00Z"))
        .await
        .unwrap();

    assert_eq!(soundings.len(), 1);
    assert_eq!(soundings[0].time, utc("2024-07-10T00:00:00Z"));
    assert_eq!(soundings[0].wind_speed, vec![3.0]);
}
