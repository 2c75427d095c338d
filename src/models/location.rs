//! Location model for monitored sites

use serde::{Deserialize, Serialize};

/// A monitored site together with the identifiers each provider knows it by.
///
/// NOAA is addressed by coordinates, IMS by its English station name and
/// UWYO by a WMO station number. The serialized form is the one written to
/// the index `Locations` snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Location {
    /// Unique location name, used in artifact file names
    pub name: String,
    /// Latitude in decimal degrees
    #[serde(rename = "lat")]
    pub latitude: f64,
    /// Longitude in decimal degrees
    #[serde(rename = "long")]
    pub longitude: f64,
    /// Altitude in meters above sea level
    #[serde(rename = "alt")]
    pub altitude: i32,
    /// UWYO (radiosonde) station number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uwyo_station: Option<u32>,
    /// IMS station name as it appears in the IMS feed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ims_name: Option<String>,
}

impl Location {
    /// Create a new location without provider identifiers
    #[must_use]
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64, altitude: i32) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            altitude,
            uwyo_station: None,
            ims_name: None,
        }
    }

    #[must_use]
    pub fn with_uwyo_station(mut self, station: u32) -> Self {
        self.uwyo_station = Some(station);
        self
    }

    #[must_use]
    pub fn with_ims_name(mut self, name: impl Into<String>) -> Self {
        self.ims_name = Some(name.into());
        self
    }
}

/// Bet Dagan, the only radiosonde launch site in Israel
const BET_DAGAN: u32 = 40179;

/// Built-in location table used when the configuration does not list any
#[must_use]
pub fn default_locations() -> Vec<Location> {
    vec![
        Location::new("megido", 32.597_662, 35.234_076, 200)
            .with_ims_name("AFULA NIR HAEMEQ")
            .with_uwyo_station(BET_DAGAN),
        Location::new("sde-teiman", 31.287_646, 34.722_855, 656)
            .with_ims_name("BEER SHEVA")
            .with_uwyo_station(BET_DAGAN),
        Location::new("zefat", 32.965_719, 35.497_225, 2559)
            .with_ims_name("ZEFAT HAR KENAAN")
            .with_uwyo_station(BET_DAGAN),
        Location::new("bet-shaan", 32.102_560, 35.197_610, -394)
            .with_ims_name("EDEN FARM")
            .with_uwyo_station(BET_DAGAN),
    ]
}
