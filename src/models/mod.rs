//! Data models for the airsounds fetcher
//!
//! This module contains the core domain models organized by concern:
//! - Location: monitored sites and their provider station identifiers
//! - Source: the three upstream providers
//! - Forecast: provider payloads and the envelope the pipeline works with

pub mod forecast;
pub mod location;
pub mod source;

// Re-export all public types for convenient access
pub use forecast::{
    FetchedRecord, ForecastRecord, Sounding, SoundingLevel, StationBatch, StationForecast,
    StationTime,
};
pub use location::{Location, default_locations};
pub use source::{SourceKind, SourceSelection};
