//! `airsounds` - Forecast data fetcher for the airsounds soaring site
//!
//! This library fetches sounding and station forecasts from NOAA, IMS and
//! UWYO, stores them in a date-partitioned JSON tree, maintains the coverage
//! index the front end reads and publishes the changes to git.

pub mod config;
pub mod digest;
pub mod error;
pub mod index;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod publish;
pub mod storage;

// Re-export core types for public API
pub use config::{AirsoundsConfig, PublishMode};
pub use error::{AirsoundsError, Stage};
pub use index::{Coverage, Index};
pub use models::{FetchedRecord, Location, SourceKind, SourceSelection};
pub use orchestrator::{Clock, FixedClock, Orchestrator, RunReport, SystemClock};
pub use providers::{ProviderError, SourcePipeline, StampPolicy};
pub use publish::{ChangePublisher, GitPublisher, PublishOutcome};
pub use storage::{ArtifactWriter, PathResolver};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, AirsoundsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
