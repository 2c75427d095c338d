//! Configuration management for the airsounds fetcher
//!
//! Handles loading configuration from an optional TOML file and
//! environment variables, and provides validation for all settings.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use clap::ValueEnum;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::AirsoundsError;
use crate::models::{Location, default_locations};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirsoundsConfig {
    /// Data tree layout
    #[serde(default)]
    pub storage: StorageConfig,
    /// Upstream provider endpoints and limits
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Change publication
    #[serde(default)]
    pub publish: PublishConfig,
    /// Monitored locations
    #[serde(default = "default_locations")]
    pub locations: Vec<Location>,
}

/// Data tree configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the date-partitioned tree
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Index file name, relative to `data_dir`
    #[serde(default = "default_index_file")]
    pub index_file: String,
    /// IANA zone used for date/hour partitioning
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Rebuild per-day digest files for days touched by a run
    #[serde(default = "default_true")]
    pub daily_digest: bool,
}

/// Provider configuration shared by all sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
    /// Upper bound for one provider fetch, all requests included
    #[serde(default = "default_fetch_deadline")]
    pub fetch_deadline_seconds: u32,
    #[serde(default)]
    pub noaa: NoaaConfig,
    #[serde(default)]
    pub ims: ImsConfig,
    #[serde(default)]
    pub uwyo: UwyoConfig,
}

/// NOAA model sounding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoaaConfig {
    #[serde(default = "default_noaa_base_url")]
    pub base_url: String,
    /// Model to request soundings from
    #[serde(default = "default_noaa_model")]
    pub model: String,
    /// Forecast window length from the start of the current day
    #[serde(default = "default_noaa_forecast_hours")]
    pub forecast_hours: u32,
}

/// IMS station forecast settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImsConfig {
    #[serde(default = "default_ims_url")]
    pub url: String,
}

/// UWYO radiosonde archive settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UwyoConfig {
    #[serde(default = "default_uwyo_base_url")]
    pub base_url: String,
    #[serde(default = "default_uwyo_region")]
    pub region: String,
    /// How far back from the run time to request soundings
    #[serde(default = "default_uwyo_lookback_hours")]
    pub lookback_hours: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// When changed files are committed and pushed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PublishMode {
    /// Only inside a CI job
    #[default]
    Auto,
    Always,
    Never,
}

impl PublishMode {
    #[must_use]
    pub fn enabled(self, in_ci: bool) -> bool {
        match self {
            Self::Auto => in_ci,
            Self::Always => true,
            Self::Never => false,
        }
    }
}

/// Change publication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub mode: PublishMode,
    /// Bot identity recorded as commit author
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
    #[serde(default = "default_commit_message")]
    pub message: String,
    /// Push after committing
    #[serde(default = "default_true")]
    pub push: bool,
    /// Working tree of the repository holding the data tree
    #[serde(default = "default_repo_dir")]
    pub repo_dir: String,
}

// Default value functions
fn default_data_dir() -> String {
    "data".to_string()
}

fn default_index_file() -> String {
    "index.json".to_string()
}

fn default_timezone() -> String {
    "Asia/Jerusalem".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u32 {
    30
}

fn default_fetch_deadline() -> u32 {
    300
}

fn default_noaa_base_url() -> String {
    "https://rucsoundings.noaa.gov".to_string()
}

fn default_noaa_model() -> String {
    "GFS".to_string()
}

fn default_noaa_forecast_hours() -> u32 {
    96
}

fn default_ims_url() -> String {
    "https://ims.gov.il/sites/default/files/ims_data/xml_files/isr_stations_hourly_forecast.xml"
        .to_string()
}

fn default_uwyo_base_url() -> String {
    "http://weather.uwyo.edu".to_string()
}

fn default_uwyo_region() -> String {
    "mideast".to_string()
}

fn default_uwyo_lookback_hours() -> u32 {
    24
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_author_name() -> String {
    "Forecast Bot".to_string()
}

fn default_author_email() -> String {
    "bot@airsounds.github.io".to_string()
}

fn default_commit_message() -> String {
    "Update forecast data".to_string()
}

fn default_repo_dir() -> String {
    ".".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            index_file: default_index_file(),
            timezone: default_timezone(),
            daily_digest: true,
        }
    }
}

impl Default for NoaaConfig {
    fn default() -> Self {
        Self {
            base_url: default_noaa_base_url(),
            model: default_noaa_model(),
            forecast_hours: default_noaa_forecast_hours(),
        }
    }
}

impl Default for ImsConfig {
    fn default() -> Self {
        Self {
            url: default_ims_url(),
        }
    }
}

impl Default for UwyoConfig {
    fn default() -> Self {
        Self {
            base_url: default_uwyo_base_url(),
            region: default_uwyo_region(),
            lookback_hours: default_uwyo_lookback_hours(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            fetch_deadline_seconds: default_fetch_deadline(),
            noaa: NoaaConfig::default(),
            ims: ImsConfig::default(),
            uwyo: UwyoConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            mode: PublishMode::default(),
            author_name: default_author_name(),
            author_email: default_author_email(),
            message: default_commit_message(),
            push: true,
            repo_dir: default_repo_dir(),
        }
    }
}

impl Default for AirsoundsConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            providers: ProvidersConfig::default(),
            logging: LoggingConfig::default(),
            publish: PublishConfig::default(),
            locations: default_locations(),
        }
    }
}

impl AirsoundsConfig {
    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let explicit = config_path.is_some();
        let config_file = config_path.unwrap_or_else(Self::get_config_path);

        if explicit || config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(explicit)
                    .format(config::FileFormat::Toml),
            );
        }

        // Environment overrides, e.g. AIRSOUNDS_STORAGE__DATA_DIR
        builder = builder.add_source(
            Environment::with_prefix("AIRSOUNDS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| format!("Failed to build configuration from {}", config_file.display()))?;

        let mut config: AirsoundsConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        // Apply defaults for missing values
        config.apply_defaults();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Default configuration file, looked up in the working directory
    #[must_use]
    pub fn get_config_path() -> PathBuf {
        PathBuf::from("airsounds.toml")
    }

    /// Apply default values to empty configuration fields
    pub fn apply_defaults(&mut self) {
        if self.storage.data_dir.is_empty() {
            self.storage.data_dir = default_data_dir();
        }
        if self.storage.index_file.is_empty() {
            self.storage.index_file = default_index_file();
        }
        if self.storage.timezone.is_empty() {
            self.storage.timezone = default_timezone();
        }
        if self.providers.timeout_seconds == 0 {
            self.providers.timeout_seconds = default_timeout();
        }
        if self.providers.fetch_deadline_seconds == 0 {
            self.providers.fetch_deadline_seconds = default_fetch_deadline();
        }
        if self.providers.noaa.forecast_hours == 0 {
            self.providers.noaa.forecast_hours = default_noaa_forecast_hours();
        }
        if self.providers.uwyo.lookback_hours == 0 {
            self.providers.uwyo.lookback_hours = default_uwyo_lookback_hours();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
        if self.locations.is_empty() {
            self.locations = default_locations();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.timezone()?;
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        self.validate_locations()?;
        Ok(())
    }

    /// Target time zone for partitioning
    pub fn timezone(&self) -> Result<Tz> {
        self.storage.timezone.parse::<Tz>().map_err(|e| {
            AirsoundsError::config(format!(
                "Invalid timezone '{}': {e}",
                self.storage.timezone
            ))
            .into()
        })
    }

    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir)
    }

    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.data_dir().join(&self.storage.index_file)
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.providers.timeout_seconds.into())
    }

    #[must_use]
    pub fn fetch_deadline(&self) -> Duration {
        Duration::from_secs(self.providers.fetch_deadline_seconds.into())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.providers.timeout_seconds > 300 {
            return Err(AirsoundsError::config("HTTP timeout cannot exceed 300 seconds").into());
        }

        if self.providers.fetch_deadline_seconds > 3600 {
            return Err(AirsoundsError::config("Fetch deadline cannot exceed 3600 seconds").into());
        }

        if self.providers.noaa.forecast_hours > 384 {
            return Err(AirsoundsError::config(
                "NOAA forecast window cannot exceed 384 hours (16 days)",
            )
            .into());
        }

        if self.providers.uwyo.lookback_hours > 744 {
            return Err(AirsoundsError::config("UWYO lookback cannot exceed 744 hours (31 days)").into());
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(AirsoundsError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(AirsoundsError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        for (name, url) in [
            ("NOAA base URL", &self.providers.noaa.base_url),
            ("IMS URL", &self.providers.ims.url),
            ("UWYO base URL", &self.providers.uwyo.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(
                    AirsoundsError::config(format!("{name} must be a valid HTTP or HTTPS URL")).into(),
                );
            }
        }

        Ok(())
    }

    /// Location names end up in file names and must be unique
    fn validate_locations(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for location in &self.locations {
            if location.name.is_empty() {
                return Err(AirsoundsError::config("Location name cannot be empty").into());
            }
            if location.name.contains(['/', '\\']) {
                return Err(AirsoundsError::config(format!(
                    "Location name '{}' cannot contain path separators",
                    location.name
                ))
                .into());
            }
            if !seen.insert(location.name.as_str()) {
                return Err(AirsoundsError::config(format!(
                    "Duplicate location name '{}'",
                    location.name
                ))
                .into());
            }
            if !(-90.0..=90.0).contains(&location.latitude)
                || !(-180.0..=180.0).contains(&location.longitude)
            {
                return Err(AirsoundsError::config(format!(
                    "Location '{}' has invalid coordinates",
                    location.name
                ))
                .into());
            }
        }
        Ok(())
    }
}
