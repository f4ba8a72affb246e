//! Configuration for the Ingestion Service

use chrono::FixedOffset;
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{IngestionError, Result};
use crate::sources::KNOWN_SOURCES;

/// Desktop browser user agent; some publishers reject unknown clients
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Storage
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    // Fetcher
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,
    #[serde(default)]
    pub retry_jitter: f64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // Timestamps
    #[serde(default = "default_capture_offset")]
    pub capture_offset: String,

    // Sources
    #[serde(default = "default_enabled_sources")]
    pub enabled_sources: Vec<String>,
    pub search_terms: Option<String>,
    #[serde(default = "default_kompas_search_url")]
    pub kompas_search_url: String,
    #[serde(default = "default_tempo_search_url")]
    pub tempo_search_url: String,
    #[serde(default = "default_tempo_base_url")]
    pub tempo_base_url: String,
    pub tempo_api_key: Option<String>,
    #[serde(default = "default_detik_search_url")]
    pub detik_search_url: String,

    // In-process pipeline
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    // Prometheus textfile written after each invocation
    pub metrics_file: Option<PathBuf>,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/storage/news_articles.db")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_concurrent_requests() -> usize {
    20
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_retry_base_delay() -> u64 {
    1000
}

fn default_retry_max_delay() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_capture_offset() -> String {
    "+07:00".to_string() // WIB
}

fn default_enabled_sources() -> Vec<String> {
    KNOWN_SOURCES.iter().map(|s| s.to_string()).collect()
}

fn default_kompas_search_url() -> String {
    "https://search.kompas.com/search".to_string()
}

fn default_tempo_search_url() -> String {
    "https://www.tempo.co/api/v1/search".to_string()
}

fn default_tempo_base_url() -> String {
    "https://www.tempo.co".to_string()
}

fn default_detik_search_url() -> String {
    "https://www.detik.com/search/searchall".to_string()
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            data_dir: default_data_dir(),
            max_concurrent_requests: default_max_concurrent_requests(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            retry_jitter: 0.0,
            user_agent: default_user_agent(),
            capture_offset: default_capture_offset(),
            enabled_sources: default_enabled_sources(),
            search_terms: None,
            kompas_search_url: default_kompas_search_url(),
            tempo_search_url: default_tempo_search_url(),
            tempo_base_url: default_tempo_base_url(),
            tempo_api_key: None,
            detik_search_url: default_detik_search_url(),
            channel_capacity: default_channel_capacity(),
            metrics_file: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file
        dotenvy::dotenv().ok();

        // Build config from environment
        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("enabled_sources"),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_requests == 0 {
            return Err(invalid("max_concurrent_requests must be at least 1"));
        }
        if self.max_retries == 0 {
            return Err(invalid("max_retries must be at least 1"));
        }
        if !(0.0..1.0).contains(&self.retry_jitter) {
            return Err(invalid("retry_jitter must be in [0, 1)"));
        }
        self.capture_offset()?;

        if self.enabled_sources.is_empty() {
            return Err(invalid("enabled_sources is empty"));
        }
        if let Some(unknown) = self
            .enabled_sources
            .iter()
            .find(|s| !KNOWN_SOURCES.contains(&s.as_str()))
        {
            return Err(invalid(&format!(
                "unknown source {unknown:?} (known: {})",
                KNOWN_SOURCES.join(", ")
            )));
        }

        Ok(())
    }

    /// The fixed offset every capture and publication instant is expressed in
    pub fn capture_offset(&self) -> Result<FixedOffset> {
        self.capture_offset
            .parse::<FixedOffset>()
            .map_err(|e| invalid(&format!("capture_offset {:?}: {e}", self.capture_offset)))
    }

    /// Checks if a source is enabled
    pub fn is_enabled(&self, source_id: &str) -> bool {
        self.enabled_sources.iter().any(|s| s == source_id)
    }

    /// Directory for stage 1 (row-oriented) artifacts
    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("staging")
    }

    /// Directory for stage 2 (columnar) artifacts
    pub fn transformed_dir(&self) -> PathBuf {
        self.data_dir.join("transformed")
    }
}

fn invalid(message: &str) -> IngestionError {
    IngestionError::InvalidInput(format!("invalid configuration: {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();

        assert_eq!(config.max_concurrent_requests, 20);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.enabled_sources, vec!["kompas", "tempo", "detik"]);
        assert_eq!(
            config.capture_offset().unwrap(),
            FixedOffset::east_opt(7 * 3600).unwrap()
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            enabled_sources: vec!["kompas".into(), "antara".into()],
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            capture_offset: "WIB".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            max_concurrent_requests: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_artifact_dirs() {
        let config = Config {
            data_dir: PathBuf::from("/tmp/news"),
            ..Config::default()
        };
        assert_eq!(config.staging_dir(), PathBuf::from("/tmp/news/staging"));
        assert_eq!(config.transformed_dir(), PathBuf::from("/tmp/news/transformed"));
    }
}
