//! Error types for the Ingestion Service
//!
//! Per-record failures (`FetchError`, `ExtractionError`, `NormalizationError`)
//! are handled where they occur: the record is dropped and the batch goes on.
//! Only `IngestionError` values abort a run.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single HTTP request.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("connection to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid request for {url}: {source}")]
    InvalidRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("cannot build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("concurrency limiter closed")]
    LimiterClosed,

    /// Terminal failure: every attempt in the retry budget failed.
    #[error("{url} failed after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Classifies a reqwest error raised while sending or reading a request.
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            FetchError::Timeout { url }
        } else if err.is_connect() {
            FetchError::Connect { url, source: err }
        } else if err.is_builder() {
            FetchError::InvalidRequest { url, source: err }
        } else if let Some(status) = err.status() {
            FetchError::Status {
                url,
                status: status.as_u16(),
            }
        } else {
            FetchError::Transport { url, source: err }
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. }
            | FetchError::Connect { .. }
            | FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status >= 400,
            FetchError::InvalidRequest { .. }
            | FetchError::ClientBuild(_)
            | FetchError::LimiterClosed
            | FetchError::Exhausted { .. } => false,
        }
    }

    /// Whether this failure ended a request for good.
    pub fn is_terminal(&self) -> bool {
        !self.is_transient()
    }
}

/// An adapter could not find what it expected in a response body.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid JSON document: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// A published timestamp matched neither the source's absolute format nor
/// the relative grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot normalize {raw:?} from source {source_id}")]
pub struct NormalizationError {
    pub source_id: String,
    pub raw: String,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt row for {url}: {reason}")]
    CorruptRow { url: String, reason: String },
}

/// Run-level failure. Any of these fails the stage that raised it.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("expected artifact is missing: {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] FetchError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

pub type Result<T> = std::result::Result<T, IngestionError>;
