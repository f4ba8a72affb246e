//! News Ingestion Service
//!
//! Crawls Indonesian news publishers' search endpoints, extracts articles,
//! normalizes their publication times and stores them keyed by URL.
//!
//! Features:
//! - Concurrency-bounded, retrying HTTP fetcher with an injected limiter
//! - Per-publisher site adapters behind a host-matching registry
//! - Absolute and relative (`2 jam`) publication time normalization
//! - Atomic, idempotent SQLite upserts
//! - In-process pipeline or file-separated scrape/transform/load stages
//! - Prometheus counters exported as a textfile after each invocation

pub mod artifacts;
pub mod config;
pub mod error;
pub mod harvester;
pub mod http_client;
pub mod metrics;
pub mod normalizer;
pub mod pipeline;
pub mod schemas;
pub mod sources;
pub mod storage;

pub use config::Config;
pub use error::{IngestionError, Result};
