//! Pipeline orchestration
//!
//! In-process run: discover → extract → normalize → load, each phase fully
//! drained before the next starts. Raw articles reach the normalizer over a
//! bounded channel; normalized articles are written with one atomic
//! `upsert_batch`, so a run commits everything or nothing.
//!
//! The same phases are also exposed as process-separated stages in
//! [`stages`], handing off through files keyed by run date.

pub mod stages;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};

use crate::config::Config;
use crate::error::{IngestionError, Result};
use crate::harvester::{BatchStats, Harvester};
use crate::http_client::{Fetcher, HttpClientConfig};
use crate::metrics;
use crate::normalizer::TimestampNormalizer;
use crate::schemas::{NormalizedArticle, RawArticle, SearchQuery};
use crate::sources::AdapterRegistry;
use crate::storage::ArticleStore;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Raw articles buffered between extraction and normalization
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            channel_capacity: config.channel_capacity.max(1),
        }
    }
}

/// Outcome of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub discovery: BatchStats,
    pub extraction: BatchStats,
    pub candidates: usize,
    pub extracted: usize,
    pub normalized: usize,
    pub dropped_normalization: usize,
    pub stored: u64,
}

/// Builds the harvester and normalizer shared by the pipeline and the stages
pub fn build_components(config: &Config) -> Result<(Harvester, TimestampNormalizer)> {
    config.validate()?;
    let offset = config.capture_offset()?;

    let registry = Arc::new(AdapterRegistry::from_config(config)?);
    let fetcher = Arc::new(Fetcher::with_limit(
        HttpClientConfig::from_config(config),
        config.max_concurrent_requests,
    )?);

    let normalizer = TimestampNormalizer::from_registry(&registry, offset);
    Ok((Harvester::new(fetcher, registry, offset), normalizer))
}

pub struct Pipeline {
    config: PipelineConfig,
    harvester: Harvester,
    normalizer: Arc<TimestampNormalizer>,
    store: Arc<dyn ArticleStore>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        harvester: Harvester,
        normalizer: TimestampNormalizer,
        store: Arc<dyn ArticleStore>,
    ) -> Self {
        Self {
            config,
            harvester,
            normalizer: Arc::new(normalizer),
            store,
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn ArticleStore>) -> Result<Self> {
        let (harvester, normalizer) = build_components(config)?;
        Ok(Self::new(
            PipelineConfig::from_config(config),
            harvester,
            normalizer,
            store,
        ))
    }

    pub fn harvester(&self) -> &Harvester {
        &self.harvester
    }

    /// Executes one run.
    ///
    /// Per-record failures only shrink the output. A store failure (or a
    /// crashed normalizer task) fails the run with nothing written.
    pub async fn run(&self, query: &SearchQuery) -> Result<RunReport> {
        info!(terms = %query.terms, since = %query.since, until = %query.until, "Starting run");

        let (candidates, discovery) = self.harvester.discover(query).await;
        let candidate_count = candidates.len();

        let (raw, extraction) = self.harvester.extract(candidates).await;
        let extracted = raw.len();

        let (normalized, dropped_normalization) = self.normalize(raw).await?;

        let stored = if normalized.is_empty() {
            debug!("Nothing to store");
            0
        } else {
            self.store.upsert_batch(&normalized).await?
        };

        metrics::record_stage(metrics::STAGE_DISCOVER, candidate_count, discovery.dropped());
        metrics::record_stage(metrics::STAGE_EXTRACT, extracted, extraction.dropped());
        metrics::record_stage(metrics::STAGE_NORMALIZE, normalized.len(), dropped_normalization);
        metrics::record_stage(metrics::STAGE_STORE, stored as usize, 0);

        let report = RunReport {
            discovery,
            extraction,
            candidates: candidate_count,
            extracted,
            normalized: normalized.len(),
            dropped_normalization,
            stored,
        };

        info!(
            candidates = report.candidates,
            extracted = report.extracted,
            normalized = report.normalized,
            dropped = report.dropped_normalization,
            stored = report.stored,
            "Run completed"
        );

        Ok(report)
    }

    /// Streams raw articles through a bounded channel into the normalizer task
    async fn normalize(&self, raw: Vec<RawArticle>) -> Result<(Vec<NormalizedArticle>, usize)> {
        let (tx, mut rx) = mpsc::channel::<RawArticle>(self.config.channel_capacity);
        let normalizer = Arc::clone(&self.normalizer);

        let worker = tokio::spawn(
            async move {
                let mut normalized = Vec::new();
                let mut dropped = 0usize;

                while let Some(article) = rx.recv().await {
                    let url = article.url.clone();
                    match normalizer.normalize_article(article) {
                        Ok(article) => normalized.push(article),
                        Err(e) => {
                            warn!(url = %url, error = %e, "Dropping article with unreadable publication time");
                            dropped += 1;
                        }
                    }
                }

                (normalized, dropped)
            }
            .instrument(tracing::info_span!("normalize")),
        );

        for article in raw {
            if tx.send(article).await.is_err() {
                // Receiver gone: the worker ended early, its join error says why
                break;
            }
        }
        drop(tx);

        worker
            .await
            .map_err(|e| IngestionError::Pipeline(format!("normalizer task failed: {e}")))
    }
}
