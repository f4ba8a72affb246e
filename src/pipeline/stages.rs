//! Process-separated pipeline stages
//!
//! Each stage reads the previous stage's artifact for the run date and writes
//! its own, so the scheduler can run and restart them independently:
//!
//! | stage       | input                         | output                          |
//! |-------------|-------------------------------|---------------------------------|
//! | `scrape`    | search endpoints              | `staging/news_<date>.jsonl`     |
//! | `transform` | `staging/news_<date>.jsonl`   | `transformed/news_<date>.parquet` |
//! | `load`      | `transformed/news_<date>.parquet` | store                       |
//!
//! A missing input artifact fails the stage.

use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use crate::artifacts::{self, ArtifactPaths};
use crate::error::Result;
use crate::harvester::Harvester;
use crate::metrics;
use crate::normalizer::TimestampNormalizer;
use crate::schemas::SearchQuery;
use crate::storage::ArticleStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    pub read: usize,
    pub written: usize,
    pub dropped: usize,
}

/// Stage 1: discover and extract, then stage the raw articles.
///
/// The run date is the last day of the query window.
#[instrument(skip_all, fields(terms = %query.terms, run_date = %query.last_day()))]
pub async fn scrape(harvester: &Harvester, query: &SearchQuery, paths: &ArtifactPaths) -> Result<StageReport> {
    let (candidates, discovery) = harvester.discover(query).await;
    let read = candidates.len();
    metrics::record_stage(metrics::STAGE_DISCOVER, read, discovery.dropped());

    let (raw, stats) = harvester.extract(candidates).await;
    let written = artifacts::write_staging(&paths.staging(query.last_day()), &raw).await?;
    metrics::record_stage(metrics::STAGE_EXTRACT, written, stats.dropped());

    Ok(StageReport {
        read,
        written,
        dropped: stats.dropped(),
    })
}

/// Stage 2: canonicalize publication times.
#[instrument(skip_all, fields(run_date = %run_date))]
pub async fn transform(
    normalizer: &TimestampNormalizer,
    paths: &ArtifactPaths,
    run_date: NaiveDate,
) -> Result<StageReport> {
    let raw = artifacts::read_staging(&paths.staging(run_date), normalizer.offset()).await?;
    let read = raw.len();

    let mut normalized = Vec::with_capacity(read);
    for article in raw {
        let url = article.url.clone();
        match normalizer.normalize_article(article) {
            Ok(article) => normalized.push(article),
            Err(e) => warn!(url = %url, error = %e, "Dropping article with unreadable publication time"),
        }
    }

    let written = artifacts::write_transformed(&paths.transformed(run_date), normalized).await?;
    metrics::record_stage(metrics::STAGE_NORMALIZE, written, read - written);
    info!(read, written, "Transform completed");

    Ok(StageReport {
        read,
        written,
        dropped: read - written,
    })
}

/// Stage 3: upsert the transformed artifact into the store.
#[instrument(skip_all, fields(run_date = %run_date))]
pub async fn load(store: &dyn ArticleStore, paths: &ArtifactPaths, run_date: NaiveDate) -> Result<StageReport> {
    let articles = artifacts::read_transformed(&paths.transformed(run_date)).await?;
    let read = articles.len();

    let stored = if articles.is_empty() {
        0
    } else {
        store.upsert_batch(&articles).await?
    };
    metrics::record_stage(metrics::STAGE_STORE, stored as usize, 0);
    info!(read, stored, "Load completed");

    Ok(StageReport {
        read,
        written: stored as usize,
        dropped: 0,
    })
}
