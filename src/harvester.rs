//! URL discovery and article extraction
//!
//! Two fully drained batches per run, both through the shared Fetcher:
//! - discovery: one search request per registered publisher
//! - extraction: one request per candidate URL
//!
//! A publisher or article that fails is logged and dropped; neither batch
//! ever fails as a whole.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, SubsecRound, Utc};
use tracing::{debug, info, instrument, warn};

use crate::http_client::Fetcher;
use crate::schemas::{CandidateUrl, RawArticle, RequestSpec, SearchQuery};
use crate::sources::{AdapterRegistry, SiteAdapter};

/// Per-batch drop counts, for run reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub requested: usize,
    pub fetch_failures: usize,
    pub extraction_failures: usize,
    pub unsupported: usize,
}

impl BatchStats {
    /// Records that did not make it through this phase
    pub fn dropped(&self) -> usize {
        self.fetch_failures + self.extraction_failures + self.unsupported
    }
}

pub struct Harvester {
    fetcher: Arc<Fetcher>,
    registry: Arc<AdapterRegistry>,
    capture_offset: FixedOffset,
}

impl Harvester {
    pub fn new(fetcher: Arc<Fetcher>, registry: Arc<AdapterRegistry>, capture_offset: FixedOffset) -> Self {
        Self {
            fetcher,
            registry,
            capture_offset,
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Runs the discovery batch.
    ///
    /// The result is the union of every publisher's candidates in registry
    /// order. The same URL surfaced by two publishers appears twice.
    #[instrument(skip(self), fields(terms = %query.terms))]
    pub async fn discover(&self, query: &SearchQuery) -> (Vec<CandidateUrl>, BatchStats) {
        let adapters = self.registry.adapters();
        let requests: Vec<RequestSpec> = adapters
            .iter()
            .map(|adapter| adapter.build_search_request(query))
            .collect();

        let outcomes = self.fetcher.fetch_all(&requests).await;

        let mut stats = BatchStats {
            requested: requests.len(),
            ..Default::default()
        };
        let mut candidates = Vec::new();

        for (adapter, outcome) in adapters.iter().zip(outcomes) {
            let body = match outcome {
                Ok(body) => body,
                Err(e) => {
                    warn!(source = %adapter.id(), error = %e, "Search request failed, skipping source");
                    stats.fetch_failures += 1;
                    continue;
                }
            };

            match adapter.extract_candidate_urls(&body) {
                Ok(urls) => {
                    debug!(source = %adapter.id(), count = urls.len(), "Extracted candidate URLs");
                    candidates.extend(urls.into_iter().map(|url| CandidateUrl {
                        source: adapter.id().to_string(),
                        url,
                    }));
                }
                Err(e) => {
                    warn!(source = %adapter.id(), error = %e, "Search response unreadable, skipping source");
                    stats.extraction_failures += 1;
                }
            }
        }

        info!(
            sources = stats.requested,
            candidates = candidates.len(),
            failed_sources = stats.fetch_failures + stats.extraction_failures,
            "Discovery completed"
        );

        (candidates, stats)
    }

    /// Runs the extraction batch over `candidates`.
    ///
    /// Each candidate is dispatched by its own host; hosts no adapter claims
    /// are skipped without a request.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub async fn extract(&self, candidates: Vec<CandidateUrl>) -> (Vec<RawArticle>, BatchStats) {
        let mut stats = BatchStats::default();
        let mut jobs: Vec<(CandidateUrl, Arc<dyn SiteAdapter>)> = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            match self.registry.resolve(&candidate.url) {
                Some(adapter) => jobs.push((candidate, adapter)),
                None => {
                    debug!(url = %candidate.url, found_by = %candidate.source, "No adapter for candidate host");
                    stats.unsupported += 1;
                }
            }
        }

        let requests: Vec<RequestSpec> = jobs
            .iter()
            .map(|(candidate, _)| RequestSpec::get(candidate.url.clone()))
            .collect();
        stats.requested = requests.len();

        let outcomes = self.fetcher.fetch_all(&requests).await;

        let mut articles = Vec::with_capacity(jobs.len());
        for ((candidate, adapter), outcome) in jobs.into_iter().zip(outcomes) {
            let body = match outcome {
                Ok(body) => body,
                Err(e) => {
                    warn!(url = %candidate.url, error = %e, "Article fetch failed, dropping");
                    stats.fetch_failures += 1;
                    continue;
                }
            };

            match adapter.extract_article_fields(&body) {
                Ok(fields) => articles.push(RawArticle {
                    source: adapter.id().to_string(),
                    title: fields.title,
                    url: candidate.url.to_string(),
                    published_raw: fields.published_raw,
                    scraped_at: self.capture_now(),
                }),
                Err(e) => {
                    warn!(url = %candidate.url, source = %adapter.id(), error = %e, "Article extraction failed, dropping");
                    stats.extraction_failures += 1;
                }
            }
        }

        info!(
            requested = stats.requested,
            extracted = articles.len(),
            fetch_failures = stats.fetch_failures,
            extraction_failures = stats.extraction_failures,
            unsupported = stats.unsupported,
            "Extraction completed"
        );

        (articles, stats)
    }

    /// Current instant at the capture offset, whole seconds
    fn capture_now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.capture_offset).trunc_subsecs(0)
    }
}
