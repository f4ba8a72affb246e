//! Publisher adapters
//!
//! Each publisher implements the `SiteAdapter` trait: how to ask its search
//! endpoint for articles, how to read candidate URLs out of the search
//! response, and how to read title and publication time out of an article.
//! Adapters are pure; all I/O goes through the Fetcher.

pub mod detik;
pub mod extract;
pub mod kompas;
pub mod tempo;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::error::{ExtractionError, IngestionError, Result};
use crate::schemas::{ArticleFields, RequestSpec, SearchQuery};

/// Adapter ids that `AdapterRegistry::from_config` can build
pub const KNOWN_SOURCES: &[&str] = &[kompas::SOURCE_ID, tempo::SOURCE_ID, detik::SOURCE_ID];

/// Metadata about a source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Unique identifier for the source, stored with every article
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Description
    pub description: String,
}

/// Where an adapter sends its search request and which hosts it owns.
#[derive(Debug, Clone)]
pub struct SourceEndpoint {
    pub search_url: Url,
    /// Host names (and their subdomains) whose articles the adapter parses
    pub hosts: Vec<String>,
}

impl SourceEndpoint {
    pub fn new(search_url: &str, hosts: &[&str]) -> Result<Self> {
        let search_url = Url::parse(search_url).map_err(|e| {
            IngestionError::InvalidInput(format!("invalid search URL {search_url:?}: {e}"))
        })?;
        Ok(Self {
            search_url,
            hosts: hosts.iter().map(|h| h.to_ascii_lowercase()).collect(),
        })
    }

    /// True for an exact host match or any subdomain of a configured host
    pub fn owns_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.hosts.iter().any(|owned| {
            host == *owned
                || host
                    .strip_suffix(owned.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

/// Capability set every publisher adapter provides
pub trait SiteAdapter: Send + Sync {
    /// Gets metadata about this source
    fn metadata(&self) -> &SourceMetadata;

    /// Whether article pages on `host` belong to this publisher
    fn matches(&self, host: &str) -> bool;

    /// Builds the search request for `query`
    fn build_search_request(&self, query: &SearchQuery) -> RequestSpec;

    /// Reads candidate article URLs out of a search response body
    fn extract_candidate_urls(&self, body: &str) -> std::result::Result<Vec<Url>, ExtractionError>;

    /// Reads title and raw publication time out of an article page
    fn extract_article_fields(&self, body: &str) -> std::result::Result<ArticleFields, ExtractionError>;

    /// chrono format strings for this publisher's absolute timestamps, tried in order
    fn published_formats(&self) -> &[&'static str] {
        &[]
    }

    /// Gets the source ID
    fn id(&self) -> &str {
        &self.metadata().id
    }

    /// Gets the source name
    fn name(&self) -> &str {
        &self.metadata().name
    }
}

/// Resolves hosts to adapters.
///
/// Dispatch is a first-match scan over registered adapters; a new publisher
/// is added with `register`, never by editing this type.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn SiteAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry for every enabled source in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();

        if config.is_enabled(kompas::SOURCE_ID) {
            let endpoint = SourceEndpoint::new(&config.kompas_search_url, kompas::HOSTS)?;
            registry.register(kompas::KompasAdapter::new(endpoint));
        }

        if config.is_enabled(tempo::SOURCE_ID) {
            let endpoint = SourceEndpoint::new(&config.tempo_search_url, tempo::HOSTS)?;
            let base_url = Url::parse(&config.tempo_base_url).map_err(|e| {
                IngestionError::InvalidInput(format!("invalid tempo_base_url: {e}"))
            })?;
            registry.register(tempo::TempoAdapter::new(
                endpoint,
                base_url,
                config.tempo_api_key.clone(),
            ));
        }

        if config.is_enabled(detik::SOURCE_ID) {
            let endpoint = SourceEndpoint::new(&config.detik_search_url, detik::HOSTS)?;
            registry.register(detik::DetikAdapter::new(endpoint));
        }

        info!(sources = ?registry.source_ids(), "Adapter registry initialized");
        Ok(registry)
    }

    pub fn register(&mut self, adapter: impl SiteAdapter + 'static) -> &mut Self {
        self.adapters.push(Arc::new(adapter));
        self
    }

    /// Adapter for `host`, or `None` when no publisher claims it
    pub fn resolve_host(&self, host: &str) -> Option<Arc<dyn SiteAdapter>> {
        let found = self.adapters.iter().find(|a| a.matches(host)).cloned();
        if found.is_none() {
            debug!(host = %host, "Unsupported source");
        }
        found
    }

    /// Adapter for the host of `url`, or `None` when unsupported
    pub fn resolve(&self, url: &Url) -> Option<Arc<dyn SiteAdapter>> {
        url.host_str().and_then(|host| self.resolve_host(host))
    }

    /// Adapter with id `source_id`
    pub fn get(&self, source_id: &str) -> Option<Arc<dyn SiteAdapter>> {
        self.adapters.iter().find(|a| a.id() == source_id).cloned()
    }

    pub fn adapters(&self) -> &[Arc<dyn SiteAdapter>] {
        &self.adapters
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Re-export adapter types
pub use detik::DetikAdapter;
pub use kompas::KompasAdapter;
pub use tempo::TempoAdapter;
