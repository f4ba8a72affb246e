//! Tempo adapter
//!
//! Tempo exposes an authenticated JSON search API. Hits carry site-relative
//! URLs, resolved here against the public base URL. Article pages embed
//! schema.org structured data with `headline` and an ISO-8601 `datePublished`.

use scraper::Html;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use url::Url;

use super::extract::json_ld_article;
use super::{SiteAdapter, SourceEndpoint, SourceMetadata};
use crate::error::ExtractionError;
use crate::schemas::{ArticleFields, RequestSpec, SearchQuery};

pub const SOURCE_ID: &str = "tempo";
pub const HOSTS: &[&str] = &["tempo.co"];

const PAGE_SIZE: u32 = 50;

/// Search API response structures
#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: SearchData,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    canonical_url: Option<String>,
}

pub struct TempoAdapter {
    endpoint: SourceEndpoint,
    base_url: Url,
    api_key: Option<String>,
    metadata: SourceMetadata,
}

impl TempoAdapter {
    pub fn new(endpoint: SourceEndpoint, base_url: Url, api_key: Option<String>) -> Self {
        Self {
            endpoint,
            base_url,
            api_key,
            metadata: SourceMetadata {
                id: SOURCE_ID.to_string(),
                name: "Tempo".to_string(),
                description: "Tempo.co news and investigative magazine".to_string(),
            },
        }
    }
}

impl SiteAdapter for TempoAdapter {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn matches(&self, host: &str) -> bool {
        self.endpoint.owns_host(host)
    }

    fn build_search_request(&self, query: &SearchQuery) -> RequestSpec {
        let body = json!({
            "query": query.terms,
            "published_from": query.since.format("%Y-%m-%d").to_string(),
            "published_to": query.until.format("%Y-%m-%d").to_string(),
            "page": 1,
            "page_size": PAGE_SIZE,
        });

        let spec = RequestSpec::post_json(self.endpoint.search_url.clone(), body);
        match self.api_key {
            Some(ref key) => spec.header("authorization", format!("Bearer {key}")),
            None => spec,
        }
    }

    fn extract_candidate_urls(&self, body: &str) -> Result<Vec<Url>, ExtractionError> {
        let response: SearchResponse = serde_json::from_str(body)?;

        Ok(response
            .data
            .hits
            .into_iter()
            .filter_map(|hit| hit.canonical_url)
            .filter_map(|path| match self.base_url.join(&path) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(source = SOURCE_ID, url = %path, error = %e, "Skipping search hit with invalid URL");
                    None
                }
            })
            .collect())
    }

    fn extract_article_fields(&self, body: &str) -> Result<ArticleFields, ExtractionError> {
        let document = Html::parse_document(body);
        let (title, published_raw) =
            json_ld_article(&document).ok_or(ExtractionError::MissingField("headline"))?;

        Ok(ArticleFields {
            title,
            published_raw,
        })
    }

    fn published_formats(&self) -> &[&'static str] {
        // `%#z` also takes the `Z` designator
        &["%Y-%m-%dT%H:%M:%S%.f%#z"]
    }
}
