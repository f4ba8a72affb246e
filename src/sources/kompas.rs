//! Kompas adapter
//!
//! Searches through the rendered results page at search.kompas.com and
//! scrapes article anchors. Article pages carry the publication time as text,
//! e.g. `Kompas.com - 17/10/2025, 09:00 WIB`, or a relative `2 jam` on fresh
//! stories.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::Url;

use super::extract::{anchor_urls, first_text};
use super::{SiteAdapter, SourceEndpoint, SourceMetadata};
use crate::error::ExtractionError;
use crate::schemas::{ArticleFields, RequestSpec, SearchQuery};

pub const SOURCE_ID: &str = "kompas";
pub const HOSTS: &[&str] = &["kompas.com"];

static ARTICLE_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.article-link[href]").expect("valid selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid selector"));
static READ_TIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.read__time").expect("valid selector"));
static VIDEO_DATE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.videoKG-date").expect("valid selector"));

pub struct KompasAdapter {
    endpoint: SourceEndpoint,
    metadata: SourceMetadata,
}

impl KompasAdapter {
    pub fn new(endpoint: SourceEndpoint) -> Self {
        Self {
            endpoint,
            metadata: SourceMetadata {
                id: SOURCE_ID.to_string(),
                name: "Kompas".to_string(),
                description: "Kompas.com national news portal".to_string(),
            },
        }
    }
}

impl SiteAdapter for KompasAdapter {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn matches(&self, host: &str) -> bool {
        self.endpoint.owns_host(host)
    }

    fn build_search_request(&self, query: &SearchQuery) -> RequestSpec {
        RequestSpec::get(self.endpoint.search_url.clone())
            .query("q", query.terms.as_str())
            .query("site_id", "all")
            .query("last_date", query.since.format("%Y-%m-%d").to_string())
            .query("sort", "latest")
    }

    fn extract_candidate_urls(&self, body: &str) -> Result<Vec<Url>, ExtractionError> {
        let document = Html::parse_document(body);
        Ok(anchor_urls(&document, &ARTICLE_LINK, &self.endpoint.search_url))
    }

    fn extract_article_fields(&self, body: &str) -> Result<ArticleFields, ExtractionError> {
        let document = Html::parse_document(body);

        let title = first_text(&document, &TITLE).ok_or(ExtractionError::MissingField("title"))?;
        // Video pages use a different container for the same text
        let published_raw = first_text(&document, &READ_TIME)
            .or_else(|| first_text(&document, &VIDEO_DATE))
            .ok_or(ExtractionError::MissingField("published"))?;

        Ok(ArticleFields {
            title,
            published_raw,
        })
    }

    fn published_formats(&self) -> &[&'static str] {
        &["Kompas.com - %d/%m/%Y, %H:%M WIB", "- %d/%m/%Y, %H:%M WIB"]
    }
}
