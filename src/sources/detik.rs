//! Detik adapter
//!
//! Scrapes the rendered search page; article metadata comes from meta tags.

use chrono::Days;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::Url;

use super::extract::{anchor_urls, meta_content};
use super::{SiteAdapter, SourceEndpoint, SourceMetadata};
use crate::error::ExtractionError;
use crate::schemas::{ArticleFields, RequestSpec, SearchQuery};

pub const SOURCE_ID: &str = "detik";
pub const HOSTS: &[&str] = &["detik.com"];

static RESULT_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".list-content article a[href]").expect("valid selector"));
static OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).expect("valid selector"));
static PUBLISH_DATE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="publishdate"]"#).expect("valid selector"));

pub struct DetikAdapter {
    endpoint: SourceEndpoint,
    metadata: SourceMetadata,
}

impl DetikAdapter {
    pub fn new(endpoint: SourceEndpoint) -> Self {
        Self {
            endpoint,
            metadata: SourceMetadata {
                id: SOURCE_ID.to_string(),
                name: "detikcom".to_string(),
                description: "detik.com news network".to_string(),
            },
        }
    }
}

impl SiteAdapter for DetikAdapter {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn matches(&self, host: &str) -> bool {
        self.endpoint.owns_host(host)
    }

    fn build_search_request(&self, query: &SearchQuery) -> RequestSpec {
        // todatex is inclusive on detik
        let to = query
            .until
            .checked_sub_days(Days::new(1))
            .unwrap_or(query.until)
            .max(query.since);

        RequestSpec::get(self.endpoint.search_url.clone())
            .query("query", query.terms.as_str())
            .query("sortby", "time")
            .query("fromdatex", query.since.format("%d/%m/%Y").to_string())
            .query("todatex", to.format("%d/%m/%Y").to_string())
            .query("page", "1")
    }

    fn extract_candidate_urls(&self, body: &str) -> Result<Vec<Url>, ExtractionError> {
        let document = Html::parse_document(body);
        let mut urls = anchor_urls(&document, &RESULT_LINK, &self.endpoint.search_url);
        // Each result card links its thumbnail and its headline to the same page
        urls.dedup();
        Ok(urls)
    }

    fn extract_article_fields(&self, body: &str) -> Result<ArticleFields, ExtractionError> {
        let document = Html::parse_document(body);

        let title = meta_content(&document, &OG_TITLE).ok_or(ExtractionError::MissingField("title"))?;
        let published_raw = meta_content(&document, &PUBLISH_DATE)
            .ok_or(ExtractionError::MissingField("published"))?;

        Ok(ArticleFields {
            title,
            published_raw,
        })
    }

    fn published_formats(&self) -> &[&'static str] {
        &["%Y/%m/%d %H:%M:%S"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn adapter() -> DetikAdapter {
        DetikAdapter::new(SourceEndpoint::new("https://www.detik.com/search/searchall", HOSTS).unwrap())
    }

    #[test]
    fn test_search_window_is_inclusive() {
        let query = SearchQuery::new(
            "purbaya",
            NaiveDate::from_ymd_opt(2025, 10, 16).unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 17).unwrap(),
        );
        let spec = adapter().build_search_request(&query);

        assert_eq!(spec.query_value("query"), Some("purbaya"));
        assert_eq!(spec.query_value("fromdatex"), Some("16/10/2025"));
        assert_eq!(spec.query_value("todatex"), Some("17/10/2025"));
    }

    #[test]
    fn test_candidate_urls() {
        let body = r#"<div class="list-content">
            <article><a href="https://news.detik.com/berita/d-8160001/satu"><img></a>
                     <a href="https://news.detik.com/berita/d-8160001/satu">Satu</a></article>
            <article><a href="https://finance.detik.com/berita-ekonomi-bisnis/d-8160002/dua">Dua</a></article>
        </div>
        <div class="sidebar"><article><a href="https://www.detik.com/promo">promo</a></article></div>"#;

        let urls = adapter().extract_candidate_urls(body).unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[1].host_str(), Some("finance.detik.com"));
    }

    #[test]
    fn test_article_fields_from_meta() {
        let body = r#"<html><head>
            <meta property="og:title" content="Purbaya Bicara APBN">
            <meta name="publishdate" content="2025/10/17 09:00:00">
            </head></html>"#;

        let fields = adapter().extract_article_fields(body).unwrap();
        assert_eq!(fields.title, "Purbaya Bicara APBN");
        assert_eq!(fields.published_raw, "2025/10/17 09:00:00");
    }

    #[test]
    fn test_missing_publish_date() {
        let body = r#"<meta property="og:title" content="Tanpa Tanggal">"#;
        assert!(matches!(
            adapter().extract_article_fields(body),
            Err(ExtractionError::MissingField("published"))
        ));
    }
}
