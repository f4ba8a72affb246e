//! Article records at each stage of a run

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::{Deserialize, Serialize};
use url::Url;

/// An article URL found on a search response, tagged with the source that
/// surfaced it. Lives only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateUrl {
    pub source: String,
    pub url: Url,
}

/// Fields an adapter pulls out of an article page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleFields {
    pub title: String,
    pub published_raw: String,
}

/// An extracted article whose publication time is still the source's own text.
///
/// Serializes as a staging row: `source, title, url, published_at, scraped_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    pub source: String,
    pub title: String,
    pub url: String,
    #[serde(rename = "published_at")]
    pub published_raw: String,
    pub scraped_at: DateTime<FixedOffset>,
}

/// Terminal, persisted form of an article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedArticle {
    pub source: String,
    pub title: String,
    pub url: String,
    pub published_at: DateTime<FixedOffset>,
    pub scraped_at: DateTime<FixedOffset>,
}

impl NormalizedArticle {
    pub fn from_raw(raw: RawArticle, published_at: DateTime<FixedOffset>) -> Self {
        Self {
            source: raw.source,
            title: raw.title,
            url: raw.url,
            published_at,
            scraped_at: raw.scraped_at,
        }
    }
}

/// Canonical text form of an instant, e.g. `2025-10-17T09:00:00+07:00`.
pub fn canonical(instant: &DateTime<FixedOffset>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_article_uses_staging_column_names() {
        let raw = RawArticle {
            source: "kompas".into(),
            title: "Judul".into(),
            url: "https://nasional.kompas.com/read/1".into(),
            published_raw: "2 jam".into(),
            scraped_at: DateTime::parse_from_rfc3339("2025-10-17T10:00:00+07:00").unwrap(),
        };

        let row = serde_json::to_value(&raw).unwrap();
        assert_eq!(row["published_at"], "2 jam");
        assert_eq!(row["scraped_at"], "2025-10-17T10:00:00+07:00");
        assert!(row.get("published_raw").is_none());
    }

    #[test]
    fn canonical_drops_subseconds() {
        let instant = DateTime::parse_from_rfc3339("2025-10-17T08:00:00.750+07:00").unwrap();
        assert_eq!(canonical(&instant), "2025-10-17T08:00:00+07:00");
    }
}
