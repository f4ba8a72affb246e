//! Shared HTML and JSON-LD extraction helpers for adapters

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

static JSON_LD: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector"));

/// Collapses runs of whitespace into single spaces and trims the ends
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of the first element matching `selector` that has any
pub fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .find(|text| !text.is_empty())
}

/// `content` attribute of the first matching `<meta>` element
pub fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .filter_map(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .find(|content| !content.is_empty())
}

/// Resolves the `href` of every matching anchor against `base`.
///
/// Fragment-only links, `javascript:`/`mailto:` links and anything that does
/// not resolve to http(s) are skipped. Order follows the document.
pub fn anchor_urls(document: &Html, selector: &Selector, base: &Url) -> Vec<Url> {
    document
        .select(selector)
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty() && !href.starts_with('#'))
        .filter_map(|href| base.join(href).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .collect()
}

/// Headline and publication date from the page's structured data.
///
/// Every `application/ld+json` block is parsed as a generic document; plain
/// objects, arrays of objects and `@graph` containers are searched for the
/// first node carrying both `headline` and `datePublished`.
pub fn json_ld_article(document: &Html) -> Option<(String, String)> {
    document
        .select(&JSON_LD)
        .filter_map(|script| serde_json::from_str::<Value>(&script.text().collect::<String>()).ok())
        .find_map(|doc| find_article_node(&doc))
}

fn find_article_node(value: &Value) -> Option<(String, String)> {
    match value {
        Value::Array(items) => items.iter().find_map(find_article_node),
        Value::Object(map) => {
            let headline = map.get("headline").and_then(Value::as_str);
            let published = map.get("datePublished").and_then(Value::as_str);
            match (headline, published) {
                (Some(h), Some(p)) if !h.trim().is_empty() && !p.trim().is_empty() => {
                    Some((collapse_whitespace(h), p.trim().to_string()))
                }
                _ => map.get("@graph").and_then(find_article_node),
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_urls_resolve_and_filter() {
        let html = Html::parse_document(
            r##"<div>
                <a class="hit" href="/read/1">one</a>
                <a class="hit" href="https://other.example/read/2">two</a>
                <a class="hit" href="#top">skip</a>
                <a class="hit" href="javascript:void(0)">skip</a>
                <a class="hit">no href</a>
            </div>"##,
        );
        let selector = Selector::parse("a.hit").unwrap();
        let base = Url::parse("https://news.example/search?q=x").unwrap();

        let urls: Vec<String> = anchor_urls(&html, &selector, &base)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            urls,
            vec!["https://news.example/read/1", "https://other.example/read/2"]
        );
    }

    #[test]
    fn test_json_ld_graph() {
        let html = Html::parse_document(
            r#"<html><head>
            <script type="application/ld+json">{"@type": "BreadcrumbList"}</script>
            <script type="application/ld+json">
              {"@context": "https://schema.org", "@graph": [
                {"@type": "WebPage", "name": "x"},
                {"@type": "NewsArticle", "headline": "  Harga  Beras Naik ", "datePublished": "2025-10-17T09:00:00+07:00"}
              ]}
            </script></head></html>"#,
        );

        let (headline, published) = json_ld_article(&html).unwrap();
        assert_eq!(headline, "Harga Beras Naik");
        assert_eq!(published, "2025-10-17T09:00:00+07:00");
    }

    #[test]
    fn test_json_ld_missing() {
        let html = Html::parse_document(
            r#"<script type="application/ld+json">not json</script>
               <script type="application/ld+json">[{"headline": "no date"}]</script>"#,
        );
        assert!(json_ld_article(&html).is_none());
    }

    #[test]
    fn test_first_text_and_meta() {
        let html = Html::parse_document(
            r#"<head><title>
                Judul   Berita
            </title><meta property="og:title" content=" OG Judul "></head>"#,
        );
        let title = Selector::parse("title").unwrap();
        let og = Selector::parse(r#"meta[property="og:title"]"#).unwrap();
        assert_eq!(first_text(&html, &title).as_deref(), Some("Judul Berita"));
        assert_eq!(meta_content(&html, &og).as_deref(), Some("OG Judul"));
    }
}
