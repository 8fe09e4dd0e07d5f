use std::collections::HashSet;

use regex::Regex;
use tracing::{debug, info};
use url::Url;

use crate::fetcher::Fetcher;

const SITEMAP_PATH: &str = "sitemap.xml";

/// Document URLs listed in the site's `sitemap.xml`. A missing sitemap is no documents.
pub async fn fetch_document_urls(fetcher: &Fetcher, root: &Url, suffix: &str) -> Vec<String> {
    let Ok(sitemap_url) = root.join(SITEMAP_PATH) else {
        return Vec::new();
    };

    debug!("Fetching sitemap: {}", sitemap_url);
    let Some(page) = fetcher.fetch_page(sitemap_url.as_str()).await else {
        return Vec::new();
    };

    let urls = scan_document_urls(&page.body, suffix);
    if !urls.is_empty() {
        info!("Sitemap {} lists {} documents", sitemap_url, urls.len());
    }
    urls
}

/// Scan raw sitemap text for absolute URLs ending in `suffix`.
///
/// The body is never parsed as XML, so broken or non-XML sitemaps still yield links.
pub fn scan_document_urls(body: &str, suffix: &str) -> Vec<String> {
    let pattern = format!(r#"https?://[^\s"'<>]+{}"#, regex::escape(suffix));
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    re.find_iter(body)
        .map(|m| m.as_str().to_string())
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

// ── Tests ──
