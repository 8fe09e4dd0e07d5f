use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Anchors on the page that point at documents ending in `suffix`.
///
/// Relative hrefs are resolved against the site root. Output is deduplicated
/// in document order.
pub fn document_links(html: &str, root: &Url, suffix: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let suffix = suffix.to_lowercase();
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for a in document.select(&ANCHOR) {
        let href = a.value().attr("href").unwrap_or("").trim();
        if href.is_empty() || !href.to_lowercase().ends_with(&suffix) {
            continue;
        }
        let absolute = match Url::parse(href) {
            Ok(u) => u.to_string(),
            Err(_) => match root.join(href) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            },
        };
        if seen.insert(absolute.clone()) {
            links.push(absolute);
        }
    }

    links
}

/// Append `extra` to `links`, skipping anything already present.
pub fn extend_unique(links: &mut Vec<String>, extra: Vec<String>) {
    let mut seen: HashSet<String> = links.iter().cloned().collect();
    for link in extra {
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }
}

// ── Tests ──
