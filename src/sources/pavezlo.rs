use std::sync::LazyLock;

use anyhow::{Context, Result};
use scraper::{ElementRef, Html, Selector};
use tracing::info;

use super::ListingRecord;
use crate::fetcher::Fetcher;
use crate::parser::text::visible_text;

const URL: &str =
    "https://pavezlo.ru/rejtingi/rejting-marketingovyh-agentstv-2025-70-luchshih-agentstv-marketinga/";
const SOURCE: &str = "pavezlo.ru";

static HEADING: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h3.wp-block-heading").unwrap());
static LIST: LazyLock<Selector> = LazyLock::new(|| Selector::parse("ol").unwrap());
static ENTRY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li a[href]").unwrap());

pub async fn scrape(fetcher: &Fetcher) -> Result<Vec<ListingRecord>> {
    let page = fetcher
        .fetch_page(URL)
        .await
        .with_context(|| format!("Listing page unavailable: {}", URL))?;
    let records = parse(&page.body);
    info!("{}: {} agencies listed", SOURCE, records.len());
    Ok(records)
}

/// Every `h3` rating section and the first `ol` after it; one record per linked entry.
pub fn parse(html: &str) -> Vec<ListingRecord> {
    let document = Html::parse_document(html);
    let mut records = Vec::new();
    let mut region: Option<String> = None;

    for el in document.root_element().descendants().filter_map(ElementRef::wrap) {
        if HEADING.matches(&el) {
            region = Some(region_from_heading(&visible_text(el, " ")));
            continue;
        }
        if !LIST.matches(&el) {
            continue;
        }
        let Some(section_region) = region.take() else {
            continue;
        };
        for a in el.select(&ENTRY) {
            let site = a.value().attr("href").unwrap_or("").trim().to_string();
            records.push(ListingRecord {
                name: visible_text(a, " "),
                region: section_region.clone(),
                rating_ref: site.clone(),
                site,
                source: SOURCE.to_string(),
                ..Default::default()
            });
        }
    }

    records
}

fn region_from_heading(heading: &str) -> String {
    let upper = heading.to_uppercase();
    if upper.contains("СПБ") {
        "Санкт-Петербург".to_string()
    } else if upper.contains("МОСКВ") {
        "Москва".to_string()
    } else {
        String::new()
    }
}

// ── Tests ──
