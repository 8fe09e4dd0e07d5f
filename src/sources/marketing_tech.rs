use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, info, warn};
use url::Url;

use super::{attr, card_progress, text, ListingRecord};
use crate::fetcher::Fetcher;
use crate::parser::text::visible_text;

const LIST_URL: &str = "https://marketing-tech.ru/company_tags/btl/";
const SOURCE: &str = "marketingtech";
const TOP_N: usize = 20;
const MIN_REVENUE: u64 = 200_000_000;
const CARD_DELAY: Duration = Duration::from_millis(800);
const DEFAULT_TAG: &str = "BTL";
/// Query parameters stripped from agency website links.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_referrer",
    "yclid",
    "gclid",
    "fbclid",
    "ref",
];

static TABLE_ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.table-wrapper table tr").unwrap());
static RANK_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td:nth-of-type(2) a[href]").unwrap());

static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("header.company-header h1").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static DECORATION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".company-star, .company-age-medal").unwrap());
static WEBSITE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".company-basics__table a.company-website-button").unwrap());
static REVENUE: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".company-flow div").unwrap());
static ABOUT_ROW: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".basic-information-table__column_about .table-row").unwrap()
});
static COL_1: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".table-row__col_1").unwrap());
static COL_2: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".table-row__col_2").unwrap());
static SPECIALS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".basic-information-table__column_specials a").unwrap());
static SERVICES: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".basic-information-table__column_services a").unwrap());
static TAGS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("figure.company-tags a.btn").unwrap());
static PHONE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".company-basics__table a.full").unwrap());
static BASICS_ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".company-basics__table .table-row").unwrap());
static TH: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".th").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".td").unwrap());
static ABOUT: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".about-company p").unwrap());

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\d.,]+").unwrap());
static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

pub async fn scrape(fetcher: &Fetcher) -> Result<Vec<ListingRecord>> {
    let page = fetcher
        .fetch_page(LIST_URL)
        .await
        .with_context(|| format!("Listing page unavailable: {}", LIST_URL))?;
    let base = Url::parse(LIST_URL)?;
    let links = top_links(&page.body, &base);
    if links.is_empty() {
        warn!("{}: ranking table not found", SOURCE);
    }
    info!("{}: {} company links", SOURCE, links.len());

    let pb = card_progress(links.len())?;
    let mut records = Vec::new();
    for link in &links {
        pb.set_message(link.clone());
        match fetcher.fetch_page(link).await {
            Some(card) => {
                let record = parse_card(&card.body, link);
                if !record.name.is_empty() {
                    records.push(record);
                }
            }
            None => debug!("Card unavailable: {}", link),
        }
        pb.inc(1);
        tokio::time::sleep(CARD_DELAY).await;
    }
    pb.finish_and_clear();

    let kept = keep_large(records);
    info!("{}: {} agencies with revenue ≥ {}", SOURCE, kept.len(), MIN_REVENUE);
    Ok(kept)
}

/// Company card links from the ranking table, header row skipped, at most 20.
pub fn top_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&TABLE_ROW)
        .skip(1)
        .filter_map(|tr| tr.select(&RANK_LINK).next())
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .map(|u| u.to_string())
        .take(TOP_N)
        .collect()
}

pub fn parse_card(html: &str, url: &str) -> ListingRecord {
    let document = Html::parse_document(html);

    let name = match document.select(&H1).next() {
        Some(h1) => match h1.select(&ANCHOR).next() {
            Some(a) => visible_text(a, " "),
            None => text_without(h1, &DECORATION),
        },
        None => String::new(),
    };

    let site = clean_site_url(&attr(document.select(&WEBSITE).next(), "href"));
    let revenue = normalize_revenue(&text(document.select(&REVENUE).next()))
        .map(|r| r.to_string())
        .unwrap_or_default();

    let mut city = String::new();
    let mut founded = String::new();
    let mut staff = String::new();
    for row in document.select(&ABOUT_ROW) {
        let left = text(row.select(&COL_1).next());
        let right = text(row.select(&COL_2).next());
        if left.contains("Город") {
            city = right;
        } else if left.contains("Основана") {
            founded = right;
        } else if left.contains("Штат") {
            staff = first_integer(&right);
        }
    }

    let specializations: Vec<String> = document.select(&SPECIALS).map(|a| visible_text(a, " ")).collect();
    let services: Vec<String> = document.select(&SERVICES).map(|a| visible_text(a, " ")).collect();
    let tags: Vec<String> = document.select(&TAGS).map(|a| visible_text(a, " ")).collect();

    let address = document
        .select(&BASICS_ROW)
        .filter(|row| text(row.select(&TH).next()).contains("Адрес"))
        .map(|row| text(row.select(&TD).next()))
        .last()
        .unwrap_or_default();

    ListingRecord {
        name,
        revenue,
        segment_tag: if tags.is_empty() {
            DEFAULT_TAG.to_string()
        } else {
            tags.join(";")
        },
        source: SOURCE.to_string(),
        rating_ref: url.to_string(),
        employees: staff,
        site,
        description: text(document.select(&ABOUT).next()),
        region: city,
        contacts: text(document.select(&PHONE).next()),
        founded,
        specializations: specializations.join(";"),
        services: services.join(";"),
        address,
        ..Default::default()
    }
}

/// Only agencies with a parsed revenue of at least 200 mln.
pub fn keep_large(records: Vec<ListingRecord>) -> Vec<ListingRecord> {
    records
        .into_iter()
        .filter(|r| r.revenue.parse::<u64>().is_ok_and(|v| v >= MIN_REVENUE))
        .collect()
}

/// "1,2 млрд ₽" → 1_200_000_000, "350 млн" → 350_000_000, else the bare digits.
pub fn normalize_revenue(raw: &str) -> Option<u64> {
    let compact: String = raw.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
    let first = NUMBER
        .find(&compact)
        .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok());

    let scale = if compact.contains("млрд") {
        Some(1_000_000_000.0)
    } else if compact.contains("млн") {
        Some(1_000_000.0)
    } else {
        None
    };

    match (scale, first) {
        (Some(scale), Some(value)) => Some((value * scale).round() as u64),
        _ => {
            let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        }
    }
}

/// Drop marketing-tech self links and tracking parameters.
pub fn clean_site_url(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    if url.host_str().is_some_and(|h| h.ends_with("marketing-tech.ru")) {
        return String::new();
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.set_query(None);
    if !kept.is_empty() {
        url.query_pairs_mut().extend_pairs(kept);
    }
    url.set_fragment(None);
    url.to_string()
}

fn first_integer(raw: &str) -> String {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    INTEGER
        .find(&compact)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Visible text of `el`, leaving out anything inside elements matching `skip`.
fn text_without(el: ElementRef<'_>, skip: &Selector) -> String {
    let mut parts = Vec::new();
    for node in el.descendants() {
        let Node::Text(t) = node.value() else {
            continue;
        };
        let decorated = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| skip.matches(&a));
        let t = t.trim();
        if !decorated && !t.is_empty() {
            parts.push(t);
        }
    }
    parts.join(" ")
}

// ── Tests ──
