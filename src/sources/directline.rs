use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use percent_encoding::percent_decode_str;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use super::{attr, card_progress, text, ListingRecord};
use crate::fetcher::Fetcher;
use crate::parser::text::visible_text;

const LIST_URL: &str = "https://www.directline.pro/blog/pr-agentstva/";
const BASE: &str = "https://www.directline.pro";
const SOURCE: &str = "directline.pro";
const ITEM_DELAY: Duration = Duration::from_millis(200);
/// Hosts that only redirect to the agency's real site.
const TRACKER_HOSTS: &[&str] = &["directline.pro", "dlrecommend.ru"];

static ITEM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.blog-table-item").unwrap());
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.blog-table-item__title a").unwrap());
static ATTRS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.blog-table-item__text").unwrap());
static BUTTON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.blog-table-item__button[href]").unwrap());
static BULLET: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.blog-table-item__list li").unwrap());
static LOGO: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.blog-table-item__logo img").unwrap());
static EXTERNAL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href^="http"]"#).unwrap());

static CITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Город:\s*[\n\r]+([^\n\r]+)").unwrap());
static FOUNDED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Год основания компании:\s*[\n\r]+([^\n\r]+)").unwrap());
static RURL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"rurl=([^\s"&]+)"#).unwrap());

/// One rating entry; `button` is the raw "go to site" href, resolved later.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Item {
    pub name: String,
    pub region: String,
    pub founded: String,
    pub tags: Vec<String>,
    pub button: String,
    pub img_src: String,
    pub img_alt: String,
}

impl Item {
    fn into_record(self, site: String, base: &Url) -> ListingRecord {
        let rating_ref = if self.button.starts_with('/') {
            base.join(&self.button)
                .map(|u| u.to_string())
                .unwrap_or_default()
        } else {
            self.button.clone()
        };
        ListingRecord {
            name: self.name,
            region: self.region,
            site,
            founded: self.founded,
            segment_tag: self.tags.join(";"),
            description: self.tags.join(" "),
            rating_ref,
            source: SOURCE.to_string(),
            img_src: self.img_src,
            img_alt: self.img_alt,
            ..Default::default()
        }
    }
}

pub async fn scrape(fetcher: &Fetcher) -> Result<Vec<ListingRecord>> {
    let page = fetcher
        .fetch_page(LIST_URL)
        .await
        .with_context(|| format!("Listing page unavailable: {}", LIST_URL))?;
    let base = Url::parse(BASE)?;
    let items = parse_items(&page.body);
    info!("{}: {} agencies listed", SOURCE, items.len());

    let pb = card_progress(items.len())?;
    let mut records = Vec::with_capacity(items.len());
    for item in items {
        pb.set_message(item.name.clone());
        let site = if item.button.is_empty() {
            String::new()
        } else {
            resolve_site(fetcher, &base, &item.button).await
        };
        records.push(item.into_record(site, &base));
        pb.inc(1);
        tokio::time::sleep(ITEM_DELAY).await;
    }
    pb.finish_and_clear();
    Ok(records)
}

pub fn parse_items(html: &str) -> Vec<Item> {
    let document = Html::parse_document(html);
    document
        .select(&ITEM)
        .map(|item| {
            let mut region = String::new();
            let mut founded = String::new();
            for block in item.select(&ATTRS) {
                let raw = visible_text(block, "\n");
                if let Some(city) = after_label(&CITY, &raw) {
                    region = city;
                }
                if let Some(year) = after_label(&FOUNDED, &raw) {
                    founded = year;
                }
            }

            let logo = item.select(&LOGO).next();
            let img_src = Some(attr(logo, "data-lazy-src"))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| attr(logo, "src"));

            Item {
                name: text(item.select(&TITLE).next()),
                region,
                founded,
                tags: item.select(&BULLET).map(|li| visible_text(li, " ")).collect(),
                button: attr(item.select(&BUTTON).next(), "href"),
                img_src,
                img_alt: attr(logo, "alt"),
            }
        })
        .collect()
}

fn after_label(label: &Regex, raw: &str) -> Option<String> {
    label
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
}

/// The agency's own site behind a rating button, as `scheme://host/`. Empty when unresolvable.
async fn resolve_site(fetcher: &Fetcher, base: &Url, href: &str) -> String {
    let Ok(target) = base.join(href) else {
        return String::new();
    };
    if target.host_str().is_some_and(|h| !is_tracker(h)) {
        return normalize_site(target.as_str());
    }

    debug!("Following redirect for {}", target);
    match fetcher.fetch_page(target.as_str()).await {
        Some(page) => site_behind_redirect(&page.url, &page.body),
        None => String::new(),
    }
}

/// Read the real site off a tracker landing: `rurl` query, a `rurl=` in the
/// body, the first external anchor, or the landing URL itself if external.
pub fn site_behind_redirect(final_url: &str, body: &str) -> String {
    let landing = Url::parse(final_url).ok();

    if let Some(url) = landing.as_ref().filter(|u| u.host_str().is_some_and(is_tracker)) {
        let rurl = url
            .query_pairs()
            .find(|(k, _)| k == "rurl")
            .map(|(_, v)| v.into_owned());
        if let Some(rurl) = rurl.filter(|r| r.starts_with("http")) {
            return normalize_site(&rurl);
        }
    }

    if let Some(m) = RURL.captures(body).and_then(|c| c.get(1)) {
        let candidate = m.as_str().replace("&amp;", "&");
        let candidate = percent_decode_str(&candidate).decode_utf8_lossy().into_owned();
        if candidate.starts_with("http") {
            return normalize_site(&candidate);
        }
    }

    let document = Html::parse_document(body);
    for a in document.select(&EXTERNAL) {
        let href = a.value().attr("href").unwrap_or("");
        let external = Url::parse(href)
            .ok()
            .and_then(|u| u.host_str().map(|h| !is_tracker(h)))
            .unwrap_or(false);
        if external {
            return normalize_site(href);
        }
    }

    match landing {
        Some(url) if url.host_str().is_some_and(|h| !is_tracker(h)) => normalize_site(url.as_str()),
        _ => String::new(),
    }
}

fn is_tracker(host: &str) -> bool {
    let host = host.to_lowercase();
    TRACKER_HOSTS.iter().any(|t| host.contains(t))
}

/// Keep only `scheme://host[:port]/`.
pub fn normalize_site(url: &str) -> String {
    match Url::parse(url) {
        Ok(u) if u.has_host() => format!("{}/", u.origin().ascii_serialization()),
        _ => String::new(),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = include_str!("../../tests/fixtures/directline_list.html");

    #[test]
    fn parses_rating_items() {
        let items = parse_items(LIST);
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.name, "PR Партнёр");
        assert_eq!(first.region, "Москва");
        assert_eq!(first.founded, "2012");
        assert_eq!(first.tags, vec!["Медиарилейшнз", "Кризисные коммуникации"]);
        assert_eq!(first.button, "/recommend/pr-partner/");
        assert_eq!(first.img_src, "https://www.directline.pro/img/pr-partner.png");
        assert_eq!(first.img_alt, "PR Партнёр");

        assert_eq!(items[1].button, "https://agency-two.ru/ru/?utm_source=dl");
        assert_eq!(items[1].region, "Новосибирск");
    }

    #[test]
    fn record_from_item() {
        let base = Url::parse(BASE).unwrap();
        let item = parse_items(LIST).remove(0);
        let rec = item.into_record("https://prpartner.ru/".into(), &base);
        assert_eq!(rec.rating_ref, "https://www.directline.pro/recommend/pr-partner/");
        assert_eq!(rec.segment_tag, "Медиарилейшнз;Кризисные коммуникации");
        assert_eq!(rec.description, "Медиарилейшнз Кризисные коммуникации");
        assert_eq!(rec.source, "directline.pro");
        assert_eq!(rec.site, "https://prpartner.ru/");
    }

    #[test]
    fn normalizes_to_root() {
        assert_eq!(normalize_site("https://agency.ru/ru/?utm_source=x#a"), "https://agency.ru/");
        assert_eq!(normalize_site("http://agency.ru:8080/x"), "http://agency.ru:8080/");
        assert_eq!(normalize_site("/relative"), "");
    }

    #[test]
    fn site_from_rurl_query() {
        let site = site_behind_redirect(
            "https://dlrecommend.ru/go?id=5&rurl=https%3A%2F%2Fagency.ru%2Fpromo%3Fa%3D1",
            "",
        );
        assert_eq!(site, "https://agency.ru/");
    }

    #[test]
    fn site_from_rurl_in_body() {
        let body = r#"<script>location = "/go?rurl=https%3A%2F%2Fbody-agency.ru%2F&amp;x=1";</script>"#;
        assert_eq!(
            site_behind_redirect("https://www.directline.pro/lander/5/", body),
            "https://body-agency.ru/"
        );
    }

    #[test]
    fn site_from_external_anchor_or_landing() {
        let body = r#"<a href="https://www.directline.pro/blog/">блог</a>
            <a href="https://anchor-agency.ru/about">сайт</a>"#;
        assert_eq!(
            site_behind_redirect("https://www.directline.pro/lander/5/", body),
            "https://anchor-agency.ru/"
        );
        assert_eq!(
            site_behind_redirect("https://landed.ru/welcome", "<p>нет ссылок</p>"),
            "https://landed.ru/"
        );
        assert_eq!(site_behind_redirect("https://www.directline.pro/lander/5/", ""), "");
    }
}
