use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, info};
use url::Url;

use super::{attr, card_progress, text, ListingRecord};
use crate::fetcher::Fetcher;
use crate::parser::text::visible_text;

const LIST_URL: &str = "https://www.alladvertising.ru/top/btl/";
const BASE_ORIGIN: &str = "https://www.alladvertising.ru";
const SOURCE: &str = "alladvertising";
const CARD_DELAY: Duration = Duration::from_millis(500);

static TOP_ITEM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div#s20 li.rate20").unwrap());
static ITEM_LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2 a[href]").unwrap());
static H2: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2").unwrap());
static SMALL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("small").unwrap());
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static SPONSOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div#sponsor").unwrap());
static SPONSOR_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.company h2 a[href]").unwrap());

static CARD_NAME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.h1_700b").unwrap());
static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static CARD_CITY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.h1_300").unwrap());
static SITE_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.sitem a[href^='http']").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static TEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(r#"a[href^="tel:"]"#).unwrap());
static ADDRESS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span#toggle").unwrap());
static PREVIEW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.text span.preview").unwrap());
static REVIEW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.review").unwrap());
static TAG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.tagblock a.newtag").unwrap());

static SITE_LABEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)сайт").unwrap());
static ADDRESS_LABEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)адрес").unwrap());
static LOOSE_PHONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\+?\d[\d\s().-]+").unwrap());
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());
static FOUNDED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)основан[оая]?.{0,20}?(\d{4})").unwrap());

/// What the rating list shows for an agency before its card is opened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preview {
    pub link: String,
    pub name: String,
    pub region: String,
    pub description: String,
    pub img_src: String,
    pub img_alt: String,
}

pub async fn scrape(fetcher: &Fetcher) -> Result<Vec<ListingRecord>> {
    let page = fetcher
        .fetch_page(LIST_URL)
        .await
        .with_context(|| format!("Listing page unavailable: {}", LIST_URL))?;
    let base = Url::parse(BASE_ORIGIN)?;
    let previews = parse_top_list(&page.body, &base);
    info!("{}: {} agencies listed", SOURCE, previews.len());

    let pb = card_progress(previews.len())?;
    let mut records = Vec::new();
    for preview in &previews {
        pb.set_message(preview.name.clone());
        match fetcher.fetch_page(&preview.link).await {
            Some(card) => records.push(parse_card(&card.body, &preview.link, preview)),
            None => debug!("Card unavailable: {}", preview.link),
        }
        pb.inc(1);
        tokio::time::sleep(CARD_DELAY).await;
    }
    pb.finish_and_clear();
    Ok(records)
}

/// Top-20 entries plus the sponsor block, in page order.
pub fn parse_top_list(html: &str, base: &Url) -> Vec<Preview> {
    let document = Html::parse_document(html);
    let mut previews = Vec::new();

    for li in document.select(&TOP_ITEM) {
        let Some(a) = li.select(&ITEM_LINK).next() else {
            continue;
        };
        let img = li.select(&IMG).next();
        previews.push(Preview {
            link: join(base, a.value().attr("href").unwrap_or("")),
            name: visible_text(a, " "),
            region: city_from_heading(li.select(&H2).next(), a),
            description: text(li.select(&SMALL).next()),
            img_src: img
                .and_then(|i| i.value().attr("src"))
                .map(|src| join(base, src))
                .unwrap_or_default(),
            img_alt: attr(img, "alt"),
        });
    }

    if let Some(sponsor) = document.select(&SPONSOR).next() {
        if let Some(a) = sponsor.select(&SPONSOR_LINK).next() {
            let img = sponsor.select(&IMG).next();
            let heading = a.ancestors().filter_map(ElementRef::wrap).find(|e| e.value().name() == "h2");
            previews.push(Preview {
                link: join(base, a.value().attr("href").unwrap_or("")),
                name: visible_text(a, " "),
                region: city_from_heading(heading, a),
                description: text(sponsor.select(&SMALL).next()),
                img_src: img
                    .and_then(|i| i.value().attr("src"))
                    .map(|src| join(base, src))
                    .unwrap_or_default(),
                img_alt: attr(img, "alt"),
            });
        }
    }

    previews
}

/// Agency detail card; gaps are filled from the list preview.
pub fn parse_card(html: &str, url: &str, preview: &Preview) -> ListingRecord {
    let document = Html::parse_document(html);
    let page_text = visible_text(document.root_element(), " ");

    let name = Some(text(document.select(&CARD_NAME).next()))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| text(document.select(&H1).next()));
    let city = text(document.select(&CARD_CITY).next())
        .trim_start_matches([',', ' '])
        .to_string();

    let mut site = attr(document.select(&SITE_LINK).next(), "href");
    if site.is_empty() {
        site = labelled_element(&document, &SITE_LABEL)
            .and_then(|label| label.select(&ANCHOR).next())
            .map(|a| attr(Some(a), "href"))
            .unwrap_or_default();
    }

    let mut phone = text(document.select(&TEL).next());
    if phone.is_empty() {
        phone = LOOSE_PHONE
            .find(&page_text)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
    }

    let email = EMAIL
        .find(&page_text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let address = match document.select(&ADDRESS).next() {
        Some(span) => visible_text(span, " "),
        None => labelled_element(&document, &ADDRESS_LABEL)
            .map(|label| visible_text(label, " "))
            .unwrap_or_default(),
    };

    let description = Some(text(document.select(&PREVIEW).next()))
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| text(document.select(&REVIEW).next()));

    let tags: Vec<String> = document.select(&TAG).map(|a| visible_text(a, " ")).collect();

    let founded = FOUNDED
        .captures(&page_text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    ListingRecord {
        name: or_else(name, &preview.name),
        region: or_else(city, &preview.region),
        site,
        contacts: phone,
        email,
        address,
        founded,
        segment_tag: tags.join(";"),
        description: or_else(description, &preview.description),
        rating_ref: url.to_string(),
        source: SOURCE.to_string(),
        img_src: preview.img_src.clone(),
        img_alt: preview.img_alt.clone(),
        ..Default::default()
    }
}

/// Heading text minus the agency name: "Агентство / Москва" → "Москва".
fn city_from_heading(heading: Option<ElementRef<'_>>, link: ElementRef<'_>) -> String {
    let name = visible_text(link, " ");
    text(heading)
        .replace(&name, "")
        .replace('/', "")
        .trim_matches([' ', ','])
        .to_string()
}

/// Parent element of the first text node matching `label`.
fn labelled_element<'a>(document: &'a Html, label: &Regex) -> Option<ElementRef<'a>> {
    document
        .root_element()
        .descendants()
        .find(|node| matches!(node.value(), Node::Text(t) if label.is_match(t)))
        .and_then(|node| node.parent())
        .and_then(ElementRef::wrap)
}

fn join(base: &Url, href: &str) -> String {
    base.join(href.trim())
        .map(|u| u.to_string())
        .unwrap_or_default()
}

fn or_else(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = include_str!("../../tests/fixtures/alladvertising_list.html");
    const CARD: &str = include_str!("../../tests/fixtures/alladvertising_card.html");

    fn base() -> Url {
        Url::parse(BASE_ORIGIN).unwrap()
    }

    #[test]
    fn top_list_and_sponsor() {
        let previews = parse_top_list(LIST, &base());
        assert_eq!(previews.len(), 3);

        assert_eq!(previews[0].name, "Промо Лаб");
        assert_eq!(previews[0].link, "https://www.alladvertising.ru/firms/promolab/");
        assert_eq!(previews[0].region, "Москва");
        assert_eq!(previews[0].description, "BTL и промо-акции");
        assert_eq!(previews[0].img_src, "https://www.alladvertising.ru/img/promolab.png");
        assert_eq!(previews[0].img_alt, "Промо Лаб");

        assert_eq!(previews[2].name, "Спонсор Медиа");
        assert_eq!(previews[2].region, "Санкт-Петербург");
        assert_eq!(previews[2].description, "Event-агентство полного цикла");
    }

    #[test]
    fn card_fields() {
        let preview = Preview {
            name: "Промо Лаб".into(),
            img_src: "https://www.alladvertising.ru/img/promolab.png".into(),
            ..Default::default()
        };
        let url = "https://www.alladvertising.ru/firms/promolab/";
        let rec = parse_card(CARD, url, &preview);

        assert_eq!(rec.name, "Промо Лаб");
        assert_eq!(rec.region, "Москва");
        assert_eq!(rec.site, "https://promolab.ru");
        assert_eq!(rec.contacts, "+7 (495) 111-22-33");
        assert_eq!(rec.email, "hello@promolab.ru");
        assert_eq!(rec.address, "ул. Тверская, д. 7");
        assert_eq!(rec.founded, "2009");
        assert_eq!(rec.segment_tag, "BTL;Промо");
        assert_eq!(rec.description, "Промо-акции и дегустации по всей России.");
        assert_eq!(rec.rating_ref, url);
        assert_eq!(rec.source, "alladvertising");
        assert_eq!(rec.img_src, preview.img_src);
    }

    #[test]
    fn sparse_card_falls_back() {
        let html = r#"<html><body><h1>Агентство Икс</h1>
            <p>Сайт: <a href="http://x.ru">x.ru</a></p>
            <p>Адрес: Казань, ул. Баумана</p>
            <p>Звоните 8 (843) 200-00-00</p></body></html>"#;
        let preview = Preview {
            region: "Казань".into(),
            description: "Короткое описание".into(),
            ..Default::default()
        };
        let rec = parse_card(html, "u", &preview);
        assert_eq!(rec.name, "Агентство Икс");
        assert_eq!(rec.site, "http://x.ru");
        assert_eq!(rec.address, "Адрес: Казань, ул. Баумана");
        assert_eq!(rec.contacts, "8 (843) 200-00-00");
        assert_eq!(rec.region, "Казань");
        assert_eq!(rec.description, "Короткое описание");
        assert_eq!(rec.segment_tag, "");
    }
}
