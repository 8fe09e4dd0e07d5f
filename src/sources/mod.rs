//! Agency listing scrapers and the listing merge.
//!
//! Each source turns one rating page (plus, for some, one detail page per
//! agency) into [`ListingRecord`]s and writes them to its own CSV. [`merge`]
//! unions those CSVs into the enrichment input.

pub mod alladvertising;
pub mod directline;
pub mod marketing_tech;
pub mod pavezlo;

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use scraper::ElementRef;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::fetcher::Fetcher;
use crate::parser::text::visible_text;
use crate::table::{self, Row};

/// One agency as a listing site presents it. Superset of every source's columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingRecord {
    pub inn: String,
    pub name: String,
    pub revenue_year: String,
    pub revenue: String,
    pub segment_tag: String,
    pub source: String,
    pub rating_ref: String,
    pub okved_main: String,
    pub employees: String,
    pub site: String,
    pub description: String,
    pub region: String,
    pub contacts: String,
    pub email: String,
    pub address: String,
    pub founded: String,
    pub specializations: String,
    pub services: String,
    pub img_src: String,
    pub img_alt: String,
}

impl Row for ListingRecord {
    const COLUMNS: &'static [&'static str] = &[
        "inn",
        "name",
        "revenue_year",
        "revenue",
        "segment_tag",
        "source",
        "rating_ref",
        "okved_main",
        "employees",
        "site",
        "description",
        "region",
        "contacts",
        "email",
        "address",
        "founded",
        "specializations",
        "services",
        "img_src",
        "img_alt",
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Source {
    Alladvertising,
    Directline,
    MarketingTech,
    Pavezlo,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::Alladvertising,
        Source::Directline,
        Source::MarketingTech,
        Source::Pavezlo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Source::Alladvertising => "alladvertising",
            Source::Directline => "directline",
            Source::MarketingTech => "marketing-tech",
            Source::Pavezlo => "pavezlo",
        }
    }

    /// CSV file the source writes under the listings directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Source::Alladvertising => "alladvertising_top20.csv",
            Source::Directline => "directline_pr_agencies.csv",
            Source::MarketingTech => "marketingtech_top20.csv",
            Source::Pavezlo => "pavezlo_marketing_agencies.csv",
        }
    }
}

/// Scrape one source into `<listings_dir>/<file_name>`. Returns rows written.
pub async fn scrape(source: Source, fetcher: &Fetcher, listings_dir: &Path) -> Result<usize> {
    info!("Scraping {}", source.name());
    let records = match source {
        Source::Alladvertising => alladvertising::scrape(fetcher).await?,
        Source::Directline => directline::scrape(fetcher).await?,
        Source::MarketingTech => marketing_tech::scrape(fetcher).await?,
        Source::Pavezlo => pavezlo::scrape(fetcher).await?,
    };
    let records = dedupe(records);

    let path = listings_dir.join(source.file_name());
    table::save(&path, &records)?;
    info!("Saved {} rows to {:?}", records.len(), path);
    Ok(records.len())
}

/// Union the per-source listing CSVs into one table at `out`.
///
/// Sources whose CSV is missing are skipped with a warning.
pub fn merge(listings_dir: &Path, out: &Path) -> Result<usize> {
    let mut merged: Vec<ListingRecord> = Vec::new();
    for source in Source::ALL {
        let path = listings_dir.join(source.file_name());
        if !path.exists() {
            warn!("No listing for {} at {:?}, skipping", source.name(), path);
            continue;
        }
        let rows: Vec<ListingRecord> = table::load(&path)?;
        info!("{}: {} rows", source.name(), rows.len());
        merged.extend(rows);
    }

    table::save(out, &merged)?;
    info!("Saved {} rows to {:?}", merged.len(), out);
    Ok(merged.len())
}

/// Drop later rows repeating an earlier (name, site) pair.
pub fn dedupe(records: Vec<ListingRecord>) -> Vec<ListingRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert((r.name.clone(), r.site.clone())))
        .collect()
}

fn text(el: Option<ElementRef<'_>>) -> String {
    el.map(|e| visible_text(e, " ")).unwrap_or_default()
}

fn attr(el: Option<ElementRef<'_>>, name: &str) -> String {
    el.and_then(|e| e.value().attr(name))
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

fn card_progress(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

// ── Tests ──
