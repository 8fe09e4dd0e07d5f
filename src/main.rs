mod batch;
mod config;
mod db;
mod enrich;
mod fetcher;
mod parser;
mod record;
mod sitemap;
mod sources;
mod table;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::error;

use config::Settings;
use enrich::Enricher;
use fetcher::Fetcher;
use record::{AgencyRecord, Field};
use sources::Source;

#[derive(Parser)]
#[command(
    name = "agency_scraper",
    about = "Agency listing scraper with INN/OGRN and contact enrichment"
)]
struct Cli {
    /// Config file (default: agency_scraper.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape agency listings into per-source CSVs
    Scrape {
        /// Only this source (default: all)
        #[arg(short, long, value_enum)]
        source: Option<Source>,
    },
    /// Union the per-source listings into one table
    Merge,
    /// Enrich merged rows with identifiers and contacts from each agency's site
    Enrich {
        /// Max rows to process (default: all incomplete)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Input table (default: paths.merged)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Output table, also the resume checkpoint (default: paths.enriched)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Scrape all sources, merge, then enrich
    Run {
        /// Max rows to enrich
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Fill rates of the enriched table
    Stats,
    /// Enriched agencies overview table
    Overview {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Mirror the enriched table into SQLite
    Export,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = config::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Scrape { source } => {
            let fetcher = Fetcher::new(&settings.fetch)?;
            let selected = match source {
                Some(s) => vec![s],
                None => Source::ALL.to_vec(),
            };
            scrape_sources(&fetcher, &settings, &selected).await;
            Ok(())
        }
        Commands::Merge => {
            let rows = sources::merge(&settings.paths.listings_dir, &settings.paths.merged)?;
            println!("Saved {} rows to {}", rows, settings.paths.merged.display());
            Ok(())
        }
        Commands::Enrich { limit, input, output } => {
            let input = input.unwrap_or_else(|| settings.paths.merged.clone());
            let output = output.unwrap_or_else(|| settings.paths.enriched.clone());
            enrich_table(&settings, &input, &output, limit.or(settings.batch.limit)).await
        }
        Commands::Run { limit } => {
            // Phase 1: Listings
            let t_scrape = Instant::now();
            let fetcher = Fetcher::new(&settings.fetch)?;
            scrape_sources(&fetcher, &settings, &Source::ALL).await;
            println!("Scraped listings in {:.1}s", t_scrape.elapsed().as_secs_f64());

            // Phase 2: Merge
            let rows = sources::merge(&settings.paths.listings_dir, &settings.paths.merged)?;
            println!("Merged {} rows into {}", rows, settings.paths.merged.display());
            if rows == 0 {
                println!("Nothing to enrich.");
                return Ok(());
            }

            // Phase 3: Enrich
            enrich_table(
                &settings,
                &settings.paths.merged,
                &settings.paths.enriched,
                limit.or(settings.batch.limit),
            )
            .await
        }
        Commands::Stats => {
            let rows: Vec<AgencyRecord> = table::load(&settings.paths.enriched)?;
            print_stats(&rows, &settings);
            Ok(())
        }
        Commands::Overview { limit } => {
            let rows: Vec<AgencyRecord> = table::load(&settings.paths.enriched)?;
            if rows.is_empty() {
                println!("No agencies found.");
                return Ok(());
            }
            print_overview(&rows, limit);
            Ok(())
        }
        Commands::Export => {
            let rows: Vec<AgencyRecord> = table::load(&settings.paths.enriched)?;
            let conn = db::connect(&settings.paths.sqlite)?;
            db::init_schema(&conn)?;
            let written = db::upsert_agencies(&conn, &rows)?;
            println!(
                "Exported {} agencies ({} in {})",
                written,
                db::count_agencies(&conn)?,
                settings.paths.sqlite.display()
            );
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Scrape each source in turn; a failing source is logged and skipped.
async fn scrape_sources(fetcher: &Fetcher, settings: &Settings, selected: &[Source]) {
    for &source in selected {
        match sources::scrape(source, fetcher, &settings.paths.listings_dir).await {
            Ok(n) => println!("{}: {} agencies", source.name(), n),
            Err(e) => error!("{} failed: {:#}", source.name(), e),
        }
    }
}

async fn enrich_table(
    settings: &Settings,
    input: &std::path::Path,
    output: &std::path::Path,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let enricher = Enricher::from_settings(settings)?;
    let summary = batch::run(
        &enricher,
        input,
        output,
        &settings.batch.complete_when,
        limit,
    )
    .await?;
    println!(
        "Done: {} rows ({} enriched, {} skipped, {} failed) -> {}",
        summary.total,
        summary.processed,
        summary.skipped,
        summary.failed,
        output.display()
    );
    Ok(())
}

fn print_stats(rows: &[AgencyRecord], settings: &Settings) {
    let total = rows.len();
    println!("Rows:      {}", total);
    if total == 0 {
        return;
    }
    let complete = rows
        .iter()
        .filter(|r| settings.batch.complete_when.is_complete(r))
        .count();
    println!("Complete:  {} ({:.0}%)", complete, percent(complete, total));
    println!();

    for field in Field::ALL {
        let filled = rows.iter().filter(|r| r.is_filled(field)).count();
        println!(
            "{:<13} {:>5} {:>5.0}%",
            field.column(),
            filled,
            percent(filled, total)
        );
    }

    let from_pdf = rows.iter().filter(|r| r.doc_type == "pdf").count();
    let from_homepage = rows.iter().filter(|r| r.doc_type == "homepage").count();
    println!("\nEvidence:  {} pdf, {} homepage", from_pdf, from_homepage);
}

fn print_overview(rows: &[AgencyRecord], limit: usize) {
    println!(
        "{:>3} | {:<24} | {:<28} | {:<12} | {:<13} | {:<16} | {:<8}",
        "#", "Agency", "Site", "INN", "OGRN", "Region", "Doc"
    );
    println!("{}", "-".repeat(124));

    for (i, r) in rows.iter().take(limit).enumerate() {
        let name = if r.name.is_empty() { &r.full_name } else { &r.name };
        println!(
            "{:>3} | {:<24} | {:<28} | {:<12} | {:<13} | {:<16} | {:<8}",
            i + 1,
            truncate(name, 24),
            truncate(&r.site, 28),
            r.inn,
            r.ogrn,
            truncate(&r.region, 16),
            r.doc_type
        );
    }

    println!("\n{} of {} agencies", rows.len().min(limit), rows.len());
}

fn percent(part: usize, total: usize) -> f64 {
    part as f64 * 100.0 / total as f64
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
