use std::path::Path;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info};

use crate::enrich::Enricher;
use crate::record::{AgencyRecord, CompletenessRule};
use crate::table;

/// Counts returned after a batch pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Enrich every incomplete row of `input`, checkpointing `output` after each one.
///
/// An existing `output` is combined with `input` first (its values win), so an
/// interrupted run picks up where it stopped. Row failures are logged and the
/// batch moves on; only table I/O errors abort it.
pub async fn run(
    enricher: &Enricher,
    input: &Path,
    output: &Path,
    complete_when: &CompletenessRule,
    limit: Option<usize>,
) -> Result<BatchSummary> {
    let fresh: Vec<AgencyRecord> = table::load(input)?;
    let mut rows = if output.exists() {
        let previous: Vec<AgencyRecord> = table::load(output)?;
        info!("Resuming from {:?} ({} rows)", output, previous.len());
        table::combine_prefer_existing(previous, fresh)
    } else {
        fresh
    };

    let mut summary = BatchSummary {
        total: rows.len(),
        ..Default::default()
    };
    info!("Enriching {} rows from {:?}", rows.len(), input);

    let pb = ProgressBar::new(rows.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    for idx in 0..rows.len() {
        pb.inc(1);
        if limit.is_some_and(|n| summary.processed + summary.failed >= n) {
            debug!("Limit reached after {} rows", summary.processed + summary.failed);
            break;
        }

        let row = &rows[idx];
        if row.site.trim().is_empty() || complete_when.is_complete(row) {
            summary.skipped += 1;
            continue;
        }

        pb.set_message(row.site.trim().to_string());
        match enricher.enrich(row).await {
            Ok(record) => {
                rows[idx] = record;
                table::save(output, &rows)?;
                summary.processed += 1;
                info!("Checkpoint {:?} updated (row {})", output, idx + 1);
            }
            Err(e) => {
                error!("Failed to process {}: {:#}", row.site.trim(), e);
                table::save(output, &rows)?;
                summary.failed += 1;
            }
        }
    }

    pb.finish_and_clear();
    table::save(output, &rows)?;
    info!(
        "Saved {} rows to {:?} ({} processed, {} skipped, {} failed)",
        rows.len(),
        output,
        summary.processed,
        summary.skipped,
        summary.failed
    );
    Ok(summary)
}

// ── Tests ──
