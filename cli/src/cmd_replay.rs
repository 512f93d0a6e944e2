//! `ledgermirror replay`: feed a JSON-lines file of event batches through the
//! reconciler.

use anyhow::Result;
use serde::Serialize;
use std::io::BufRead;
use tracing::{info, warn};

use ledgermirror_core::{BatchOutcome, Event, MirrorStore, Reconciler};

/// Totals for one replay run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub batches: usize,
    pub applied: usize,
    pub duplicates: usize,
    pub forks: usize,
    pub without_block: usize,
    pub failed: usize,
    pub versions_inserted: usize,
    pub changes_skipped: usize,
}

impl std::fmt::Display for ReplaySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Batches:    {}", self.batches)?;
        writeln!(f, "  applied:    {}", self.applied)?;
        writeln!(f, "  duplicate:  {}", self.duplicates)?;
        writeln!(f, "  forks:      {}", self.forks)?;
        writeln!(f, "  no block:   {}", self.without_block)?;
        writeln!(f, "  failed:     {}", self.failed)?;
        writeln!(f, "Versions inserted: {}", self.versions_inserted)?;
        write!(f, "Changes skipped:   {}", self.changes_skipped)
    }
}

/// Replay every non-blank line of `input` in order.
///
/// Each line is a JSON array of events. A line that fails to parse or
/// reconcile is logged and counted; the run carries on with the next one.
pub async fn replay<S: MirrorStore>(
    reconciler: &Reconciler<S>,
    input: impl BufRead,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for (idx, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        summary.batches += 1;
        let line_no = idx + 1;

        let events: Vec<Event> = match serde_json::from_str(&line) {
            Ok(events) => events,
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping unparseable batch");
                summary.failed += 1;
                continue;
            }
        };

        match reconciler.handle_events(&events).await {
            Ok(BatchOutcome::NoBlock) => summary.without_block += 1,
            Ok(BatchOutcome::Duplicate(_)) => summary.duplicates += 1,
            Ok(BatchOutcome::Applied { fork, summary: applied, .. }) => {
                summary.applied += 1;
                summary.forks += usize::from(fork.is_some());
                summary.versions_inserted += applied.versions_inserted;
                summary.changes_skipped += applied.changes_skipped;
            }
            Err(e) => {
                warn!(line = line_no, error = %e, "batch failed");
                summary.failed += 1;
            }
        }
    }

    info!(
        batches = summary.batches,
        applied = summary.applied,
        failed = summary.failed,
        "replay finished"
    );
    Ok(summary)
}
