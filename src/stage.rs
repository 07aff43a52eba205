//! Pieces shared by every ETL stage: the context a stage runs against, the
//! extract step (paced request + raw snapshot) and the per-item batch loop.

use std::fmt;
use std::time::Duration;

use chrono::{NaiveDate, TimeDelta, Utc};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::error::{EtlError, Result};
use crate::settings::Pacing;
use crate::snapshot::{RawSnapshot, SnapshotStore, snapshot_file_name};
use crate::stats_api::{ApiRequest, StatsApi};
use crate::warehouse::Warehouse;

/// Everything a stage needs, handed in explicitly.
pub struct EtlContext<A> {
    pub api: A,
    pub warehouse: Warehouse,
    pub snapshots: SnapshotStore,
    pub pacing: Pacing,
}

impl<A: StatsApi> EtlContext<A> {
    pub fn new(api: A, warehouse: Warehouse, snapshots: SnapshotStore, pacing: Pacing) -> Self {
        Self {
            api,
            warehouse,
            snapshots,
            pacing,
        }
    }

    /// Waits out the request delay, calls the API and saves the response as
    /// `{stem}_{timestamp}.json` before handing it back.
    pub fn extract(&self, request: &ApiRequest, stem: &str) -> Result<Value> {
        pause(self.pacing.request);
        let response = self.api.fetch(request).inspect_err(|err| {
            error!(endpoint = request.endpoint, error = %err, "stats api request failed");
        })?;

        let now = Utc::now();
        let snapshot = RawSnapshot::capture(request, response, now);
        let path = self
            .snapshots
            .write(&snapshot_file_name(stem, now), &snapshot)
            .inspect_err(|err| {
                error!(endpoint = request.endpoint, error = %err, "failed to save raw snapshot");
            })?;
        debug!(path = %path.display(), "raw snapshot saved");
        Ok(snapshot.response)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Extract,
    Load,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Extract => "extract",
            Step::Load => "load",
        })
    }
}

#[derive(Debug)]
pub struct StepFailure {
    pub step: Step,
    pub error: EtlError,
}

pub trait StepExt<T> {
    fn during(self, step: Step) -> std::result::Result<T, StepFailure>;
}

impl<T> StepExt<T> for Result<T> {
    fn during(self, step: Step) -> std::result::Result<T, StepFailure> {
        self.map_err(|error| StepFailure { step, error })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageSummary {
    pub stage: &'static str,
    pub selected: usize,
    pub processed: usize,
    pub failed: usize,
    pub rows_loaded: usize,
    pub errors: Vec<String>,
}

impl StageSummary {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Runs `process` over `items` in order. A failed item is logged, recorded
/// and skipped; it is picked up again on a later run because nothing was
/// loaded for it. `item_delay` follows every item that succeeded.
///
/// `process` returns the number of rows it loaded.
pub fn run_batch<T, F>(
    stage: &'static str,
    items: &[T],
    item_delay: Duration,
    mut process: F,
) -> StageSummary
where
    T: fmt::Display,
    F: FnMut(&T) -> std::result::Result<usize, StepFailure>,
{
    let mut summary = StageSummary::new(stage);
    summary.selected = items.len();

    for item in items {
        match process(item) {
            Ok(rows) => {
                summary.processed += 1;
                summary.rows_loaded += rows;
                info!(stage, item = %item, rows, "item processed");
                pause(item_delay);
            }
            Err(StepFailure { step, error }) => {
                summary.failed += 1;
                error!(stage, item = %item, %step, error = %error, "item failed, skipping");
                summary.errors.push(format!("{item}: {step} failed: {error}"));
            }
        }
    }

    info!(
        stage,
        selected = summary.selected,
        processed = summary.processed,
        failed = summary.failed,
        rows = summary.rows_loaded,
        "batch complete"
    );
    summary
}

/// UTC date `days` days before today; the look-back cutoff for stages that
/// select recent games.
pub fn days_ago(days: i64) -> NaiveDate {
    (Utc::now() - TimeDelta::days(days.max(0))).date_naive()
}

pub(crate) fn pause(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}
