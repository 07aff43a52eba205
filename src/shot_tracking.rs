//! Shot tracking stage: per player-game shot charts bucketed by distance and
//! zone into `fact_player_shot_tracking`.
//!
//! Work is every `fact_player_game_stats` row without a shot tracking row.
//! A player-game that was processed but had no shots still gets an all-zero
//! row, so absence of a row is the only "not done yet" signal.

use std::fmt;
use std::path::Path;

use rusqlite::{Transaction, params};
use serde_json::Value;
use tracing::{error, info};

use crate::error::{EtlError, Result};
use crate::result_set::{Record, ResultSet, find_result_set, result_sets};
use crate::stage::{EtlContext, StageSummary, Step, StepExt, run_batch};
use crate::snapshot::RawSnapshot;
use crate::stats_api::{ApiRequest, SHOT_CHART_ENDPOINT, StatsApi};
use crate::warehouse::{Warehouse, now_stamp};

pub const STAGE: &str = "shot_tracking";

const SHOT_CHART_SET: &str = "Shot_Chart_Detail";
const DISTANCE_FIELD: &str = "SHOT_DISTANCE";
const MADE_FLAG_FIELD: &str = "SHOT_MADE_FLAG";
const SHOT_TYPE_FIELD: &str = "SHOT_TYPE";
const ZONE_BASIC_FIELD: &str = "SHOT_ZONE_BASIC";
const ACTION_TYPE_FIELD: &str = "ACTION_TYPE";

const RESTRICTED_MAX_FT: i64 = 3;
const PAINT_MAX_FT: i64 = 10;
const MID_RANGE_MAX_FT: i64 = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShotBucket {
    pub made: u32,
    pub attempted: u32,
}

impl ShotBucket {
    pub fn record(&mut self, made: bool) {
        self.attempted += 1;
        if made {
            self.made += 1;
        }
    }

    /// `made / attempted`, or 0.0 with no attempts.
    pub fn pct(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        f64::from(self.made) / f64::from(self.attempted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub player_game_id: String,
    pub game_id: String,
    pub player_id: String,
    pub team_id: String,
}

impl WorkItem {
    pub fn new(game_id: &str, player_id: &str, team_id: &str) -> Self {
        Self {
            player_game_id: player_game_id(game_id, player_id),
            game_id: game_id.to_string(),
            player_id: player_id.to_string(),
            team_id: team_id.to_string(),
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.player_game_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShotTrackingRecord {
    pub player_game_id: String,
    pub game_id: String,
    pub player_id: String,
    pub team_id: String,
    /// Distance <= 3 ft.
    pub within_3ft: ShotBucket,
    pub from_3_to_10ft: ShotBucket,
    pub from_10_to_16ft: ShotBucket,
    /// Two-pointers beyond 16 ft.
    pub long_two: ShotBucket,
    pub corner_three: ShotBucket,
    pub above_break_three: ShotBucket,
    pub dunks: ShotBucket,
}

impl ShotTrackingRecord {
    pub fn empty(item: &WorkItem) -> Self {
        Self {
            player_game_id: item.player_game_id.clone(),
            game_id: item.game_id.clone(),
            player_id: item.player_id.clone(),
            team_id: item.team_id.clone(),
            ..Self::default()
        }
    }

    fn add_shot(&mut self, shot: &Record<'_>) {
        let made = shot.f64(MADE_FLAG_FIELD) == Some(1.0);
        let zone = shot.string(ZONE_BASIC_FIELD).unwrap_or_default();
        let is_three = shot
            .string(SHOT_TYPE_FIELD)
            .is_some_and(|t| t.starts_with("3PT"))
            || zone.ends_with(" 3");

        if let Some(distance) = shot.whole(DISTANCE_FIELD) {
            if distance <= RESTRICTED_MAX_FT {
                self.within_3ft.record(made);
            } else if distance <= PAINT_MAX_FT {
                self.from_3_to_10ft.record(made);
            } else if distance <= MID_RANGE_MAX_FT {
                self.from_10_to_16ft.record(made);
            } else if !is_three {
                self.long_two.record(made);
            }
        }

        if zone.ends_with("Corner 3") {
            self.corner_three.record(made);
        } else if zone == "Above the Break 3" {
            self.above_break_three.record(made);
        }

        if shot
            .string(ACTION_TYPE_FIELD)
            .is_some_and(|a| a.to_ascii_lowercase().contains("dunk"))
        {
            self.dunks.record(made);
        }
    }
}

pub fn player_game_id(game_id: &str, player_id: &str) -> String {
    format!("{game_id}_{player_id}")
}

pub fn extract<A: StatsApi>(ctx: &EtlContext<A>, item: &WorkItem) -> Result<Value> {
    info!(player_game_id = %item.player_game_id, "extracting shot chart");
    let request = ApiRequest::shot_chart(&item.player_id, &item.game_id, &item.team_id);
    ctx.extract(
        &request,
        &format!("shot_chart_{}_{}", item.player_id, item.game_id),
    )
}

/// Never fails: anything missing from the response counts as no shots.
pub fn transform(response: &Value, item: &WorkItem) -> ShotTrackingRecord {
    let mut record = ShotTrackingRecord::empty(item);
    let sets = result_sets(response);
    let Some(shots) = shot_chart_set(&sets) else {
        return record;
    };
    for shot in shots.records() {
        record.add_shot(&shot);
    }
    record
}

fn shot_chart_set(sets: &[ResultSet]) -> Option<&ResultSet> {
    find_result_set(sets, SHOT_CHART_SET)
        .or_else(|| sets.first())
        .filter(|set| !set.is_empty())
}

/// Replaces any earlier row for the same player-game. One connection and one
/// transaction per call; an error rolls back.
pub fn load(warehouse: &Warehouse, record: &ShotTrackingRecord) -> Result<()> {
    let write = || -> Result<()> {
        let mut conn = warehouse.connect()?;
        let tx = conn.transaction()?;
        upsert_record(&tx, record, &now_stamp())?;
        tx.commit()?;
        Ok(())
    };
    write().inspect_err(|err| {
        error!(player_game_id = %record.player_game_id, error = %err, "failed to load shot tracking");
    })
}

fn upsert_record(tx: &Transaction<'_>, r: &ShotTrackingRecord, now: &str) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO fact_player_shot_tracking (
            player_game_id, game_id, player_id, team_id,
            shots_made_0_3ft, shots_attempted_0_3ft, shots_pct_0_3ft,
            shots_made_3_10ft, shots_attempted_3_10ft, shots_pct_3_10ft,
            shots_made_10_16ft, shots_attempted_10_16ft, shots_pct_10_16ft,
            shots_made_16ft_3pt, shots_attempted_16ft_3pt, shots_pct_16ft_3pt,
            corner_3_made, corner_3_attempted, corner_3_pct,
            above_break_3_made, above_break_3_attempted, above_break_3_pct,
            dunk_made, dunk_attempted, inserted_at
        ) VALUES (
            ?1, ?2, ?3, ?4,
            ?5, ?6, ?7,
            ?8, ?9, ?10,
            ?11, ?12, ?13,
            ?14, ?15, ?16,
            ?17, ?18, ?19,
            ?20, ?21, ?22,
            ?23, ?24, ?25
        )
        ON CONFLICT(player_game_id) DO UPDATE SET
            game_id = excluded.game_id,
            player_id = excluded.player_id,
            team_id = excluded.team_id,
            shots_made_0_3ft = excluded.shots_made_0_3ft,
            shots_attempted_0_3ft = excluded.shots_attempted_0_3ft,
            shots_pct_0_3ft = excluded.shots_pct_0_3ft,
            shots_made_3_10ft = excluded.shots_made_3_10ft,
            shots_attempted_3_10ft = excluded.shots_attempted_3_10ft,
            shots_pct_3_10ft = excluded.shots_pct_3_10ft,
            shots_made_10_16ft = excluded.shots_made_10_16ft,
            shots_attempted_10_16ft = excluded.shots_attempted_10_16ft,
            shots_pct_10_16ft = excluded.shots_pct_10_16ft,
            shots_made_16ft_3pt = excluded.shots_made_16ft_3pt,
            shots_attempted_16ft_3pt = excluded.shots_attempted_16ft_3pt,
            shots_pct_16ft_3pt = excluded.shots_pct_16ft_3pt,
            corner_3_made = excluded.corner_3_made,
            corner_3_attempted = excluded.corner_3_attempted,
            corner_3_pct = excluded.corner_3_pct,
            above_break_3_made = excluded.above_break_3_made,
            above_break_3_attempted = excluded.above_break_3_attempted,
            above_break_3_pct = excluded.above_break_3_pct,
            dunk_made = excluded.dunk_made,
            dunk_attempted = excluded.dunk_attempted,
            inserted_at = excluded.inserted_at
        "#,
        params![
            r.player_game_id,
            r.game_id,
            r.player_id,
            r.team_id,
            r.within_3ft.made,
            r.within_3ft.attempted,
            r.within_3ft.pct(),
            r.from_3_to_10ft.made,
            r.from_3_to_10ft.attempted,
            r.from_3_to_10ft.pct(),
            r.from_10_to_16ft.made,
            r.from_10_to_16ft.attempted,
            r.from_10_to_16ft.pct(),
            r.long_two.made,
            r.long_two.attempted,
            r.long_two.pct(),
            r.corner_three.made,
            r.corner_three.attempted,
            r.corner_three.pct(),
            r.above_break_three.made,
            r.above_break_three.attempted,
            r.above_break_three.pct(),
            r.dunks.made,
            r.dunks.attempted,
            now,
        ],
    )?;
    Ok(())
}

/// Up to `limit` player-games that have box score stats but no shot tracking
/// row yet.
pub fn pending_work(warehouse: &Warehouse, limit: usize) -> Result<Vec<WorkItem>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let conn = warehouse.connect()?;
    let mut stmt = conn.prepare(
        r#"
        SELECT ps.player_game_id, ps.game_id, ps.player_id, ps.team_id
        FROM fact_player_game_stats ps
        LEFT JOIN fact_player_shot_tracking st ON st.player_game_id = ps.player_game_id
        WHERE st.player_game_id IS NULL
        ORDER BY ps.player_game_id ASC
        LIMIT ?1
        "#,
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok(WorkItem {
            player_game_id: row.get(0)?,
            game_id: row.get(1)?,
            player_id: row.get(2)?,
            team_id: row.get(3)?,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// [`pending_work`] that treats a selector failure as an empty batch.
pub fn select_pending(warehouse: &Warehouse, limit: usize) -> Vec<WorkItem> {
    match pending_work(warehouse, limit) {
        Ok(items) => {
            info!(count = items.len(), "player games pending shot tracking");
            items
        }
        Err(err) => {
            error!(error = %err, "failed to select pending shot tracking work");
            Vec::new()
        }
    }
}

/// One batch of at most `limit` player-games. Per-item failures are recorded
/// in the summary. The only error is a raw snapshot directory that cannot be
/// created while there is work to do.
pub fn run<A: StatsApi>(ctx: &EtlContext<A>, limit: usize) -> Result<StageSummary> {
    info!(limit, "starting shot tracking stage");

    let items = select_pending(&ctx.warehouse, limit);
    if items.is_empty() {
        info!("no player games to process");
        return Ok(StageSummary::new(STAGE));
    }
    ctx.snapshots.ensure_dir()?;

    Ok(run_batch(STAGE, &items, ctx.pacing.item, |item| {
        let response = extract(ctx, item).during(Step::Extract)?;
        let record = transform(&response, item);
        load(&ctx.warehouse, &record).during(Step::Load)?;
        Ok(1)
    }))
}

/// Re-transforms and loads a saved shot chart snapshot without calling the
/// API.
pub fn replay(warehouse: &Warehouse, path: &Path) -> Result<ShotTrackingRecord> {
    let snapshot = RawSnapshot::read(path)?;
    if snapshot.endpoint != SHOT_CHART_ENDPOINT {
        return Err(EtlError::Config(format!(
            "{} is a {} snapshot, not {SHOT_CHART_ENDPOINT}",
            path.display(),
            snapshot.endpoint
        )));
    }
    let id = |name: &str| {
        snapshot
            .param(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| EtlError::Config(format!("snapshot is missing {name}")))
    };
    let item = WorkItem::new(id("GameID")?, id("PlayerID")?, id("TeamID")?);
    let record = transform(&snapshot.response, &item);
    load(warehouse, &record)?;
    info!(player_game_id = %item.player_game_id, path = %path.display(), "replayed shot chart snapshot");
    Ok(record)
}
