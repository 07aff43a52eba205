//! Players stage: the season's rostered players into `dim_players`.

use rusqlite::{Transaction, params};
use serde_json::Value;
use tracing::{error, info};

use crate::error::Result;
use crate::player_game_stats::split_name;
use crate::result_set::{Record, result_sets};
use crate::stage::{EtlContext, StageSummary, Step, StepExt, run_batch};
use crate::stats_api::{ApiRequest, StatsApi};
use crate::warehouse::{Warehouse, now_stamp};

pub const STAGE: &str = "players";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerRecord {
    pub player_id: String,
    pub first_name: String,
    pub last_name: String,
}

impl PlayerRecord {
    fn from_record(row: &Record<'_>) -> Option<Self> {
        let player_id = row.string("PERSON_ID")?;
        // ROSTERSTATUS is 0 for players without a team this season.
        if row.i64("ROSTERSTATUS") == Some(0) {
            return None;
        }
        let (first_name, last_name) = match row.string("DISPLAY_LAST_COMMA_FIRST") {
            Some(display) => match display.split_once(',') {
                Some((last, first)) => (first.trim().to_string(), last.trim().to_string()),
                None => (display, String::new()),
            },
            None => {
                let display = row.string("DISPLAY_FIRST_LAST").unwrap_or_default();
                let (first, last) = split_name(&display);
                (first.to_string(), last.to_string())
            }
        };
        Some(Self {
            player_id,
            first_name,
            last_name,
        })
    }
}

pub fn extract<A: StatsApi>(ctx: &EtlContext<A>, season: &str) -> Result<Value> {
    info!(season, "extracting players");
    ctx.extract(&ApiRequest::all_players(season), "players")
}

/// Rostered players of the first table; rows without a person id are dropped.
pub fn transform(response: &Value) -> Vec<PlayerRecord> {
    let sets = result_sets(response);
    let Some(set) = sets.first() else {
        return Vec::new();
    };
    let players = set
        .records()
        .filter_map(|row| PlayerRecord::from_record(&row))
        .collect::<Vec<_>>();
    info!(players = players.len(), "transformed players");
    players
}

pub fn load(warehouse: &Warehouse, players: &[PlayerRecord]) -> Result<usize> {
    let write = || -> Result<usize> {
        let mut conn = warehouse.connect()?;
        let tx = conn.transaction()?;
        let now = now_stamp();
        for player in players {
            upsert_player(&tx, player, &now)?;
        }
        tx.commit()?;
        info!(players = players.len(), "loaded players");
        Ok(players.len())
    };
    write().inspect_err(|err| {
        error!(error = %err, "failed to load players");
    })
}

fn upsert_player(tx: &Transaction<'_>, p: &PlayerRecord, now: &str) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO dim_players (player_id, first_name, last_name, inserted_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?4)
        ON CONFLICT(player_id) DO UPDATE SET
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            updated_at = excluded.updated_at
        "#,
        params![p.player_id, p.first_name, p.last_name, now],
    )?;
    Ok(())
}

pub fn run<A: StatsApi>(ctx: &EtlContext<A>, season: &str) -> Result<StageSummary> {
    info!(season, "starting players stage");
    ctx.snapshots.ensure_dir()?;

    Ok(run_batch(STAGE, &[season], ctx.pacing.item, |season| {
        let response = extract(ctx, season).during(Step::Extract)?;
        let players = transform(&response);
        load(&ctx.warehouse, &players).during(Step::Load)
    }))
}
