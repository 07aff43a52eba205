//! Player game stats stage: traditional box scores for recent games into
//! `fact_player_game_stats`, plus `dim_players` rows for players seen for the
//! first time. Its rows are the work list for the shot tracking stage.

use chrono::NaiveDate;
use rusqlite::{Transaction, params};
use serde_json::Value;
use tracing::{error, info};

use crate::error::Result;
use crate::result_set::{Record, find_result_set, result_sets};
use crate::shot_tracking::player_game_id;
use crate::stage::{EtlContext, StageSummary, Step, StepExt, run_batch};
use crate::stats_api::{ApiRequest, StatsApi};
use crate::warehouse::{Warehouse, now_stamp};

pub const STAGE: &str = "player_game_stats";

const PLAYER_STATS_SET: &str = "PlayerStats";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerGameStats {
    pub player_game_id: String,
    pub game_id: String,
    pub player_id: String,
    pub team_id: String,
    pub player_name: Option<String>,
    pub minutes: Option<String>,
    pub points: Option<i64>,
    pub rebounds: Option<i64>,
    pub assists: Option<i64>,
    pub steals: Option<i64>,
    pub blocks: Option<i64>,
    pub turnovers: Option<i64>,
    pub personal_fouls: Option<i64>,
    pub fg_made: Option<i64>,
    pub fg_attempted: Option<i64>,
    pub fg3_made: Option<i64>,
    pub fg3_attempted: Option<i64>,
    pub ft_made: Option<i64>,
    pub ft_attempted: Option<i64>,
    pub plus_minus: Option<f64>,
}

impl PlayerGameStats {
    fn from_record(game_id: &str, row: &Record<'_>) -> Option<Self> {
        let player_id = row.string("PLAYER_ID")?;
        let team_id = row.string("TEAM_ID")?;
        Some(Self {
            player_game_id: player_game_id(game_id, &player_id),
            game_id: game_id.to_string(),
            team_id,
            player_name: row.string("PLAYER_NAME"),
            minutes: row.string("MIN"),
            points: row.i64("PTS"),
            rebounds: row.i64("REB"),
            assists: row.i64("AST"),
            steals: row.i64("STL"),
            blocks: row.i64("BLK"),
            turnovers: row.i64("TO"),
            personal_fouls: row.i64("PF"),
            fg_made: row.i64("FGM"),
            fg_attempted: row.i64("FGA"),
            fg3_made: row.i64("FG3M"),
            fg3_attempted: row.i64("FG3A"),
            ft_made: row.i64("FTM"),
            ft_attempted: row.i64("FTA"),
            plus_minus: row.f64("PLUS_MINUS"),
            player_id,
        })
    }
}

pub fn extract<A: StatsApi>(ctx: &EtlContext<A>, game_id: &str) -> Result<Value> {
    info!(game_id, "extracting box score");
    ctx.extract(&ApiRequest::box_score(game_id), &format!("boxscore_{game_id}"))
}

/// Rows of the `PlayerStats` table; rows without a player or team id are
/// dropped.
pub fn transform(response: &Value, game_id: &str) -> Vec<PlayerGameStats> {
    let sets = result_sets(response);
    let Some(set) = find_result_set(&sets, PLAYER_STATS_SET) else {
        return Vec::new();
    };
    let rows = set
        .records()
        .filter_map(|row| PlayerGameStats::from_record(game_id, &row))
        .collect::<Vec<_>>();
    info!(game_id, rows = rows.len(), "transformed player game stats");
    rows
}

pub fn load(warehouse: &Warehouse, rows: &[PlayerGameStats]) -> Result<usize> {
    let write = || -> Result<usize> {
        let mut conn = warehouse.connect()?;
        let tx = conn.transaction()?;
        let now = now_stamp();
        let mut players_added = 0usize;
        for row in rows {
            players_added += insert_player_if_missing(&tx, row, &now)?;
            upsert_stats(&tx, row, &now)?;
        }
        tx.commit()?;
        info!(rows = rows.len(), players_added, "loaded player game stats");
        Ok(rows.len())
    };
    write().inspect_err(|err| {
        error!(error = %err, "failed to load player game stats");
    })
}

fn insert_player_if_missing(tx: &Transaction<'_>, row: &PlayerGameStats, now: &str) -> Result<usize> {
    let Some(name) = row.player_name.as_deref() else {
        return Ok(0);
    };
    let (first, last) = split_name(name);
    let inserted = tx.execute(
        "INSERT INTO dim_players (player_id, first_name, last_name, inserted_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(player_id) DO NOTHING",
        params![row.player_id, first, last, now],
    )?;
    Ok(inserted)
}

fn upsert_stats(tx: &Transaction<'_>, s: &PlayerGameStats, now: &str) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO fact_player_game_stats (
            player_game_id, game_id, player_id, team_id, minutes,
            points, rebounds, assists, steals, blocks, turnovers, personal_fouls,
            fg_made, fg_attempted, fg3_made, fg3_attempted, ft_made, ft_attempted,
            plus_minus, inserted_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9, ?10, ?11, ?12,
            ?13, ?14, ?15, ?16, ?17, ?18,
            ?19, ?20
        )
        ON CONFLICT(player_game_id) DO UPDATE SET
            game_id = excluded.game_id,
            player_id = excluded.player_id,
            team_id = excluded.team_id,
            minutes = excluded.minutes,
            points = excluded.points,
            rebounds = excluded.rebounds,
            assists = excluded.assists,
            steals = excluded.steals,
            blocks = excluded.blocks,
            turnovers = excluded.turnovers,
            personal_fouls = excluded.personal_fouls,
            fg_made = excluded.fg_made,
            fg_attempted = excluded.fg_attempted,
            fg3_made = excluded.fg3_made,
            fg3_attempted = excluded.fg3_attempted,
            ft_made = excluded.ft_made,
            ft_attempted = excluded.ft_attempted,
            plus_minus = excluded.plus_minus,
            inserted_at = excluded.inserted_at
        "#,
        params![
            s.player_game_id,
            s.game_id,
            s.player_id,
            s.team_id,
            s.minutes,
            s.points,
            s.rebounds,
            s.assists,
            s.steals,
            s.blocks,
            s.turnovers,
            s.personal_fouls,
            s.fg_made,
            s.fg_attempted,
            s.fg3_made,
            s.fg3_attempted,
            s.ft_made,
            s.ft_attempted,
            s.plus_minus,
            now,
        ],
    )?;
    Ok(())
}

/// Games played on or after `since` that have no player rows yet.
pub fn pending_games(warehouse: &Warehouse, since: NaiveDate, limit: usize) -> Result<Vec<String>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let conn = warehouse.connect()?;
    let mut stmt = conn.prepare(
        r#"
        SELECT g.game_id
        FROM dim_games g
        LEFT JOIN fact_player_game_stats ps ON ps.game_id = g.game_id
        WHERE g.game_date >= ?1
          AND ps.player_game_id IS NULL
        ORDER BY g.game_date ASC, g.game_id ASC
        LIMIT ?2
        "#,
    )?;
    let rows = stmt.query_map(
        params![since.format("%Y-%m-%d").to_string(), limit as i64],
        |row| row.get::<_, String>(0),
    )?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn select_pending(warehouse: &Warehouse, since: NaiveDate, limit: usize) -> Vec<String> {
    match pending_games(warehouse, since, limit) {
        Ok(games) => {
            info!(count = games.len(), %since, "games pending player stats");
            games
        }
        Err(err) => {
            error!(error = %err, "failed to select games pending player stats");
            Vec::new()
        }
    }
}

pub fn run<A: StatsApi>(ctx: &EtlContext<A>, since: NaiveDate, limit: usize) -> Result<StageSummary> {
    info!(limit, %since, "starting player game stats stage");

    let games = select_pending(&ctx.warehouse, since, limit);
    if games.is_empty() {
        info!("no games to process");
        return Ok(StageSummary::new(STAGE));
    }
    ctx.snapshots.ensure_dir()?;

    Ok(run_batch(STAGE, &games, ctx.pacing.item, |game_id| {
        let response = extract(ctx, game_id).during(Step::Extract)?;
        let rows = transform(&response, game_id);
        load(&ctx.warehouse, &rows).during(Step::Load)
    }))
}

pub(crate) fn split_name(name: &str) -> (&str, &str) {
    let name = name.trim();
    match name.split_once(' ') {
        Some((first, last)) => (first, last.trim()),
        None => (name, ""),
    }
}
