//! Games stage: league game finder results since a date into `dim_games` and
//! `fact_game_stats`. The game finder answers with one row per team per
//! game, so rows are folded by game id.

use std::collections::HashMap;

use chrono::NaiveDate;
use rusqlite::{Transaction, params};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::result_set::result_sets;
use crate::stage::{EtlContext, StageSummary, Step, StepExt, run_batch};
use crate::stats_api::{ApiRequest, StatsApi};
use crate::warehouse::{Warehouse, now_stamp};

pub const STAGE: &str = "games";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRecord {
    pub game_id: String,
    pub game_date: String,
    pub season: String,
    pub season_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameScore {
    pub game_id: String,
    pub home_team_id: String,
    pub away_team_id: String,
    pub home_team_score: Option<i64>,
    pub away_team_score: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GamesBatch {
    pub games: Vec<GameRecord>,
    pub scores: Vec<GameScore>,
}

#[derive(Debug, Clone)]
struct TeamSide {
    team_id: String,
    is_home: bool,
    points: Option<i64>,
}

/// Season ids carry the season type in their first digit (`22023` is the
/// 2023-24 regular season).
pub fn season_type(season_id: &str) -> &'static str {
    match season_id.chars().next() {
        Some('1') => "Pre Season",
        Some('2') => "Regular Season",
        Some('3') => "All Star",
        Some('4') => "Playoffs",
        Some('5') => "PlayIn",
        _ => "Unknown",
    }
}

pub fn extract<A: StatsApi>(ctx: &EtlContext<A>, since: NaiveDate) -> Result<Value> {
    info!(%since, "extracting games");
    ctx.extract(&ApiRequest::league_games(since), "games")
}

pub fn transform(response: &Value) -> GamesBatch {
    let sets = result_sets(response);
    let Some(set) = sets.first() else {
        return GamesBatch::default();
    };

    let mut batch = GamesBatch::default();
    let mut sides: HashMap<String, Vec<TeamSide>> = HashMap::new();

    for row in set.records() {
        let Some(game_id) = row.string("GAME_ID") else {
            continue;
        };
        if !sides.contains_key(&game_id) {
            let season = row.string("SEASON_ID").unwrap_or_default();
            batch.games.push(GameRecord {
                game_id: game_id.clone(),
                game_date: row.string("GAME_DATE").unwrap_or_default(),
                season_type: season_type(&season),
                season,
            });
            sides.insert(game_id.clone(), Vec::new());
        }
        let Some(team_id) = row.string("TEAM_ID") else {
            continue;
        };
        sides.entry(game_id).or_default().push(TeamSide {
            team_id,
            is_home: row
                .string("MATCHUP")
                .is_some_and(|m| m.contains(" vs. ")),
            points: row.i64("PTS"),
        });
    }

    for game in &batch.games {
        let Some(teams) = sides.get(&game.game_id) else {
            continue;
        };
        let home = teams.iter().find(|t| t.is_home);
        let away = teams.iter().find(|t| !t.is_home);
        let (Some(home), Some(away)) = (home, away) else {
            warn!(game_id = %game.game_id, "game is missing a home or away side");
            continue;
        };
        batch.scores.push(GameScore {
            game_id: game.game_id.clone(),
            home_team_id: home.team_id.clone(),
            away_team_id: away.team_id.clone(),
            home_team_score: home.points,
            away_team_score: away.points,
        });
    }

    info!(
        games = batch.games.len(),
        scores = batch.scores.len(),
        "transformed games"
    );
    batch
}

pub fn load(warehouse: &Warehouse, batch: &GamesBatch) -> Result<usize> {
    let write = || -> Result<usize> {
        let mut conn = warehouse.connect()?;
        let tx = conn.transaction()?;
        let now = now_stamp();
        for game in &batch.games {
            upsert_game(&tx, game, &now)?;
        }
        for score in &batch.scores {
            upsert_score(&tx, score, &now)?;
        }
        tx.commit()?;
        info!(
            games = batch.games.len(),
            scores = batch.scores.len(),
            "loaded games"
        );
        Ok(batch.games.len() + batch.scores.len())
    };
    write().inspect_err(|err| {
        error!(error = %err, "failed to load games");
    })
}

fn upsert_game(tx: &Transaction<'_>, g: &GameRecord, now: &str) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO dim_games (game_id, game_date, season, season_type, inserted_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        ON CONFLICT(game_id) DO UPDATE SET
            game_date = excluded.game_date,
            season = excluded.season,
            season_type = excluded.season_type,
            updated_at = excluded.updated_at
        "#,
        params![g.game_id, g.game_date, g.season, g.season_type, now],
    )?;
    Ok(())
}

fn upsert_score(tx: &Transaction<'_>, s: &GameScore, now: &str) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO fact_game_stats (
            game_id, home_team_id, away_team_id, home_team_score, away_team_score, inserted_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(game_id) DO UPDATE SET
            home_team_id = excluded.home_team_id,
            away_team_id = excluded.away_team_id,
            home_team_score = excluded.home_team_score,
            away_team_score = excluded.away_team_score,
            inserted_at = excluded.inserted_at
        "#,
        params![
            s.game_id,
            s.home_team_id,
            s.away_team_id,
            s.home_team_score,
            s.away_team_score,
            now
        ],
    )?;
    Ok(())
}

/// A single game finder call; runs through the batch loop so a failed fetch
/// is recorded the same way per-item failures are.
pub fn run<A: StatsApi>(ctx: &EtlContext<A>, since: NaiveDate) -> Result<StageSummary> {
    info!(%since, "starting games stage");
    ctx.snapshots.ensure_dir()?;

    Ok(run_batch(STAGE, &[since], ctx.pacing.item, |since| {
        let response = extract(ctx, *since).during(Step::Extract)?;
        let batch = transform(&response);
        load(&ctx.warehouse, &batch).during(Step::Load)
    }))
}
