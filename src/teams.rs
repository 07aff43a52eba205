//! Teams stage: one row per franchise from the season standings into
//! `dim_teams`.

use std::collections::HashSet;

use rusqlite::{Transaction, params};
use serde_json::Value;
use tracing::{error, info};

use crate::error::Result;
use crate::result_set::{Record, find_result_set, result_sets};
use crate::stage::{EtlContext, StageSummary, Step, StepExt, run_batch};
use crate::stats_api::{ApiRequest, StatsApi};
use crate::warehouse::{Warehouse, now_stamp};

pub const STAGE: &str = "teams";

const STANDINGS_SET: &str = "Standings";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamRecord {
    pub team_id: String,
    pub team_name: Option<String>,
    pub team_city: Option<String>,
    pub team_abbreviation: Option<String>,
    pub conference: Option<String>,
    pub division: Option<String>,
}

impl TeamRecord {
    // Standings use camel case headers, the older team endpoints upper snake.
    fn from_record(row: &Record<'_>) -> Option<Self> {
        let field = |camel: &str, snake: &str| row.string(camel).or_else(|| row.string(snake));
        Some(Self {
            team_id: field("TeamID", "TEAM_ID")?,
            team_name: field("TeamName", "TEAM_NAME"),
            team_city: field("TeamCity", "TEAM_CITY"),
            team_abbreviation: field("TeamAbbreviation", "TEAM_ABBREVIATION"),
            conference: field("Conference", "CONFERENCE"),
            division: field("Division", "DIVISION"),
        })
    }
}

pub fn extract<A: StatsApi>(ctx: &EtlContext<A>, season: &str) -> Result<Value> {
    info!(season, "extracting teams");
    ctx.extract(&ApiRequest::standings(season), "teams")
}

/// Teams of the `Standings` table (or the first table), once per team id.
pub fn transform(response: &Value) -> Vec<TeamRecord> {
    let sets = result_sets(response);
    let Some(set) = find_result_set(&sets, STANDINGS_SET).or_else(|| sets.first()) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let teams = set
        .records()
        .filter_map(|row| TeamRecord::from_record(&row))
        .filter(|team| seen.insert(team.team_id.clone()))
        .collect::<Vec<_>>();
    info!(teams = teams.len(), "transformed teams");
    teams
}

pub fn load(warehouse: &Warehouse, teams: &[TeamRecord]) -> Result<usize> {
    let write = || -> Result<usize> {
        let mut conn = warehouse.connect()?;
        let tx = conn.transaction()?;
        let now = now_stamp();
        for team in teams {
            upsert_team(&tx, team, &now)?;
        }
        tx.commit()?;
        info!(teams = teams.len(), "loaded teams");
        Ok(teams.len())
    };
    write().inspect_err(|err| {
        error!(error = %err, "failed to load teams");
    })
}

// A refresh that lacks a column keeps the value an earlier load stored.
fn upsert_team(tx: &Transaction<'_>, t: &TeamRecord, now: &str) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO dim_teams (
            team_id, team_name, team_city, team_abbreviation, conference, division,
            inserted_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
        ON CONFLICT(team_id) DO UPDATE SET
            team_name = COALESCE(excluded.team_name, dim_teams.team_name),
            team_city = COALESCE(excluded.team_city, dim_teams.team_city),
            team_abbreviation = COALESCE(excluded.team_abbreviation, dim_teams.team_abbreviation),
            conference = COALESCE(excluded.conference, dim_teams.conference),
            division = COALESCE(excluded.division, dim_teams.division),
            updated_at = excluded.updated_at
        "#,
        params![
            t.team_id,
            t.team_name,
            t.team_city,
            t.team_abbreviation,
            t.conference,
            t.division,
            now
        ],
    )?;
    Ok(())
}

/// A single standings call for `season`, recorded through the batch loop like
/// the games stage.
pub fn run<A: StatsApi>(ctx: &EtlContext<A>, season: &str) -> Result<StageSummary> {
    info!(season, "starting teams stage");
    ctx.snapshots.ensure_dir()?;

    Ok(run_batch(STAGE, &[season], ctx.pacing.item, |season| {
        let response = extract(ctx, season).during(Step::Extract)?;
        let teams = transform(&response);
        load(&ctx.warehouse, &teams).during(Step::Load)
    }))
}
