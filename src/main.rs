use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;

use hoops_etl::logging::{LogFormat, init_logging};
use hoops_etl::settings::Settings;
use hoops_etl::snapshot::SnapshotStore;
use hoops_etl::stage::days_ago;
use hoops_etl::stats_api::{NbaStatsClient, season_for};
use hoops_etl::warehouse::Warehouse;
use hoops_etl::{EtlContext, StageSummary, games, player_game_stats, players, shot_tracking, teams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageArg {
    Teams,
    Players,
    Games,
    PlayerStats,
    Shots,
    All,
}

fn main() -> Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let format = if args.iter().any(|a| a == "--json-logs") {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logging(format);

    let mut settings = Settings::from_env();
    if let Some(db) = arg_value(&args, "--db") {
        settings.db_path = PathBuf::from(db);
    }
    if let Some(raw) = arg_value(&args, "--limit") {
        settings.batch_limit = raw
            .trim()
            .parse::<usize>()
            .with_context(|| format!("invalid --limit {raw}"))?;
    }
    if let Some(raw) = arg_value(&args, "--days-back") {
        settings.days_back = raw
            .trim()
            .parse::<i64>()
            .with_context(|| format!("invalid --days-back {raw}"))?;
    }
    if let Some(season) = arg_value(&args, "--season") {
        settings.season = Some(season);
    }
    settings.ensure_dirs().context("prepare data directories")?;

    let warehouse = Warehouse::open(&settings.db_path)
        .with_context(|| format!("open warehouse {}", settings.db_path.display()))?;

    if let Some(path) = arg_value(&args, "--replay") {
        let record = shot_tracking::replay(&warehouse, &PathBuf::from(&path))
            .with_context(|| format!("replay snapshot {path}"))?;
        println!("Replayed {}", record.player_game_id);
        println!(
            "0-3ft: {}/{} ({:.3})",
            record.within_3ft.made,
            record.within_3ft.attempted,
            record.within_3ft.pct()
        );
        return Ok(());
    }

    let stage = match arg_value(&args, "--stage") {
        Some(raw) => parse_stage(&raw)?,
        None => StageArg::Shots,
    };

    let api = NbaStatsClient::new(&settings).context("build stats api client")?;
    let ctx = EtlContext::new(
        api,
        warehouse,
        SnapshotStore::new(&settings.raw_dir),
        settings.pacing,
    );
    let since = days_ago(settings.days_back);
    let limit = settings.batch_limit;
    let season = settings
        .season
        .clone()
        .unwrap_or_else(|| season_for(Utc::now().date_naive()));

    let mut summaries = Vec::new();
    if matches!(stage, StageArg::Teams | StageArg::All) {
        summaries.push(teams::run(&ctx, &season).context("teams stage")?);
    }
    if matches!(stage, StageArg::Players | StageArg::All) {
        summaries.push(players::run(&ctx, &season).context("players stage")?);
    }
    if matches!(stage, StageArg::Games | StageArg::All) {
        summaries.push(games::run(&ctx, since).context("games stage")?);
    }
    if matches!(stage, StageArg::PlayerStats | StageArg::All) {
        summaries.push(
            player_game_stats::run(&ctx, since, limit).context("player game stats stage")?,
        );
    }
    if matches!(stage, StageArg::Shots | StageArg::All) {
        summaries.push(shot_tracking::run(&ctx, limit).context("shot tracking stage")?);
    }

    println!("DB: {}", ctx.warehouse.path().display());
    for summary in &summaries {
        print_summary(summary);
    }
    Ok(())
}

fn print_summary(summary: &StageSummary) {
    println!(
        "{}: {}/{} processed, {} failed, {} rows loaded",
        summary.stage, summary.processed, summary.selected, summary.failed, summary.rows_loaded
    );
    for err in summary.errors.iter().take(8) {
        println!("   - {err}");
    }
}

fn parse_stage(raw: &str) -> Result<StageArg> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "teams" => Ok(StageArg::Teams),
        "players" => Ok(StageArg::Players),
        "games" => Ok(StageArg::Games),
        "player-stats" | "player_game_stats" => Ok(StageArg::PlayerStats),
        "shots" | "shot_tracking" => Ok(StageArg::Shots),
        "all" => Ok(StageArg::All),
        other => Err(anyhow!(
            "unknown stage {other:?} (expected teams, players, games, player-stats, shots or all)"
        )),
    }
}

/// `--name=value` or `--name value`.
fn arg_value(args: &[String], name: &str) -> Option<String> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('='))
        {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}
