use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::Connection;

use crate::error::Result;
use crate::settings::create_dir;

/// Handle to the SQLite warehouse. Holds only the path: every unit of work
/// opens its own connection and drops it when done.
#[derive(Debug, Clone)]
pub struct Warehouse {
    path: PathBuf,
}

impl Warehouse {
    /// Opens (creating if needed) the database and its tables.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let warehouse = Self { path: path.into() };
        if let Some(parent) = warehouse.path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir(parent)?;
        }
        let conn = warehouse.connect()?;
        init_schema(&conn)?;
        Ok(warehouse)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    pub fn count_rows(&self, table: &str) -> Result<i64> {
        let conn = self.connect()?;
        let sql = format!("SELECT COUNT(*) FROM {table}");
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS dim_games (
            game_id TEXT PRIMARY KEY,
            game_date TEXT NOT NULL,
            season TEXT NOT NULL,
            season_type TEXT NOT NULL,
            inserted_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_dim_games_date ON dim_games(game_date);

        CREATE TABLE IF NOT EXISTS dim_teams (
            team_id TEXT PRIMARY KEY,
            team_name TEXT NULL,
            team_city TEXT NULL,
            team_abbreviation TEXT NULL,
            conference TEXT NULL,
            division TEXT NULL,
            inserted_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dim_players (
            player_id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            inserted_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS fact_game_stats (
            game_id TEXT PRIMARY KEY,
            home_team_id TEXT NOT NULL,
            away_team_id TEXT NOT NULL,
            home_team_score INTEGER NULL,
            away_team_score INTEGER NULL,
            inserted_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS fact_player_game_stats (
            player_game_id TEXT PRIMARY KEY,
            game_id TEXT NOT NULL,
            player_id TEXT NOT NULL,
            team_id TEXT NOT NULL,
            minutes TEXT NULL,
            points INTEGER NULL,
            rebounds INTEGER NULL,
            assists INTEGER NULL,
            steals INTEGER NULL,
            blocks INTEGER NULL,
            turnovers INTEGER NULL,
            personal_fouls INTEGER NULL,
            fg_made INTEGER NULL,
            fg_attempted INTEGER NULL,
            fg3_made INTEGER NULL,
            fg3_attempted INTEGER NULL,
            ft_made INTEGER NULL,
            ft_attempted INTEGER NULL,
            plus_minus REAL NULL,
            inserted_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_player_game_stats_game ON fact_player_game_stats(game_id);

        CREATE TABLE IF NOT EXISTS fact_player_shot_tracking (
            player_game_id TEXT PRIMARY KEY,
            game_id TEXT NOT NULL,
            player_id TEXT NOT NULL,
            team_id TEXT NOT NULL,
            shots_made_0_3ft INTEGER NOT NULL,
            shots_attempted_0_3ft INTEGER NOT NULL,
            shots_pct_0_3ft REAL NOT NULL,
            shots_made_3_10ft INTEGER NOT NULL,
            shots_attempted_3_10ft INTEGER NOT NULL,
            shots_pct_3_10ft REAL NOT NULL,
            shots_made_10_16ft INTEGER NOT NULL,
            shots_attempted_10_16ft INTEGER NOT NULL,
            shots_pct_10_16ft REAL NOT NULL,
            shots_made_16ft_3pt INTEGER NOT NULL,
            shots_attempted_16ft_3pt INTEGER NOT NULL,
            shots_pct_16ft_3pt REAL NOT NULL,
            corner_3_made INTEGER NOT NULL,
            corner_3_attempted INTEGER NOT NULL,
            corner_3_pct REAL NOT NULL,
            above_break_3_made INTEGER NOT NULL,
            above_break_3_attempted INTEGER NOT NULL,
            above_break_3_pct REAL NOT NULL,
            dunk_made INTEGER NOT NULL,
            dunk_attempted INTEGER NOT NULL,
            inserted_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

/// Load timestamp written to `inserted_at` / `updated_at`.
pub fn now_stamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
