#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::params;
use serde_json::Value;
use tempfile::TempDir;

use hoops_etl::error::{EtlError, Result};
use hoops_etl::settings::{Pacing, Settings};
use hoops_etl::snapshot::SnapshotStore;
use hoops_etl::stats_api::{ApiRequest, StatsApi};
use hoops_etl::warehouse::Warehouse;
use hoops_etl::EtlContext;

pub fn read_fixture(name: &str) -> Value {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    let raw = fs::read_to_string(path).expect("fixture file should be readable");
    serde_json::from_str(&raw).expect("fixture should be valid json")
}

type Responder = Box<dyn Fn(&ApiRequest) -> Result<Value>>;

/// Canned stats API that records every request it sees.
pub struct FakeApi {
    respond: Responder,
    pub calls: RefCell<Vec<ApiRequest>>,
}

impl FakeApi {
    pub fn new(respond: impl Fn(&ApiRequest) -> Result<Value> + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl StatsApi for FakeApi {
    fn fetch(&self, request: &ApiRequest) -> Result<Value> {
        self.calls.borrow_mut().push(request.clone());
        (self.respond)(request)
    }
}

pub fn upstream_error(request: &ApiRequest, status: u16) -> EtlError {
    EtlError::Upstream {
        endpoint: request.endpoint.to_string(),
        status,
        body: "rate limited".to_string(),
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub ctx: EtlContext<FakeApi>,
}

impl Harness {
    pub fn new(api: FakeApi) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let settings = Settings::with_data_dir(dir.path());
        let warehouse = Warehouse::open(&settings.db_path).expect("open warehouse");
        let ctx = EtlContext::new(
            api,
            warehouse,
            SnapshotStore::new(&settings.raw_dir),
            Pacing::none(),
        );
        Self { dir, ctx }
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.ctx.warehouse
    }

    pub fn raw_files(&self) -> Vec<String> {
        list_files(self.ctx.snapshots.dir())
    }
}

pub fn list_files(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect::<Vec<_>>();
    names.sort();
    names
}

pub fn seed_player_game(warehouse: &Warehouse, game_id: &str, player_id: &str, team_id: &str) {
    let conn = warehouse.connect().expect("connect");
    conn.execute(
        "INSERT INTO fact_player_game_stats (player_game_id, game_id, player_id, team_id, inserted_at)
         VALUES (?1, ?2, ?3, ?4, '2024-01-10 00:00:00')",
        params![format!("{game_id}_{player_id}"), game_id, player_id, team_id],
    )
    .expect("seed player game");
}

pub fn seed_game(warehouse: &Warehouse, game_id: &str, game_date: &str) {
    let conn = warehouse.connect().expect("connect");
    conn.execute(
        "INSERT INTO dim_games (game_id, game_date, season, season_type, inserted_at, updated_at)
         VALUES (?1, ?2, '22023', 'Regular Season', '2024-01-10 00:00:00', '2024-01-10 00:00:00')",
        params![game_id, game_date],
    )
    .expect("seed game");
}
