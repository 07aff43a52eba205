use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EtlError, Result};

pub const DEFAULT_STATS_BASE_URL: &str = "https://stats.nba.com/stats";
pub const DEFAULT_BATCH_LIMIT: usize = 5;
pub const DEFAULT_DAYS_BACK: i64 = 7;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REQUEST_DELAY_MS: u64 = 1000;
const DEFAULT_ITEM_DELAY_MS: u64 = 1000;

/// Delays that keep the pipeline under the upstream rate limit.
///
/// `request` is slept before every API call, `item` after every item a stage
/// finished successfully. A zero duration disables the sleep.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub request: Duration,
    pub item: Duration,
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            request: Duration::ZERO,
            item: Duration::ZERO,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            request: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            item: Duration::from_millis(DEFAULT_ITEM_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub raw_dir: PathBuf,
    pub db_path: PathBuf,
    pub stats_base_url: String,
    pub http_timeout: Duration,
    pub pacing: Pacing,
    pub batch_limit: usize,
    pub days_back: i64,
    /// Season label (`2023-24`) for the teams and players stages; the current
    /// season when unset.
    pub season: Option<String>,
}

impl Settings {
    /// Settings rooted at `data_dir` with every other value at its default.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            raw_dir: data_dir.join("raw"),
            db_path: data_dir.join("processed").join("nba_data.db"),
            data_dir,
            stats_base_url: DEFAULT_STATS_BASE_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            pacing: Pacing::default(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            days_back: DEFAULT_DAYS_BACK,
            season: None,
        }
    }

    /// Loads `.env.local` and `.env` (when present) and reads the process
    /// environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = get("HOOPS_DATA_DIR")
            .map(|v| PathBuf::from(v.trim()))
            .unwrap_or_else(|| PathBuf::from("data"));
        let mut settings = Self::with_data_dir(data_dir);

        if let Some(path) = get("HOOPS_DB_PATH") {
            settings.db_path = PathBuf::from(path.trim());
        }
        if let Some(url) = get("HOOPS_STATS_BASE_URL") {
            settings.stats_base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(secs) = get("HOOPS_HTTP_TIMEOUT_SECS").and_then(|v| parse_u64(&v)) {
            settings.http_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(ms) = get("HOOPS_REQUEST_DELAY_MS").and_then(|v| parse_u64(&v)) {
            settings.pacing.request = Duration::from_millis(ms);
        }
        if let Some(ms) = get("HOOPS_ITEM_DELAY_MS").and_then(|v| parse_u64(&v)) {
            settings.pacing.item = Duration::from_millis(ms);
        }
        if let Some(limit) = get("HOOPS_BATCH_LIMIT").and_then(|v| parse_u64(&v)) {
            settings.batch_limit = limit as usize;
        }
        if let Some(days) = get("HOOPS_DAYS_BACK").and_then(|v| v.trim().parse::<i64>().ok()) {
            settings.days_back = days.max(0);
        }
        if let Some(season) = get("HOOPS_SEASON") {
            settings.season = Some(season.trim().to_string());
        }
        settings
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        create_dir(&self.data_dir)?;
        create_dir(&self.raw_dir)?;
        if let Some(parent) = self.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir(parent)?;
        }
        Ok(())
    }
}

pub(crate) fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|err| {
        EtlError::Config(format!("cannot create directory {}: {err}", path.display()))
    })
}

fn parse_u64(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()
}
