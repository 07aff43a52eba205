use chrono::{Datelike, NaiveDate};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use serde_json::Value;

use crate::error::{EtlError, Result};
use crate::settings::Settings;

pub const SHOT_CHART_ENDPOINT: &str = "shotchartdetail";
pub const BOX_SCORE_ENDPOINT: &str = "boxscoretraditionalv2";
pub const GAME_FINDER_ENDPOINT: &str = "leaguegamefinder";
pub const STANDINGS_ENDPOINT: &str = "leaguestandingsv3";
pub const ALL_PLAYERS_ENDPOINT: &str = "commonallplayers";
pub const NBA_LEAGUE_ID: &str = "00";

const ERROR_BODY_LIMIT: usize = 512;

/// One stats API call: endpoint name plus query parameters in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub endpoint: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl ApiRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Field-goal attempts only, for one player in one game.
    pub fn shot_chart(player_id: &str, game_id: &str, team_id: &str) -> Self {
        Self {
            endpoint: SHOT_CHART_ENDPOINT,
            params: vec![
                ("PlayerID", player_id.to_string()),
                ("TeamID", team_id.to_string()),
                ("GameID", game_id.to_string()),
                ("ContextMeasure", "FGA".to_string()),
                ("LeagueID", NBA_LEAGUE_ID.to_string()),
                ("SeasonType", "Regular Season".to_string()),
                ("Season", String::new()),
                ("LastNGames", "0".to_string()),
                ("Month", "0".to_string()),
                ("OpponentTeamID", "0".to_string()),
                ("Period", "0".to_string()),
                ("PlayerPosition", String::new()),
                ("DateFrom", String::new()),
                ("DateTo", String::new()),
            ],
        }
    }

    pub fn box_score(game_id: &str) -> Self {
        Self {
            endpoint: BOX_SCORE_ENDPOINT,
            params: vec![
                ("GameID", game_id.to_string()),
                ("StartPeriod", "0".to_string()),
                ("EndPeriod", "10".to_string()),
                ("StartRange", "0".to_string()),
                ("EndRange", "0".to_string()),
                ("RangeType", "0".to_string()),
            ],
        }
    }

    pub fn league_games(date_from: NaiveDate) -> Self {
        Self {
            endpoint: GAME_FINDER_ENDPOINT,
            params: vec![
                ("DateFrom", date_from.format("%m/%d/%Y").to_string()),
                ("LeagueID", NBA_LEAGUE_ID.to_string()),
                ("PlayerOrTeam", "T".to_string()),
            ],
        }
    }

    /// One row per team in `season` (`2023-24`), with conference and division.
    pub fn standings(season: &str) -> Self {
        Self {
            endpoint: STANDINGS_ENDPOINT,
            params: vec![
                ("LeagueID", NBA_LEAGUE_ID.to_string()),
                ("Season", season.to_string()),
                ("SeasonType", "Regular Season".to_string()),
            ],
        }
    }

    /// Players on a roster in `season`.
    pub fn all_players(season: &str) -> Self {
        Self {
            endpoint: ALL_PLAYERS_ENDPOINT,
            params: vec![
                ("LeagueID", NBA_LEAGUE_ID.to_string()),
                ("Season", season.to_string()),
                ("IsOnlyCurrentSeason", "1".to_string()),
            ],
        }
    }
}

/// Season label (`2023-24`) for the season `date` falls in. Seasons roll over
/// in October.
pub fn season_for(date: NaiveDate) -> String {
    let start = if date.month() >= 10 {
        date.year()
    } else {
        date.year() - 1
    };
    format!("{start}-{:02}", (start + 1).rem_euclid(100))
}

/// The upstream data source. Stages only see this trait, so tests can swap in
/// canned responses.
pub trait StatsApi {
    fn fetch(&self, request: &ApiRequest) -> Result<Value>;
}

impl<T: StatsApi + ?Sized> StatsApi for &T {
    fn fetch(&self, request: &ApiRequest) -> Result<Value> {
        (**self).fetch(request)
    }
}

pub struct NbaStatsClient {
    client: Client,
    base_url: String,
}

impl NbaStatsClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.http_timeout)
            .default_headers(default_headers())
            .build()?;
        Ok(Self {
            client,
            base_url: settings.stats_base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl StatsApi for NbaStatsClient {
    fn fetch(&self, request: &ApiRequest) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, request.endpoint);
        let resp = self.client.get(&url).query(&request.params).send()?;
        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            return Err(EtlError::Upstream {
                endpoint: request.endpoint.to_string(),
                status: status.as_u16(),
                body: truncate(&body, ERROR_BODY_LIMIT),
            });
        }
        Ok(serde_json::from_str::<Value>(body.trim())?)
    }
}

// stats.nba.com drops requests that do not look like they come from nba.com.
fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
        ),
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(REFERER, HeaderValue::from_static("https://www.nba.com/"));
    headers.insert(ORIGIN, HeaderValue::from_static("https://www.nba.com"));
    headers.insert(
        HeaderName::from_static("x-nba-stats-origin"),
        HeaderValue::from_static("stats"),
    );
    headers.insert(
        HeaderName::from_static("x-nba-stats-token"),
        HeaderValue::from_static("true"),
    );
    headers
}

fn truncate(body: &str, limit: usize) -> String {
    match body.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
