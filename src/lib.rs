pub mod error;
pub mod games;
pub mod logging;
pub mod player_game_stats;
pub mod players;
pub mod result_set;
pub mod settings;
pub mod shot_tracking;
pub mod snapshot;
pub mod stage;
pub mod stats_api;
pub mod teams;
pub mod warehouse;

pub use error::{EtlError, Result};
pub use stage::{EtlContext, StageSummary};
