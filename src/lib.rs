//! Possession and plus/minus reconstruction for NBA play-by-play
//!
//! Turns raw play-by-play events into ordered game timelines, on-court
//! lineups, possessions and running plus/minus, and serves point-in-time
//! queries over the stored results.

pub mod batch;
pub mod clock;
pub mod data;
pub mod pipeline;
pub mod query;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Unique identifier for a game (NBA game ids keep their leading zeros)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GameId(pub String);

impl GameId {
    pub fn new(id: impl Into<String>) -> Self {
        GameId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a team
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(pub i64);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Team({})", self.0)
    }
}

/// Unique identifier for a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub i64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player({})", self.0)
    }
}

/// Kind of play-by-play action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MadeShot,
    MissedShot,
    FreeThrowMade,
    FreeThrowMissed,
    Rebound,
    Turnover,
    Foul,
    SubstitutionIn,
    SubstitutionOut,
    PeriodStart,
    PeriodEnd,
    JumpBall,
    Timeout,
    Violation,
    Other,
}

impl EventKind {
    pub const ALL: [EventKind; 15] = [
        EventKind::MadeShot,
        EventKind::MissedShot,
        EventKind::FreeThrowMade,
        EventKind::FreeThrowMissed,
        EventKind::Rebound,
        EventKind::Turnover,
        EventKind::Foul,
        EventKind::SubstitutionIn,
        EventKind::SubstitutionOut,
        EventKind::PeriodStart,
        EventKind::PeriodEnd,
        EventKind::JumpBall,
        EventKind::Timeout,
        EventKind::Violation,
        EventKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MadeShot => "made_shot",
            EventKind::MissedShot => "missed_shot",
            EventKind::FreeThrowMade => "free_throw_made",
            EventKind::FreeThrowMissed => "free_throw_missed",
            EventKind::Rebound => "rebound",
            EventKind::Turnover => "turnover",
            EventKind::Foul => "foul",
            EventKind::SubstitutionIn => "substitution_in",
            EventKind::SubstitutionOut => "substitution_out",
            EventKind::PeriodStart => "period_start",
            EventKind::PeriodEnd => "period_end",
            EventKind::JumpBall => "jump_ball",
            EventKind::Timeout => "timeout",
            EventKind::Violation => "violation",
            EventKind::Other => "other",
        }
    }

    /// Events that tell us which team has the ball
    pub fn is_ball_control(&self) -> bool {
        matches!(
            self,
            EventKind::MadeShot
                | EventKind::MissedShot
                | EventKind::FreeThrowMade
                | EventKind::FreeThrowMissed
                | EventKind::Rebound
                | EventKind::Turnover
        )
    }

    /// Events that prove the acting player is on the court
    pub fn is_participation(&self) -> bool {
        self.is_ball_control() || *self == EventKind::Foul
    }

    pub fn is_substitution(&self) -> bool {
        matches!(self, EventKind::SubstitutionIn | EventKind::SubstitutionOut)
    }

    pub fn is_free_throw(&self) -> bool {
        matches!(self, EventKind::FreeThrowMade | EventKind::FreeThrowMissed)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = CourtsideError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_lowercase().replace([' ', '-'], "_");
        let kind = match key.as_str() {
            "made_shot" | "field_goal_made" | "shot_made" => EventKind::MadeShot,
            "missed_shot" | "field_goal_missed" | "shot_missed" => EventKind::MissedShot,
            "free_throw_made" | "made_free_throw" => EventKind::FreeThrowMade,
            "free_throw_missed" | "missed_free_throw" => EventKind::FreeThrowMissed,
            "rebound" => EventKind::Rebound,
            "turnover" => EventKind::Turnover,
            "foul" => EventKind::Foul,
            "substitution_in" | "sub_in" => EventKind::SubstitutionIn,
            "substitution_out" | "sub_out" => EventKind::SubstitutionOut,
            "period_start" | "start_period" => EventKind::PeriodStart,
            "period_end" | "end_period" => EventKind::PeriodEnd,
            "jump_ball" | "jumpball" => EventKind::JumpBall,
            "timeout" => EventKind::Timeout,
            "violation" => EventKind::Violation,
            "other" => EventKind::Other,
            _ => return Err(CourtsideError::Parse(format!("unknown event type: {}", s))),
        };
        Ok(kind)
    }
}

/// One normalized play-by-play action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub game_id: GameId,
    /// Position in the source feed, used to break ties at equal elapsed time
    pub sequence: u32,
    pub period: u8,
    pub game_clock_seconds: f64,
    pub elapsed_game_seconds: f64,
    pub kind: EventKind,
    pub team_id: Option<TeamId>,
    pub player_id: Option<PlayerId>,
    pub points_scored: u8,
    /// Free throw awarded for a technical foul
    pub technical: bool,
    pub wall_clock: Option<DateTime<Utc>>,
    /// Clock was outside the period and had to be clamped
    pub clock_clamped: bool,
}

impl Event {
    pub fn is_scoring(&self) -> bool {
        self.points_scored > 0
    }
}

/// Processing outcome stored with each game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Ok,
    /// Written, but with data-quality warnings worth a look
    Flagged,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Ok => "ok",
            GameStatus::Flagged => "flagged",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "flagged" => GameStatus::Flagged,
            _ => GameStatus::Ok,
        }
    }
}

/// Bookkeeping row for a processed game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: GameId,
    pub game_date: Option<NaiveDate>,
    /// Feed format the events were read from
    pub source: String,
    pub teams: (TeamId, TeamId),
    pub final_score: (u32, u32),
    pub is_final: bool,
    pub status: GameStatus,
    pub warning_count: usize,
    pub processed_at: DateTime<Utc>,
}

/// Non-fatal data problems found while processing a game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataQualityWarning {
    ClockClamped {
        sequence: u32,
        period: u8,
        clock: f64,
    },
    MissingClock {
        sequence: u32,
    },
    InferredLineup {
        team_id: TeamId,
        period: u8,
        players: usize,
    },
    IncompleteLineup {
        team_id: TeamId,
        elapsed: f64,
        players: usize,
    },
    InferredPossessionBoundary {
        possession_number: u32,
        elapsed: f64,
    },
    OrphanScoringEvent {
        sequence: u32,
        team_id: TeamId,
        elapsed: f64,
    },
}

impl DataQualityWarning {
    /// Whether the warning marks the game as flagged. Inferred lineups and
    /// boundaries are routine for sparse feeds and only get recorded.
    pub fn flags_game(&self) -> bool {
        !matches!(
            self,
            DataQualityWarning::InferredLineup { .. }
                | DataQualityWarning::InferredPossessionBoundary { .. }
        )
    }
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQualityWarning::ClockClamped {
                sequence,
                period,
                clock,
            } => write!(
                f,
                "event #{} clock {:.1} out of range for period {}, clamped",
                sequence, clock, period
            ),
            DataQualityWarning::MissingClock { sequence } => {
                write!(f, "event #{} has no clock, carried from previous event", sequence)
            }
            DataQualityWarning::InferredLineup {
                team_id,
                period,
                players,
            } => write!(
                f,
                "{} lineup for period {} inferred from {} players",
                team_id, period, players
            ),
            DataQualityWarning::IncompleteLineup {
                team_id,
                elapsed,
                players,
            } => write!(
                f,
                "{} has {} players on court at {:.1}s",
                team_id, players, elapsed
            ),
            DataQualityWarning::InferredPossessionBoundary {
                possession_number,
                elapsed,
            } => write!(
                f,
                "possession {} closed by inference at {:.1}s",
                possession_number, elapsed
            ),
            DataQualityWarning::OrphanScoringEvent {
                sequence,
                team_id,
                elapsed,
            } => write!(
                f,
                "scoring event #{} at {:.1}s has no lineup for {}",
                sequence, elapsed, team_id
            ),
        }
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum CourtsideError {
    #[error("Game {game_id} could not be processed: {reason}")]
    GameProcessing { game_id: GameId, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown source format: {0}")]
    UnknownSource(String),

    #[error("Input for game {0} not found")]
    GameNotFound(GameId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl CourtsideError {
    pub fn game(game_id: &GameId, reason: impl Into<String>) -> Self {
        CourtsideError::GameProcessing {
            game_id: game_id.clone(),
            reason: reason.into(),
        }
    }

    /// Errors that abort a whole run rather than a single game
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CourtsideError::Database(_) | CourtsideError::Config(_) | CourtsideError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CourtsideError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub database_path: String,
    /// Root of `<date>/<game_id>.json` input files
    pub input_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Worker threads, 0 = one per core
    pub workers: usize,
    /// Per-game processing budget; slower games are failed without writing
    pub game_timeout_secs: u64,
    /// Rows fetched per page by lazy event queries
    pub page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data: DataConfig {
                database_path: "data/courtside.db".to_string(),
                input_dir: "data/raw".to_string(),
            },
            pipeline: PipelineConfig {
                workers: 0,
                game_timeout_secs: 60,
                page_size: 500,
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CourtsideError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| CourtsideError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CourtsideError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `COURTSIDE_*` environment overrides
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(path) = std::env::var("COURTSIDE_DATABASE_PATH") {
            self.data.database_path = path;
        }
        if let Ok(dir) = std::env::var("COURTSIDE_INPUT_DIR") {
            self.data.input_dir = dir;
        }
        if let Ok(workers) = std::env::var("COURTSIDE_WORKERS") {
            self.pipeline.workers = workers.parse().map_err(|_| {
                CourtsideError::Config(format!("COURTSIDE_WORKERS is not a number: {}", workers))
            })?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_round_trips_through_names() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert_eq!("Sub-In".parse::<EventKind>().unwrap(), EventKind::SubstitutionIn);
        assert!("alley_oop".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_ball_control_classification() {
        assert!(EventKind::Rebound.is_ball_control());
        assert!(!EventKind::Foul.is_ball_control());
        assert!(EventKind::Foul.is_participation());
        assert!(!EventKind::SubstitutionIn.is_participation());
    }

    #[test]
    fn test_config_toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.data.database_path, config.data.database_path);
        assert_eq!(parsed.pipeline.page_size, 500);
    }

    #[test]
    fn test_fatal_errors() {
        assert!(CourtsideError::Config("x".into()).is_fatal());
        assert!(!CourtsideError::game(&GameId::new("1"), "bad").is_fatal());
    }
}
