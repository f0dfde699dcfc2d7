//! Play-by-play source adapters
//!
//! Every feed is mapped onto [`RawEvent`] here; nothing past the normalizer
//! knows which feed an event came from.

pub mod canonical;
pub mod espn;
pub mod nba_api;

use crate::{CourtsideError, EventKind, GameId, PlayerId, Result, TeamId};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Feed shape of a game file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// JSON array of rows carrying the contract fields directly
    Canonical,
    /// ESPN summary JSON with a `plays` array
    Espn,
    /// stats.nba.com `playbyplayv2` result sets
    NbaApi,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Canonical => "canonical",
            SourceFormat::Espn => "espn",
            SourceFormat::NbaApi => "nba-api",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceFormat {
    type Err = CourtsideError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "canonical" | "rows" => Ok(SourceFormat::Canonical),
            "espn" => Ok(SourceFormat::Espn),
            "nba-api" | "nba" | "stats" => Ok(SourceFormat::NbaApi),
            _ => Err(CourtsideError::UnknownSource(s.to_string())),
        }
    }
}

/// One event as read from a feed, before clock normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// Position in the feed
    pub source_order: u32,
    pub period: Option<u8>,
    /// Seconds remaining in the period
    pub game_clock_seconds: Option<f64>,
    pub kind: EventKind,
    pub team_id: Option<TeamId>,
    pub player_id: Option<PlayerId>,
    pub points_scored: u8,
    pub technical: bool,
    pub wall_clock: Option<DateTime<Utc>>,
}

impl RawEvent {
    pub fn new(source_order: u32, period: u8, clock: f64, kind: EventKind) -> Self {
        RawEvent {
            source_order,
            period: Some(period),
            game_clock_seconds: Some(clock),
            kind,
            team_id: None,
            player_id: None,
            points_scored: 0,
            technical: false,
            wall_clock: None,
        }
    }

    pub fn team(mut self, team: i64) -> Self {
        self.team_id = Some(TeamId(team));
        self
    }

    pub fn player(mut self, player: i64) -> Self {
        self.player_id = Some(PlayerId(player));
        self
    }

    pub fn points(mut self, points: u8) -> Self {
        self.points_scored = points;
        self
    }

    pub fn technical(mut self) -> Self {
        self.technical = true;
        self
    }
}

/// Trait for all feed adapters
pub trait SourceAdapter {
    /// The feed shape this adapter understands
    fn format(&self) -> SourceFormat;

    /// Map a parsed game document onto raw events
    fn parse(&self, game_id: &GameId, document: &Value) -> Result<Vec<RawEvent>>;
}

/// Guess the feed shape from the document structure
pub fn detect_format(document: &Value) -> Option<SourceFormat> {
    match document {
        Value::Array(_) => Some(SourceFormat::Canonical),
        Value::Object(map) if map.contains_key("plays") => Some(SourceFormat::Espn),
        Value::Object(map) if map.contains_key("resultSets") => Some(SourceFormat::NbaApi),
        Value::Object(map) if map.contains_key("events") => Some(SourceFormat::Canonical),
        _ => None,
    }
}

pub fn adapter_for(format: SourceFormat) -> Box<dyn SourceAdapter + Send + Sync> {
    match format {
        SourceFormat::Canonical => Box::new(canonical::CanonicalAdapter),
        SourceFormat::Espn => Box::new(espn::EspnAdapter),
        SourceFormat::NbaApi => Box::new(nba_api::NbaApiAdapter),
    }
}

/// Parse a game document, auto-detecting the feed unless `format` is given
pub fn parse_document(
    game_id: &GameId,
    document: &Value,
    format: Option<SourceFormat>,
) -> Result<(SourceFormat, Vec<RawEvent>)> {
    let format = match format.or_else(|| detect_format(document)) {
        Some(f) => f,
        None => {
            return Err(CourtsideError::game(
                game_id,
                "unrecognised document shape, pass --source",
            ))
        }
    };
    let events = adapter_for(format).parse(game_id, document)?;
    log::debug!("{}: {} raw events from {} feed", game_id, events.len(), format);
    Ok((format, events))
}

/// Read and parse one game file
pub fn load_game_file<P: AsRef<Path>>(
    path: P,
    game_id: &GameId,
    format: Option<SourceFormat>,
) -> Result<(SourceFormat, Vec<RawEvent>)> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let document: Value = serde_json::from_str(&text)
        .map_err(|e| CourtsideError::game(game_id, format!("invalid JSON: {}", e)))?;
    parse_document(game_id, &document, format)
}

/// Inclusive range of game dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

impl FromStr for DateRange {
    type Err = CourtsideError;

    /// `2024-01-01..2024-01-31`, `2024-01-01:2024-01-31` or a single date
    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| {
            NaiveDate::parse_from_str(part.trim(), "%Y-%m-%d")
                .map_err(|e| CourtsideError::Parse(format!("bad date '{}': {}", part, e)))
        };
        let (start, end) = match s.split_once("..").or_else(|| s.split_once(':')) {
            Some((a, b)) => (parse(a)?, parse(b)?),
            None => {
                let d = parse(s)?;
                (d, d)
            }
        };
        if end < start {
            return Err(CourtsideError::Parse(format!(
                "date range ends before it starts: {}",
                s
            )));
        }
        Ok(DateRange { start, end })
    }
}

/// A game file located in the input directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameInput {
    pub game_id: GameId,
    pub game_date: NaiveDate,
    pub path: PathBuf,
}

/// Input directory laid out as `<root>/<YYYY-MM-DD>/<game_id>.json`
pub struct InputDir {
    root: PathBuf,
}

impl InputDir {
    /// Open the input root; a missing root is a configuration error
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(CourtsideError::Config(format!(
                "input directory {} does not exist",
                root.display()
            )));
        }
        Ok(InputDir { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All games, sorted by date then id
    pub fn all_games(&self) -> Result<Vec<GameInput>> {
        let mut games = Vec::new();

        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(date) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| NaiveDate::parse_from_str(n, "%Y-%m-%d").ok())
            else {
                log::debug!("Skipping non-date directory {}", path.display());
                continue;
            };

            for file in std::fs::read_dir(&path)? {
                let file = file?.path();
                if file.extension().map(|e| e == "json").unwrap_or(false) {
                    if let Some(stem) = file.file_stem().and_then(|s| s.to_str()) {
                        games.push(GameInput {
                            game_id: GameId::new(stem),
                            game_date: date,
                            path: file.clone(),
                        });
                    }
                }
            }
        }

        games.sort_by(|a, b| (a.game_date, &a.game_id).cmp(&(b.game_date, &b.game_id)));
        Ok(games)
    }

    pub fn games_in_range(&self, range: DateRange) -> Result<Vec<GameInput>> {
        Ok(self
            .all_games()?
            .into_iter()
            .filter(|g| range.contains(g.game_date))
            .collect())
    }

    pub fn find_game(&self, game_id: &GameId) -> Result<GameInput> {
        self.all_games()?
            .into_iter()
            .find(|g| &g.game_id == game_id)
            .ok_or_else(|| CourtsideError::GameNotFound(game_id.clone()))
    }
}

/// Read an integer id that may be encoded as a number or a string
pub(crate) fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
