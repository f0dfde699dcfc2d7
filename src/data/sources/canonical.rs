//! Canonical row feed
//!
//! Rows already carry the contract fields (`game_id`, `period`,
//! `game_clock_seconds`, `event_type`, `team_id`, `player_id`,
//! `points_scored`). This is the shape written by the ETL exporters.

use super::{RawEvent, SourceAdapter, SourceFormat};
use crate::clock::parse_clock;
use crate::{CourtsideError, EventKind, GameId, PlayerId, Result, TeamId};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// One row of the canonical feed
#[derive(Debug, Clone, Deserialize)]
pub struct CanonicalRow {
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default)]
    pub period: Option<u8>,
    #[serde(default)]
    pub game_clock_seconds: Option<f64>,
    /// Display clock, used when `game_clock_seconds` is absent
    #[serde(default)]
    pub clock: Option<String>,
    pub event_type: String,
    #[serde(default)]
    pub team_id: Option<i64>,
    #[serde(default)]
    pub player_id: Option<i64>,
    #[serde(default)]
    pub points_scored: Option<u8>,
    #[serde(default)]
    pub technical: Option<bool>,
    #[serde(default)]
    pub wall_clock: Option<DateTime<Utc>>,
}

pub struct CanonicalAdapter;

impl CanonicalAdapter {
    fn to_raw(&self, index: usize, row: CanonicalRow) -> Result<RawEvent> {
        let kind: EventKind = row.event_type.parse()?;
        let game_clock_seconds = row
            .game_clock_seconds
            .or_else(|| row.clock.as_deref().and_then(parse_clock));

        Ok(RawEvent {
            source_order: index as u32,
            period: row.period,
            game_clock_seconds,
            kind,
            team_id: row.team_id.map(TeamId),
            player_id: row.player_id.map(PlayerId),
            points_scored: row.points_scored.unwrap_or(0),
            technical: row.technical.unwrap_or(false),
            wall_clock: row.wall_clock,
        })
    }
}

impl SourceAdapter for CanonicalAdapter {
    fn format(&self) -> SourceFormat {
        SourceFormat::Canonical
    }

    fn parse(&self, game_id: &GameId, document: &Value) -> Result<Vec<RawEvent>> {
        let rows = match document {
            Value::Array(rows) => rows,
            Value::Object(map) => match map.get("events") {
                Some(Value::Array(rows)) => rows,
                _ => return Err(CourtsideError::game(game_id, "expected an `events` array")),
            },
            _ => return Err(CourtsideError::game(game_id, "expected an array of rows")),
        };

        let mut events = Vec::with_capacity(rows.len());
        for (index, value) in rows.iter().enumerate() {
            let row: CanonicalRow = serde_json::from_value(value.clone()).map_err(|e| {
                CourtsideError::game(game_id, format!("row {} is malformed: {}", index, e))
            })?;

            if let Some(row_game) = row.game_id.as_deref() {
                if row_game != game_id.as_str() {
                    log::warn!(
                        "{}: skipping row {} belonging to game {}",
                        game_id,
                        index,
                        row_game
                    );
                    continue;
                }
            }

            let event = self
                .to_raw(index, row)
                .map_err(|e| CourtsideError::game(game_id, format!("row {}: {}", index, e)))?;
            events.push(event);
        }

        Ok(events)
    }
}
