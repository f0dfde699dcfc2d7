//! ESPN play-by-play feed
//!
//! Maps the `plays` array of the ESPN game summary document. Play types
//! are free text (`"Driving Layup Shot"`, `"Free Throw - 2 of 2"`), so the
//! mapping goes by keyword.

use super::{value_as_i64, RawEvent, SourceAdapter, SourceFormat};
use crate::clock::parse_clock;
use crate::{CourtsideError, EventKind, GameId, PlayerId, Result, TeamId};
use chrono::{DateTime, Utc};
use serde_json::Value;

pub struct EspnAdapter;

impl EspnAdapter {
    /// Map an ESPN play type onto an event kind
    pub fn classify(type_text: &str, scoring: bool, shooting: bool) -> EventKind {
        let text = type_text.to_lowercase();

        if text.contains("free throw") {
            return if scoring {
                EventKind::FreeThrowMade
            } else {
                EventKind::FreeThrowMissed
            };
        }
        if text.contains("end period") || text.contains("end game") {
            return EventKind::PeriodEnd;
        }
        if text.contains("start period") || text.contains("start game") {
            return EventKind::PeriodStart;
        }
        if text.contains("substitution") {
            return EventKind::SubstitutionIn;
        }
        if text.contains("rebound") {
            return EventKind::Rebound;
        }
        if text.contains("turnover")
            || text.contains("traveling")
            || text.contains("lost ball")
            || text.contains("bad pass")
        {
            return EventKind::Turnover;
        }
        if text.contains("foul") {
            return EventKind::Foul;
        }
        if text.contains("timeout") {
            return EventKind::Timeout;
        }
        if text.contains("violation") {
            return EventKind::Violation;
        }
        if text.contains("jumpball") || text.contains("jump ball") {
            return EventKind::JumpBall;
        }
        if shooting
            || text.contains("shot")
            || text.contains("layup")
            || text.contains("dunk")
            || text.contains("tip")
        {
            return if scoring {
                EventKind::MadeShot
            } else {
                EventKind::MissedShot
            };
        }
        EventKind::Other
    }

    fn athlete(play: &Value, index: usize) -> Option<PlayerId> {
        play.get("participants")?
            .get(index)?
            .get("athlete")?
            .get("id")
            .and_then(value_as_i64)
            .map(PlayerId)
    }

    /// One play as raw events; `source_order` is assigned by the caller
    fn map_play(&self, play: &Value) -> Vec<RawEvent> {
        let type_text = play
            .pointer("/type/text")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let scoring = play
            .get("scoringPlay")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let shooting = play
            .get("shootingPlay")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let kind = Self::classify(type_text, scoring, shooting);
        let period = play
            .pointer("/period/number")
            .and_then(value_as_i64)
            .and_then(|p| u8::try_from(p).ok());
        let clock = play
            .pointer("/clock/displayValue")
            .and_then(Value::as_str)
            .and_then(parse_clock);
        let team_id = play.pointer("/team/id").and_then(value_as_i64).map(TeamId);
        let wall_clock = play
            .get("wallclock")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc));
        let points_scored = if scoring {
            play.get("scoreValue")
                .and_then(value_as_i64)
                .and_then(|v| u8::try_from(v).ok())
                .unwrap_or(0)
        } else {
            0
        };

        let base = RawEvent {
            source_order: 0,
            period,
            game_clock_seconds: clock,
            kind,
            team_id,
            player_id: Self::athlete(play, 0),
            points_scored,
            technical: kind.is_free_throw() && type_text.to_lowercase().contains("technical"),
            wall_clock,
        };

        if kind == EventKind::SubstitutionIn {
            // "X enters the game for Y": participants are [entering, leaving]
            let leaving = RawEvent {
                kind: EventKind::SubstitutionOut,
                player_id: Self::athlete(play, 1),
                ..base.clone()
            };
            return vec![leaving, base];
        }

        vec![base]
    }
}

impl SourceAdapter for EspnAdapter {
    fn format(&self) -> SourceFormat {
        SourceFormat::Espn
    }

    fn parse(&self, game_id: &GameId, document: &Value) -> Result<Vec<RawEvent>> {
        let plays = document
            .get("plays")
            .and_then(Value::as_array)
            .ok_or_else(|| CourtsideError::game(game_id, "ESPN document has no plays array"))?;

        let mut events = Vec::with_capacity(plays.len());
        for play in plays {
            for mut event in self.map_play(play) {
                event.source_order = events.len() as u32;
                events.push(event);
            }
        }
        Ok(events)
    }
}
