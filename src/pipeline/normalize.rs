//! Event stream normalization
//!
//! Converts per-period countdown clocks into monotonic elapsed seconds and
//! orders a game's events deterministically.

use crate::clock;
use crate::data::RawEvent;
use crate::{CourtsideError, DataQualityWarning, Event, EventKind, GameId, Result, TeamId};
use std::collections::BTreeSet;

/// A game's ordered event stream
#[derive(Debug, Clone)]
pub struct NormalizedGame {
    pub game_id: GameId,
    /// The two teams, lower id first
    pub teams: (TeamId, TeamId),
    pub events: Vec<Event>,
    pub warnings: Vec<DataQualityWarning>,
}

impl NormalizedGame {
    /// The other team in the game
    pub fn opponent(&self, team: TeamId) -> TeamId {
        if team == self.teams.0 {
            self.teams.1
        } else {
            self.teams.0
        }
    }

    pub fn last_period(&self) -> u8 {
        self.events.last().map(|e| e.period).unwrap_or(1)
    }

    /// A game is final once its feed ends with the end of period 4 or later
    pub fn is_final(&self) -> bool {
        self.events.last().map_or(false, |e| {
            e.kind == EventKind::PeriodEnd && e.period >= clock::REGULATION_PERIODS
        })
    }

    pub fn final_elapsed(&self) -> f64 {
        self.events
            .last()
            .map(|e| e.elapsed_game_seconds)
            .unwrap_or(0.0)
    }

    /// Total points per team according to the scoring events
    pub fn scoreboard(&self) -> (u32, u32) {
        self.events
            .iter()
            .fold((0, 0), |(home, away), e| match e.team_id {
                Some(t) if t == self.teams.0 => (home + e.points_scored as u32, away),
                Some(t) if t == self.teams.1 => (home, away + e.points_scored as u32),
                _ => (home, away),
            })
    }
}

/// Normalize one game's raw events
///
/// Data problems that can be repaired (clamped clocks, single missing
/// clocks) become warnings; a stream that cannot be ordered at all, or
/// that does not name exactly two teams, fails the game.
pub fn normalize(game_id: &GameId, raw: Vec<RawEvent>) -> Result<NormalizedGame> {
    if raw.is_empty() {
        return Err(CourtsideError::game(game_id, "no events"));
    }
    if raw.iter().all(|e| e.game_clock_seconds.is_none()) {
        return Err(CourtsideError::game(game_id, "no event carries a game clock"));
    }
    if raw.iter().all(|e| e.period.is_none()) {
        return Err(CourtsideError::game(game_id, "no event carries a period"));
    }
    if raw.iter().any(|e| e.period == Some(0)) {
        return Err(CourtsideError::game(game_id, "period numbers are 1-based"));
    }

    let teams: BTreeSet<TeamId> = raw.iter().filter_map(|e| e.team_id).collect();
    let teams: Vec<TeamId> = teams.into_iter().collect();
    let teams = match teams.as_slice() {
        [a, b] => (*a, *b),
        _ => {
            return Err(CourtsideError::game(
                game_id,
                format!("expected 2 teams, found {}", teams.len()),
            ))
        }
    };

    // Feed order is the tie-breaker, so fix it before anything moves
    let mut raw = raw;
    raw.sort_by_key(|e| e.source_order);

    let mut warnings = Vec::new();
    let mut events = Vec::with_capacity(raw.len());
    let mut previous: Option<(u8, f64)> = None;

    for (sequence, r) in raw.into_iter().enumerate() {
        let sequence = sequence as u32;

        let period = match (r.period, previous) {
            (Some(p), _) => p,
            (None, Some((p, _))) => p,
            (None, None) => 1,
        };

        let (clock_value, clamped) = match r.game_clock_seconds {
            Some(c) => {
                let (clamped_value, moved) = clock::clamp_clock(period, c);
                if moved {
                    log::warn!(
                        "{}: event #{} clock {} outside period {}, clamped to {}",
                        game_id,
                        sequence,
                        c,
                        period,
                        clamped_value
                    );
                    warnings.push(DataQualityWarning::ClockClamped {
                        sequence,
                        period,
                        clock: c,
                    });
                }
                (clamped_value, moved)
            }
            None => {
                log::warn!("{}: event #{} has no clock", game_id, sequence);
                warnings.push(DataQualityWarning::MissingClock { sequence });
                let carried = match previous {
                    Some((p, c)) if p == period => c,
                    _ => clock::period_length(period),
                };
                (carried, false)
            }
        };
        previous = Some((period, clock_value));

        events.push(Event {
            game_id: game_id.clone(),
            sequence,
            period,
            game_clock_seconds: clock_value,
            elapsed_game_seconds: clock::elapsed_seconds(period, clock_value),
            kind: r.kind,
            team_id: r.team_id,
            player_id: r.player_id,
            points_scored: r.points_scored,
            technical: r.technical,
            wall_clock: r.wall_clock,
            clock_clamped: clamped,
        });
    }

    // Stable: equal elapsed times keep feed order, nothing is deduplicated
    events.sort_by(|a, b| {
        a.elapsed_game_seconds
            .total_cmp(&b.elapsed_game_seconds)
            .then(a.sequence.cmp(&b.sequence))
    });

    log::debug!(
        "{}: normalized {} events, {} warnings",
        game_id,
        events.len(),
        warnings.len()
    );

    Ok(NormalizedGame {
        game_id: game_id.clone(),
        teams,
        events,
        warnings,
    })
}
