//! Per-game reconstruction pipeline
//!
//! normalize -> lineups + possessions -> plus/minus. Each stage is a pure
//! function of the previous stage's output, so a game can be reprocessed
//! from its raw events at any time with identical results.

pub mod lineup;
pub mod normalize;
pub mod plus_minus;
pub mod possession;

pub use lineup::{track_lineups, LineupSnapshot};
pub use normalize::{normalize, NormalizedGame};
pub use plus_minus::{accumulate, LineupStats, PlayerPlusMinusSnapshot};
pub use possession::{segment_possessions, Possession, PossessionResult};

use crate::data::RawEvent;
use crate::{CourtsideError, DataQualityWarning, Event, GameId, PlayerId, Result, TeamId};
use std::collections::HashMap;

/// Everything derived for one game
#[derive(Debug, Clone)]
pub struct GameOutput {
    pub game_id: GameId,
    pub teams: (TeamId, TeamId),
    pub is_final: bool,
    pub final_score: (u32, u32),
    pub events: Vec<Event>,
    pub lineups: Vec<LineupSnapshot>,
    pub possessions: Vec<Possession>,
    pub plus_minus: Vec<PlayerPlusMinusSnapshot>,
    pub lineup_stats: Vec<LineupStats>,
    pub warnings: Vec<DataQualityWarning>,
}

impl GameOutput {
    /// Whether any warning marks the game as flagged
    pub fn is_flagged(&self) -> bool {
        self.warnings.iter().any(DataQualityWarning::flags_game)
    }

    /// Consistency checks over the derived rows; an empty list means the
    /// game can be written
    pub fn check_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();

        for pair in self.events.windows(2) {
            if pair[1].elapsed_game_seconds < pair[0].elapsed_game_seconds {
                violations.push(format!(
                    "event #{} goes back in time from {:.1}s to {:.1}s",
                    pair[1].sequence, pair[0].elapsed_game_seconds, pair[1].elapsed_game_seconds
                ));
            }
        }

        for team in [self.teams.0, self.teams.1] {
            self.check_lineup_coverage(team, &mut violations);
        }

        let mut by_period: HashMap<u8, Vec<&Possession>> = HashMap::new();
        for p in &self.possessions {
            by_period.entry(p.period).or_default().push(p);
        }
        for (period, possessions) in &by_period {
            for pair in possessions.windows(2) {
                if pair[0].end_elapsed_seconds != pair[1].start_elapsed_seconds {
                    violations.push(format!(
                        "possessions {} and {} leave a gap in period {}",
                        pair[0].possession_number, pair[1].possession_number, period
                    ));
                }
            }
        }

        if self.is_final {
            let points = |team: TeamId| -> u32 {
                self.possessions
                    .iter()
                    .filter(|p| p.offensive_team_id == team)
                    .map(|p| p.points_scored)
                    .sum()
            };
            let counted = (points(self.teams.0), points(self.teams.1));
            if counted != self.final_score {
                violations.push(format!(
                    "possessions account for {}-{} but the final score is {}-{}",
                    counted.0, counted.1, self.final_score.0, self.final_score.1
                ));
            }
        }

        let complete = !self.lineups.iter().any(|l| l.incomplete_lineup)
            && !self
                .warnings
                .iter()
                .any(|w| matches!(w, DataQualityWarning::OrphanScoringEvent { .. }));
        if complete {
            let mut last: HashMap<PlayerId, i32> = HashMap::new();
            for row in &self.plus_minus {
                last.insert(row.player_id, row.plus_minus);
            }
            let total: i32 = last.values().sum();
            if total != 0 {
                violations.push(format!("plus/minus sums to {} instead of 0", total));
            }
        }

        violations
    }

    fn check_lineup_coverage(&self, team: TeamId, violations: &mut Vec<String>) {
        let lineups: Vec<&LineupSnapshot> =
            self.lineups.iter().filter(|l| l.team_id == team).collect();

        for pair in lineups.windows(2) {
            if pair[0].incomplete_lineup || pair[1].incomplete_lineup {
                continue;
            }
            if pair[0].valid_to != Some(pair[1].valid_from) {
                violations.push(format!(
                    "{} lineups {} and {} are not contiguous at {:.1}s",
                    team, pair[0].lineup_hash, pair[1].lineup_hash, pair[1].valid_from
                ));
            }
        }

        let open = lineups.iter().filter(|l| l.valid_to.is_none()).count();
        if open > 1 || (open == 1 && lineups.last().map_or(false, |l| l.valid_to.is_some())) {
            violations.push(format!("{} has an open lineup before its last one", team));
        }
        if self.is_final && open > 0 {
            violations.push(format!("{} lineup left open in a final game", team));
        }
    }
}

/// Number of the last possession starting at or before `t`
pub fn possession_at(possessions: &[Possession], t: f64) -> Option<u32> {
    possessions
        .iter()
        .rev()
        .find(|p| p.start_elapsed_seconds <= t)
        .map(|p| p.possession_number)
}

/// Possession a score at `t` by `team` belongs to
///
/// Prefers a possession of the scoring team covering `t`; a made basket
/// ends its possession at the instant of the score, so the end is inclusive
/// here.
pub fn possession_for_score(possessions: &[Possession], t: f64, team: TeamId) -> Option<u32> {
    possessions
        .iter()
        .rev()
        .find(|p| {
            p.offensive_team_id == team
                && p.start_elapsed_seconds <= t
                && t <= p.end_elapsed_seconds
        })
        .map(|p| p.possession_number)
        .or_else(|| possession_at(possessions, t))
}

/// Stamp each lineup with the possession active when it took the floor
fn assign_possessions(lineups: &mut [LineupSnapshot], possessions: &[Possession]) {
    for lineup in lineups.iter_mut() {
        lineup.possession_number = possession_at(possessions, lineup.valid_from);
    }
}

/// Run the full pipeline for one game
pub fn process_game(game_id: &GameId, raw: Vec<RawEvent>) -> Result<GameOutput> {
    let game = normalize(game_id, raw)?;

    let lineups = track_lineups(&game);
    let possessions = segment_possessions(&game);

    let mut snapshots = lineups.snapshots;
    assign_possessions(&mut snapshots, &possessions.possessions);

    let plus_minus = accumulate(&game, &snapshots, &possessions.possessions);

    let mut warnings = game.warnings.clone();
    warnings.extend(lineups.warnings);
    warnings.extend(possessions.warnings);
    warnings.extend(plus_minus.warnings);

    log::debug!(
        "{}: {} events, {} lineups, {} possessions, {} plus/minus rows, through period {}",
        game_id,
        game.events.len(),
        snapshots.len(),
        possessions.possessions.len(),
        plus_minus.snapshots.len(),
        game.last_period()
    );

    Ok(GameOutput {
        game_id: game_id.clone(),
        teams: game.teams,
        is_final: game.is_final(),
        final_score: game.scoreboard(),
        events: game.events,
        lineups: snapshots,
        possessions: possessions.possessions,
        plus_minus: plus_minus.snapshots,
        lineup_stats: plus_minus.lineup_stats,
        warnings,
    })
}

/// Run the pipeline and reject the game if its output is inconsistent
pub fn process_game_checked(game_id: &GameId, raw: Vec<RawEvent>) -> Result<GameOutput> {
    let output = process_game(game_id, raw)?;
    let violations = output.check_invariants();
    if !violations.is_empty() {
        for v in &violations {
            log::error!("{}: {}", game_id, v);
        }
        return Err(CourtsideError::game(
            game_id,
            format!("{} consistency violations: {}", violations.len(), violations[0]),
        ));
    }
    Ok(output)
}
