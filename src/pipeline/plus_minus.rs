//! Plus/minus accumulation
//!
//! Walks scoring events and lineup changes in time order, crediting points
//! to everyone on court. Emits a per-player timeline row whenever a
//! player's value or on-court status changes, and rolls up per-lineup
//! totals for the leaderboard.

use crate::pipeline::lineup::LineupSnapshot;
use crate::pipeline::normalize::NormalizedGame;
use crate::pipeline::possession::{Possession, PossessionResult};
use crate::pipeline::{possession_at, possession_for_score};
use crate::{DataQualityWarning, Event, GameId, PlayerId, TeamId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A player's running plus/minus at a point in the game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerPlusMinusSnapshot {
    pub game_id: GameId,
    /// Emission order within the game
    pub ordinal: u32,
    pub player_id: PlayerId,
    pub team_id: TeamId,
    pub elapsed_seconds: f64,
    pub on_court: bool,
    pub plus_minus: i32,
    pub possession_number: Option<u32>,
    pub wall_clock: Option<DateTime<Utc>>,
}

/// Totals for one five-man unit within a game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineupStats {
    pub game_id: GameId,
    pub team_id: TeamId,
    pub lineup_hash: String,
    pub player_ids: Vec<PlayerId>,
    pub seconds_on_court: f64,
    pub offensive_possessions: u32,
    pub defensive_possessions: u32,
    pub points_for: u32,
    pub points_against: u32,
}

impl LineupStats {
    pub fn plus_minus(&self) -> i64 {
        self.points_for as i64 - self.points_against as i64
    }

    /// Points scored per 100 offensive possessions
    pub fn offensive_rating(&self) -> f64 {
        per_100(self.points_for, self.offensive_possessions)
    }

    /// Points allowed per 100 defensive possessions
    pub fn defensive_rating(&self) -> f64 {
        per_100(self.points_against, self.defensive_possessions)
    }

    pub fn net_rating(&self) -> f64 {
        self.offensive_rating() - self.defensive_rating()
    }

    pub fn possessions(&self) -> u32 {
        self.offensive_possessions + self.defensive_possessions
    }
}

pub(crate) fn per_100(points: u32, possessions: u32) -> f64 {
    if possessions == 0 {
        0.0
    } else {
        points as f64 * 100.0 / possessions as f64
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlusMinusOutput {
    pub snapshots: Vec<PlayerPlusMinusSnapshot>,
    pub lineup_stats: Vec<LineupStats>,
    pub warnings: Vec<DataQualityWarning>,
}

/// Something that happens on the combined timeline
#[derive(Debug, Clone, Copy)]
enum Moment {
    /// Lineup snapshot index starts
    Lineup(usize),
    /// Scoring event index
    Score(usize),
}

/// Running plus/minus state for one game
pub struct PlusMinusAccumulator<'a> {
    game: &'a NormalizedGame,
    lineups: &'a [LineupSnapshot],
    possessions: &'a [Possession],
    /// Snapshot indices per team, in time order
    by_team: HashMap<TeamId, Vec<usize>>,
    running: HashMap<PlayerId, i32>,
    rows: Vec<PlayerPlusMinusSnapshot>,
    stats: BTreeMap<(TeamId, String), LineupStats>,
    warnings: Vec<DataQualityWarning>,
}

impl<'a> PlusMinusAccumulator<'a> {
    pub fn new(
        game: &'a NormalizedGame,
        lineups: &'a [LineupSnapshot],
        possessions: &'a [Possession],
    ) -> Self {
        let mut by_team: HashMap<TeamId, Vec<usize>> = HashMap::new();
        for (i, s) in lineups.iter().enumerate() {
            by_team.entry(s.team_id).or_default().push(i);
        }
        for indices in by_team.values_mut() {
            indices.sort_by(|&a, &b| {
                lineups[a]
                    .valid_from
                    .total_cmp(&lineups[b].valid_from)
                    .then(lineups[a].valid_from_sequence.cmp(&lineups[b].valid_from_sequence))
            });
        }

        PlusMinusAccumulator {
            game,
            lineups,
            possessions,
            by_team,
            running: HashMap::new(),
            rows: Vec::new(),
            stats: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    /// The unit on court for `team` at the event ordered `(t, sequence)`
    ///
    /// A snapshot also covers its own `valid_to`: either the next unit
    /// starts later in that instant, or it is the last one and a basket at
    /// the final buzzer still has a lineup.
    pub fn active_lineup(&self, team: TeamId, t: f64, sequence: u32) -> Option<&'a LineupSnapshot> {
        let lineups = self.lineups;
        let indices = self.by_team.get(&team)?;
        indices
            .iter()
            .rev()
            .map(|&i| &lineups[i])
            .find(|s| s.started_by(t, sequence))
            .filter(|s| s.valid_to.map_or(true, |to| t <= to))
    }

    pub fn run(&mut self) {
        let game = self.game;
        let mut timeline: Vec<(f64, u32, u8, usize, Moment)> = Vec::new();
        for (i, s) in self.lineups.iter().enumerate() {
            timeline.push((s.valid_from, s.valid_from_sequence, 0, i, Moment::Lineup(i)));
        }
        for (i, e) in game.events.iter().enumerate() {
            if e.is_scoring() && e.team_id.is_some() {
                timeline.push((e.elapsed_game_seconds, e.sequence, 1, i, Moment::Score(i)));
            }
        }
        // Event order; a unit taking the floor before an event lands first
        timeline.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
                .then(a.3.cmp(&b.3))
        });

        for (_, _, _, _, moment) in timeline {
            match moment {
                Moment::Lineup(i) => self.on_lineup_change(i),
                Moment::Score(i) => self.on_score(&game.events[i]),
            }
        }

        self.roll_up_lineups();
    }

    pub fn finish(self) -> PlusMinusOutput {
        PlusMinusOutput {
            snapshots: self.rows,
            lineup_stats: self.stats.into_values().collect(),
            warnings: self.warnings,
        }
    }

    fn on_lineup_change(&mut self, index: usize) {
        let lineups = self.lineups;
        let snapshot = &lineups[index];
        let t = snapshot.valid_from;

        let previous = self
            .by_team
            .get(&snapshot.team_id)
            .and_then(|indices| {
                let pos = indices.iter().position(|&i| i == index)?;
                pos.checked_sub(1).map(|p| indices[p])
            })
            .map(|i| &lineups[i]);

        let possession_number = possession_at(self.possessions, t);
        let wall_clock = self.wall_clock_at(t);

        if let Some(previous) = previous {
            for &player in &previous.player_ids {
                if !snapshot.has_player(player) {
                    let value = self.running.get(&player).copied().unwrap_or(0);
                    self.emit(player, snapshot.team_id, t, false, value, possession_number, wall_clock);
                }
            }
        }
        for &player in &snapshot.player_ids {
            if previous.map_or(true, |p| !p.has_player(player)) {
                let value = *self.running.entry(player).or_insert(0);
                self.emit(player, snapshot.team_id, t, true, value, possession_number, wall_clock);
            }
        }
    }

    fn on_score(&mut self, event: &Event) {
        let Some(scoring_team) = event.team_id else {
            return;
        };
        let t = event.elapsed_game_seconds;
        let points = event.points_scored as i32;
        let possession_number = possession_for_score(self.possessions, t, scoring_team);

        for (team, delta) in [
            (scoring_team, points),
            (self.game.opponent(scoring_team), -points),
        ] {
            let Some(lineup) = self.active_lineup(team, t, event.sequence) else {
                log::warn!(
                    "{}: no {} lineup at {:.1}s for scoring event #{}",
                    self.game.game_id,
                    team,
                    t,
                    event.sequence
                );
                self.warnings.push(DataQualityWarning::OrphanScoringEvent {
                    sequence: event.sequence,
                    team_id: team,
                    elapsed: t,
                });
                continue;
            };

            for &player in &lineup.player_ids {
                let value = self.running.entry(player).or_insert(0);
                *value += delta;
                let value = *value;
                self.emit(player, team, t, true, value, possession_number, event.wall_clock);
            }

            let stats = self.stats_for(lineup);
            if delta > 0 {
                stats.points_for += points as u32;
            } else {
                stats.points_against += points as u32;
            }
        }
    }

    /// Time on court and possession counts for every unit
    fn roll_up_lineups(&mut self) {
        let lineups = self.lineups;
        let end = self.game.final_elapsed();
        for snapshot in lineups {
            self.stats_for(snapshot).seconds_on_court += snapshot.duration(end);
        }

        // Technical free throw possessions split or interrupt a trip, so
        // they are not counted as trips of their own
        for possession in self.possessions {
            if possession.result == PossessionResult::TechnicalFreeThrows {
                continue;
            }
            // Units that check in at the possession's first instant play it
            let t = possession.start_elapsed_seconds;
            if let Some(lineup) = self.active_lineup(possession.offensive_team_id, t, u32::MAX) {
                self.stats_for(lineup).offensive_possessions += 1;
            }
            if let Some(lineup) = self.active_lineup(possession.defensive_team_id, t, u32::MAX) {
                self.stats_for(lineup).defensive_possessions += 1;
            }
        }
    }

    fn stats_for(&mut self, lineup: &LineupSnapshot) -> &mut LineupStats {
        self.stats
            .entry((lineup.team_id, lineup.lineup_hash.clone()))
            .or_insert_with(|| LineupStats {
                game_id: lineup.game_id.clone(),
                team_id: lineup.team_id,
                lineup_hash: lineup.lineup_hash.clone(),
                player_ids: lineup.player_ids.clone(),
                seconds_on_court: 0.0,
                offensive_possessions: 0,
                defensive_possessions: 0,
                points_for: 0,
                points_against: 0,
            })
    }

    /// Wall clock of the first event at or after `t`
    fn wall_clock_at(&self, t: f64) -> Option<DateTime<Utc>> {
        self.game
            .events
            .iter()
            .skip_while(|e| e.elapsed_game_seconds < t)
            .find_map(|e| e.wall_clock)
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &mut self,
        player: PlayerId,
        team: TeamId,
        t: f64,
        on_court: bool,
        plus_minus: i32,
        possession_number: Option<u32>,
        wall_clock: Option<DateTime<Utc>>,
    ) {
        self.rows.push(PlayerPlusMinusSnapshot {
            game_id: self.game.game_id.clone(),
            ordinal: self.rows.len() as u32,
            player_id: player,
            team_id: team,
            elapsed_seconds: t,
            on_court,
            plus_minus,
            possession_number,
            wall_clock,
        });
    }
}

/// Run the accumulator over a game's lineups and possessions
pub fn accumulate(
    game: &NormalizedGame,
    lineups: &[LineupSnapshot],
    possessions: &[Possession],
) -> PlusMinusOutput {
    let mut accumulator = PlusMinusAccumulator::new(game, lineups, possessions);
    accumulator.run();
    accumulator.finish()
}
