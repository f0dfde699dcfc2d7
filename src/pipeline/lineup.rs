//! Lineup state tracking
//!
//! Maintains the five players on court for each team and records a
//! [`LineupSnapshot`] every time the unit changes.

use crate::clock;
use crate::pipeline::normalize::NormalizedGame;
use crate::{DataQualityWarning, Event, EventKind, GameId, PlayerId, TeamId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

pub const PLAYERS_ON_COURT: usize = 5;

/// The unit on court for one team over `[valid_from, valid_to)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineupSnapshot {
    pub game_id: GameId,
    pub team_id: TeamId,
    /// Sorted player ids joined with `-`
    pub lineup_hash: String,
    /// Sorted, distinct
    pub player_ids: Vec<PlayerId>,
    pub valid_from: f64,
    /// Sequence of the event the unit takes the floor before; events at
    /// `valid_from` ordered ahead of it still belong to the previous unit
    pub valid_from_sequence: u32,
    /// `None` while the unit is still on court
    pub valid_to: Option<f64>,
    /// Possession active at `valid_from`
    pub possession_number: Option<u32>,
    /// Players were deduced from period activity rather than substitutions
    pub inferred: bool,
    /// Not exactly five players could be determined
    pub incomplete_lineup: bool,
}

impl LineupSnapshot {
    /// Whether the unit had taken the floor by the event at `(t, sequence)`
    pub fn started_by(&self, t: f64, sequence: u32) -> bool {
        self.valid_from < t || (self.valid_from == t && self.valid_from_sequence <= sequence)
    }

    pub fn has_player(&self, player: PlayerId) -> bool {
        self.player_ids.binary_search(&player).is_ok()
    }

    /// Seconds on court, measuring an open snapshot up to `now`
    pub fn duration(&self, now: f64) -> f64 {
        (self.valid_to.unwrap_or(now) - self.valid_from).max(0.0)
    }
}

/// Canonical fingerprint of a set of players
pub fn lineup_hash(players: &BTreeSet<PlayerId>) -> String {
    players
        .iter()
        .map(|p| p.0.to_string())
        .collect::<Vec<_>>()
        .join("-")
}

/// Snapshots and warnings for one game
#[derive(Debug, Clone, Default)]
pub struct LineupOutput {
    pub snapshots: Vec<LineupSnapshot>,
    pub warnings: Vec<DataQualityWarning>,
}

/// Substitutions for one team at one instant, applied together
#[derive(Debug, Clone)]
struct SubstitutionBatch {
    elapsed: f64,
    /// Sequence of the batch's first substitution
    sequence: u32,
    outgoing: Vec<PlayerId>,
    incoming: Vec<PlayerId>,
}

#[derive(Debug, Default)]
struct TeamState {
    on_court: BTreeSet<PlayerId>,
    /// Index of the open snapshot
    open: Option<usize>,
    pending: Option<SubstitutionBatch>,
}

/// Who was on court when a period started, read from the period's events
#[derive(Debug, Default)]
struct PeriodEvidence {
    starters: Vec<PlayerId>,
    /// Subbed in before showing any sign of being on court
    entered: HashSet<PlayerId>,
}

impl PeriodEvidence {
    /// Whether `carried` contradicts what the period shows
    fn contradicts(&self, carried: &BTreeSet<PlayerId>) -> bool {
        self.starters.iter().any(|p| !carried.contains(p))
            || self.entered.iter().any(|p| carried.contains(p))
    }
}

/// Lineup state machine over a normalized game
pub struct LineupTracker<'a> {
    game: &'a NormalizedGame,
    states: HashMap<TeamId, TeamState>,
    snapshots: Vec<LineupSnapshot>,
    warnings: Vec<DataQualityWarning>,
}

impl<'a> LineupTracker<'a> {
    pub fn new(game: &'a NormalizedGame) -> Self {
        let mut states = HashMap::new();
        states.insert(game.teams.0, TeamState::default());
        states.insert(game.teams.1, TeamState::default());

        LineupTracker {
            game,
            states,
            snapshots: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Consume the whole event stream
    pub fn run(&mut self) {
        let game = self.game;
        let mut current_period = 0u8;

        for (index, event) in game.events.iter().enumerate() {
            if event.period != current_period {
                self.flush_all();
                current_period = event.period;
                self.start_period(current_period, index);
            }

            self.flush_before(event.elapsed_game_seconds);

            if event.kind.is_substitution() {
                match (event.team_id, event.player_id) {
                    (Some(team), Some(player)) => self.queue_substitution(team, event, player),
                    _ => log::warn!(
                        "{}: substitution #{} without team or player ignored",
                        game.game_id,
                        event.sequence
                    ),
                }
            } else {
                self.check_participant(event);
            }
        }

        self.flush_all();
    }

    /// Close out the game and hand back the snapshots
    pub fn finish(mut self) -> LineupOutput {
        if self.game.is_final() {
            let end = self.game.final_elapsed();
            for state in self.states.values_mut() {
                if let Some(i) = state.open.take() {
                    self.snapshots[i].valid_to = Some(end.max(self.snapshots[i].valid_from));
                }
            }
        }

        LineupOutput {
            snapshots: self.snapshots,
            warnings: self.warnings,
        }
    }

    fn queue_substitution(&mut self, team: TeamId, event: &Event, player: PlayerId) {
        let t = event.elapsed_game_seconds;
        let needs_flush = self
            .states
            .get(&team)
            .and_then(|s| s.pending.as_ref())
            .map_or(false, |b| b.elapsed != t);
        if needs_flush {
            self.flush(team);
        }

        let Some(state) = self.states.get_mut(&team) else {
            return;
        };
        let batch = state.pending.get_or_insert_with(|| SubstitutionBatch {
            elapsed: t,
            sequence: event.sequence,
            outgoing: Vec::new(),
            incoming: Vec::new(),
        });
        match event.kind {
            EventKind::SubstitutionOut => batch.outgoing.push(player),
            _ => batch.incoming.push(player),
        }
    }

    fn flush_before(&mut self, t: f64) {
        let due: Vec<TeamId> = self
            .states
            .iter()
            .filter(|(_, s)| s.pending.as_ref().map_or(false, |b| b.elapsed < t))
            .map(|(team, _)| *team)
            .collect();
        for team in due {
            self.flush(team);
        }
    }

    fn flush_all(&mut self) {
        for team in [self.game.teams.0, self.game.teams.1] {
            self.flush(team);
        }
    }

    /// Apply a team's pending substitutions as one lineup change
    fn flush(&mut self, team: TeamId) {
        let Some(state) = self.states.get_mut(&team) else {
            return;
        };
        let Some(batch) = state.pending.take() else {
            return;
        };

        let mut players = state.on_court.clone();
        for p in &batch.outgoing {
            if !players.remove(p) {
                log::debug!(
                    "{}: {} subbed out at {:.1}s but was not on court",
                    self.game.game_id,
                    p,
                    batch.elapsed
                );
            }
        }
        for p in &batch.incoming {
            if !players.insert(*p) {
                log::debug!(
                    "{}: {} subbed in at {:.1}s but was already on court",
                    self.game.game_id,
                    p,
                    batch.elapsed
                );
            }
        }

        self.open_snapshot(team, batch.elapsed, batch.sequence, players, false);
    }

    /// Re-establish each team's lineup at the start of a period
    fn start_period(&mut self, period: u8, from: usize) {
        let t = clock::period_start_elapsed(period);
        let sequence = self.game.events.get(from).map_or(0, |e| e.sequence);

        for team in [self.game.teams.0, self.game.teams.1] {
            let evidence = self.period_evidence(team, period, from);
            let known = self
                .states
                .get(&team)
                .filter(|s| s.open.is_some())
                .map(|s| s.on_court.clone());

            let players: BTreeSet<PlayerId> = match known {
                // Nothing to go on: leave the team without a lineup
                None if evidence.starters.is_empty() => continue,
                None => evidence.starters.iter().copied().collect(),
                Some(current) => {
                    if !evidence.contradicts(&current) {
                        continue;
                    }
                    // The carried unit is stale: keep what the period proves,
                    // top up from the carried unit minus anyone who enters later
                    let mut players: BTreeSet<PlayerId> =
                        evidence.starters.iter().copied().collect();
                    for p in &current {
                        if players.len() >= PLAYERS_ON_COURT {
                            break;
                        }
                        if !evidence.entered.contains(p) {
                            players.insert(*p);
                        }
                    }
                    players
                }
            };

            log::warn!(
                "{}: inferred {} lineup for period {} from {} players",
                self.game.game_id,
                team,
                period,
                players.len()
            );
            self.warnings.push(DataQualityWarning::InferredLineup {
                team_id: team,
                period,
                players: players.len(),
            });
            self.open_snapshot(team, t, sequence, players, true);
        }
    }

    /// Scan a period for players proven to be on court at its start
    fn period_evidence(&self, team: TeamId, period: u8, from: usize) -> PeriodEvidence {
        let mut evidence = PeriodEvidence::default();

        for e in &self.game.events[from..] {
            if e.period != period {
                break;
            }
            if e.team_id != Some(team) {
                continue;
            }
            let Some(player) = e.player_id else {
                continue;
            };

            let proves_on_court = match e.kind {
                EventKind::SubstitutionIn => {
                    if !evidence.starters.contains(&player) {
                        evidence.entered.insert(player);
                    }
                    false
                }
                EventKind::SubstitutionOut => true,
                kind => kind.is_participation(),
            };

            if proves_on_court
                && !evidence.entered.contains(&player)
                && !evidence.starters.contains(&player)
            {
                evidence.starters.push(player);
                if evidence.starters.len() == PLAYERS_ON_COURT {
                    break;
                }
            }
        }

        evidence
    }

    fn check_participant(&self, event: &Event) {
        if !event.kind.is_participation() {
            return;
        }
        if let (Some(team), Some(player)) = (event.team_id, event.player_id) {
            let on_court = self
                .states
                .get(&team)
                .map_or(false, |s| s.on_court.contains(&player));
            if !on_court {
                log::debug!(
                    "{}: {} acted at {:.1}s while not in the tracked lineup",
                    self.game.game_id,
                    player,
                    event.elapsed_game_seconds
                );
            }
        }
    }

    /// Make `players` the team's unit from `t` on
    fn open_snapshot(
        &mut self,
        team: TeamId,
        t: f64,
        sequence: u32,
        players: BTreeSet<PlayerId>,
        inferred: bool,
    ) {
        let incomplete = players.len() != PLAYERS_ON_COURT;
        let Some(state) = self.states.get_mut(&team) else {
            return;
        };
        state.on_court = players.clone();

        let player_ids: Vec<PlayerId> = players.iter().copied().collect();
        let hash = lineup_hash(&players);

        if let Some(i) = state.open {
            let open = &mut self.snapshots[i];
            if open.player_ids == player_ids {
                return;
            }
            if open.valid_from == t {
                // Same instant: amend rather than leave a zero-length unit
                open.player_ids = player_ids;
                open.lineup_hash = hash;
                open.inferred |= inferred;
                open.incomplete_lineup = incomplete;
                if incomplete {
                    Self::warn_incomplete(&self.game.game_id, &mut self.warnings, team, t, players.len());
                }
                return;
            }
            open.valid_to = Some(t);
        }

        if incomplete {
            Self::warn_incomplete(&self.game.game_id, &mut self.warnings, team, t, players.len());
        }

        self.snapshots.push(LineupSnapshot {
            game_id: self.game.game_id.clone(),
            team_id: team,
            lineup_hash: hash,
            player_ids,
            valid_from: t,
            valid_from_sequence: sequence,
            valid_to: None,
            possession_number: None,
            inferred,
            incomplete_lineup: incomplete,
        });
        state.open = Some(self.snapshots.len() - 1);
    }

    fn warn_incomplete(
        game_id: &GameId,
        warnings: &mut Vec<DataQualityWarning>,
        team: TeamId,
        t: f64,
        players: usize,
    ) {
        log::warn!(
            "{}: {} has {} players on court at {:.1}s",
            game_id,
            team,
            players,
            t
        );
        warnings.push(DataQualityWarning::IncompleteLineup {
            team_id: team,
            elapsed: t,
            players,
        });
    }
}

/// Run the tracker over a game
pub fn track_lineups(game: &NormalizedGame) -> LineupOutput {
    let mut tracker = LineupTracker::new(game);
    tracker.run();
    tracker.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RawEvent;
    use crate::pipeline::normalize::normalize;

    const X: i64 = 1;
    const Y: i64 = 2;

    fn game_of(raw: Vec<RawEvent>) -> NormalizedGame {
        normalize(&GameId::new("g"), raw).unwrap()
    }

    fn for_team(output: &LineupOutput, team: i64) -> Vec<&LineupSnapshot> {
        output
            .snapshots
            .iter()
            .filter(|s| s.team_id == TeamId(team))
            .collect()
    }

    fn ids(v: &[i64]) -> Vec<PlayerId> {
        v.iter().map(|&p| PlayerId(p)).collect()
    }

    #[test]
    fn test_single_substitution_splits_lineup() {
        // 10 events over 4 periods, player 1 replaced by 6 at 300s
        let raw = vec![
            RawEvent::new(0, 1, 700.0, EventKind::MadeShot).team(X).player(2).points(2),
            RawEvent::new(1, 1, 690.0, EventKind::MissedShot).team(Y).player(21),
            RawEvent::new(2, 1, 689.0, EventKind::Rebound).team(X).player(3),
            RawEvent::new(3, 1, 650.0, EventKind::Foul).team(X).player(4),
            RawEvent::new(4, 1, 600.0, EventKind::MadeShot).team(X).player(5).points(3),
            RawEvent::new(5, 1, 420.0, EventKind::SubstitutionOut).team(X).player(1),
            RawEvent::new(6, 1, 420.0, EventKind::SubstitutionIn).team(X).player(6),
            RawEvent::new(7, 2, 500.0, EventKind::MissedShot).team(Y).player(22),
            RawEvent::new(8, 3, 400.0, EventKind::Turnover).team(Y).player(23),
            RawEvent::new(9, 4, 0.0, EventKind::PeriodEnd),
        ];
        let game = game_of(raw);
        let output = track_lineups(&game);
        let x = for_team(&output, X);

        assert_eq!(x.len(), 2);
        assert_eq!(x[0].player_ids, ids(&[1, 2, 3, 4, 5]));
        assert_eq!(x[0].valid_from, 0.0);
        assert_eq!(x[0].valid_to, Some(300.0));
        assert!(x[0].inferred);
        assert_eq!(x[1].player_ids, ids(&[2, 3, 4, 5, 6]));
        assert_eq!(x[1].valid_from, 300.0);
        assert_eq!(x[1].valid_to, Some(2880.0));
        assert!(!x[1].inferred);
        assert!(!x[1].incomplete_lineup);
    }

    #[test]
    fn test_live_game_leaves_last_snapshot_open() {
        let raw = vec![
            RawEvent::new(0, 1, 700.0, EventKind::MadeShot).team(X).player(1).points(2),
            RawEvent::new(1, 1, 690.0, EventKind::MissedShot).team(Y).player(21),
        ];
        let output = track_lineups(&game_of(raw));
        assert!(output.snapshots.iter().all(|s| s.valid_to.is_none()));
    }

    #[test]
    fn test_short_evidence_flags_incomplete() {
        let raw = vec![
            RawEvent::new(0, 1, 700.0, EventKind::MadeShot).team(X).player(1).points(2),
            RawEvent::new(1, 1, 690.0, EventKind::MissedShot).team(Y).player(21),
        ];
        let output = track_lineups(&game_of(raw));
        let x = for_team(&output, X);
        assert_eq!(x.len(), 1);
        assert!(x[0].incomplete_lineup);
        assert!(output
            .warnings
            .iter()
            .any(|w| matches!(w, DataQualityWarning::IncompleteLineup { players: 1, .. })));
    }

    #[test]
    fn test_simultaneous_substitutions_are_one_change() {
        let mut raw = vec![];
        for (i, p) in [1, 2, 3, 4, 5].iter().enumerate() {
            raw.push(RawEvent::new(i as u32, 1, 700.0 - i as f64, EventKind::Foul).team(X).player(*p));
        }
        raw.push(RawEvent::new(5, 1, 690.0, EventKind::MissedShot).team(Y).player(21));
        raw.push(RawEvent::new(6, 1, 500.0, EventKind::SubstitutionOut).team(X).player(1));
        raw.push(RawEvent::new(7, 1, 500.0, EventKind::SubstitutionIn).team(X).player(6));
        raw.push(RawEvent::new(8, 1, 500.0, EventKind::FreeThrowMade).team(Y).player(21).points(1));
        raw.push(RawEvent::new(9, 1, 500.0, EventKind::SubstitutionOut).team(X).player(2));
        raw.push(RawEvent::new(10, 1, 500.0, EventKind::SubstitutionIn).team(X).player(7));
        raw.push(RawEvent::new(11, 1, 450.0, EventKind::MissedShot).team(X).player(6));

        let output = track_lineups(&game_of(raw));
        let x = for_team(&output, X);
        assert_eq!(x.len(), 2);
        assert_eq!(x[1].valid_from, 220.0);
        assert_eq!(x[1].player_ids, ids(&[3, 4, 5, 6, 7]));
    }

    #[test]
    fn test_stale_lineup_replaced_at_period_start() {
        let mut raw = vec![];
        for (i, p) in [1, 2, 3, 4, 5].iter().enumerate() {
            raw.push(RawEvent::new(i as u32, 1, 700.0 - i as f64, EventKind::Foul).team(X).player(*p));
        }
        raw.push(RawEvent::new(5, 1, 690.0, EventKind::MissedShot).team(Y).player(21));
        // Period 2 opens with 8 and 9 active, and 9 later leaves for 1
        raw.push(RawEvent::new(6, 2, 700.0, EventKind::MadeShot).team(X).player(8).points(2));
        raw.push(RawEvent::new(7, 2, 650.0, EventKind::SubstitutionOut).team(X).player(9));
        raw.push(RawEvent::new(8, 2, 650.0, EventKind::SubstitutionIn).team(X).player(1));

        let output = track_lineups(&game_of(raw));
        let x = for_team(&output, X);
        assert_eq!(x.len(), 3);
        assert_eq!(x[0].valid_to, Some(720.0));
        assert_eq!(x[1].valid_from, 720.0);
        assert!(x[1].inferred);
        // 8 and 9 proven; 2, 3, 4 carried (1 enters later so it was off)
        assert_eq!(x[1].player_ids, ids(&[2, 3, 4, 8, 9]));
        assert_eq!(x[2].player_ids, ids(&[1, 2, 3, 4, 8]));
    }

    #[test]
    fn test_returning_player_was_off_at_period_start() {
        let mut raw = vec![];
        for (i, p) in [1, 2, 3, 4, 5].iter().enumerate() {
            raw.push(RawEvent::new(i as u32, 1, 700.0 - i as f64, EventKind::Foul).team(X).player(*p));
        }
        raw.push(RawEvent::new(5, 1, 690.0, EventKind::MissedShot).team(Y).player(21));
        // 5 left during the break without a logged substitution and comes back for 1
        raw.push(RawEvent::new(6, 2, 700.0, EventKind::MadeShot).team(X).player(2).points(2));
        raw.push(RawEvent::new(7, 2, 650.0, EventKind::SubstitutionOut).team(X).player(1));
        raw.push(RawEvent::new(8, 2, 650.0, EventKind::SubstitutionIn).team(X).player(5));

        let output = track_lineups(&game_of(raw));
        let x = for_team(&output, X);
        assert_eq!(x.len(), 3);
        assert_eq!(x[1].valid_from, 720.0);
        assert!(x[1].inferred);
        assert_eq!(x[1].player_ids, ids(&[1, 2, 3, 4]));
        assert!(x[1].incomplete_lineup);
        assert_eq!(x[2].player_ids, ids(&[2, 3, 4, 5]));
    }

    #[test]
    fn test_starter_who_leaves_and_returns_keeps_the_lineup() {
        let mut raw = vec![];
        for (i, p) in [1, 2, 3, 4, 5].iter().enumerate() {
            raw.push(RawEvent::new(i as u32, 1, 700.0 - i as f64, EventKind::Foul).team(X).player(*p));
        }
        raw.push(RawEvent::new(5, 1, 690.0, EventKind::MissedShot).team(Y).player(21));
        raw.push(RawEvent::new(6, 2, 650.0, EventKind::SubstitutionOut).team(X).player(5));
        raw.push(RawEvent::new(7, 2, 650.0, EventKind::SubstitutionIn).team(X).player(6));
        raw.push(RawEvent::new(8, 2, 600.0, EventKind::SubstitutionOut).team(X).player(6));
        raw.push(RawEvent::new(9, 2, 600.0, EventKind::SubstitutionIn).team(X).player(5));

        let output = track_lineups(&game_of(raw));
        let x = for_team(&output, X);
        assert_eq!(x.len(), 3);
        assert!(!x[1].inferred);
        assert_eq!(x[2].player_ids, ids(&[1, 2, 3, 4, 5]));
        assert!(!output
            .warnings
            .iter()
            .any(|w| matches!(w, DataQualityWarning::InferredLineup { period: 2, .. })));
    }

    #[test]
    fn test_batch_takes_effect_at_its_first_substitution() {
        let raw = vec![
            RawEvent::new(0, 1, 700.0, EventKind::MadeShot).team(X).player(1).points(2),
            RawEvent::new(1, 1, 690.0, EventKind::MissedShot).team(Y).player(21),
            RawEvent::new(2, 1, 420.0, EventKind::MadeShot).team(X).player(1).points(2),
            RawEvent::new(3, 1, 420.0, EventKind::SubstitutionOut).team(X).player(1),
            RawEvent::new(4, 1, 420.0, EventKind::SubstitutionIn).team(X).player(6),
        ];
        let output = track_lineups(&game_of(raw));
        let x = for_team(&output, X);
        assert_eq!(x[0].valid_from_sequence, 0);
        assert_eq!(x[1].valid_from, 300.0);
        assert_eq!(x[1].valid_from_sequence, 3);
    }

    #[test]
    fn test_unchanged_lineup_carries_across_periods() {
        let mut raw = vec![];
        for (i, p) in [1, 2, 3, 4, 5].iter().enumerate() {
            raw.push(RawEvent::new(i as u32, 1, 700.0 - i as f64, EventKind::Foul).team(X).player(*p));
        }
        raw.push(RawEvent::new(5, 1, 690.0, EventKind::MissedShot).team(Y).player(21));
        raw.push(RawEvent::new(6, 2, 700.0, EventKind::MadeShot).team(X).player(3).points(2));

        let output = track_lineups(&game_of(raw));
        assert_eq!(for_team(&output, X).len(), 1);
    }

    #[test]
    fn test_snapshots_are_contiguous() {
        let raw = vec![
            RawEvent::new(0, 1, 700.0, EventKind::MadeShot).team(X).player(1).points(2),
            RawEvent::new(1, 1, 690.0, EventKind::MissedShot).team(Y).player(21),
            RawEvent::new(2, 1, 600.0, EventKind::SubstitutionOut).team(X).player(1),
            RawEvent::new(3, 1, 600.0, EventKind::SubstitutionIn).team(X).player(6),
            RawEvent::new(4, 1, 500.0, EventKind::SubstitutionOut).team(X).player(6),
            RawEvent::new(5, 1, 500.0, EventKind::SubstitutionIn).team(X).player(1),
            RawEvent::new(6, 4, 0.0, EventKind::PeriodEnd),
        ];
        let output = track_lineups(&game_of(raw));
        let x = for_team(&output, X);
        assert_eq!(x.len(), 3);
        for pair in x.windows(2) {
            assert_eq!(pair[0].valid_to, Some(pair[1].valid_from));
        }
        assert_eq!(x.last().unwrap().valid_to, Some(2880.0));
    }

    #[test]
    fn test_started_by_and_hash() {
        let players: BTreeSet<PlayerId> = ids(&[5, 1, 3]).into_iter().collect();
        assert_eq!(lineup_hash(&players), "1-3-5");

        let snapshot = LineupSnapshot {
            game_id: GameId::new("g"),
            team_id: TeamId(X),
            lineup_hash: "1-3-5".into(),
            player_ids: ids(&[1, 3, 5]),
            valid_from: 10.0,
            valid_from_sequence: 4,
            valid_to: Some(20.0),
            possession_number: None,
            inferred: false,
            incomplete_lineup: true,
        };
        assert!(snapshot.started_by(10.0, 4));
        assert!(!snapshot.started_by(10.0, 3));
        assert!(snapshot.has_player(PlayerId(3)));
        assert_eq!(snapshot.duration(100.0), 10.0);
    }
}
