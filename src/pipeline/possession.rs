//! Possession segmentation
//!
//! Splits a normalized event stream into contiguous possessions. Each event
//! kind is routed to a handler; handlers share the open-possession state.

use crate::clock;
use crate::pipeline::normalize::NormalizedGame;
use crate::{CourtsideError, DataQualityWarning, Event, EventKind, GameId, TeamId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a possession ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PossessionResult {
    MadeBasket,
    MissedAndDefensiveRebound,
    Turnover,
    EndOfPeriod,
    EndOfGame,
    /// Ball changed hands without an explicit rebound or turnover
    InferredBoundary,
    /// Interrupted by, or consisting of, technical free throws
    TechnicalFreeThrows,
}

impl PossessionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            PossessionResult::MadeBasket => "made_basket",
            PossessionResult::MissedAndDefensiveRebound => "missed_and_defensive_rebound",
            PossessionResult::Turnover => "turnover",
            PossessionResult::EndOfPeriod => "end_of_period",
            PossessionResult::EndOfGame => "end_of_game",
            PossessionResult::InferredBoundary => "inferred_boundary",
            PossessionResult::TechnicalFreeThrows => "technical_free_throws",
        }
    }
}

impl fmt::Display for PossessionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PossessionResult {
    type Err = CourtsideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "made_basket" => Ok(PossessionResult::MadeBasket),
            "missed_and_defensive_rebound" => Ok(PossessionResult::MissedAndDefensiveRebound),
            "turnover" => Ok(PossessionResult::Turnover),
            "end_of_period" => Ok(PossessionResult::EndOfPeriod),
            "end_of_game" => Ok(PossessionResult::EndOfGame),
            "inferred_boundary" => Ok(PossessionResult::InferredBoundary),
            "technical_free_throws" => Ok(PossessionResult::TechnicalFreeThrows),
            other => Err(CourtsideError::Parse(format!(
                "unknown possession result: {}",
                other
            ))),
        }
    }
}

/// One team's uninterrupted control of the ball
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Possession {
    pub game_id: GameId,
    /// 1-based, in time order
    pub possession_number: u32,
    pub offensive_team_id: TeamId,
    pub defensive_team_id: TeamId,
    pub start_elapsed_seconds: f64,
    pub end_elapsed_seconds: f64,
    pub period: u8,
    pub points_scored: u32,
    pub result: PossessionResult,
}

impl Possession {
    pub fn duration_seconds(&self) -> f64 {
        self.end_elapsed_seconds - self.start_elapsed_seconds
    }

    /// Half-open containment, with zero-length possessions matching their instant
    pub fn contains(&self, t: f64) -> bool {
        if self.start_elapsed_seconds == self.end_elapsed_seconds {
            return t == self.start_elapsed_seconds;
        }
        self.start_elapsed_seconds <= t && t < self.end_elapsed_seconds
    }
}

#[derive(Debug, Clone, Default)]
pub struct PossessionOutput {
    pub possessions: Vec<Possession>,
    pub warnings: Vec<DataQualityWarning>,
}

#[derive(Debug, Clone)]
struct OpenPossession {
    offense: TeamId,
    start: f64,
    points: u32,
    /// Time of the last made shot or free throw; the opponent's next
    /// ball-control event ends the possession here
    made_at: Option<f64>,
    /// Last shot attempt missed, so an opposing rebound is defensive
    after_miss: bool,
}

type Handler<'a> = fn(&mut PossessionSegmenter<'a>, &Event, TeamId);

/// Possession state machine over a normalized game
pub struct PossessionSegmenter<'a> {
    game: &'a NormalizedGame,
    current_period: u8,
    /// Where the next possession of this period starts
    boundary: f64,
    open: Option<OpenPossession>,
    possessions: Vec<Possession>,
    warnings: Vec<DataQualityWarning>,
}

impl<'a> PossessionSegmenter<'a> {
    pub fn new(game: &'a NormalizedGame) -> Self {
        PossessionSegmenter {
            game,
            current_period: 0,
            boundary: 0.0,
            open: None,
            possessions: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Handler for ball-control kinds; everything else leaves possession alone
    fn handler_for(kind: EventKind) -> Option<Handler<'a>> {
        match kind {
            EventKind::MadeShot => Some(Self::on_made_shot),
            EventKind::MissedShot => Some(Self::on_missed_shot),
            EventKind::FreeThrowMade | EventKind::FreeThrowMissed => Some(Self::on_free_throw),
            EventKind::Rebound => Some(Self::on_rebound),
            EventKind::Turnover => Some(Self::on_turnover),
            EventKind::Foul
            | EventKind::SubstitutionIn
            | EventKind::SubstitutionOut
            | EventKind::PeriodStart
            | EventKind::PeriodEnd
            | EventKind::JumpBall
            | EventKind::Timeout
            | EventKind::Violation
            | EventKind::Other => None,
        }
    }

    pub fn run(&mut self) {
        let game = self.game;

        for event in &game.events {
            if event.period != self.current_period {
                if self.current_period != 0 {
                    self.end_period(clock::period_end_elapsed(self.current_period));
                }
                self.current_period = event.period;
                self.boundary = clock::period_start_elapsed(event.period);
            }

            if event.kind == EventKind::PeriodEnd {
                self.end_period(event.elapsed_game_seconds);
                continue;
            }

            let Some(handler) = Self::handler_for(event.kind) else {
                continue;
            };
            match event.team_id {
                Some(team) => handler(self, event, team),
                None => log::debug!(
                    "{}: {} #{} has no team, ignored for possessions",
                    game.game_id,
                    event.kind,
                    event.sequence
                ),
            }
        }
    }

    pub fn finish(mut self) -> PossessionOutput {
        // A live game keeps its current possession open; only a completed
        // made basket is known to have ended
        if let Some(made_at) = self.open.as_ref().and_then(|o| o.made_at) {
            self.close(made_at, PossessionResult::MadeBasket);
        }
        if let Some(open) = &self.open {
            log::debug!(
                "{}: possession for {} still open at end of feed",
                self.game.game_id,
                open.offense
            );
        }

        PossessionOutput {
            possessions: self.possessions,
            warnings: self.warnings,
        }
    }

    fn on_made_shot(&mut self, event: &Event, team: TeamId) {
        let t = event.elapsed_game_seconds;
        self.resolve_pending();
        self.ensure_offense(team, t);
        if let Some(open) = self.open.as_mut() {
            open.points += event.points_scored as u32;
            open.made_at = Some(t);
            open.after_miss = false;
        }
    }

    fn on_missed_shot(&mut self, event: &Event, team: TeamId) {
        self.resolve_pending();
        self.ensure_offense(team, event.elapsed_game_seconds);
        if let Some(open) = self.open.as_mut() {
            open.after_miss = true;
        }
    }

    fn on_free_throw(&mut self, event: &Event, team: TeamId) {
        if event.technical {
            self.on_technical_free_throw(event, team);
            return;
        }

        let t = event.elapsed_game_seconds;
        let continuing = self
            .open
            .as_ref()
            .map_or(false, |o| o.offense == team && o.made_at.is_some());
        if !continuing {
            self.resolve_pending();
            self.ensure_offense(team, t);
        }

        if let Some(open) = self.open.as_mut() {
            open.points += event.points_scored as u32;
            if event.kind == EventKind::FreeThrowMade {
                open.made_at = Some(t);
                open.after_miss = false;
            } else {
                open.made_at = None;
                open.after_miss = true;
            }
        }
    }

    /// Technical free throws never change who has the ball
    fn on_technical_free_throw(&mut self, event: &Event, team: TeamId) {
        let t = event.elapsed_game_seconds;
        let points = event.points_scored as u32;

        if self.open.as_ref().map_or(false, |o| o.offense != team) {
            self.resolve_pending();
        }
        if let Some(open) = self.open.as_mut() {
            if open.offense == team {
                open.points += points;
                return;
            }
        }
        let offense = self.open.as_ref().map(|o| o.offense);

        // Consecutive technicals at the same instant share one possession
        let merges = match (&self.open, self.possessions.last()) {
            (Some(open), Some(last)) => {
                open.start == t
                    && open.points == 0
                    && last.offensive_team_id == team
                    && last.result == PossessionResult::TechnicalFreeThrows
                    && last.start_elapsed_seconds == t
                    && last.end_elapsed_seconds == t
            }
            _ => false,
        };
        if merges {
            if let Some(last) = self.possessions.last_mut() {
                last.points_scored += points;
            }
            return;
        }

        if offense.is_some() {
            self.close(t, PossessionResult::TechnicalFreeThrows);
        }
        self.push_possession(team, t, t, points, PossessionResult::TechnicalFreeThrows);
        self.boundary = t;
        if let Some(offense) = offense {
            self.open_for(offense, t);
        }
    }

    fn on_rebound(&mut self, event: &Event, team: TeamId) {
        let t = event.elapsed_game_seconds;
        self.resolve_pending();

        let Some(open) = self.open.as_mut() else {
            self.ensure_offense(team, t);
            return;
        };

        if open.offense == team {
            open.after_miss = false;
        } else if open.after_miss {
            self.close(t, PossessionResult::MissedAndDefensiveRebound);
            self.open_for(team, t);
        } else {
            self.ensure_offense(team, t);
        }
    }

    fn on_turnover(&mut self, event: &Event, team: TeamId) {
        let t = event.elapsed_game_seconds;
        self.resolve_pending();
        self.ensure_offense(team, t);
        self.close(t, PossessionResult::Turnover);
        self.open_for(self.game.opponent(team), t);
    }

    /// End a possession left pending by a made basket
    fn resolve_pending(&mut self) {
        let Some((offense, made_at)) = self
            .open
            .as_ref()
            .and_then(|o| o.made_at.map(|m| (o.offense, m)))
        else {
            return;
        };
        self.close(made_at, PossessionResult::MadeBasket);
        self.open_for(self.game.opponent(offense), made_at);
    }

    /// Make `team` the offense, inferring a boundary if the other team had the ball
    fn ensure_offense(&mut self, team: TeamId, t: f64) {
        match &self.open {
            None => self.open_for(team, self.boundary),
            Some(open) if open.offense == team => {}
            Some(_) => {
                self.close(t, PossessionResult::InferredBoundary);
                self.open_for(team, t);
            }
        }
    }

    fn end_period(&mut self, end: f64) {
        if let Some((offense, made_at)) = self
            .open
            .as_ref()
            .and_then(|o| o.made_at.map(|m| (o.offense, m)))
        {
            self.close(made_at, PossessionResult::MadeBasket);
            if made_at < end {
                self.open_for(self.game.opponent(offense), made_at);
            }
        }

        let result = if self.game.is_final() && self.current_period == self.game.last_period() {
            PossessionResult::EndOfGame
        } else {
            PossessionResult::EndOfPeriod
        };
        if self.open.is_some() {
            self.close(end, result);
        }
        self.boundary = end;
    }

    fn open_for(&mut self, team: TeamId, start: f64) {
        self.open = Some(OpenPossession {
            offense: team,
            start,
            points: 0,
            made_at: None,
            after_miss: false,
        });
    }

    fn close(&mut self, end: f64, result: PossessionResult) {
        let Some(open) = self.open.take() else {
            return;
        };
        self.push_possession(open.offense, open.start, end.max(open.start), open.points, result);
        self.boundary = end.max(open.start);

        if result == PossessionResult::InferredBoundary {
            let possession_number = self.possessions.len() as u32;
            log::warn!(
                "{}: possession {} ended without a rebound or turnover at {:.1}s",
                self.game.game_id,
                possession_number,
                end
            );
            self.warnings
                .push(DataQualityWarning::InferredPossessionBoundary {
                    possession_number,
                    elapsed: end,
                });
        }
    }

    fn push_possession(
        &mut self,
        offense: TeamId,
        start: f64,
        end: f64,
        points: u32,
        result: PossessionResult,
    ) {
        self.possessions.push(Possession {
            game_id: self.game.game_id.clone(),
            possession_number: self.possessions.len() as u32 + 1,
            offensive_team_id: offense,
            defensive_team_id: self.game.opponent(offense),
            start_elapsed_seconds: start,
            end_elapsed_seconds: end,
            period: self.current_period,
            points_scored: points,
            result,
        });
    }
}

/// Run the segmenter over a game
pub fn segment_possessions(game: &NormalizedGame) -> PossessionOutput {
    let mut segmenter = PossessionSegmenter::new(game);
    segmenter.run();
    segmenter.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RawEvent;
    use crate::pipeline::normalize::normalize;

    const A: i64 = 1;
    const B: i64 = 2;

    fn segment(raw: Vec<RawEvent>) -> PossessionOutput {
        let game = normalize(&GameId::new("g"), raw).unwrap();
        segment_possessions(&game)
    }

    fn results(output: &PossessionOutput) -> Vec<PossessionResult> {
        output.possessions.iter().map(|p| p.result).collect()
    }

    #[test]
    fn test_basic_exchange() {
        let output = segment(vec![
            RawEvent::new(0, 1, 700.0, EventKind::MadeShot).team(A).player(10).points(2),
            RawEvent::new(1, 1, 680.0, EventKind::MissedShot).team(B).player(20),
            RawEvent::new(2, 1, 678.0, EventKind::Rebound).team(A).player(11),
            RawEvent::new(3, 1, 660.0, EventKind::Turnover).team(A).player(12),
            RawEvent::new(4, 1, 640.0, EventKind::MadeShot).team(B).player(21).points(3),
            RawEvent::new(5, 1, 0.0, EventKind::PeriodEnd),
        ]);

        assert_eq!(
            results(&output),
            vec![
                PossessionResult::MadeBasket,
                PossessionResult::MissedAndDefensiveRebound,
                PossessionResult::Turnover,
                PossessionResult::MadeBasket,
                PossessionResult::EndOfPeriod,
            ]
        );
        let p = &output.possessions;
        assert_eq!(p[0].start_elapsed_seconds, 0.0);
        assert_eq!(p[0].end_elapsed_seconds, 20.0);
        assert_eq!(p[0].points_scored, 2);
        assert_eq!(p[1].offensive_team_id, TeamId(B));
        assert_eq!(p[3].points_scored, 3);
        assert_eq!(p[4].offensive_team_id, TeamId(A));
        assert_eq!(p[4].end_elapsed_seconds, 720.0);
        for pair in p.windows(2) {
            assert_eq!(pair[0].end_elapsed_seconds, pair[1].start_elapsed_seconds);
        }
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_offensive_rebound_continues_possession() {
        let output = segment(vec![
            RawEvent::new(0, 1, 700.0, EventKind::MissedShot).team(A).player(10),
            RawEvent::new(1, 1, 698.0, EventKind::Rebound).team(A).player(11),
            RawEvent::new(2, 1, 690.0, EventKind::MadeShot).team(A).player(11).points(2),
            RawEvent::new(3, 1, 670.0, EventKind::MissedShot).team(B).player(20),
        ]);
        assert_eq!(output.possessions.len(), 1);
        assert_eq!(output.possessions[0].points_scored, 2);
        assert_eq!(output.possessions[0].end_elapsed_seconds, 30.0);
    }

    #[test]
    fn test_and_one_stays_in_possession() {
        let output = segment(vec![
            RawEvent::new(0, 1, 700.0, EventKind::MadeShot).team(A).player(10).points(2),
            RawEvent::new(1, 1, 700.0, EventKind::Foul).team(B).player(20),
            RawEvent::new(2, 1, 700.0, EventKind::FreeThrowMade).team(A).player(10).points(1),
            RawEvent::new(3, 1, 680.0, EventKind::MissedShot).team(B).player(21),
        ]);
        assert_eq!(output.possessions.len(), 1);
        assert_eq!(output.possessions[0].points_scored, 3);
        assert_eq!(output.possessions[0].result, PossessionResult::MadeBasket);
    }

    #[test]
    fn test_missed_last_free_throw_needs_rebound() {
        let output = segment(vec![
            RawEvent::new(0, 1, 700.0, EventKind::FreeThrowMade).team(A).player(10).points(1),
            RawEvent::new(1, 1, 700.0, EventKind::FreeThrowMissed).team(A).player(10),
            RawEvent::new(2, 1, 698.0, EventKind::Rebound).team(B).player(20),
            RawEvent::new(3, 1, 0.0, EventKind::PeriodEnd),
        ]);
        assert_eq!(
            results(&output),
            vec![
                PossessionResult::MissedAndDefensiveRebound,
                PossessionResult::EndOfPeriod
            ]
        );
        assert_eq!(output.possessions[0].points_scored, 1);
    }

    #[test]
    fn test_sparse_feed_infers_boundary() {
        let output = segment(vec![
            RawEvent::new(0, 1, 700.0, EventKind::MissedShot).team(A).player(10),
            RawEvent::new(1, 1, 680.0, EventKind::MissedShot).team(B).player(20),
        ]);
        assert_eq!(results(&output), vec![PossessionResult::InferredBoundary]);
        assert!(matches!(
            output.warnings[0],
            DataQualityWarning::InferredPossessionBoundary {
                possession_number: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_technical_free_throw_by_defense() {
        let output = segment(vec![
            RawEvent::new(0, 1, 700.0, EventKind::MissedShot).team(A).player(10),
            RawEvent::new(1, 1, 698.0, EventKind::Rebound).team(A).player(11),
            RawEvent::new(2, 1, 690.0, EventKind::FreeThrowMade).team(B).player(20).points(1).technical(),
            RawEvent::new(3, 1, 690.0, EventKind::FreeThrowMade).team(B).player(20).points(1).technical(),
            RawEvent::new(4, 1, 680.0, EventKind::MadeShot).team(A).player(10).points(2),
            RawEvent::new(5, 1, 0.0, EventKind::PeriodEnd),
        ]);

        let p = &output.possessions;
        assert_eq!(
            results(&output),
            vec![
                PossessionResult::TechnicalFreeThrows,
                PossessionResult::TechnicalFreeThrows,
                PossessionResult::MadeBasket,
                PossessionResult::EndOfPeriod,
            ]
        );
        assert_eq!(p[1].offensive_team_id, TeamId(B));
        assert_eq!(p[1].points_scored, 2);
        assert_eq!(p[1].duration_seconds(), 0.0);
        assert_eq!(p[2].offensive_team_id, TeamId(A));
        assert_eq!(p[2].start_elapsed_seconds, 30.0);
        assert_eq!(p[2].points_scored, 2);
    }

    #[test]
    fn test_technical_free_throw_by_offense_adds_points() {
        let output = segment(vec![
            RawEvent::new(0, 1, 700.0, EventKind::MissedShot).team(A).player(10),
            RawEvent::new(1, 1, 698.0, EventKind::Rebound).team(A).player(11),
            RawEvent::new(2, 1, 690.0, EventKind::Foul).team(B).player(20),
            RawEvent::new(3, 1, 690.0, EventKind::FreeThrowMade).team(A).player(10).points(1).technical(),
            RawEvent::new(4, 1, 0.0, EventKind::PeriodEnd),
        ]);
        assert_eq!(results(&output), vec![PossessionResult::EndOfPeriod]);
        assert_eq!(output.possessions[0].offensive_team_id, TeamId(A));
        assert_eq!(output.possessions[0].points_scored, 1);
    }

    #[test]
    fn test_final_period_ends_game() {
        let output = segment(vec![
            RawEvent::new(0, 4, 10.0, EventKind::MissedShot).team(A).player(10),
            RawEvent::new(1, 4, 0.0, EventKind::MadeShot).team(B).player(20).points(2),
            RawEvent::new(2, 4, 0.0, EventKind::PeriodEnd),
        ]);
        // Buzzer basket: nothing opens after it
        assert_eq!(
            results(&output),
            vec![PossessionResult::InferredBoundary, PossessionResult::MadeBasket]
        );
        assert_eq!(output.possessions[1].end_elapsed_seconds, 2880.0);

        let output = segment(vec![
            RawEvent::new(0, 4, 10.0, EventKind::MadeShot).team(A).player(10).points(2),
            RawEvent::new(1, 4, 5.0, EventKind::Foul).team(B).player(20),
            RawEvent::new(2, 4, 0.0, EventKind::PeriodEnd),
        ]);
        assert_eq!(
            results(&output),
            vec![PossessionResult::MadeBasket, PossessionResult::EndOfGame]
        );
        assert_eq!(output.possessions[1].offensive_team_id, TeamId(B));
    }

    #[test]
    fn test_missing_period_end_closes_at_period_boundary() {
        let output = segment(vec![
            RawEvent::new(0, 1, 100.0, EventKind::MissedShot).team(A).player(10),
            RawEvent::new(1, 2, 700.0, EventKind::MissedShot).team(B).player(20),
        ]);
        let p = &output.possessions;
        assert_eq!(p[0].result, PossessionResult::EndOfPeriod);
        assert_eq!(p[0].end_elapsed_seconds, 720.0);
        assert_eq!(p[0].period, 1);
    }

    #[test]
    fn test_points_conserved() {
        let output = segment(vec![
            RawEvent::new(0, 1, 700.0, EventKind::MadeShot).team(A).player(10).points(3),
            RawEvent::new(1, 1, 690.0, EventKind::FreeThrowMade).team(B).player(20).points(1),
            RawEvent::new(2, 1, 690.0, EventKind::FreeThrowMade).team(B).player(20).points(1),
            RawEvent::new(3, 1, 680.0, EventKind::FreeThrowMade).team(A).player(10).points(1).technical(),
            RawEvent::new(4, 1, 670.0, EventKind::MadeShot).team(A).player(11).points(2),
            RawEvent::new(5, 4, 0.0, EventKind::PeriodEnd),
        ]);
        let total = |team: i64| -> u32 {
            output
                .possessions
                .iter()
                .filter(|p| p.offensive_team_id == TeamId(team))
                .map(|p| p.points_scored)
                .sum()
        };
        assert_eq!(total(A), 6);
        assert_eq!(total(B), 2);
    }

    #[test]
    fn test_result_names_parse() {
        assert_eq!(
            "inferred_boundary".parse::<PossessionResult>().unwrap(),
            PossessionResult::InferredBoundary
        );
        assert!("buzzer".parse::<PossessionResult>().is_err());
    }
}
