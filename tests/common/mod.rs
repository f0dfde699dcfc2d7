//! Synthetic play-by-play for integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use courtside::data::RawEvent;
use courtside::EventKind;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;

pub const HOME: i64 = 1610612737;
pub const AWAY: i64 = 1610612738;

/// A scripted game that only produces legal basketball sequences
pub struct GameScript {
    rng: StdRng,
    events: Vec<RawEvent>,
    period: u8,
    clock: f64,
    on_court: [Vec<i64>; 2],
    bench: [Vec<i64>; 2],
    score: [u32; 2],
    /// What each player's plus/minus really is, from the script's own lineups
    plus_minus: HashMap<i64, i32>,
    tip_off: DateTime<Utc>,
    /// Starters only show up through play, as in real feeds
    sparse: bool,
    /// Substitutions share the clock of the play before them
    same_clock_subs: bool,
}

/// A played script with what it knows to be true
pub struct ScriptedGame {
    pub events: Vec<RawEvent>,
    pub score: (u32, u32),
    pub plus_minus: HashMap<i64, i32>,
}

impl GameScript {
    pub fn new(seed: u64) -> Self {
        GameScript {
            rng: StdRng::seed_from_u64(seed),
            events: Vec::new(),
            period: 1,
            clock: 720.0,
            on_court: [(101..=105).collect(), (201..=205).collect()],
            bench: [(106..=110).collect(), (206..=210).collect()],
            score: [0, 0],
            plus_minus: HashMap::new(),
            tip_off: Utc.with_ymd_and_hms(2024, 1, 15, 0, 30, 0).unwrap(),
            sparse: false,
            same_clock_subs: false,
        }
    }

    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    pub fn same_clock_subs(mut self) -> Self {
        self.same_clock_subs = true;
        self
    }

    fn team_id(side: usize) -> i64 {
        if side == 0 {
            HOME
        } else {
            AWAY
        }
    }

    fn elapsed(&self) -> f64 {
        courtside::clock::elapsed_seconds(self.period, self.clock)
    }

    fn push(&mut self, kind: EventKind, side: Option<usize>, player: Option<i64>, points: u8) {
        let mut event = RawEvent::new(self.events.len() as u32, self.period, self.clock, kind);
        if let Some(side) = side {
            event = event.team(Self::team_id(side));
        }
        if let Some(player) = player {
            event = event.player(player);
        }
        event = event.points(points);
        // Broadcast time runs at twice game time
        let wall = self.tip_off + Duration::milliseconds((self.elapsed() * 2000.0) as i64);
        event.wall_clock = Some(wall);
        if let Some(side) = side {
            self.score[side] += points as u32;
            if points > 0 {
                for (team, delta) in [(side, points as i32), (1 - side, -(points as i32))] {
                    for &p in &self.on_court[team] {
                        *self.plus_minus.entry(p).or_insert(0) += delta;
                    }
                }
            }
        }
        self.events.push(event);
    }

    fn tick(&mut self, min: u32, max: u32) {
        let step = self.rng.gen_range(min..=max) as f64;
        self.clock = (self.clock - step).max(0.0);
    }

    fn pick(&mut self, side: usize) -> i64 {
        *self.on_court[side].choose(&mut self.rng).unwrap()
    }

    /// One possession for `offense`; returns who has the ball next and
    /// whether a substitution already happened during it
    fn possession(&mut self, offense: usize) -> (usize, bool) {
        let defense = 1 - offense;
        self.tick(4, 14);
        let shooter = self.pick(offense);
        let mut subbed = false;

        match self.rng.gen_range(0..5) {
            0 => {
                let points = if self.rng.gen_bool(0.35) { 3 } else { 2 };
                self.push(EventKind::MadeShot, Some(offense), Some(shooter), points);
            }
            1 => {
                self.push(EventKind::MissedShot, Some(offense), Some(shooter), 0);
                self.tick(1, 3);
                let rebounder = self.pick(defense);
                self.push(EventKind::Rebound, Some(defense), Some(rebounder), 0);
            }
            2 => {
                self.push(EventKind::MissedShot, Some(offense), Some(shooter), 0);
                self.tick(1, 3);
                let rebounder = self.pick(offense);
                self.push(EventKind::Rebound, Some(offense), Some(rebounder), 0);
                self.tick(1, 4);
                let putback = self.pick(offense);
                self.push(EventKind::MadeShot, Some(offense), Some(putback), 2);
            }
            3 => {
                self.push(EventKind::Turnover, Some(offense), Some(shooter), 0);
            }
            _ => {
                let fouler = self.pick(defense);
                self.push(EventKind::Foul, Some(defense), Some(fouler), 0);
                self.push(EventKind::FreeThrowMade, Some(offense), Some(shooter), 1);
                if self.same_clock_subs && self.rng.gen_bool(0.3) {
                    // Between free throws; the shooter stays in
                    let side = self.rng.gen_range(0..2);
                    self.swap_player(side, Some(shooter));
                    subbed = true;
                }
                if self.rng.gen_bool(0.75) {
                    self.push(EventKind::FreeThrowMade, Some(offense), Some(shooter), 1);
                } else {
                    self.push(EventKind::FreeThrowMissed, Some(offense), Some(shooter), 0);
                    self.tick(1, 3);
                    let rebounder = self.pick(defense);
                    self.push(EventKind::Rebound, Some(defense), Some(rebounder), 0);
                }
            }
        }
        (defense, subbed)
    }

    fn substitution(&mut self, side: usize) {
        if !self.same_clock_subs {
            self.tick(1, 2);
        }
        self.swap_player(side, None);
    }

    /// Swap a random player for one from the bench at the current clock
    fn swap_player(&mut self, side: usize, keep: Option<i64>) {
        let out_index = loop {
            let i = self.rng.gen_range(0..self.on_court[side].len());
            if Some(self.on_court[side][i]) != keep {
                break i;
            }
        };
        let in_index = self.rng.gen_range(0..self.bench[side].len());
        let outgoing = self.on_court[side][out_index];
        let incoming = self.bench[side][in_index];
        self.on_court[side][out_index] = incoming;
        self.bench[side][in_index] = outgoing;
        self.push(EventKind::SubstitutionOut, Some(side), Some(outgoing), 0);
        self.push(EventKind::SubstitutionIn, Some(side), Some(incoming), 0);
    }

    /// Play `periods` full periods; returns the raw events and the score
    pub fn play(self, periods: u8) -> (Vec<RawEvent>, (u32, u32)) {
        let game = self.play_scripted(periods);
        (game.events, game.score)
    }

    pub fn play_scripted(mut self, periods: u8) -> ScriptedGame {
        for period in 1..=periods {
            self.period = period;
            self.clock = courtside::clock::period_length(period);
            self.push(EventKind::PeriodStart, None, None, 0);

            // Every player on the floor shows up in the feed before play starts
            if !self.sparse {
                for side in 0..2 {
                    for player in self.on_court[side].clone() {
                        self.push(EventKind::Foul, Some(side), Some(player), 0);
                    }
                }
            }

            let mut offense = self.rng.gen_range(0..2);
            while self.clock > 40.0 {
                let (next, subbed) = self.possession(offense);
                offense = next;
                if !subbed && self.rng.gen_bool(0.15) {
                    let side = self.rng.gen_range(0..2);
                    self.substitution(side);
                }
            }

            self.clock = 0.0;
            self.push(EventKind::PeriodEnd, None, None, 0);
        }
        ScriptedGame {
            events: self.events,
            score: (self.score[0], self.score[1]),
            plus_minus: self.plus_minus,
        }
    }
}

/// A full four-period game with its true final score
pub fn full_game(seed: u64) -> (Vec<RawEvent>, (u32, u32)) {
    GameScript::new(seed).play(4)
}

/// Canonical feed rows for a raw event list
pub fn to_canonical(game_id: &str, events: &[RawEvent]) -> Value {
    Value::Array(
        events
            .iter()
            .map(|e| {
                json!({
                    "game_id": game_id,
                    "period": e.period,
                    "game_clock_seconds": e.game_clock_seconds,
                    "event_type": e.kind.as_str(),
                    "team_id": e.team_id.map(|t| t.0),
                    "player_id": e.player_id.map(|p| p.0),
                    "points_scored": e.points_scored,
                    "technical": e.technical,
                    "wall_clock": e.wall_clock,
                })
            })
            .collect(),
    )
}

/// Write a game file into an input tree laid out by date
pub fn write_game(root: &Path, date: &str, game_id: &str, events: &[RawEvent]) {
    let day = root.join(date);
    std::fs::create_dir_all(&day).unwrap();
    let body = serde_json::to_string_pretty(&to_canonical(game_id, events)).unwrap();
    std::fs::write(day.join(format!("{}.json", game_id)), body).unwrap();
}
