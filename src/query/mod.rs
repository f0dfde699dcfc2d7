//! Point-in-time queries over stored games
//!
//! Read-only views over the database: a player's plus/minus at any moment,
//! lineup leaderboards, and lazily paged event ranges.

pub mod cache;

pub use cache::TtlCache;

use crate::clock;
use crate::data::{Database, DateRange};
use crate::pipeline::plus_minus::per_100;
use crate::pipeline::{LineupStats, PlayerPlusMinusSnapshot};
use crate::{CourtsideError, Event, EventKind, GameId, PlayerId, Result, TeamId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

pub const DEFAULT_PAGE_SIZE: usize = 500;

/// A point in time, on one of the three clocks a caller may know
#[derive(Debug, Clone, PartialEq)]
pub enum Moment {
    /// Seconds since tip-off
    Elapsed { game_id: GameId, seconds: f64 },
    /// Period plus countdown clock, as shown on the scoreboard
    GameClock {
        game_id: GameId,
        period: u8,
        clock_seconds: f64,
    },
    /// Broadcast wall-clock time, across all games
    WallClock(DateTime<Utc>),
}

/// A player's plus/minus state at a moment
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerState {
    /// No row for the player yet at that moment
    NotYetOnCourt,
    Known(PlayerPlusMinusSnapshot),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LeaderboardScope {
    Game(GameId),
    Dates(DateRange),
}

impl fmt::Display for LeaderboardScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaderboardScope::Game(id) => write!(f, "game {}", id),
            LeaderboardScope::Dates(range) => write!(f, "{} to {}", range.start, range.end),
        }
    }
}

/// A lineup's totals over a leaderboard scope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineupRating {
    pub team_id: TeamId,
    pub lineup_hash: String,
    pub player_ids: Vec<PlayerId>,
    pub games: usize,
    pub seconds_on_court: f64,
    pub offensive_possessions: u32,
    pub defensive_possessions: u32,
    pub points_for: u32,
    pub points_against: u32,
    pub plus_minus: i64,
    pub offensive_rating: f64,
    pub defensive_rating: f64,
    pub net_rating: f64,
}

impl LineupRating {
    pub fn possessions(&self) -> u32 {
        self.offensive_possessions + self.defensive_possessions
    }
}

pub type LeaderboardCache = TtlCache<(LeaderboardScope, u32), Vec<LineupRating>>;

/// Query entry point over one database connection
pub struct Queries<'a> {
    db: &'a Database,
    page_size: usize,
    leaderboard_cache: Option<&'a LeaderboardCache>,
}

impl<'a> Queries<'a> {
    pub fn new(db: &'a Database) -> Self {
        Queries {
            db,
            page_size: DEFAULT_PAGE_SIZE,
            leaderboard_cache: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_cache(mut self, cache: &'a LeaderboardCache) -> Self {
        self.leaderboard_cache = Some(cache);
        self
    }

    fn require_game(&self, game_id: &GameId) -> Result<()> {
        if self.db.is_processed(game_id)? {
            Ok(())
        } else {
            Err(CourtsideError::GameNotFound(game_id.clone()))
        }
    }

    /// A player's latest plus/minus row at or before `moment`
    pub fn player_state_at(&self, player_id: PlayerId, moment: &Moment) -> Result<PlayerState> {
        let row = match moment {
            Moment::Elapsed { game_id, seconds } => {
                self.require_game(game_id)?;
                self.db.latest_player_snapshot(game_id, player_id, *seconds)?
            }
            Moment::GameClock {
                game_id,
                period,
                clock_seconds,
            } => {
                if *period == 0 {
                    return Err(CourtsideError::Parse("periods are numbered from 1".into()));
                }
                self.require_game(game_id)?;
                let (clock_value, _) = clock::clamp_clock(*period, *clock_seconds);
                let elapsed = clock::elapsed_seconds(*period, clock_value);
                self.db.latest_player_snapshot(game_id, player_id, elapsed)?
            }
            Moment::WallClock(at) => self.db.latest_player_snapshot_at(player_id, at)?,
        };

        Ok(match row {
            Some(snapshot) => PlayerState::Known(snapshot),
            None => PlayerState::NotYetOnCourt,
        })
    }

    /// Lineups ranked by net rating, best first
    pub fn lineup_leaderboard(
        &self,
        scope: &LeaderboardScope,
        min_possessions: u32,
    ) -> Result<Vec<LineupRating>> {
        let key = (scope.clone(), min_possessions);
        match self.leaderboard_cache {
            Some(cache) => cache.get_or_try_insert(key, || self.compute_leaderboard(scope, min_possessions)),
            None => self.compute_leaderboard(scope, min_possessions),
        }
    }

    /// Recompute a leaderboard, replacing any cached copy
    pub fn refresh_leaderboard(
        &self,
        scope: &LeaderboardScope,
        min_possessions: u32,
    ) -> Result<Vec<LineupRating>> {
        let key = (scope.clone(), min_possessions);
        match self.leaderboard_cache {
            Some(cache) => cache.refresh(key, || self.compute_leaderboard(scope, min_possessions)),
            None => self.compute_leaderboard(scope, min_possessions),
        }
    }

    fn compute_leaderboard(
        &self,
        scope: &LeaderboardScope,
        min_possessions: u32,
    ) -> Result<Vec<LineupRating>> {
        let stats = match scope {
            LeaderboardScope::Game(game_id) => {
                self.require_game(game_id)?;
                self.db.get_lineup_stats(game_id)?
            }
            LeaderboardScope::Dates(range) => {
                self.db.get_lineup_stats_in_range(range.start, range.end)?
            }
        };
        log::debug!("Leaderboard for {}: {} lineup rows", scope, stats.len());
        Ok(rank_lineups(&stats, min_possessions))
    }

    /// Events of a game within `[start, end]` elapsed seconds, fetched page by page
    pub fn events_in_range(
        &self,
        game_id: &GameId,
        start: f64,
        end: f64,
        kind: Option<EventKind>,
    ) -> Result<EventRange<'a>> {
        self.require_game(game_id)?;
        Ok(EventRange {
            db: self.db,
            game_id: game_id.clone(),
            start,
            end,
            kind,
            page_size: self.page_size,
        })
    }
}

/// Sum per-game lineup rows into one rating per lineup and rank them
pub fn rank_lineups(stats: &[LineupStats], min_possessions: u32) -> Vec<LineupRating> {
    let mut totals: BTreeMap<(TeamId, String), (LineupRating, BTreeSet<GameId>)> = BTreeMap::new();

    for s in stats {
        let (rating, games) = totals
            .entry((s.team_id, s.lineup_hash.clone()))
            .or_insert_with(|| {
                (
                    LineupRating {
                        team_id: s.team_id,
                        lineup_hash: s.lineup_hash.clone(),
                        player_ids: s.player_ids.clone(),
                        games: 0,
                        seconds_on_court: 0.0,
                        offensive_possessions: 0,
                        defensive_possessions: 0,
                        points_for: 0,
                        points_against: 0,
                        plus_minus: 0,
                        offensive_rating: 0.0,
                        defensive_rating: 0.0,
                        net_rating: 0.0,
                    },
                    BTreeSet::new(),
                )
            });
        games.insert(s.game_id.clone());
        rating.seconds_on_court += s.seconds_on_court;
        rating.offensive_possessions += s.offensive_possessions;
        rating.defensive_possessions += s.defensive_possessions;
        rating.points_for += s.points_for;
        rating.points_against += s.points_against;
    }

    let mut ratings: Vec<LineupRating> = totals
        .into_values()
        .map(|(mut rating, games)| {
            rating.games = games.len();
            rating.plus_minus = rating.points_for as i64 - rating.points_against as i64;
            rating.offensive_rating = per_100(rating.points_for, rating.offensive_possessions);
            rating.defensive_rating = per_100(rating.points_against, rating.defensive_possessions);
            rating.net_rating = rating.offensive_rating - rating.defensive_rating;
            rating
        })
        .filter(|r| r.possessions() >= min_possessions)
        .collect();

    ratings.sort_by(|a, b| {
        b.net_rating
            .total_cmp(&a.net_rating)
            .then_with(|| a.lineup_hash.cmp(&b.lineup_hash))
            .then_with(|| a.team_id.cmp(&b.team_id))
    });
    ratings
}

/// A lazily paged range of events
///
/// Nothing is read until iteration starts; each page resumes after the last
/// `(elapsed, sequence)` seen, so pages never overlap or skip.
pub struct EventRange<'a> {
    db: &'a Database,
    game_id: GameId,
    start: f64,
    end: f64,
    kind: Option<EventKind>,
    page_size: usize,
}

impl<'a> EventRange<'a> {
    pub fn iter(&self) -> EventIter<'a> {
        EventIter {
            db: self.db,
            game_id: self.game_id.clone(),
            start: self.start,
            end: self.end,
            kind: self.kind,
            page_size: self.page_size,
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: self.end < self.start,
        }
    }
}

impl<'a, 'r> IntoIterator for &'r EventRange<'a> {
    type Item = Result<Event>;
    type IntoIter = EventIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct EventIter<'a> {
    db: &'a Database,
    game_id: GameId,
    start: f64,
    end: f64,
    kind: Option<EventKind>,
    page_size: usize,
    buffer: VecDeque<Event>,
    cursor: Option<(f64, u32)>,
    exhausted: bool,
}

impl<'a> EventIter<'a> {
    fn fetch_page(&mut self) -> Result<()> {
        let page = self.db.get_events_page(
            &self.game_id,
            self.start,
            self.end,
            self.kind,
            self.cursor,
            self.page_size,
        )?;
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.cursor = Some((last.elapsed_game_seconds, last.sequence));
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl<'a> Iterator for EventIter<'a> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
