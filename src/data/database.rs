//! SQLite storage for processed games
//!
//! Each game's derived rows are replaced as a unit, so reprocessing a game
//! never leaves a mix of old and new rows behind.

use crate::pipeline::{
    GameOutput, LineupSnapshot, LineupStats, PlayerPlusMinusSnapshot, Possession,
};
use crate::{Event, EventKind, GameId, GameRecord, GameStatus, PlayerId, Result, TeamId};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Tables holding per-game rows, cleared before a game is rewritten
const GAME_TABLES: [&str; 6] = [
    "events",
    "lineup_snapshots",
    "possessions",
    "plus_minus_snapshots",
    "lineup_stats",
    "games",
];

const EVENT_COLUMNS: &str = "game_id, sequence, period, game_clock_seconds, elapsed_seconds, \
     event_type, team_id, player_id, points_scored, technical, wall_clock, clock_clamped";

const SNAPSHOT_COLUMNS: &str = "game_id, ordinal, player_id, team_id, elapsed_seconds, \
     on_court, plus_minus, possession_number, wall_clock";

const STATS_COLUMNS: &str = "game_id, team_id, lineup_hash, player_ids, seconds_on_court, \
     offensive_possessions, defensive_possessions, points_for, points_against";

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(30))?;
        // Concurrent readers while a worker writes
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS games (
                game_id TEXT PRIMARY KEY,
                game_date TEXT,
                source TEXT NOT NULL,
                team_a INTEGER NOT NULL,
                team_b INTEGER NOT NULL,
                score_a INTEGER NOT NULL,
                score_b INTEGER NOT NULL,
                is_final INTEGER NOT NULL,
                status TEXT NOT NULL,
                warning_count INTEGER NOT NULL,
                processed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                game_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                period INTEGER NOT NULL,
                game_clock_seconds REAL NOT NULL,
                elapsed_seconds REAL NOT NULL,
                event_type TEXT NOT NULL,
                team_id INTEGER,
                player_id INTEGER,
                points_scored INTEGER NOT NULL,
                technical INTEGER NOT NULL DEFAULT 0,
                wall_clock TEXT,
                clock_clamped INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (game_id, sequence)
            );

            CREATE TABLE IF NOT EXISTS lineup_snapshots (
                game_id TEXT NOT NULL,
                team_id INTEGER NOT NULL,
                valid_from REAL NOT NULL,
                valid_from_sequence INTEGER NOT NULL DEFAULT 0,
                valid_to REAL,
                lineup_hash TEXT NOT NULL,
                player_ids TEXT NOT NULL,
                possession_number INTEGER,
                inferred INTEGER NOT NULL DEFAULT 0,
                incomplete_lineup INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (game_id, team_id, valid_from)
            );

            CREATE TABLE IF NOT EXISTS possessions (
                game_id TEXT NOT NULL,
                possession_number INTEGER NOT NULL,
                offensive_team_id INTEGER NOT NULL,
                defensive_team_id INTEGER NOT NULL,
                start_elapsed_seconds REAL NOT NULL,
                end_elapsed_seconds REAL NOT NULL,
                period INTEGER NOT NULL,
                points_scored INTEGER NOT NULL,
                result TEXT NOT NULL,
                PRIMARY KEY (game_id, possession_number)
            );

            CREATE TABLE IF NOT EXISTS plus_minus_snapshots (
                game_id TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                player_id INTEGER NOT NULL,
                team_id INTEGER NOT NULL,
                elapsed_seconds REAL NOT NULL,
                on_court INTEGER NOT NULL,
                plus_minus INTEGER NOT NULL,
                possession_number INTEGER,
                wall_clock TEXT,
                PRIMARY KEY (game_id, ordinal)
            );

            CREATE TABLE IF NOT EXISTS lineup_stats (
                game_id TEXT NOT NULL,
                team_id INTEGER NOT NULL,
                lineup_hash TEXT NOT NULL,
                player_ids TEXT NOT NULL,
                seconds_on_court REAL NOT NULL,
                offensive_possessions INTEGER NOT NULL,
                defensive_possessions INTEGER NOT NULL,
                points_for INTEGER NOT NULL,
                points_against INTEGER NOT NULL,
                PRIMARY KEY (game_id, team_id, lineup_hash)
            );

            CREATE INDEX IF NOT EXISTS idx_games_date ON games(game_date);
            CREATE INDEX IF NOT EXISTS idx_events_time ON events(game_id, elapsed_seconds, sequence);
            CREATE INDEX IF NOT EXISTS idx_pm_player ON plus_minus_snapshots(player_id, game_id, elapsed_seconds);
            CREATE INDEX IF NOT EXISTS idx_pm_wall_clock ON plus_minus_snapshots(player_id, wall_clock);
            "#,
        )?;
        Ok(())
    }

    // ==================== Game Writes ====================

    /// Replace every stored row for a game in one transaction
    pub fn replace_game(&mut self, record: &GameRecord, output: &GameOutput) -> Result<()> {
        let tx = self.conn.transaction()?;
        let id = record.game_id.as_str();

        for table in GAME_TABLES {
            tx.execute(
                &format!("DELETE FROM {} WHERE game_id = ?1", table),
                params![id],
            )?;
        }

        tx.execute(
            r#"
            INSERT INTO games (game_id, game_date, source, team_a, team_b, score_a, score_b,
                               is_final, status, warning_count, processed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                id,
                record.game_date.map(|d| d.format(DATE_FORMAT).to_string()),
                record.source,
                record.teams.0 .0,
                record.teams.1 .0,
                record.final_score.0,
                record.final_score.1,
                record.is_final,
                record.status.as_str(),
                record.warning_count as i64,
                format_wall_clock(&record.processed_at),
            ],
        )?;

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO events ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                EVENT_COLUMNS
            ))?;
            for e in &output.events {
                stmt.execute(params![
                    id,
                    e.sequence,
                    e.period,
                    e.game_clock_seconds,
                    e.elapsed_game_seconds,
                    e.kind.as_str(),
                    e.team_id.map(|t| t.0),
                    e.player_id.map(|p| p.0),
                    e.points_scored,
                    e.technical,
                    e.wall_clock.as_ref().map(format_wall_clock),
                    e.clock_clamped,
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO lineup_snapshots (game_id, team_id, valid_from, valid_from_sequence,
                                              valid_to, lineup_hash, player_ids, possession_number,
                                              inferred, incomplete_lineup)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )?;
            for l in &output.lineups {
                stmt.execute(params![
                    id,
                    l.team_id.0,
                    l.valid_from,
                    l.valid_from_sequence,
                    l.valid_to,
                    l.lineup_hash,
                    serde_json::to_string(&l.player_ids)?,
                    l.possession_number,
                    l.inferred,
                    l.incomplete_lineup,
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO possessions (game_id, possession_number, offensive_team_id,
                                         defensive_team_id, start_elapsed_seconds,
                                         end_elapsed_seconds, period, points_scored, result)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )?;
            for p in &output.possessions {
                stmt.execute(params![
                    id,
                    p.possession_number,
                    p.offensive_team_id.0,
                    p.defensive_team_id.0,
                    p.start_elapsed_seconds,
                    p.end_elapsed_seconds,
                    p.period,
                    p.points_scored,
                    p.result.as_str(),
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO plus_minus_snapshots ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                SNAPSHOT_COLUMNS
            ))?;
            for s in &output.plus_minus {
                stmt.execute(params![
                    id,
                    s.ordinal,
                    s.player_id.0,
                    s.team_id.0,
                    s.elapsed_seconds,
                    s.on_court,
                    s.plus_minus,
                    s.possession_number,
                    s.wall_clock.as_ref().map(format_wall_clock),
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO lineup_stats ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                STATS_COLUMNS
            ))?;
            for s in &output.lineup_stats {
                stmt.execute(params![
                    id,
                    s.team_id.0,
                    s.lineup_hash,
                    serde_json::to_string(&s.player_ids)?,
                    s.seconds_on_court,
                    s.offensive_possessions,
                    s.defensive_possessions,
                    s.points_for,
                    s.points_against,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Remove a game and all its rows
    pub fn delete_game(&mut self, game_id: &GameId) -> Result<()> {
        let tx = self.conn.transaction()?;
        for table in GAME_TABLES {
            tx.execute(
                &format!("DELETE FROM {} WHERE game_id = ?1", table),
                params![game_id.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ==================== Games ====================

    pub fn is_processed(&self, game_id: &GameId) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM games WHERE game_id = ?1",
            params![game_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_game(&self, game_id: &GameId) -> Result<Option<GameRecord>> {
        let game = self
            .conn
            .query_row(
                "SELECT game_id, game_date, source, team_a, team_b, score_a, score_b,
                        is_final, status, warning_count, processed_at
                 FROM games WHERE game_id = ?1",
                params![game_id.as_str()],
                Self::row_to_game,
            )
            .optional()?;
        Ok(game)
    }

    /// All processed games, oldest first
    pub fn get_games(&self) -> Result<Vec<GameRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT game_id, game_date, source, team_a, team_b, score_a, score_b,
                    is_final, status, warning_count, processed_at
             FROM games
             ORDER BY game_date, game_id",
        )?;

        let games = stmt
            .query_map([], Self::row_to_game)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(games)
    }

    fn row_to_game(row: &rusqlite::Row) -> rusqlite::Result<GameRecord> {
        let game_date: Option<String> = row.get(1)?;
        let status: String = row.get(8)?;
        let warning_count: i64 = row.get(9)?;
        let processed_at: String = row.get(10)?;

        Ok(GameRecord {
            game_id: GameId(row.get(0)?),
            game_date: game_date.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
            source: row.get(2)?,
            teams: (TeamId(row.get(3)?), TeamId(row.get(4)?)),
            final_score: (row.get(5)?, row.get(6)?),
            is_final: row.get(7)?,
            status: GameStatus::from_str_lossy(&status),
            warning_count: warning_count.max(0) as usize,
            processed_at: parse_wall_clock(&processed_at).unwrap_or_default(),
        })
    }

    // ==================== Events ====================

    /// One page of a game's events within `[start, end]`, resuming after
    /// the `(elapsed, sequence)` cursor
    pub fn get_events_page(
        &self,
        game_id: &GameId,
        start: f64,
        end: f64,
        kind: Option<EventKind>,
        after: Option<(f64, u32)>,
        limit: usize,
    ) -> Result<Vec<Event>> {
        let (after_elapsed, after_sequence) = match after {
            Some((elapsed, sequence)) => (elapsed, sequence as i64),
            None => (-1.0, -1),
        };

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {}
             FROM events
             WHERE game_id = ?1
               AND elapsed_seconds >= ?2 AND elapsed_seconds <= ?3
               AND (?4 IS NULL OR event_type = ?4)
               AND (elapsed_seconds > ?5 OR (elapsed_seconds = ?5 AND sequence > ?6))
             ORDER BY elapsed_seconds, sequence
             LIMIT ?7",
            EVENT_COLUMNS
        ))?;

        let events = stmt
            .query_map(
                params![
                    game_id.as_str(),
                    start,
                    end,
                    kind.map(|k| k.as_str()),
                    after_elapsed,
                    after_sequence,
                    limit as i64,
                ],
                Self::row_to_event,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(events)
    }

    /// Every stored event of a game in timeline order
    pub fn get_events(&self, game_id: &GameId) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM events WHERE game_id = ?1 ORDER BY elapsed_seconds, sequence",
            EVENT_COLUMNS
        ))?;

        let events = stmt
            .query_map(params![game_id.as_str()], Self::row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(events)
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<Event> {
        let kind: String = row.get(5)?;
        let kind: EventKind = kind.parse().map_err(|e| conversion_error(5, e))?;
        let wall_clock: Option<String> = row.get(10)?;

        Ok(Event {
            game_id: GameId(row.get(0)?),
            sequence: row.get(1)?,
            period: row.get(2)?,
            game_clock_seconds: row.get(3)?,
            elapsed_game_seconds: row.get(4)?,
            kind,
            team_id: row.get::<_, Option<i64>>(6)?.map(TeamId),
            player_id: row.get::<_, Option<i64>>(7)?.map(PlayerId),
            points_scored: row.get(8)?,
            technical: row.get(9)?,
            wall_clock: wall_clock.as_deref().and_then(parse_wall_clock),
            clock_clamped: row.get(11)?,
        })
    }

    // ==================== Lineups and Possessions ====================

    pub fn get_lineup_snapshots(&self, game_id: &GameId) -> Result<Vec<LineupSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT game_id, team_id, valid_from, valid_from_sequence, valid_to, lineup_hash,
                    player_ids, possession_number, inferred, incomplete_lineup
             FROM lineup_snapshots
             WHERE game_id = ?1
             ORDER BY valid_from, valid_from_sequence, team_id",
        )?;

        let lineups = stmt
            .query_map(params![game_id.as_str()], |row| {
                let player_ids: String = row.get(6)?;
                Ok(LineupSnapshot {
                    game_id: GameId(row.get(0)?),
                    team_id: TeamId(row.get(1)?),
                    valid_from: row.get(2)?,
                    valid_from_sequence: row.get(3)?,
                    valid_to: row.get(4)?,
                    lineup_hash: row.get(5)?,
                    player_ids: parse_player_ids(6, &player_ids)?,
                    possession_number: row.get(7)?,
                    inferred: row.get(8)?,
                    incomplete_lineup: row.get(9)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(lineups)
    }

    pub fn get_possessions(&self, game_id: &GameId) -> Result<Vec<Possession>> {
        let mut stmt = self.conn.prepare(
            "SELECT game_id, possession_number, offensive_team_id, defensive_team_id,
                    start_elapsed_seconds, end_elapsed_seconds, period, points_scored, result
             FROM possessions
             WHERE game_id = ?1
             ORDER BY possession_number",
        )?;

        let possessions = stmt
            .query_map(params![game_id.as_str()], |row| {
                let result: String = row.get(8)?;
                Ok(Possession {
                    game_id: GameId(row.get(0)?),
                    possession_number: row.get(1)?,
                    offensive_team_id: TeamId(row.get(2)?),
                    defensive_team_id: TeamId(row.get(3)?),
                    start_elapsed_seconds: row.get(4)?,
                    end_elapsed_seconds: row.get(5)?,
                    period: row.get(6)?,
                    points_scored: row.get(7)?,
                    result: result.parse().map_err(|e| conversion_error(8, e))?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(possessions)
    }

    // ==================== Plus/Minus ====================

    pub fn get_plus_minus(&self, game_id: &GameId) -> Result<Vec<PlayerPlusMinusSnapshot>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM plus_minus_snapshots WHERE game_id = ?1 ORDER BY ordinal",
            SNAPSHOT_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![game_id.as_str()], Self::row_to_snapshot)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Latest row for a player at or before `elapsed` in a game
    pub fn latest_player_snapshot(
        &self,
        game_id: &GameId,
        player_id: PlayerId,
        elapsed: f64,
    ) -> Result<Option<PlayerPlusMinusSnapshot>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {}
                     FROM plus_minus_snapshots
                     WHERE game_id = ?1 AND player_id = ?2 AND elapsed_seconds <= ?3
                     ORDER BY elapsed_seconds DESC, ordinal DESC
                     LIMIT 1",
                    SNAPSHOT_COLUMNS
                ),
                params![game_id.as_str(), player_id.0, elapsed],
                Self::row_to_snapshot,
            )
            .optional()?;
        Ok(row)
    }

    /// Latest row for a player at or before a wall-clock instant, across games
    pub fn latest_player_snapshot_at(
        &self,
        player_id: PlayerId,
        at: &DateTime<Utc>,
    ) -> Result<Option<PlayerPlusMinusSnapshot>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {}
                     FROM plus_minus_snapshots
                     WHERE player_id = ?1 AND wall_clock IS NOT NULL AND wall_clock <= ?2
                     ORDER BY wall_clock DESC, ordinal DESC
                     LIMIT 1",
                    SNAPSHOT_COLUMNS
                ),
                params![player_id.0, format_wall_clock(at)],
                Self::row_to_snapshot,
            )
            .optional()?;
        Ok(row)
    }

    fn row_to_snapshot(row: &rusqlite::Row) -> rusqlite::Result<PlayerPlusMinusSnapshot> {
        let wall_clock: Option<String> = row.get(8)?;
        Ok(PlayerPlusMinusSnapshot {
            game_id: GameId(row.get(0)?),
            ordinal: row.get(1)?,
            player_id: PlayerId(row.get(2)?),
            team_id: TeamId(row.get(3)?),
            elapsed_seconds: row.get(4)?,
            on_court: row.get(5)?,
            plus_minus: row.get(6)?,
            possession_number: row.get(7)?,
            wall_clock: wall_clock.as_deref().and_then(parse_wall_clock),
        })
    }

    // ==================== Lineup Stats ====================

    pub fn get_lineup_stats(&self, game_id: &GameId) -> Result<Vec<LineupStats>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM lineup_stats WHERE game_id = ?1 ORDER BY team_id, lineup_hash",
            STATS_COLUMNS
        ))?;

        let stats = stmt
            .query_map(params![game_id.as_str()], Self::row_to_stats)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(stats)
    }

    /// Lineup stats for every game dated within `[start, end]`
    pub fn get_lineup_stats_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LineupStats>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.game_id, s.team_id, s.lineup_hash, s.player_ids, s.seconds_on_court,
                    s.offensive_possessions, s.defensive_possessions, s.points_for,
                    s.points_against
             FROM lineup_stats s
             JOIN games g ON g.game_id = s.game_id
             WHERE g.game_date >= ?1 AND g.game_date <= ?2
             ORDER BY g.game_date, s.game_id, s.team_id, s.lineup_hash",
        )?;

        let stats = stmt
            .query_map(
                params![
                    start.format(DATE_FORMAT).to_string(),
                    end.format(DATE_FORMAT).to_string()
                ],
                Self::row_to_stats,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(stats)
    }

    fn row_to_stats(row: &rusqlite::Row) -> rusqlite::Result<LineupStats> {
        let player_ids: String = row.get(3)?;
        Ok(LineupStats {
            game_id: GameId(row.get(0)?),
            team_id: TeamId(row.get(1)?),
            lineup_hash: row.get(2)?,
            player_ids: parse_player_ids(3, &player_ids)?,
            seconds_on_court: row.get(4)?,
            offensive_possessions: row.get(5)?,
            defensive_possessions: row.get(6)?,
            points_for: row.get(7)?,
            points_against: row.get(8)?,
        })
    }

    // ==================== Statistics ====================

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n.max(0) as usize)
        };

        let min_date: Option<String> = self
            .conn
            .query_row("SELECT MIN(game_date) FROM games", [], |row| row.get(0))
            .optional()?
            .flatten();

        let max_date: Option<String> = self
            .conn
            .query_row("SELECT MAX(game_date) FROM games", [], |row| row.get(0))
            .optional()?
            .flatten();

        Ok(DatabaseStats {
            game_count: count("SELECT COUNT(*) FROM games")?,
            flagged_count: count("SELECT COUNT(*) FROM games WHERE status = 'flagged'")?,
            event_count: count("SELECT COUNT(*) FROM events")?,
            possession_count: count("SELECT COUNT(*) FROM possessions")?,
            lineup_count: count("SELECT COUNT(*) FROM lineup_snapshots")?,
            plus_minus_count: count("SELECT COUNT(*) FROM plus_minus_snapshots")?,
            earliest_game: min_date.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
            latest_game: max_date.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()),
        })
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub game_count: usize,
    pub flagged_count: usize,
    pub event_count: usize,
    pub possession_count: usize,
    pub lineup_count: usize,
    pub plus_minus_count: usize,
    pub earliest_game: Option<NaiveDate>,
    pub latest_game: Option<NaiveDate>,
}

/// Fixed-width RFC 3339 so stored timestamps sort as text
fn format_wall_clock(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_wall_clock(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn parse_player_ids(column: usize, text: &str) -> rusqlite::Result<Vec<PlayerId>> {
    serde_json::from_str(text).map_err(|e| conversion_error(column, e))
}

fn conversion_error<E>(column: usize, error: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, error.into())
}
