mod common;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use common::{full_game, HOME};
use courtside::data::{Database, DateRange};
use courtside::pipeline::{process_game, GameOutput, LineupSnapshot};
use courtside::query::{LeaderboardCache, LeaderboardScope, Moment, PlayerState, Queries};
use courtside::{CourtsideError, EventKind, GameId, GameRecord, GameStatus, PlayerId, TeamId};

fn record(output: &GameOutput, date: &str) -> GameRecord {
    GameRecord {
        game_id: output.game_id.clone(),
        game_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").ok(),
        source: "canonical".to_string(),
        teams: output.teams,
        final_score: output.final_score,
        is_final: output.is_final,
        status: if output.is_flagged() {
            GameStatus::Flagged
        } else {
            GameStatus::Ok
        },
        warning_count: output.warnings.len(),
        processed_at: Utc::now(),
    }
}

fn stored_game(seed: u64) -> (Database, GameOutput) {
    let (raw, _) = full_game(seed);
    let output = process_game(&GameId::new("0022300001"), raw).unwrap();
    let mut db = Database::in_memory().unwrap();
    db.replace_game(&record(&output, "2024-01-15"), &output).unwrap();
    (db, output)
}

#[test]
fn rewriting_a_game_replaces_its_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("courtside.db");

    let (raw, _) = full_game(4);
    let output = process_game(&GameId::new("0022300004"), raw).unwrap();

    let mut db = Database::open(&path).unwrap();
    db.replace_game(&record(&output, "2024-01-15"), &output).unwrap();
    let first = db.get_stats().unwrap();
    db.replace_game(&record(&output, "2024-01-15"), &output).unwrap();
    let second = db.get_stats().unwrap();

    assert_eq!(first.game_count, 1);
    assert_eq!(second.game_count, 1);
    assert_eq!(first.event_count, output.events.len());
    assert_eq!(second.event_count, first.event_count);
    assert_eq!(second.possession_count, output.possessions.len());
    assert_eq!(second.lineup_count, output.lineups.len());
    assert_eq!(second.plus_minus_count, output.plus_minus.len());

    // Rows read back equal what was written
    let id = GameId::new("0022300004");
    assert_eq!(db.get_possessions(&id).unwrap(), output.possessions);
    assert_eq!(db.get_plus_minus(&id).unwrap(), output.plus_minus);
    assert_eq!(db.get_events(&id).unwrap(), output.events);

    let by_team_and_time = |a: &LineupSnapshot, b: &LineupSnapshot| {
        a.team_id
            .0
            .cmp(&b.team_id.0)
            .then(a.valid_from.total_cmp(&b.valid_from))
    };
    let mut stored = db.get_lineup_snapshots(&id).unwrap();
    let mut written = output.lineups.clone();
    stored.sort_by(by_team_and_time);
    written.sort_by(by_team_and_time);
    assert_eq!(stored, written);

    // A second connection sees the committed game
    let reader = Database::open(&path).unwrap();
    assert!(reader.is_processed(&id).unwrap());
}

#[test]
fn player_state_matches_the_timeline() {
    let (db, output) = stored_game(6);
    let queries = Queries::new(&db);
    let id = output.game_id.clone();
    let player = PlayerId(101);

    for t in [0.0, 333.0, 720.0, 1500.5, 2880.0] {
        let expected = output
            .plus_minus
            .iter()
            .filter(|r| r.player_id == player && r.elapsed_seconds <= t)
            .last()
            .cloned();

        let state = queries
            .player_state_at(
                player,
                &Moment::Elapsed {
                    game_id: id.clone(),
                    seconds: t,
                },
            )
            .unwrap();
        match (state, expected) {
            (PlayerState::Known(row), Some(expected)) => assert_eq!(row, expected),
            (PlayerState::NotYetOnCourt, None) => {}
            (state, expected) => panic!("at {}: {:?} vs {:?}", t, state, expected),
        }
    }
}

#[test]
fn player_state_is_the_same_on_every_clock() {
    let (db, output) = stored_game(9);
    let queries = Queries::new(&db);
    let id = output.game_id.clone();
    let player = PlayerId(203);

    // 5:00 left in the third is 1860 seconds in
    let by_elapsed = queries
        .player_state_at(
            player,
            &Moment::Elapsed {
                game_id: id.clone(),
                seconds: 1860.0,
            },
        )
        .unwrap();
    let by_clock = queries
        .player_state_at(
            player,
            &Moment::GameClock {
                game_id: id.clone(),
                period: 3,
                clock_seconds: 300.0,
            },
        )
        .unwrap();
    // The synthetic feed stamps broadcast time at twice game time
    let tip_off = Utc.with_ymd_and_hms(2024, 1, 15, 0, 30, 0).unwrap();
    let by_wall = queries
        .player_state_at(player, &Moment::WallClock(tip_off + Duration::seconds(3720)))
        .unwrap();

    assert!(matches!(by_elapsed, PlayerState::Known(_)));
    assert_eq!(by_elapsed, by_clock);
    assert_eq!(by_elapsed, by_wall);

    // Before the opening tip nobody has a row
    let before = queries
        .player_state_at(player, &Moment::WallClock(tip_off - Duration::minutes(5)))
        .unwrap();
    assert_eq!(before, PlayerState::NotYetOnCourt);
}

#[test]
fn unknown_game_is_reported() {
    let (db, _) = stored_game(1);
    let queries = Queries::new(&db);

    let err = queries
        .player_state_at(
            PlayerId(101),
            &Moment::Elapsed {
                game_id: GameId::new("nope"),
                seconds: 10.0,
            },
        )
        .unwrap_err();
    assert!(matches!(err, CourtsideError::GameNotFound(_)));
    assert!(queries
        .events_in_range(&GameId::new("nope"), 0.0, 100.0, None)
        .is_err());
}

#[test]
fn event_range_pages_through_the_window() {
    let (db, output) = stored_game(12);
    let id = output.game_id.clone();

    let expected: Vec<_> = output
        .events
        .iter()
        .filter(|e| e.elapsed_game_seconds >= 100.0 && e.elapsed_game_seconds <= 1500.0)
        .cloned()
        .collect();

    let queries = Queries::new(&db).with_page_size(7);
    let range = queries.events_in_range(&id, 100.0, 1500.0, None).unwrap();
    let events: Vec<_> = range.iter().collect::<Result<_, _>>().unwrap();
    assert_eq!(events, expected);

    // Iterating again starts from the beginning
    assert_eq!(range.iter().count(), expected.len());

    let rebounds = queries
        .events_in_range(&id, 0.0, 2880.0, Some(EventKind::Rebound))
        .unwrap();
    let rebounds: Vec<_> = rebounds.iter().collect::<Result<_, _>>().unwrap();
    assert!(!rebounds.is_empty());
    assert!(rebounds.iter().all(|e| e.kind == EventKind::Rebound));

    let empty = queries.events_in_range(&id, 900.0, 100.0, None).unwrap();
    assert_eq!(empty.iter().count(), 0);
}

#[test]
fn leaderboard_over_dates_and_cached() {
    let mut db = Database::in_memory().unwrap();
    for (seed, date) in [(30, "2024-01-10"), (31, "2024-01-12"), (32, "2024-02-01")] {
        let (raw, _) = full_game(seed);
        let output = process_game(&GameId::new(format!("g{}", seed)), raw).unwrap();
        db.replace_game(&record(&output, date), &output).unwrap();
    }

    let cache = LeaderboardCache::new(std::time::Duration::from_secs(60));
    let queries = Queries::new(&db).with_cache(&cache);
    let january = LeaderboardScope::Dates(DateRange {
        start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    });

    let ratings = queries.lineup_leaderboard(&january, 0).unwrap();
    assert!(!ratings.is_empty());
    assert!(ratings
        .windows(2)
        .all(|w| w[0].net_rating >= w[1].net_rating));
    assert!(ratings.iter().all(|r| r.games >= 1 && r.games <= 2));
    assert_eq!(cache.len(), 1);

    let again = queries.lineup_leaderboard(&january, 0).unwrap();
    assert_eq!(again, ratings);
    assert_eq!(cache.len(), 1);

    // The starting five of each team played in both January games
    let home_starters = ratings
        .iter()
        .find(|r| r.team_id == TeamId(HOME) && r.lineup_hash == "101-102-103-104-105")
        .unwrap();
    assert_eq!(home_starters.games, 2);

    let strict = queries.lineup_leaderboard(&january, 40).unwrap();
    assert!(strict.iter().all(|r| r.possessions() >= 40));
    assert!(strict.len() <= ratings.len());

    // A new January game is invisible until the cached board is refreshed
    let (raw, _) = full_game(33);
    let output = process_game(&GameId::new("g33"), raw).unwrap();
    db.replace_game(&record(&output, "2024-01-20"), &output).unwrap();

    let queries = Queries::new(&db).with_cache(&cache);
    assert_eq!(queries.lineup_leaderboard(&january, 0).unwrap(), ratings);
    let refreshed = queries.refresh_leaderboard(&january, 0).unwrap();
    let home_starters = refreshed
        .iter()
        .find(|r| r.team_id == TeamId(HOME) && r.lineup_hash == "101-102-103-104-105")
        .unwrap();
    assert_eq!(home_starters.games, 3);
    assert_eq!(queries.lineup_leaderboard(&january, 0).unwrap(), refreshed);
}

#[test]
fn deleting_a_game_removes_it_from_queries() {
    let (mut db, output) = stored_game(2);
    db.delete_game(&output.game_id).unwrap();

    assert!(!db.is_processed(&output.game_id).unwrap());
    assert_eq!(db.get_stats().unwrap().event_count, 0);
    let err = Queries::new(&db)
        .lineup_leaderboard(&LeaderboardScope::Game(output.game_id.clone()), 0)
        .unwrap_err();
    assert!(matches!(err, CourtsideError::GameNotFound(_)));
}
