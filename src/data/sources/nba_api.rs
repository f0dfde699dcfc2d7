//! stats.nba.com `playbyplayv2` feed
//!
//! Tabular result set: a `headers` list and a `rowSet` of positional rows.
//! Event categories come from `EVENTMSGTYPE`; made/missed free throws and
//! three-pointers are only visible in the description text.

use super::{value_as_i64, RawEvent, SourceAdapter, SourceFormat};
use crate::clock::parse_clock;
use crate::{CourtsideError, EventKind, GameId, PlayerId, Result, TeamId};
use serde_json::Value;
use std::collections::HashMap;

const MSG_MADE_SHOT: i64 = 1;
const MSG_MISSED_SHOT: i64 = 2;
const MSG_FREE_THROW: i64 = 3;
const MSG_REBOUND: i64 = 4;
const MSG_TURNOVER: i64 = 5;
const MSG_FOUL: i64 = 6;
const MSG_VIOLATION: i64 = 7;
const MSG_SUBSTITUTION: i64 = 8;
const MSG_TIMEOUT: i64 = 9;
const MSG_JUMP_BALL: i64 = 10;
const MSG_PERIOD_START: i64 = 12;
const MSG_PERIOD_END: i64 = 13;

/// `EVENTMSGACTIONTYPE` of a technical free throw
const ACTION_TECHNICAL_FREE_THROW: i64 = 16;

/// `PERSONnTYPE` values naming a team rather than a player
const PERSON_HOME_TEAM: i64 = 2;
const PERSON_VISITOR_TEAM: i64 = 3;

pub struct NbaApiAdapter;

/// Column lookup over one row of the result set
struct Row<'a> {
    columns: &'a HashMap<String, usize>,
    values: &'a [Value],
}

impl<'a> Row<'a> {
    fn get(&self, column: &str) -> Option<&'a Value> {
        self.columns
            .get(column)
            .and_then(|&i| self.values.get(i))
            .filter(|v| !v.is_null())
    }

    fn int(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(value_as_i64)
    }

    fn text(&self, column: &str) -> Option<&'a str> {
        self.get(column).and_then(Value::as_str)
    }

    /// Home, neutral and visitor descriptions joined
    fn description(&self) -> String {
        ["HOMEDESCRIPTION", "NEUTRALDESCRIPTION", "VISITORDESCRIPTION"]
            .iter()
            .filter_map(|c| self.text(c))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Player and team for PLAYERn; team rebounds/turnovers put the team id
    /// in the player column, leave the team column empty and mark
    /// `PERSONnTYPE` as a team
    fn actor(&self, n: u8) -> (Option<TeamId>, Option<PlayerId>) {
        let player = self.int(&format!("PLAYER{}_ID", n)).filter(|&id| id != 0);
        let team = self.int(&format!("PLAYER{}_TEAM_ID", n));
        let is_team = matches!(
            self.int(&format!("PERSON{}TYPE", n)),
            Some(PERSON_HOME_TEAM | PERSON_VISITOR_TEAM)
        );
        match (team, player) {
            (Some(team), player) => (Some(TeamId(team)), player.map(PlayerId)),
            (None, Some(team_as_player)) if is_team => (Some(TeamId(team_as_player)), None),
            (None, player) => (None, player.map(PlayerId)),
        }
    }
}

impl NbaApiAdapter {
    fn map_row(&self, row: &Row) -> Vec<RawEvent> {
        let msg_type = row.int("EVENTMSGTYPE").unwrap_or(-1);
        let action = row.int("EVENTMSGACTIONTYPE").unwrap_or(0);
        let description = row.description().to_uppercase();
        let (team_id, player_id) = row.actor(1);

        let (kind, points_scored) = match msg_type {
            MSG_MADE_SHOT => {
                let points = if description.contains("3PT") { 3 } else { 2 };
                (EventKind::MadeShot, points)
            }
            MSG_MISSED_SHOT => (EventKind::MissedShot, 0),
            MSG_FREE_THROW if description.contains("MISS") => (EventKind::FreeThrowMissed, 0),
            MSG_FREE_THROW => (EventKind::FreeThrowMade, 1),
            MSG_REBOUND => (EventKind::Rebound, 0),
            MSG_TURNOVER => (EventKind::Turnover, 0),
            MSG_FOUL => (EventKind::Foul, 0),
            MSG_VIOLATION => (EventKind::Violation, 0),
            MSG_SUBSTITUTION => (EventKind::SubstitutionOut, 0),
            MSG_TIMEOUT => (EventKind::Timeout, 0),
            MSG_JUMP_BALL => (EventKind::JumpBall, 0),
            MSG_PERIOD_START => (EventKind::PeriodStart, 0),
            MSG_PERIOD_END => (EventKind::PeriodEnd, 0),
            _ => (EventKind::Other, 0),
        };

        let base = RawEvent {
            source_order: 0,
            period: row
                .int("PERIOD")
                .and_then(|p| u8::try_from(p).ok()),
            game_clock_seconds: row.text("PCTIMESTRING").and_then(parse_clock),
            kind,
            team_id,
            player_id,
            points_scored,
            technical: kind.is_free_throw() && action == ACTION_TECHNICAL_FREE_THROW,
            wall_clock: None,
        };

        if msg_type == MSG_SUBSTITUTION {
            // PLAYER1 leaves, PLAYER2 enters for the same team
            let (_, entering) = row.actor(2);
            let sub_in = RawEvent {
                kind: EventKind::SubstitutionIn,
                player_id: entering,
                ..base.clone()
            };
            return vec![base, sub_in];
        }

        vec![base]
    }
}

impl SourceAdapter for NbaApiAdapter {
    fn format(&self) -> SourceFormat {
        SourceFormat::NbaApi
    }

    fn parse(&self, game_id: &GameId, document: &Value) -> Result<Vec<RawEvent>> {
        let result_set = document
            .get("resultSets")
            .and_then(Value::as_array)
            .and_then(|sets| {
                sets.iter()
                    .find(|s| s.get("name").and_then(Value::as_str) == Some("PlayByPlay"))
                    .or_else(|| sets.first())
            })
            .ok_or_else(|| CourtsideError::game(game_id, "NBA API document has no result set"))?;

        let headers = result_set
            .get("headers")
            .and_then(Value::as_array)
            .ok_or_else(|| CourtsideError::game(game_id, "result set has no headers"))?;
        let columns: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| h.as_str().map(|name| (name.to_uppercase(), i)))
            .collect();

        let rows = result_set
            .get("rowSet")
            .and_then(Value::as_array)
            .ok_or_else(|| CourtsideError::game(game_id, "result set has no rowSet"))?;

        let mut events = Vec::with_capacity(rows.len());
        for values in rows {
            let Some(values) = values.as_array() else {
                log::warn!("{}: skipping non-array row", game_id);
                continue;
            };
            let row = Row {
                columns: &columns,
                values,
            };

            if let Some(row_game) = row.text("GAME_ID") {
                if row_game != game_id.as_str() {
                    continue;
                }
            }

            for mut event in self.map_row(&row) {
                event.source_order = events.len() as u32;
                events.push(event);
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(rows: Vec<Value>) -> Value {
        json!({"resultSets": [{
            "name": "PlayByPlay",
            "headers": ["GAME_ID", "EVENTNUM", "EVENTMSGTYPE", "EVENTMSGACTIONTYPE", "PERIOD",
                        "PCTIMESTRING", "HOMEDESCRIPTION", "NEUTRALDESCRIPTION",
                        "VISITORDESCRIPTION", "PLAYER1_ID", "PLAYER1_TEAM_ID",
                        "PLAYER2_ID", "PLAYER2_TEAM_ID", "PERSON1TYPE", "PERSON2TYPE"],
            "rowSet": rows
        }]})
    }

    #[test]
    fn test_shots_and_free_throws() {
        let doc = document(vec![
            json!(["0022300001", 2, 1, 1, 1, "11:40", "Curry 26' 3PT Jump Shot (3 PTS)",
                   null, null, 201939, 1610612744, 0, null, 4, 0]),
            json!(["0022300001", 3, 3, 11, 1, "11:20", null, null,
                   "MISS James Free Throw 1 of 2", 2544, 1610612747, 0, null, 5, 0]),
            json!(["0022300001", 4, 3, 16, 1, "11:20", null, null,
                   "James Free Throw Technical (1 PTS)", 2544, 1610612747, 0, null, 5, 0]),
        ]);

        let events = NbaApiAdapter
            .parse(&GameId::new("0022300001"), &doc)
            .unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, EventKind::MadeShot);
        assert_eq!(events[0].points_scored, 3);
        assert_eq!(events[0].team_id, Some(TeamId(1610612744)));
        assert_eq!(events[1].kind, EventKind::FreeThrowMissed);
        assert_eq!(events[2].kind, EventKind::FreeThrowMade);
        assert!(events[2].technical);
        assert_eq!(events[2].points_scored, 1);
    }

    #[test]
    fn test_substitution_splits_into_out_and_in() {
        let doc = document(vec![json!([
            "0022300001", 50, 8, 0, 2, "5:00", "SUB: Looney FOR Green", null, null,
            203110, 1610612744, 1626172, 1610612744, 4, 4
        ])]);

        let events = NbaApiAdapter
            .parse(&GameId::new("0022300001"), &doc)
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::SubstitutionOut);
        assert_eq!(events[0].player_id, Some(PlayerId(203110)));
        assert_eq!(events[1].kind, EventKind::SubstitutionIn);
        assert_eq!(events[1].player_id, Some(PlayerId(1626172)));
        assert_eq!(events[1].team_id, Some(TeamId(1610612744)));
        assert_eq!(events[1].game_clock_seconds, Some(300.0));
    }

    #[test]
    fn test_team_rebound_uses_player_column_for_team() {
        let doc = document(vec![json!([
            "0022300001", 9, 4, 0, 1, "10:00", null, null, "Lakers Rebound",
            1610612747, null, 0, null, 3, 0
        ])]);

        let events = NbaApiAdapter
            .parse(&GameId::new("0022300001"), &doc)
            .unwrap();
        assert_eq!(events[0].team_id, Some(TeamId(1610612747)));
        assert_eq!(events[0].player_id, None);
    }

    #[test]
    fn test_player_without_team_column_stays_a_player() {
        let doc = document(vec![json!([
            "0022300001", 12, 6, 1, 1, "9:30", "Green P.FOUL (P1.T1)", null, null,
            203110, null, 0, null, 4, 0
        ])]);

        let events = NbaApiAdapter
            .parse(&GameId::new("0022300001"), &doc)
            .unwrap();
        assert_eq!(events[0].kind, EventKind::Foul);
        assert_eq!(events[0].team_id, None);
        assert_eq!(events[0].player_id, Some(PlayerId(203110)));
    }
}
