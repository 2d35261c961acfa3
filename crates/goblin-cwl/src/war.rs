//! CWL war records as the stats API returns them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::parse_timestamp;

/// War lifecycle reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WarState {
    NotInWar,
    Preparation,
    InWar,
    WarEnded,
    #[serde(other)]
    Unknown,
}

/// One side of a war. Only the identity is typed; the rest is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClanSummary {
    pub tag: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A single CWL round war.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CwlWar {
    pub state: WarState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attacks_per_member: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub clan: ClanSummary,
    pub opponent: ClanSummary,
    /// Members, attacks and anything else the API adds.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// End of a war, if the record carries a parseable one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndTime {
    Known(DateTime<Utc>),
    Unknown,
}

impl CwlWar {
    pub fn end_instant(&self) -> EndTime {
        match self.end_time.as_deref().map(parse_timestamp) {
            Some(Ok(dt)) => EndTime::Known(dt),
            _ => EndTime::Unknown,
        }
    }

    /// Whether the war is over for good and safe to cache.
    pub fn is_finished(&self) -> bool {
        self.is_finished_at(Utc::now())
    }

    /// Ended state, and an end time at or before `now`. A missing or
    /// unparseable end time counts as over: the state alone decides.
    pub fn is_finished_at(&self, now: DateTime<Utc>) -> bool {
        if self.state != WarState::WarEnded {
            return false;
        }
        match self.end_instant() {
            EndTime::Known(end) => end <= now,
            EndTime::Unknown => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 6, 0, 0, 0).unwrap()
    }

    fn war(state: &str, end_time: Option<&str>) -> CwlWar {
        let mut value = serde_json::json!({
            "state": state,
            "teamSize": 15,
            "attacksPerMember": 1,
            "startTime": "20260101T000000.000Z",
            "clan": { "tag": "#CLAN", "name": "Clan", "stars": 30 },
            "opponent": { "tag": "#OPP", "name": "Opponent" },
        });
        if let Some(end) = end_time {
            value["endTime"] = serde_json::json!(end);
        }
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_ended_in_past_is_finished() {
        assert!(war("warEnded", Some("20260105T000000.000Z")).is_finished_at(now()));
    }

    #[test]
    fn test_end_in_future_is_not_finished() {
        assert!(!war("warEnded", Some("20260110T000000.000Z")).is_finished_at(now()));
    }

    #[test]
    fn test_missing_or_garbage_end_time_falls_back_to_state() {
        assert!(war("warEnded", None).is_finished_at(now()));
        assert!(war("warEnded", Some("soon")).is_finished_at(now()));
        assert_eq!(war("warEnded", Some("soon")).end_instant(), EndTime::Unknown);
    }

    #[test]
    fn test_other_states_never_finished() {
        for state in ["inWar", "preparation", "notInWar", "somethingNew"] {
            assert!(!war(state, Some("20200101T000000.000Z")).is_finished_at(now()));
            assert!(!war(state, None).is_finished_at(now()));
        }
    }

    #[test]
    fn test_unknown_fields_survive() {
        let w = war("warEnded", None);
        assert_eq!(w.clan.extra["stars"], 30);
        let back = serde_json::to_value(&w).unwrap();
        assert_eq!(back["clan"]["stars"], 30);
        assert_eq!(back["teamSize"], 15);
        assert!(back.get("endTime").is_none());
    }
}
