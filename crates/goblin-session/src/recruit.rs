//! Payload of a recruit DM session.

use serde::{Deserialize, Serialize};

use crate::cache::{Session, SessionCache};

/// A player's town hall level, when the stats API reported one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TownHall {
    Known(u8),
    #[default]
    Unknown,
}

impl TownHall {
    /// Levels of zero are what the API sends for "no data".
    pub fn from_level(level: Option<u32>) -> Self {
        match level {
            Some(l) if l > 0 && l <= u8::MAX as u32 => TownHall::Known(l as u8),
            _ => TownHall::Unknown,
        }
    }
}

impl std::fmt::Display for TownHall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TownHall::Known(level) => write!(f, "{level}"),
            TownHall::Unknown => write!(f, "?"),
        }
    }
}

/// The player the applicant linked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub name: String,
    pub tag: String,
    pub town_hall: TownHall,
}

/// A clan the applicant may pick, with its eligibility at session creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClanOption {
    pub tag: String,
    pub name: String,
    pub member_count: u32,
    pub member_limit: u32,
    pub application_url: Option<String>,
    pub eligible: bool,
    pub reason: Option<String>,
}

/// State of one recruiter → applicant DM conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecruitDmSession {
    pub guild_id: String,
    pub thread_id: String,
    pub thread_url: String,
    pub recruiter_id: String,
    pub applicant_id: String,
    pub applicant_tag: String,
    pub player: PlayerSnapshot,
    pub clans: Vec<ClanOption>,
    pub status_message: Option<String>,
    pub recruiter_controls_closed: bool,
    pub dm_channel_id: Option<String>,
    pub dm_message_id: Option<String>,
}

impl RecruitDmSession {
    /// Clan the applicant picked, if it is still offered.
    pub fn clan(&self, tag: &str) -> Option<&ClanOption> {
        self.clans.iter().find(|c| c.tag == tag)
    }
}

impl SessionCache<RecruitDmSession> {
    /// Mark the recruiter's control panel as closed. No-op for unknown or expired ids.
    pub fn close_recruiter_controls(&self, id: &str) -> Option<Session<RecruitDmSession>> {
        self.update(id, |s| s.recruiter_controls_closed = true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample() -> RecruitDmSession {
        RecruitDmSession {
            guild_id: "g1".into(),
            thread_id: "t1".into(),
            thread_url: "https://discord.com/channels/g1/t1".into(),
            recruiter_id: "r1".into(),
            applicant_id: "a1".into(),
            applicant_tag: "applicant".into(),
            player: PlayerSnapshot {
                name: "Goblin".into(),
                tag: "#ABC123".into(),
                town_hall: TownHall::from_level(Some(15)),
            },
            clans: vec![ClanOption {
                tag: "#CLAN".into(),
                name: "Clan".into(),
                member_count: 49,
                member_limit: 50,
                application_url: None,
                eligible: true,
                reason: None,
            }],
            status_message: None,
            recruiter_controls_closed: false,
            dm_channel_id: None,
            dm_message_id: None,
        }
    }

    #[test]
    fn test_town_hall_display() {
        assert_eq!(TownHall::from_level(Some(15)).to_string(), "15");
        assert_eq!(TownHall::from_level(Some(0)).to_string(), "?");
        assert_eq!(TownHall::from_level(None), TownHall::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_recruiter_controls() {
        let cache = SessionCache::new(Duration::from_secs(60));
        let s = cache.create(sample());
        let closed = cache.close_recruiter_controls(&s.id).unwrap();
        assert!(closed.data.recruiter_controls_closed);
        assert!(closed.data.clan("#CLAN").is_some());
        assert!(cache.close_recruiter_controls("nope").is_none());
    }
}
