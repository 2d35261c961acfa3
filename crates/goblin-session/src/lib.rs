//! # Goblin Session
//!
//! Short-lived conversational state (recruit DM flows). Nothing here is
//! persisted: a restart forgets every session.

pub mod cache;
pub mod recruit;

pub use cache::{Session, SessionCache};
pub use recruit::{ClanOption, PlayerSnapshot, RecruitDmSession, TownHall};
