//! # Goblin CWL
//!
//! Finished Clan War League wars never change, so they are cached on disk
//! once and served from there afterwards.
//!
//! ```text
//! <root>/<CLANTAG>/<YYYY-MM>/day<N>.json
//! ```

pub mod cache;
pub mod time;
pub mod war;

pub use cache::{SaveOutcome, WarCache, date_key, date_key_from_str, is_month_key, normalize_clan_tag};
pub use time::{Unparseable, format_compact, parse_timestamp};
pub use war::{ClanSummary, CwlWar, EndTime, WarState};
