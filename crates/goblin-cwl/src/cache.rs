//! On-disk CWL war cache.
//!
//! Each finished war lives in its own file, written once through a temp
//! file and a rename. Files are independent, so writes for different
//! clans or months never wait on each other.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use goblin_core::{GoblinError, Result};
use goblin_store::write_atomic;

use crate::time::parse_timestamp;
use crate::war::{CwlWar, EndTime};

/// What [`WarCache::save`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The war was written to `day<N>.json`.
    Written(u32),
    /// The same war (same end time) was already cached.
    Unchanged,
    /// The war is still running; nothing was written.
    InProgress,
    /// No usable end time or day; nothing was written.
    Undated,
}

/// Directory name for a clan: `#2abc` → `2ABC`. Anything but ASCII
/// letters and digits is dropped.
pub fn normalize_clan_tag(tag: &str) -> String {
    tag.trim()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// `YYYY-MM` for an instant.
pub fn date_key(dt: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", dt.year(), dt.month())
}

/// `YYYY-MM` from a compact or RFC 3339 timestamp.
pub fn date_key_from_str(s: &str) -> Option<String> {
    parse_timestamp(s).ok().map(date_key)
}

/// True for names shaped like `YYYY-MM`.
pub fn is_month_key(name: &str) -> bool {
    let b = name.as_bytes();
    b.len() == 7
        && b[4] == b'-'
        && b[..4].iter().all(u8::is_ascii_digit)
        && b[5..].iter().all(u8::is_ascii_digit)
}

fn day_from_file_name(name: &str) -> Option<u32> {
    let day = name.strip_prefix("day")?.strip_suffix(".json")?;
    // `day01.json` is not the file `load(.., 1)` reads.
    if day.is_empty() || day.starts_with('0') || !day.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    day.parse().ok().filter(|d| *d > 0)
}

/// Date-partitioned cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct WarCache {
    root: PathBuf,
}

impl WarCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn clan_dir(&self, clan_tag: &str) -> Option<PathBuf> {
        let clan = normalize_clan_tag(clan_tag);
        (!clan.is_empty()).then(|| self.root.join(clan))
    }

    fn day_path(&self, clan_tag: &str, month: &str, day: u32) -> Option<PathBuf> {
        if !is_month_key(month) {
            return None;
        }
        Some(self.clan_dir(clan_tag)?.join(month).join(format!("day{day}.json")))
    }

    /// Cached war for one slot. Missing or unreadable files are `None`.
    pub async fn load(&self, clan_tag: &str, month: &str, day: u32) -> Option<CwlWar> {
        let path = self.day_path(clan_tag, month, day)?;
        let raw = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&raw) {
            Ok(war) => Some(war),
            Err(e) => {
                tracing::warn!("⚠️ Ignoring unreadable war cache {}: {e}", path.display());
                None
            }
        }
    }

    /// Cache a finished war.
    ///
    /// `round_index` is the 0-based CWL round and becomes `day<round+1>`.
    /// Without it the end time's day of month is used, which does not
    /// line up with CWL rounds and only exists for older callers.
    pub async fn save(
        &self,
        war: &CwlWar,
        clan_tag: &str,
        round_index: Option<usize>,
    ) -> Result<SaveOutcome> {
        if !war.is_finished() {
            return Ok(SaveOutcome::InProgress);
        }
        let EndTime::Known(end) = war.end_instant() else {
            return Ok(SaveOutcome::Undated);
        };
        let month = date_key(end);
        let day = match round_index {
            Some(round) => match round.checked_add(1).and_then(|d| u32::try_from(d).ok()) {
                Some(day) => day,
                None => {
                    tracing::warn!("⚠️ Round index {round} out of range, not caching");
                    return Ok(SaveOutcome::Undated);
                }
            },
            None => end.day(),
        };

        let path = self.day_path(clan_tag, &month, day).ok_or_else(|| {
            GoblinError::Validation(format!("Invalid clan tag for war cache: {clan_tag:?}"))
        })?;

        if let Some(cached) = self.load(clan_tag, &month, day).await
            && cached.end_time.is_some()
            && cached.end_time == war.end_time
        {
            tracing::debug!("War already cached at {}", path.display());
            return Ok(SaveOutcome::Unchanged);
        }

        let bytes = serde_json::to_vec_pretty(war)?;
        write_atomic(&path, &bytes).await?;
        tracing::info!("💾 Cached CWL war {} → {}", war.clan.tag, path.display());
        Ok(SaveOutcome::Written(day))
    }

    /// Every cached war of a month, keyed by day.
    pub async fn load_month(&self, clan_tag: &str, month: &str) -> BTreeMap<u32, CwlWar> {
        let mut wars = BTreeMap::new();
        let Some(dir) = self.clan_dir(clan_tag).filter(|_| is_month_key(month)) else {
            return wars;
        };
        let Ok(mut entries) = tokio::fs::read_dir(dir.join(month)).await else {
            return wars;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Some(day) = entry.file_name().to_str().and_then(day_from_file_name) else {
                continue;
            };
            if let Some(war) = self.load(clan_tag, month, day).await {
                wars.insert(day, war);
            }
        }
        wars
    }

    /// Months with cached wars for a clan, newest first.
    pub async fn list_available_months(&self, clan_tag: &str) -> Vec<String> {
        let Some(dir) = self.clan_dir(clan_tag) else {
            return Vec::new();
        };
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No war cache for {clan_tag} at {}", dir.display());
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("⚠️ Failed to list {}: {e}", dir.display());
                return Vec::new();
            }
        };

        let mut months = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if let Some(name) = entry.file_name().to_str()
                && is_dir
                && is_month_key(name)
            {
                months.push(name.to_string());
            }
        }
        months.sort_unstable_by(|a, b| b.cmp(a));
        tracing::debug!("Found {} month(s) for {clan_tag}", months.len());
        months
    }
}
