//! Guild-scoped recruit settings, persisted as one JSON document.

use std::collections::BTreeMap;
use std::path::PathBuf;

use goblin_core::{GoblinError, Result};
use serde::{Deserialize, Serialize};

use crate::atomic::{AtomicFileStore, Document};

/// Highest town hall level a role mapping may target.
pub const MAX_TOWN_HALL: u8 = 18;
/// Discord select menus cap at 25 options.
pub const MAX_ALLOWED_ROLES: usize = 25;

/// A canned message recruiters paste into applicant DMs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmTemplate {
    pub id: String,
    pub name: String,
    pub content: String,
}

/// Settings for one guild.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecruitGuildConfig {
    /// Town hall level (as a string key) → recruiter role ids.
    #[serde(default)]
    pub th_role_ids: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub allowed_role_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_channel_id: Option<String>,
    #[serde(default)]
    pub dm_templates: Vec<DmTemplate>,
}

/// The whole settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecruitConfigFile {
    pub version: u32,
    #[serde(default)]
    pub guilds: BTreeMap<String, RecruitGuildConfig>,
}

impl Default for RecruitConfigFile {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            guilds: BTreeMap::new(),
        }
    }
}

impl Document for RecruitConfigFile {
    const VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }
}

/// Trimmed, non-empty, de-duplicated (first occurrence wins).
fn normalize_role_ids(role_ids: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in role_ids {
        let id = id.trim();
        if !id.is_empty() && !out.iter().any(|o| o == id) {
            out.push(id.to_string());
        }
    }
    out
}

fn check_town_hall(th: u8) -> Result<()> {
    if th == 0 || th > MAX_TOWN_HALL {
        return Err(GoblinError::Validation(format!(
            "Town Hall must be an integer 1-{MAX_TOWN_HALL} (got {th})"
        )));
    }
    Ok(())
}

fn mention_roles(ids: &[String]) -> String {
    ids.iter()
        .map(|r| format!("<@&{r}>"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Guild settings store (`recruit-config.json`).
pub struct ConfigStore {
    store: AtomicFileStore<RecruitConfigFile>,
}

impl ConfigStore {
    /// Open the store. Must run inside a tokio runtime.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            store: AtomicFileStore::open(path),
        }
    }

    async fn guild(&self, guild_id: &str) -> RecruitGuildConfig {
        self.store
            .load()
            .await
            .guilds
            .get(guild_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn update_guild<F>(&self, guild_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut RecruitGuildConfig) + Send + 'static,
    {
        let guild_id = guild_id.to_string();
        self.store
            .mutate(move |mut cfg| {
                f(cfg.guilds.entry(guild_id).or_default());
                cfg
            })
            .await?;
        Ok(())
    }

    pub async fn role_ids_for_town_hall(&self, guild_id: &str, th: u8) -> Result<Vec<String>> {
        check_town_hall(th)?;
        let guild = self.guild(guild_id).await;
        Ok(normalize_role_ids(
            guild.th_role_ids.get(&th.to_string()).map(Vec::as_slice).unwrap_or_default(),
        ))
    }

    pub async fn set_role_ids_for_town_hall(
        &self,
        guild_id: &str,
        th: u8,
        role_ids: &[String],
    ) -> Result<()> {
        check_town_hall(th)?;
        let cleaned = normalize_role_ids(role_ids);
        tracing::info!("⚙️ Guild {guild_id}: TH{th} → {} role(s)", cleaned.len());
        self.update_guild(guild_id, move |g| {
            g.th_role_ids.insert(th.to_string(), cleaned);
        })
        .await
    }

    /// One line per configured town hall, lowest first.
    pub async fn role_mapping_summary(&self, guild_id: &str) -> String {
        let guild = self.guild(guild_id).await;
        let lines: Vec<String> = (1..=MAX_TOWN_HALL)
            .filter_map(|th| {
                let roles = normalize_role_ids(guild.th_role_ids.get(&th.to_string())?);
                (!roles.is_empty()).then(|| format!("- TH{th}: {}", mention_roles(&roles)))
            })
            .collect();
        if lines.is_empty() {
            "_No leader roles configured yet._".into()
        } else {
            lines.join("\n")
        }
    }

    pub async fn allowed_role_ids(&self, guild_id: &str) -> Vec<String> {
        normalize_role_ids(&self.guild(guild_id).await.allowed_role_ids)
    }

    pub async fn set_allowed_role_ids(&self, guild_id: &str, role_ids: &[String]) -> Result<()> {
        let mut cleaned = normalize_role_ids(role_ids);
        cleaned.truncate(MAX_ALLOWED_ROLES);
        self.update_guild(guild_id, move |g| g.allowed_role_ids = cleaned)
            .await
    }

    pub async fn allowed_role_summary(&self, guild_id: &str) -> String {
        let roles = self.allowed_role_ids(guild_id).await;
        if roles.is_empty() {
            "_None configured._".into()
        } else {
            mention_roles(&roles)
        }
    }

    /// Leader role holders are always allowed; otherwise any allowed role grants access.
    pub async fn is_recruit_authorized(
        &self,
        guild_id: &str,
        member_role_ids: &[String],
        leader_role_id: &str,
    ) -> bool {
        if member_role_ids.iter().any(|r| r == leader_role_id) {
            return true;
        }
        let allowed = self.allowed_role_ids(guild_id).await;
        member_role_ids.iter().any(|r| allowed.contains(r))
    }

    pub async fn thread_channel_id(&self, guild_id: &str) -> Option<String> {
        self.guild(guild_id).await.thread_channel_id
    }

    pub async fn set_thread_channel_id(&self, guild_id: &str, channel_id: Option<String>) -> Result<()> {
        let channel_id = channel_id.filter(|c| !c.trim().is_empty());
        self.update_guild(guild_id, move |g| g.thread_channel_id = channel_id)
            .await
    }

    pub async fn dm_templates(&self, guild_id: &str) -> Vec<DmTemplate> {
        self.guild(guild_id).await.dm_templates
    }

    /// Insert or replace a template. `id = None` creates a new one.
    pub async fn upsert_dm_template(
        &self,
        guild_id: &str,
        id: Option<String>,
        name: &str,
        content: &str,
    ) -> Result<DmTemplate> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GoblinError::Validation("Template name cannot be empty".into()));
        }
        let template = DmTemplate {
            id: id.unwrap_or_else(|| format!("{:016x}", rand::random::<u64>())),
            name: name.to_string(),
            content: content.to_string(),
        };
        let stored = template.clone();
        self.update_guild(guild_id, move |g| {
            match g.dm_templates.iter_mut().find(|t| t.id == template.id) {
                Some(existing) => *existing = template,
                None => g.dm_templates.push(template),
            }
        })
        .await?;
        Ok(stored)
    }

    /// Returns whether a template was removed.
    pub async fn delete_dm_template(&self, guild_id: &str, id: &str) -> Result<bool> {
        if !self.dm_templates(guild_id).await.iter().any(|t| t.id == id) {
            return Ok(false);
        }
        let id = id.to_string();
        self.update_guild(guild_id, move |g| g.dm_templates.retain(|t| t.id != id))
            .await?;
        Ok(true)
    }

    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await
    }

    pub async fn close(self) {
        self.store.close().await;
    }
}
