//! Discord REST adapter: thread lookups, notices and lock/archive over the HTTP API.

use async_trait::async_trait;
use goblin_core::config::DiscordConfig;
use goblin_core::error::{GoblinError, Result};
use goblin_core::traits::ThreadPlatform;
use goblin_core::types::ThreadState;
use serde::Deserialize;

/// Channel object as returned by `GET /channels/{id}`. Only thread fields are read.
#[derive(Debug, Deserialize)]
struct ChannelPayload {
    id: String,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    thread_metadata: Option<ThreadMetadata>,
}

#[derive(Debug, Deserialize)]
struct ThreadMetadata {
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    locked: bool,
}

impl ChannelPayload {
    /// Non-thread channels have no metadata and are not treated as threads.
    fn into_thread(self) -> Option<ThreadState> {
        let meta = self.thread_metadata?;
        Some(ThreadState {
            id: self.id,
            guild_id: self.guild_id,
            archived: meta.archived,
            locked: meta.locked,
        })
    }
}

/// Bot-token client for the Discord channel endpoints.
pub struct DiscordThreads {
    config: DiscordConfig,
    client: reqwest::Client,
}

impl DiscordThreads {
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.config.token)
    }

    async fn patch_channel(&self, thread_id: &str, body: serde_json::Value, reason: &str) -> Result<()> {
        let response = self
            .client
            .patch(self.api_url(&format!("channels/{thread_id}")))
            .header("Authorization", self.auth())
            .header("X-Audit-Log-Reason", audit_reason(reason))
            .json(&body)
            .send()
            .await
            .map_err(|e| GoblinError::Channel(format!("Discord PATCH {thread_id} failed: {e}")))?;
        check_status(response, thread_id).await
    }
}

/// Audit log reasons travel in a header: Discord expects them URL-encoded and
/// caps them at 512 characters.
fn audit_reason(reason: &str) -> String {
    let trimmed: String = reason
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(512)
        .collect();
    let mut encoded = String::with_capacity(trimmed.len());
    for byte in trimmed.bytes() {
        if byte.is_ascii_alphanumeric() || b"-_.~ ".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

async fn check_status(response: reqwest::Response, thread_id: &str) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(GoblinError::Channel(format!(
        "Discord API error for {thread_id}: {status} {body}"
    )))
}

#[async_trait]
impl ThreadPlatform for DiscordThreads {
    fn name(&self) -> &str {
        "discord"
    }

    async fn fetch_thread(&self, thread_id: &str) -> Result<Option<ThreadState>> {
        let response = self
            .client
            .get(self.api_url(&format!("channels/{thread_id}")))
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| GoblinError::Channel(format!("Discord GET {thread_id} failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!("Discord thread {thread_id} not found");
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GoblinError::Channel(format!(
                "Discord API error for {thread_id}: {status} {body}"
            )));
        }

        let channel: ChannelPayload = response
            .json()
            .await
            .map_err(|e| GoblinError::Channel(format!("Invalid Discord channel payload: {e}")))?;
        Ok(channel.into_thread())
    }

    async fn send_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let body = serde_json::json!({
            "content": content,
            "allowed_mentions": { "parse": [] },
        });
        let response = self
            .client
            .post(self.api_url(&format!("channels/{thread_id}/messages")))
            .header("Authorization", self.auth())
            .json(&body)
            .send()
            .await
            .map_err(|e| GoblinError::Channel(format!("Discord send to {thread_id} failed: {e}")))?;
        check_status(response, thread_id).await
    }

    async fn set_locked(&self, thread_id: &str, reason: &str) -> Result<()> {
        self.patch_channel(thread_id, serde_json::json!({ "locked": true }), reason)
            .await
    }

    async fn set_archived(&self, thread_id: &str, reason: &str) -> Result<()> {
        self.patch_channel(thread_id, serde_json::json!({ "archived": true }), reason)
            .await
    }
}
