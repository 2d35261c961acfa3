//! Open applicant registry: which recruit threads exist, and for whom.
//!
//! Three in-memory indices (owner, resource, trigger) describe one relation
//! and are only ever changed together under one mutex. Each change queues a
//! full snapshot to the backing [`AtomicFileStore`] without waiting for it,
//! so the caller's result is defined by the in-memory update and
//! durability follows in submission order. `flush` waits for it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use goblin_core::Result;
use serde::{Deserialize, Deserializer, Serialize};

use crate::atomic::{AtomicFileStore, Document};
use crate::lock::IdempotencyLock;

/// One open derived resource (a recruit thread) and who it belongs to.
///
/// Files written by the older bot (`applicantId`, `threadId`, epoch-millisecond
/// `openedAt`, ...) are read through the aliases and rewritten in this form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    /// Stable id of whoever the resource was opened for (one entry per owner).
    #[serde(alias = "applicantId")]
    pub owner_key: String,
    /// Display tag of the owner.
    #[serde(alias = "applicantTag")]
    pub resource_tag: String,
    /// Durable id of the derived resource (thread id).
    #[serde(alias = "threadId")]
    pub resource_id: String,
    #[serde(alias = "threadUrl")]
    pub external_url: String,
    /// What the resource concerns, e.g. the normalized player tag.
    #[serde(alias = "playerTag")]
    pub correlation_key: String,
    #[serde(default, alias = "guildId", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Source-event id the workflow was claimed under, when it differs from `owner_key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_key: Option<String>,
    #[serde(deserialize_with = "opened_at_compat")]
    pub opened_at: DateTime<Utc>,
}

/// RFC 3339 string, or epoch milliseconds as the older files store it.
fn opened_at_compat<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(DateTime<Utc>),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| serde::de::Error::custom(format!("openedAt out of range: {ms}"))),
        Raw::Text(dt) => Ok(dt),
    }
}

impl RegistryEntry {
    /// New entry opened now.
    pub fn new(
        owner_key: impl Into<String>,
        resource_tag: impl Into<String>,
        resource_id: impl Into<String>,
        external_url: impl Into<String>,
        correlation_key: impl Into<String>,
    ) -> Self {
        Self {
            owner_key: owner_key.into(),
            resource_tag: resource_tag.into(),
            resource_id: resource_id.into(),
            external_url: external_url.into(),
            correlation_key: correlation_key.into(),
            group_id: None,
            trigger_key: None,
            opened_at: Utc::now(),
        }
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_trigger(mut self, trigger_key: impl Into<String>) -> Self {
        self.trigger_key = Some(trigger_key.into());
        self
    }

    /// Time since the resource was opened.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.opened_at
    }
}

/// On-disk form of the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub version: u32,
    #[serde(default)]
    pub entries: Vec<RegistryEntry>,
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            entries: Vec::new(),
        }
    }
}

impl Document for RegistryDocument {
    const VERSION: u32 = 1;

    fn version(&self) -> u32 {
        self.version
    }
}

#[derive(Default)]
struct Indices {
    by_owner: HashMap<String, RegistryEntry>,
    owner_by_resource: HashMap<String, String>,
    owner_by_trigger: HashMap<String, String>,
}

impl Indices {
    /// Insert, evicting any entry that shares the owner or the resource.
    fn insert(&mut self, entry: RegistryEntry) -> Vec<RegistryEntry> {
        let mut evicted = Vec::new();
        if let Some(old) = self.remove_owner(&entry.owner_key) {
            evicted.push(old);
        }
        if let Some(other) = self.owner_by_resource.get(&entry.resource_id).cloned()
            && let Some(old) = self.remove_owner(&other)
        {
            evicted.push(old);
        }
        if let Some(other) = entry
            .trigger_key
            .as_ref()
            .and_then(|t| self.owner_by_trigger.get(t).cloned())
            && let Some(old) = self.remove_owner(&other)
        {
            evicted.push(old);
        }

        self.owner_by_resource
            .insert(entry.resource_id.clone(), entry.owner_key.clone());
        if let Some(trigger) = &entry.trigger_key {
            self.owner_by_trigger
                .insert(trigger.clone(), entry.owner_key.clone());
        }
        self.by_owner.insert(entry.owner_key.clone(), entry);
        evicted
    }

    fn remove_owner(&mut self, owner_key: &str) -> Option<RegistryEntry> {
        let entry = self.by_owner.remove(owner_key)?;
        self.owner_by_resource.remove(&entry.resource_id);
        if let Some(trigger) = &entry.trigger_key {
            self.owner_by_trigger.remove(trigger);
        }
        Some(entry)
    }

    fn is_completed(&self, key: &str) -> bool {
        self.by_owner.contains_key(key) || self.owner_by_trigger.contains_key(key)
    }

    fn sorted(&self) -> Vec<RegistryEntry> {
        let mut entries: Vec<_> = self.by_owner.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.opened_at
                .cmp(&b.opened_at)
                .then_with(|| a.owner_key.cmp(&b.owner_key))
        });
        entries
    }
}

/// Durable registry of open recruit threads plus the claim space that
/// keeps two triggers from opening duplicates.
pub struct ApplicantRegistry {
    store: AtomicFileStore<RegistryDocument>,
    indices: Mutex<Indices>,
    pending: IdempotencyLock,
}

impl ApplicantRegistry {
    /// Open the registry and replay the persisted document into memory.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let store = AtomicFileStore::<RegistryDocument>::open(path);
        let doc = store.load().await;

        let mut indices = Indices::default();
        for entry in doc.entries {
            indices.insert(entry);
        }
        tracing::info!(
            "📂 Applicant registry loaded: {} open thread(s) from {}",
            indices.by_owner.len(),
            store.path().display()
        );

        Self {
            store,
            indices: Mutex::new(indices),
            pending: IdempotencyLock::new(),
        }
    }

    fn indices(&self) -> std::sync::MutexGuard<'_, Indices> {
        self.indices.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a snapshot write. Called with the indices guard held so
    /// snapshots reach the writer in the order the changes happened.
    fn persist(&self, indices: &Indices) {
        let doc = RegistryDocument {
            version: RegistryDocument::VERSION,
            entries: indices.sorted(),
        };
        if let Err(e) = self.store.mutate_detached(move |_| doc) {
            tracing::warn!("⚠️ Registry snapshot not queued: {e}");
        }
    }

    /// Claim `key` for a new workflow. Fails if it is already in flight or
    /// an open entry already answers to it.
    pub fn try_claim(&self, key: &str) -> bool {
        let indices = self.indices();
        self.pending.try_claim_unless(key, |k| indices.is_completed(k))
    }

    /// Give up a claim without registering anything.
    pub fn release(&self, key: &str) {
        self.pending.release(key);
    }

    /// RAII form of [`try_claim`](Self::try_claim): the claim is released
    /// on drop unless promoted with [`Claim::register`].
    pub fn claim(&self, key: &str) -> Option<Claim<'_>> {
        self.try_claim(key).then(|| Claim {
            registry: self,
            key: key.to_string(),
            promoted: false,
        })
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.is_pending(key)
    }

    /// Record a finished workflow. Replaces any entry for the same owner
    /// (or the same resource) and releases matching pending claims.
    pub fn register(&self, entry: RegistryEntry) -> RegistryEntry {
        let mut indices = self.indices();
        let evicted = indices.insert(entry.clone());
        self.pending.release(&entry.owner_key);
        if let Some(trigger) = &entry.trigger_key {
            self.pending.release(trigger);
        }
        self.persist(&indices);
        drop(indices);

        for old in &evicted {
            tracing::debug!(
                "Replaced registry entry for {} (thread {})",
                old.owner_key,
                old.resource_id
            );
        }
        tracing::info!(
            "🧵 Registered thread {} for {} ({})",
            entry.resource_id,
            entry.owner_key,
            entry.correlation_key
        );
        entry
    }

    pub fn lookup(&self, owner_key: &str) -> Option<RegistryEntry> {
        self.indices().by_owner.get(owner_key).cloned()
    }

    pub fn lookup_by_resource(&self, resource_id: &str) -> Option<RegistryEntry> {
        let indices = self.indices();
        let owner = indices.owner_by_resource.get(resource_id)?;
        indices.by_owner.get(owner).cloned()
    }

    pub fn lookup_by_trigger(&self, trigger_key: &str) -> Option<RegistryEntry> {
        let indices = self.indices();
        let owner = indices.owner_by_trigger.get(trigger_key)?;
        indices.by_owner.get(owner).cloned()
    }

    /// Remove the entry whose resource is `resource_id`. Returns whether one existed.
    pub fn remove_by_resource(&self, resource_id: &str) -> bool {
        let mut indices = self.indices();
        let Some(owner) = indices.owner_by_resource.get(resource_id).cloned() else {
            return false;
        };
        indices.remove_owner(&owner);
        self.persist(&indices);
        true
    }

    pub fn remove_by_owner(&self, owner_key: &str) -> Option<RegistryEntry> {
        let mut indices = self.indices();
        let removed = indices.remove_owner(owner_key)?;
        self.persist(&indices);
        Some(removed)
    }

    /// All open entries, oldest first.
    pub fn list_all(&self) -> Vec<RegistryEntry> {
        self.indices().sorted()
    }

    pub fn len(&self) -> usize {
        self.indices().by_owner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until every queued snapshot has been written.
    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await
    }

    /// Flush and stop the background writer.
    pub async fn close(self) {
        self.store.close().await;
    }
}

/// A pending claim on a trigger key.
pub struct Claim<'a> {
    registry: &'a ApplicantRegistry,
    key: String,
    promoted: bool,
}

impl Claim<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Promote the claim into a registry entry. If the claim key is not
    /// the entry's owner key it is recorded as the entry's trigger key.
    pub fn register(mut self, mut entry: RegistryEntry) -> RegistryEntry {
        if entry.trigger_key.is_none() && entry.owner_key != self.key {
            entry.trigger_key = Some(self.key.clone());
        }
        let registered = self.registry.register(entry);
        // Released by register() via owner or trigger key; make sure either way.
        self.registry.release(&self.key);
        self.promoted = true;
        registered
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.promoted {
            tracing::debug!("Releasing unpromoted claim {}", self.key);
            self.registry.release(&self.key);
        }
    }
}
