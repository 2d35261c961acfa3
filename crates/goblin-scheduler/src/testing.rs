//! In-memory `ThreadPlatform` for tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use goblin_core::{GoblinError, Result, ThreadPlatform, ThreadState};
use tokio::sync::{Notify, Semaphore};

#[derive(Default)]
pub struct FakePlatform {
    threads: Mutex<HashMap<String, ThreadState>>,
    broken: Mutex<HashSet<String>>,
    read_only: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    pub gate: Option<Arc<Semaphore>>,
    pub entered: Arc<Notify>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// A platform whose `fetch_thread` waits for permits on the returned semaphore.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let platform = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (platform, gate)
    }

    pub fn add_thread(&self, id: &str, archived: bool, locked: bool) {
        self.threads.lock().unwrap().insert(
            id.to_string(),
            ThreadState {
                id: id.to_string(),
                guild_id: Some("guild-1".into()),
                archived,
                locked,
            },
        );
    }

    /// Every call touching `id` fails.
    pub fn break_thread(&self, id: &str) {
        self.broken.lock().unwrap().insert(id.to_string());
    }

    /// `fetch_thread` works for `id` but every write fails.
    pub fn make_read_only(&self, id: &str) {
        self.read_only.lock().unwrap().insert(id.to_string());
    }

    pub fn thread(&self, id: &str) -> Option<ThreadState> {
        self.threads.lock().unwrap().get(id).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str, id: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("{call}:{id}"));
        let write_blocked = call != "fetch" && self.read_only.lock().unwrap().contains(id);
        if write_blocked || self.broken.lock().unwrap().contains(id) {
            return Err(GoblinError::Channel(format!("{call} failed for {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ThreadPlatform for FakePlatform {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch_thread(&self, thread_id: &str) -> Result<Option<ThreadState>> {
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.map_err(|e| GoblinError::Channel(e.to_string()))?;
        }
        self.record("fetch", thread_id)?;
        Ok(self.thread(thread_id))
    }

    async fn send_message(&self, thread_id: &str, _content: &str) -> Result<()> {
        self.record("send", thread_id)
    }

    async fn set_locked(&self, thread_id: &str, _reason: &str) -> Result<()> {
        self.record("lock", thread_id)?;
        if let Some(t) = self.threads.lock().unwrap().get_mut(thread_id) {
            t.locked = true;
        }
        Ok(())
    }

    async fn set_archived(&self, thread_id: &str, _reason: &str) -> Result<()> {
        self.record("archive", thread_id)?;
        if let Some(t) = self.threads.lock().unwrap().get_mut(thread_id) {
            t.archived = true;
        }
        Ok(())
    }
}
