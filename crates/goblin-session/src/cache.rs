//! Session cache: absolute TTL from creation, lazy eviction on read.
//!
//! `get` never returns an expired session, even if no cleanup has run.
//! Every `create` also scans the whole table and drops expired sessions so
//! memory stays bounded when callers never come back.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// One session: immutable id and creation time plus a mutable payload.
#[derive(Debug, Clone)]
pub struct Session<T> {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub data: T,
    born: Instant,
}

impl<T> Session<T> {
    fn expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.born) >= ttl
    }
}

/// In-memory TTL map keyed by a random hex id.
pub struct SessionCache<T> {
    ttl: Duration,
    sessions: Mutex<HashMap<String, Session<T>>>,
}

impl<T: Clone> SessionCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session<T>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `data` under a fresh id.
    pub fn create(&self, data: T) -> Session<T> {
        let now = Instant::now();
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, s| !s.expired(self.ttl, now));
        if sessions.len() < before {
            tracing::debug!("Evicted {} expired session(s)", before - sessions.len());
        }

        let id = loop {
            let candidate = format!("{:016x}", rand::random::<u64>());
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        let session = Session {
            id: id.clone(),
            created_at: Utc::now(),
            data,
            born: now,
        };
        sessions.insert(id, session.clone());
        session
    }

    /// Live session by id; an expired one is removed and reported absent.
    pub fn get(&self, id: &str) -> Option<Session<T>> {
        let mut sessions = self.sessions();
        let expired = sessions.get(id)?.expired(self.ttl, Instant::now());
        if expired {
            sessions.remove(id);
            return None;
        }
        sessions.get(id).cloned()
    }

    /// Patch a live session's payload. Id and creation time never change.
    pub fn update<F>(&self, id: &str, patch: F) -> Option<Session<T>>
    where
        F: FnOnce(&mut T),
    {
        let mut sessions = self.sessions();
        let expired = sessions.get(id)?.expired(self.ttl, Instant::now());
        if expired {
            sessions.remove(id);
            return None;
        }
        let session = sessions.get_mut(id)?;
        patch(&mut session.data);
        Some(session.clone())
    }

    pub fn delete(&self, id: &str) {
        self.sessions().remove(id);
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, s| !s.expired(self.ttl, now));
        before - sessions.len()
    }

    /// Stored sessions, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
