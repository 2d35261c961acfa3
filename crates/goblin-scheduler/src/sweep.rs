//! Sweep scheduler: the loop that retires stale recruit threads.
//! Uses tokio::interval; sleeps between sweeps.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use goblin_core::ThreadPlatform;
use goblin_core::config::SweepConfig;
use goblin_store::{ApplicantRegistry, RegistryEntry};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::finalize::{Finalized, finalize_thread, recheck_entry};

/// Largest threshold chrono can represent, in seconds.
const MAX_STALE_SECS: u64 = (i64::MAX / 1000) as u64;

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries in the registry when the sweep started.
    pub examined: usize,
    /// Entries at or past the age threshold.
    pub stale: usize,
    /// Stale threads that existed and got the close sequence.
    pub finalized: usize,
    /// Stale threads already gone from the platform.
    pub missing: usize,
    /// Stale threads whose lookup failed.
    pub failed: usize,
    /// Entries removed from the registry.
    pub removed: usize,
}

/// Resets the running flag even if a sweep panics.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodically closes and forgets registry entries older than a threshold.
pub struct SweepScheduler {
    registry: Arc<ApplicantRegistry>,
    platform: Arc<dyn ThreadPlatform>,
    stale_after: chrono::Duration,
    interval: Duration,
    close_message: String,
    running: AtomicBool,
    stop: Notify,
}

impl SweepScheduler {
    /// Create a sweeper with the default settings (hourly, 7 days).
    pub fn new(registry: Arc<ApplicantRegistry>, platform: Arc<dyn ThreadPlatform>) -> Self {
        Self::from_config(registry, platform, &SweepConfig::default())
    }

    pub fn from_config(
        registry: Arc<ApplicantRegistry>,
        platform: Arc<dyn ThreadPlatform>,
        config: &SweepConfig,
    ) -> Self {
        Self {
            registry,
            platform,
            stale_after: chrono::Duration::seconds(config.stale_after_secs.min(MAX_STALE_SECS) as i64),
            interval: Duration::from_secs(config.interval_secs.max(1)),
            close_message: config.close_message.clone(),
            running: AtomicBool::new(false),
            stop: Notify::new(),
        }
    }

    pub fn with_stale_after(mut self, stale_after: chrono::Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one sweep now. `None` if a sweep is already in flight.
    pub async fn trigger(&self) -> Option<SweepReport> {
        self.trigger_at(Utc::now()).await
    }

    /// Run one sweep treating `now` as the current time.
    pub async fn trigger_at(&self, now: DateTime<Utc>) -> Option<SweepReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Sweep already running, skipping");
            return None;
        }
        let _guard = RunningGuard(&self.running);
        Some(self.sweep(now).await)
    }

    async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let entries = self.registry.list_all();
        let mut report = SweepReport {
            examined: entries.len(),
            ..SweepReport::default()
        };

        for entry in entries.iter().filter(|e| e.age(now) >= self.stale_after) {
            report.stale += 1;
            self.retire(entry, &mut report).await;
        }

        if report.stale > 0 {
            tracing::info!(
                "🧹 Sweep: {} stale of {} ({} closed, {} gone, {} failed, {} removed)",
                report.stale,
                report.examined,
                report.finalized,
                report.missing,
                report.failed,
                report.removed
            );
        }
        report
    }

    async fn retire(&self, entry: &RegistryEntry, report: &mut SweepReport) {
        match finalize_thread(self.platform.as_ref(), &entry.resource_id, &self.close_message).await {
            Ok(Finalized::Closed) => {
                report.finalized += 1;
                tracing::info!(
                    "🔒 Auto-closed stale recruit thread {} ({})",
                    entry.resource_id,
                    entry.owner_key
                );
            }
            Ok(Finalized::Missing) => report.missing += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(
                    "⚠️ Failed to auto-close recruit thread {} ({}): {e}",
                    entry.resource_id,
                    entry.owner_key
                );
            }
        }
        // Removed even on failure so a permanently broken thread cannot pin its entry.
        if self.registry.remove_by_resource(&entry.resource_id) {
            report.removed += 1;
        }
    }

    /// Look up an owner's open thread, dropping it if the platform says it is closed.
    pub async fn recheck(&self, owner_key: &str) -> Option<RegistryEntry> {
        let entry = self.registry.lookup(owner_key)?;
        recheck_entry(&self.registry, self.platform.as_ref(), entry).await
    }

    /// Spawn the sweep loop: one sweep right away, then one per interval.
    ///
    /// Sweeps run inside the loop, so a tick that lands on a running sweep
    /// is skipped. The task ends after [`shutdown`](Self::shutdown), once
    /// any sweep in flight has finished.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                "⏰ Sweeper started (every {}s, stale after {}h)",
                self.interval.as_secs(),
                self.stale_after.num_hours()
            );
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = self.stop.notified() => break,
                    _ = interval.tick() => {
                        self.trigger().await;
                    }
                }
            }
            tracing::info!("⏰ Sweeper stopped");
        })
    }

    /// Ask the spawned loop to stop. Await its handle to wait for a sweep in flight.
    pub fn shutdown(&self) {
        self.stop.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePlatform;

    async fn setup(dir: &std::path::Path) -> Arc<ApplicantRegistry> {
        Arc::new(ApplicantRegistry::open(dir.join("open.json")).await)
    }

    fn aged(owner: &str, thread: &str, days: i64) -> RegistryEntry {
        let mut e = RegistryEntry::new(owner, owner, thread, "url", "#TAG");
        e.opened_at = Utc::now() - chrono::Duration::days(days);
        e
    }

    #[tokio::test]
    async fn test_eight_day_old_entry_is_swept() {
        let dir = tempfile::tempdir().unwrap();
        let registry = setup(dir.path()).await;
        let platform = Arc::new(FakePlatform::new());
        platform.add_thread("t1", false, false);
        registry.register(aged("user-1", "t1", 8));

        let sweeper = SweepScheduler::new(registry.clone(), platform.clone());
        let report = sweeper.trigger().await.unwrap();

        assert_eq!(report.stale, 1);
        assert_eq!(report.finalized, 1);
        assert!(registry.lookup("user-1").is_none());
        assert!(platform.thread("t1").unwrap().archived);
    }

    #[tokio::test]
    async fn test_only_stale_entries_removed_despite_failures() {
        let dir = tempfile::tempdir().unwrap();
        let registry = setup(dir.path()).await;
        let platform = Arc::new(FakePlatform::new());

        registry.register(aged("fresh-1", "f1", 1));
        registry.register(aged("fresh-2", "f2", 6));
        registry.register(aged("old-ok", "o1", 8));
        registry.register(aged("old-broken", "o2", 9));
        registry.register(aged("old-gone", "o3", 30));
        platform.add_thread("o1", false, false);
        platform.add_thread("o2", false, false);
        platform.break_thread("o2");

        let sweeper = SweepScheduler::new(registry.clone(), platform.clone());
        let report = sweeper.trigger().await.unwrap();

        assert_eq!(
            report,
            SweepReport {
                examined: 5,
                stale: 3,
                finalized: 1,
                missing: 1,
                failed: 1,
                removed: 3,
            }
        );
        let fetches = platform.calls().iter().filter(|c| c.starts_with("fetch:")).count();
        assert_eq!(fetches, 3);
        let left: Vec<_> = registry.list_all().into_iter().map(|e| e.owner_key).collect();
        assert_eq!(left, vec!["fresh-2", "fresh-1"]);
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let registry = setup(dir.path()).await;
        let platform = Arc::new(FakePlatform::new());
        let entry = registry.register(aged("edge", "t1", 0));

        let sweeper = SweepScheduler::new(registry.clone(), platform)
            .with_stale_after(chrono::Duration::days(7));
        let at_threshold = entry.opened_at + chrono::Duration::days(7);
        let report = sweeper
            .trigger_at(at_threshold - chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(report.stale, 0);
        let report = sweeper.trigger_at(at_threshold).await.unwrap();
        assert_eq!(report.removed, 1);
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let registry = setup(dir.path()).await;
        let (platform, gate) = FakePlatform::gated();
        let platform = Arc::new(platform);
        platform.add_thread("t1", false, false);
        registry.register(aged("user-1", "t1", 8));

        let sweeper = Arc::new(SweepScheduler::new(registry.clone(), platform.clone()));
        let first = tokio::spawn({
            let sweeper = sweeper.clone();
            async move { sweeper.trigger().await }
        });

        platform.entered.notified().await;
        assert!(sweeper.is_running());
        assert!(sweeper.trigger().await.is_none());

        gate.add_permits(10);
        let report = first.await.unwrap().unwrap();
        assert_eq!(report.removed, 1);
        assert!(!sweeper.is_running());
        assert!(sweeper.trigger().await.is_some());
    }

    #[tokio::test]
    async fn test_spawned_loop_sweeps_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let registry = setup(dir.path()).await;
        let platform = Arc::new(FakePlatform::new());
        registry.register(aged("user-1", "t1", 10));

        let sweeper = Arc::new(
            SweepScheduler::new(registry.clone(), platform).with_interval(Duration::from_secs(3600)),
        );
        let handle = sweeper.clone().spawn();

        for _ in 0..200 {
            if registry.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(registry.is_empty());

        sweeper.shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_sweep_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let registry = setup(dir.path()).await;
        let (platform, gate) = FakePlatform::gated();
        let platform = Arc::new(platform);
        platform.add_thread("t1", false, false);
        platform.add_thread("t2", false, false);
        registry.register(aged("user-1", "t1", 8));
        registry.register(aged("user-2", "t2", 9));

        let sweeper = Arc::new(
            SweepScheduler::new(registry.clone(), platform.clone())
                .with_interval(Duration::from_secs(3600)),
        );
        let handle = sweeper.clone().spawn();

        platform.entered.notified().await;
        sweeper.shutdown();
        assert!(!handle.is_finished());

        gate.add_permits(10);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!sweeper.is_running());
        assert!(registry.is_empty());
        assert!(platform.thread("t1").unwrap().archived);
        assert!(platform.thread("t2").unwrap().archived);

        registry.flush().await.unwrap();
        let reopened = ApplicantRegistry::open(dir.path().join("open.json")).await;
        assert!(reopened.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let registry = setup(dir.path()).await;
        let platform = Arc::new(FakePlatform::new());
        registry.register(aged("user-1", "t1", 10));
        registry.register(aged("user-2", "t2", 1));

        SweepScheduler::new(registry.clone(), platform).trigger().await.unwrap();
        registry.flush().await.unwrap();

        let reopened = ApplicantRegistry::open(dir.path().join("open.json")).await;
        assert!(reopened.lookup("user-1").is_none());
        assert!(reopened.lookup("user-2").is_some());
    }
}
