//! Closing a recruit thread, and checking whether a registered one is still open.

use goblin_core::{Result, ThreadPlatform};
use goblin_store::{ApplicantRegistry, RegistryEntry};

/// How a finalize attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalized {
    /// The thread existed; close steps were attempted.
    Closed,
    /// The thread is gone. Nothing left to close.
    Missing,
}

/// Post `notice`, lock, then archive the thread.
///
/// Only the lookup can fail; each close step is best-effort and a failed
/// step (archived threads reject sends) is logged and skipped.
pub async fn finalize_thread(
    platform: &dyn ThreadPlatform,
    thread_id: &str,
    notice: &str,
) -> Result<Finalized> {
    let Some(thread) = platform.fetch_thread(thread_id).await? else {
        return Ok(Finalized::Missing);
    };

    if let Err(e) = platform.send_message(thread_id, notice).await {
        tracing::debug!("Close notice not sent to {thread_id}: {e}");
    }
    if !thread.locked
        && let Err(e) = platform.set_locked(thread_id, notice).await
    {
        tracing::warn!("⚠️ Failed to lock thread {thread_id}: {e}");
    }
    if !thread.archived
        && let Err(e) = platform.set_archived(thread_id, notice).await
    {
        tracing::warn!("⚠️ Failed to archive thread {thread_id}: {e}");
    }
    Ok(Finalized::Closed)
}

/// Re-check a registered thread before relying on it.
///
/// A thread that is gone or archived is dropped from the registry and
/// `None` is returned. If the platform cannot be reached the entry is
/// kept: an unknown state is not evidence the thread closed.
pub async fn recheck_entry(
    registry: &ApplicantRegistry,
    platform: &dyn ThreadPlatform,
    entry: RegistryEntry,
) -> Option<RegistryEntry> {
    match platform.fetch_thread(&entry.resource_id).await {
        Ok(Some(thread)) if thread.is_open() => Some(entry),
        Ok(_) => {
            tracing::info!(
                "🧹 Thread {} for {} is closed, forgetting it",
                entry.resource_id,
                entry.owner_key
            );
            registry.remove_by_resource(&entry.resource_id);
            None
        }
        Err(e) => {
            tracing::warn!(
                "⚠️ Could not check thread {} on {}: {e}",
                entry.resource_id,
                platform.name()
            );
            Some(entry)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePlatform;

    #[tokio::test]
    async fn test_finalize_open_thread() {
        let platform = FakePlatform::new();
        platform.add_thread("t1", false, false);

        let outcome = finalize_thread(&platform, "t1", "bye").await.unwrap();
        assert_eq!(outcome, Finalized::Closed);
        assert_eq!(platform.calls(), vec!["fetch:t1", "send:t1", "lock:t1", "archive:t1"]);
        let t = platform.thread("t1").unwrap();
        assert!(t.locked && t.archived);
    }

    #[tokio::test]
    async fn test_finalize_skips_done_steps() {
        let platform = FakePlatform::new();
        platform.add_thread("t1", true, true);
        finalize_thread(&platform, "t1", "bye").await.unwrap();
        assert_eq!(platform.calls(), vec!["fetch:t1", "send:t1"]);
    }

    #[tokio::test]
    async fn test_finalize_missing_is_success() {
        let platform = FakePlatform::new();
        assert_eq!(
            finalize_thread(&platform, "gone", "bye").await.unwrap(),
            Finalized::Missing
        );
    }

    #[tokio::test]
    async fn test_finalize_swallows_step_failures() {
        let platform = FakePlatform::new();
        platform.add_thread("t1", false, false);
        platform.make_read_only("t1");
        assert_eq!(
            finalize_thread(&platform, "t1", "bye").await.unwrap(),
            Finalized::Closed
        );
        assert_eq!(platform.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_recheck() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ApplicantRegistry::open(dir.path().join("open.json")).await;
        let platform = FakePlatform::new();
        platform.add_thread("open", false, false);
        platform.add_thread("archived", true, false);
        platform.add_thread("flaky", false, false);
        platform.break_thread("flaky");

        for (owner, thread) in [("a", "open"), ("b", "archived"), ("c", "missing"), ("d", "flaky")] {
            registry.register(RegistryEntry::new(owner, owner, thread, "url", "#TAG"));
        }

        for owner in ["a", "b", "c", "d"] {
            let entry = registry.lookup(owner).unwrap();
            let kept = recheck_entry(&registry, &platform, entry).await.is_some();
            assert_eq!(kept, owner == "a" || owner == "d", "owner {owner}");
        }
        assert_eq!(registry.len(), 2);
        assert!(registry.lookup_by_resource("archived").is_none());
    }
}
