//! Collaborator traits: the seams where goblin talks to the outside world.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ThreadState;

/// Thread primitives the recruit workflows need from the chat platform.
///
/// Implementations report transport failures as errors; callers decide
/// whether a failure is fatal (it never is for the sweeper).
#[async_trait]
pub trait ThreadPlatform: Send + Sync {
    /// Platform name for logs.
    fn name(&self) -> &str;

    /// Look up a thread. `Ok(None)` means it no longer exists or is not a thread.
    async fn fetch_thread(&self, thread_id: &str) -> Result<Option<ThreadState>>;

    /// Post a plain text message into the thread.
    async fn send_message(&self, thread_id: &str, content: &str) -> Result<()>;

    /// Lock the thread so only moderators can post.
    async fn set_locked(&self, thread_id: &str, reason: &str) -> Result<()>;

    /// Archive the thread.
    async fn set_archived(&self, thread_id: &str, reason: &str) -> Result<()>;
}
