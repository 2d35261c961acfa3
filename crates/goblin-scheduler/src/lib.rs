//! # Goblin Scheduler
//!
//! Keeps the applicant registry from growing forever.
//!
//! ```text
//! SweepScheduler (tokio interval, first tick immediately)
//!   └── sweep: list registry → stale? → finalize thread → remove entry
//!                                        ├── send close notice
//!                                        ├── lock
//!                                        └── archive
//! ```
//! At most one sweep runs at a time; a tick that lands on a running sweep
//! is dropped.

pub mod finalize;
pub mod sweep;

#[cfg(test)]
pub(crate) mod testing;

pub use finalize::{Finalized, finalize_thread, recheck_entry};
pub use sweep::{SweepReport, SweepScheduler};
