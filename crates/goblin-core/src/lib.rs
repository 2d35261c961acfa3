//! # Goblin Core
//!
//! Shared pieces every other goblin crate builds on: the error type, the
//! runtime configuration, and the traits that describe external
//! collaborators (the chat platform).

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::GoblinConfig;
pub use error::{GoblinError, Result};
pub use traits::ThreadPlatform;
pub use types::ThreadState;
