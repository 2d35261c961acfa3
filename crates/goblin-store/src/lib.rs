//! # Goblin Store
//!
//! Durable state that must survive restarts without corruption.
//!
//! ```text
//! AtomicFileStore<D>   one JSON document, write-through cache,
//!   │                  writes linearized through a single writer task,
//!   │                  each commit = temp file + rename
//!   ├── ConfigStore          guild settings (recruit-config.json)
//!   └── ApplicantRegistry    open recruit threads + IdempotencyLock
//! ```

pub mod atomic;
pub mod config_store;
pub mod lock;
pub mod registry;

pub use atomic::{AtomicFileStore, Document, write_atomic};
pub use config_store::{ConfigStore, DmTemplate, RecruitConfigFile, RecruitGuildConfig};
pub use lock::IdempotencyLock;
pub use registry::{ApplicantRegistry, Claim, RegistryDocument, RegistryEntry};
