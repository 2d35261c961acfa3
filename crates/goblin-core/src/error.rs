//! Error type shared across goblin crates.

/// Everything a goblin store or collaborator can fail with.
#[derive(Debug, thiserror::Error)]
pub enum GoblinError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Store writer has shut down")]
    Closed,
}

pub type Result<T> = std::result::Result<T, GoblinError>;
