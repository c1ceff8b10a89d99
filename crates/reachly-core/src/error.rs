//! Error type shared by every Reachly crate.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ReachlyError>;

#[derive(Debug, thiserror::Error)]
pub enum ReachlyError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    /// Input that can never succeed, no matter how often it is retried.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Outbound messaging API rejected or failed the call.
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl ReachlyError {
    /// Permanent errors are never worth another attempt.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ReachlyError::Validation(_))
    }
}
