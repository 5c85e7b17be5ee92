use crate::mover::TransferStats;

#[derive(thiserror::Error, Debug)]
pub enum MoverError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("JSON Serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to decode entry from '{key}': {message}")]
    Decode { key: String, message: String },

    #[error("Entry written to sorted set '{key}' has no score")]
    MissingScore { key: String },

    #[error("Transfer of '{key}' was stopped after transferring {} jobs", .stats.moved)]
    Cancelled { key: String, stats: TransferStats },

    #[error("An instance of transfer jobs is already running (lock '{lock_key}' held by {holder})")]
    AlreadyRunning { lock_key: String, holder: String },

    #[error("Runtime error: {message}")]
    Runtime { message: String },
}

impl MoverError {
    /// True when the transfer stopped because of a shutdown request rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MoverError::Cancelled { .. })
    }
}
