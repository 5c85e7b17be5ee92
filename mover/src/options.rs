use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::DEFAULT_BATCH_SIZE;

pub const DEFAULT_LOCK_KEY: &str = "transfer_jobs";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferOptions {
    /// Entries read, reconciled and committed per round trip.
    pub batch_size: usize,

    /// Process-wide lock on the source deployment. Running two transfers against the
    /// same source is never safe, so this lock covers the whole `recover` call.
    pub lock_key: String,
    /// How long `recover` waits for a running transfer to release the lock.
    pub lock_wait_time: Duration,
    /// How long the lock is held at most. Must outlast a full migration run.
    pub lock_timeout: Duration,
    pub lock_poll_interval: Duration,

    /// Used for job locks that do not declare their own timeout.
    pub default_job_lock_ttl: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            lock_key: DEFAULT_LOCK_KEY.to_string(),
            lock_wait_time: Duration::from_secs(60),
            lock_timeout: Duration::from_secs(30 * 60),
            lock_poll_interval: Duration::from_millis(500),
            default_job_lock_ttl: Duration::from_secs(30 * 60),
        }
    }
}
