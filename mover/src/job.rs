use std::time::Duration;

/// Mutual-exclusion token declared by a job.
///
/// The same key exists independently in the source and destination deployments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLock {
    pub key: String,
    pub owner: String,
    /// `None` falls back to `TransferOptions::default_job_lock_ttl`.
    pub ttl: Option<Duration>,
}

impl JobLock {
    pub fn new(key: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            owner: owner.into(),
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// What the movers need to know about a decoded job.
///
/// Everything except identity and class is optional: a job that does not declare a
/// lock passes through lock reconciliation untouched.
pub trait TransferJob {
    fn id(&self) -> &str;

    /// Job type identity, matched against the blacklist.
    fn class_name(&self) -> &str;

    /// Shard/pod tag the job is pinned to, if any.
    fn affinity(&self) -> Option<&str> {
        None
    }

    /// Jobs that choose their shard at runtime are never considered globally owned.
    fn selects_affinity(&self) -> bool {
        false
    }

    fn lock(&self) -> Option<JobLock> {
        None
    }

    /// Secondary list that backs this job's lock and has to follow it.
    fn lock_queue_key(&self) -> Option<String> {
        None
    }

    /// Key holding execution status for this job, copied along with the job.
    fn status_key(&self) -> Option<String> {
        None
    }
}
