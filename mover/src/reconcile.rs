use std::time::Duration;

use redis::aio::ConnectionManager;

use crate::codec::RawCodec;
use crate::error::MoverError;
use crate::job::{JobLock, TransferJob};
use crate::lock::{AcquireLockResult, LockRequest, RedisLock};
use crate::options::TransferOptions;
use crate::queue::{ClaimOutcome, DEFAULT_BATCH_SIZE, Entry, ListQueue};

/// Result of reconciling one batch of kept jobs.
#[derive(Debug)]
pub struct Reconciled<T> {
    pub to_append: Vec<Entry<T>>,
    /// Jobs whose lock is held by someone else in the destination. Their source lock is
    /// gone as well, they are intentionally abandoned.
    pub dropped: Vec<Entry<T>>,
}

/// Hands job locks over from the source deployment to the destination.
///
/// The destination lock is attempted first (set-if-absent, no waiting), then the
/// source lock is released for every lockable job in the batch, whether or not the
/// destination attempt succeeded.
///
/// A fault between the destination acquire and the batch commit leaves the destination
/// lock held by the job itself while the job is still in the recovery copy. On resume
/// that lock is recognised by its owner and the job is moved, not dropped.
#[derive(Clone)]
pub struct LockReconciler {
    source: RedisLock,
    dest: RedisLock,
    default_ttl: Duration,
    batch_size: usize,
}

impl LockReconciler {
    pub fn new(source: ConnectionManager, dest: ConnectionManager) -> Self {
        let defaults = TransferOptions::default();
        Self {
            source: RedisLock::new(source),
            dest: RedisLock::new(dest),
            default_ttl: defaults.default_job_lock_ttl,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Batch size used when draining lock queues.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn reconcile<T: TransferJob>(
        &self,
        entries: Vec<Entry<T>>,
    ) -> Result<Reconciled<T>, MoverError> {
        let locks: Vec<Option<JobLock>> = entries.iter().map(|e| e.value.lock()).collect();
        if locks.iter().all(Option::is_none) {
            return Ok(Reconciled {
                to_append: entries,
                dropped: Vec::new(),
            });
        }

        for (entry, lock) in entries.iter().zip(&locks) {
            if lock.is_none() {
                continue;
            }
            if let Some(lock_queue_key) = entry.value.lock_queue_key() {
                self.recover_lock_queue(&lock_queue_key).await?;
            }
        }

        let results = {
            let requests: Vec<LockRequest<'_>> = locks
                .iter()
                .flatten()
                .map(|lock| LockRequest {
                    key: &lock.key,
                    owner: &lock.owner,
                    ttl: lock.ttl.unwrap_or(self.default_ttl),
                })
                .collect();

            let results = self.dest.try_acquire_many(&requests).await?;

            let keys: Vec<&str> = requests.iter().map(|r| r.key).collect();
            self.source.release_many(&keys).await?;
            results
        };

        let mut results = results.into_iter();
        let mut to_append = Vec::with_capacity(entries.len());
        let mut dropped = Vec::new();

        for (entry, lock) in entries.into_iter().zip(&locks) {
            let Some(lock) = lock else {
                to_append.push(entry);
                continue;
            };

            match results.next() {
                Some(AcquireLockResult::AlreadyLocked(owner)) if owner == lock.owner => {
                    tracing::debug!(
                        job_id = entry.value.id(),
                        lock_key = %lock.key,
                        "Destination lock already held by this job"
                    );
                    to_append.push(entry);
                }
                Some(AcquireLockResult::AlreadyLocked(other_owner)) => {
                    tracing::warn!(
                        job_id = entry.value.id(),
                        other_job_id = %other_owner,
                        lock_key = %lock.key,
                        "Dropping job with lock owned by other job"
                    );
                    dropped.push(entry);
                }
                Some(AcquireLockResult::Acquired) => to_append.push(entry),
                None => {
                    return Err(MoverError::Runtime {
                        message: format!("Missing lock reply for job {}", entry.value.id()),
                    });
                }
            }
        }

        Ok(Reconciled { to_append, dropped })
    }

    /// Moves a lock queue to the destination using the same claim protocol as any other
    /// queue. Entries are carried over verbatim.
    pub async fn recover_lock_queue(&self, key: &str) -> Result<u64, MoverError> {
        let mut source = ListQueue::new(self.source.conn().clone(), key, RawCodec)
            .with_batch_size(self.batch_size);
        let dest = ListQueue::new(self.dest.conn().clone(), key, RawCodec);

        if source.move_queue_to_recovery().await? == ClaimOutcome::Missing {
            return Ok(0);
        }

        let mut moved = 0;
        while let Some(batch) = source.next_batch().await? {
            dest.append(&batch).await?;
            source.commit(&[]).await?;
            moved += batch.len() as u64;
        }

        tracing::debug!(lock_queue_key = key, moved, "Recovered lock queue");
        Ok(moved)
    }
}
