mod builder;

use std::sync::Arc;

use redis::aio::ConnectionManager;
use serde::Serialize;
use tokio::time::{Instant, sleep};

use crate::codec::Codec;
use crate::error::MoverError;
use crate::filter::JobFilter;
use crate::job::TransferJob;
use crate::lock::{AcquireLockResult, RedisLock};
use crate::mover::{MoverContext, QueueMover, TransferStats};
use crate::multi::MultiQueueMover;
use crate::options::TransferOptions;
use crate::progress::{LogProgress, ProgressSink};
use crate::queue::{QueueShape, Set, SortedSet, SortedSetQueue};
use crate::reconcile::LockReconciler;
use crate::registry::QueueRegistry;
use crate::shutdown::ShutdownHandle;

pub use builder::{
    HasCodec, HasDestination, HasSource, NoCodec, NoDestination, NoSource, TransferJobsBuilder,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Set,
    SortedSet,
}

/// A registry of queue names and how its members map to queue keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryPlan {
    pub key: String,
    pub kind: RegistryKind,
    pub member_prefix: String,
}

impl RegistryPlan {
    pub fn set(key: impl Into<String>, member_prefix: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: RegistryKind::Set,
            member_prefix: member_prefix.into(),
        }
    }

    pub fn sorted_set(key: impl Into<String>, member_prefix: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: RegistryKind::SortedSet,
            member_prefix: member_prefix.into(),
        }
    }
}

/// Job-state categories migrated by `recover`, in order: registries first, then
/// sorted-set scheduled queues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPlan {
    pub registries: Vec<RegistryPlan>,
    pub scheduled_queues: Vec<String>,
}

impl TransferPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(mut self, registry: RegistryPlan) -> Self {
        self.registries.push(registry);
        self
    }

    pub fn with_scheduled_queue(mut self, key: impl Into<String>) -> Self {
        self.scheduled_queues.push(key.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverReport {
    pub moved: u64,
    pub dropped: u64,
    pub reenqueued: u64,
    /// Stopped by `shutdown` before every category was drained. Re-running resumes.
    pub aborted: bool,
}

/// Migrates every queue in a `TransferPlan` from one deployment to another under a
/// process-wide lock.
pub struct TransferJobs<C: Codec> {
    source: ConnectionManager,
    dest: ConnectionManager,
    codec: C,
    plan: TransferPlan,
    options: TransferOptions,
    filter: JobFilter,
    shutdown: ShutdownHandle,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl<C> TransferJobs<C>
where
    C: Codec,
    C::Item: TransferJob,
{
    pub fn plan(&self) -> &TransferPlan {
        &self.plan
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    pub fn filter(&self) -> &JobFilter {
        &self.filter
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Asks a running `recover` to stop at its next check point.
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Runs the whole migration. Fails with `AlreadyRunning` if another transfer holds
    /// the lock past `lock_wait_time`; a shutdown request yields a report with
    /// `aborted` set.
    pub async fn recover(&self) -> Result<RecoverReport, MoverError> {
        let lock = RedisLock::new(self.source.clone());
        let owner = nanoid::nanoid!();

        self.acquire_transfer_lock(&lock, &owner).await?;
        tracing::info!(lock_key = %self.options.lock_key, owner = %owner, "Acquired transfer lock");

        let result = self.recover_locked().await;

        match lock.release_if_owner(&self.options.lock_key, &owner).await {
            Ok(true) => tracing::debug!(lock_key = %self.options.lock_key, "Released transfer lock"),
            Ok(false) => tracing::warn!(
                lock_key = %self.options.lock_key,
                "Transfer lock expired before the transfer finished"
            ),
            Err(e) => tracing::error!(
                lock_key = %self.options.lock_key,
                error = %e,
                "Failed to release transfer lock"
            ),
        }

        result
    }

    async fn acquire_transfer_lock(&self, lock: &RedisLock, owner: &str) -> Result<(), MoverError> {
        let deadline = Instant::now() + self.options.lock_wait_time;

        loop {
            let holder = match lock
                .try_acquire(&self.options.lock_key, owner, self.options.lock_timeout)
                .await?
            {
                AcquireLockResult::Acquired => return Ok(()),
                AcquireLockResult::AlreadyLocked(holder) => holder,
            };

            if Instant::now() >= deadline || self.shutdown.is_shutdown() {
                return Err(MoverError::AlreadyRunning {
                    lock_key: self.options.lock_key.clone(),
                    holder,
                });
            }

            tracing::debug!(lock_key = %self.options.lock_key, holder = %holder, "Waiting for transfer lock");
            sleep(self.options.lock_poll_interval).await;
        }
    }

    async fn recover_locked(&self) -> Result<RecoverReport, MoverError> {
        let progress = self
            .progress
            .clone()
            .unwrap_or_else(|| Arc::new(LogProgress::new()));

        let total = self.estimate_total().await?;
        progress.start(total);
        tracing::info!(total, "Progress for processing ~{} entries is being logged", total);

        let context = MoverContext::new(
            self.source.clone(),
            self.dest.clone(),
            self.shutdown.token().clone(),
        )
        .with_reconciler(
            LockReconciler::new(self.source.clone(), self.dest.clone())
                .with_default_ttl(self.options.default_job_lock_ttl)
                .with_batch_size(self.options.batch_size),
        )
        .with_progress(progress.clone());

        let mut stats = TransferStats::default();
        let result = self.run_plan(&context, &mut stats).await;
        progress.complete();

        let report = |stats: TransferStats, aborted| RecoverReport {
            moved: stats.moved,
            dropped: stats.dropped,
            reenqueued: stats.reenqueued,
            aborted,
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    num_moved = stats.moved,
                    num_dropped = stats.dropped,
                    num_reenqueued = stats.reenqueued,
                    "Finished transfer"
                );
                Ok(report(stats, false))
            }
            Err(MoverError::Cancelled { key, stats: partial }) => {
                stats += partial;
                tracing::warn!(
                    queue_key = %key,
                    num_moved = stats.moved,
                    num_dropped = stats.dropped,
                    num_reenqueued = stats.reenqueued,
                    "Transfer aborted, re-run to resume"
                );
                Ok(report(stats, true))
            }
            Err(e) => Err(e),
        }
    }

    async fn run_plan(
        &self,
        context: &MoverContext,
        stats: &mut TransferStats,
    ) -> Result<(), MoverError> {
        let keep = |job: &C::Item| self.filter.keep(job);

        for registry in &self.plan.registries {
            *stats += match registry.kind {
                RegistryKind::Set => {
                    self.multi_mover::<Set>(registry, context)
                        .transfer(&keep)
                        .await?
                }
                RegistryKind::SortedSet => {
                    self.multi_mover::<SortedSet>(registry, context)
                        .transfer(&keep)
                        .await?
                }
            };
        }

        for key in &self.plan.scheduled_queues {
            let mover = QueueMover::new(
                self.scheduled_queue(self.source.clone(), key),
                self.scheduled_queue(self.dest.clone(), key),
                context.clone(),
            );
            *stats += mover.transfer(&keep).await?;
        }

        Ok(())
    }

    async fn estimate_total(&self) -> Result<u64, MoverError> {
        let mut total = 0;

        for registry in &self.plan.registries {
            total += match registry.kind {
                RegistryKind::Set => {
                    self.registry::<Set>(self.source.clone(), registry)
                        .total_entries()
                        .await?
                }
                RegistryKind::SortedSet => {
                    self.registry::<SortedSet>(self.source.clone(), registry)
                        .total_entries()
                        .await?
                }
            };
        }

        for key in &self.plan.scheduled_queues {
            total += self.scheduled_queue(self.source.clone(), key).size().await?;
        }

        Ok(total)
    }

    fn multi_mover<S: QueueShape + Default>(
        &self,
        registry: &RegistryPlan,
        context: &MoverContext,
    ) -> MultiQueueMover<S, C> {
        MultiQueueMover::new(
            self.registry(self.source.clone(), registry),
            self.registry(self.dest.clone(), registry),
            self.codec.clone(),
            context.clone(),
        )
        .with_batch_size(self.options.batch_size)
    }

    fn registry<S: QueueShape + Default>(
        &self,
        redis: ConnectionManager,
        registry: &RegistryPlan,
    ) -> QueueRegistry<S> {
        QueueRegistry::new(redis, registry.key.clone(), registry.member_prefix.clone())
            .with_batch_size(self.options.batch_size)
    }

    fn scheduled_queue(&self, redis: ConnectionManager, key: &str) -> SortedSetQueue<C> {
        SortedSetQueue::new(redis, key, self.codec.clone()).with_batch_size(self.options.batch_size)
    }
}
