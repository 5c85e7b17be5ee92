use std::ops::AddAssign;
use std::sync::Arc;

use redis::aio::ConnectionManager;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::codec::Codec;
use crate::error::MoverError;
use crate::job::TransferJob;
use crate::progress::{NoopProgress, ProgressSink};
use crate::queue::{ClaimOutcome, Entry, QueueShape, RedisQueue};
use crate::reconcile::LockReconciler;
use crate::status::StatusCopier;

/// Accounting for one or more transfers. Every entry read ends up in exactly one
/// of the three counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStats {
    /// Appended to the destination.
    pub moved: u64,
    /// Lost their lock to a competing job in the destination.
    pub dropped: u64,
    /// Rejected by the keep predicate and returned to the live source queue.
    pub reenqueued: u64,
}

impl AddAssign for TransferStats {
    fn add_assign(&mut self, other: Self) {
        self.moved += other.moved;
        self.dropped += other.dropped;
        self.reenqueued += other.reenqueued;
    }
}

/// Collaborators shared by every mover of one run.
#[derive(Clone)]
pub struct MoverContext {
    pub reconciler: LockReconciler,
    pub statuses: StatusCopier,
    pub cancel: CancellationToken,
    pub progress: Arc<dyn ProgressSink>,
}

impl MoverContext {
    pub fn new(source: ConnectionManager, dest: ConnectionManager, cancel: CancellationToken) -> Self {
        Self {
            reconciler: LockReconciler::new(source.clone(), dest.clone()),
            statuses: StatusCopier::new(source, dest),
            cancel,
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_reconciler(mut self, reconciler: LockReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub(crate) fn ensure_running(&self, key: &str, stats: TransferStats) -> Result<(), MoverError> {
        if self.cancel.is_cancelled() {
            return Err(MoverError::Cancelled {
                key: key.to_string(),
                stats,
            });
        }
        Ok(())
    }
}

/// Moves the contents of one queue from the source deployment to the destination.
pub struct QueueMover<S: QueueShape, C: Codec> {
    source: RedisQueue<S, C>,
    dest: RedisQueue<S, C>,
    context: MoverContext,
}

impl<S, C> QueueMover<S, C>
where
    S: QueueShape,
    C: Codec,
    C::Item: TransferJob,
{
    pub fn new(source: RedisQueue<S, C>, dest: RedisQueue<S, C>, context: MoverContext) -> Self {
        Self {
            source,
            dest,
            context,
        }
    }

    /// Claims the source queue and drains it batch by batch. Jobs rejected by `keep`
    /// are re-enqueued to the live source key.
    ///
    /// Cancellation is checked after every read and before the batch is processed. It
    /// surfaces as `MoverError::Cancelled` carrying the partial stats; the batch in
    /// flight is never partially committed. A queue found exhausted finishes normally.
    pub async fn transfer<F>(mut self, keep: F) -> Result<TransferStats, MoverError>
    where
        F: Fn(&C::Item) -> bool,
    {
        let queue_key = self.source.original_key().to_string();

        if self.source.recovery_already_exists().await? {
            tracing::info!(
                queue_key = %queue_key,
                "Resuming a transfer of '{}', re-run to move currently enqueued jobs",
                queue_key
            );
        }

        if self.source.move_queue_to_recovery().await? == ClaimOutcome::Missing {
            tracing::debug!(queue_key = %queue_key, "Nothing to recover");
            return Ok(TransferStats::default());
        }

        tracing::info!(queue_key = %queue_key, "Recovering single queue");

        let mut stats = TransferStats::default();
        match self.drain(&keep, &mut stats).await {
            Ok(()) => {
                tracing::info!(
                    queue_key = %queue_key,
                    num_moved = stats.moved,
                    num_dropped = stats.dropped,
                    num_reenqueued = stats.reenqueued,
                    "Finished recovering single queue"
                );
                Ok(stats)
            }
            Err(e) if e.is_cancelled() => {
                tracing::error!(
                    queue_key = %queue_key,
                    num_moved = stats.moved,
                    num_dropped = stats.dropped,
                    num_reenqueued = stats.reenqueued,
                    "Transfer of queue '{}' was stopped after transferring {} jobs to the target redis",
                    queue_key,
                    stats.moved
                );
                Err(e)
            }
            Err(e) => {
                tracing::error!(
                    queue_key = %queue_key,
                    num_moved = stats.moved,
                    num_dropped = stats.dropped,
                    num_reenqueued = stats.reenqueued,
                    error = %e,
                    "Transfer of queue failed"
                );
                Err(e)
            }
        }
    }

    async fn drain<F>(&mut self, keep: &F, stats: &mut TransferStats) -> Result<(), MoverError>
    where
        F: Fn(&C::Item) -> bool,
    {
        loop {
            let Some(batch) = self.source.next_batch().await? else {
                return Ok(());
            };
            self.context
                .ensure_running(self.source.original_key(), *stats)?;

            let read = batch.len() as u64;

            let (jobs_to_move, excluded): (Vec<_>, Vec<_>) =
                batch.into_iter().partition(|entry| keep(&entry.value));

            let (moved, dropped) = self.move_batch_to_dest(jobs_to_move).await?;
            self.source.commit(&excluded).await?;

            stats.moved += moved;
            stats.dropped += dropped;
            stats.reenqueued += excluded.len() as u64;

            debug_assert_eq!(read, moved + dropped + excluded.len() as u64);
            self.context.progress.advance(read);
        }
    }

    /// Reconciles locks for `jobs_to_move`, appends the survivors to the destination and
    /// copies their status records. Returns `(moved, dropped)`.
    pub async fn move_batch_to_dest(
        &self,
        jobs_to_move: Vec<Entry<C::Item>>,
    ) -> Result<(u64, u64), MoverError> {
        let reconciled = self.context.reconciler.reconcile(jobs_to_move).await?;

        self.dest.append(&reconciled.to_append).await?;
        self.context.statuses.copy(&reconciled.to_append).await?;

        Ok((
            reconciled.to_append.len() as u64,
            reconciled.dropped.len() as u64,
        ))
    }
}
