use crate::codec::Codec;
use crate::error::MoverError;
use crate::job::TransferJob;
use crate::mover::{MoverContext, QueueMover, TransferStats};
use crate::queue::{ClaimOutcome, DEFAULT_BATCH_SIZE, ListQueue, QueueShape};
use crate::registry::QueueRegistry;

/// Moves every queue named in a registry.
///
/// The registry itself goes through the same claim/batch/commit cycle as a job queue.
/// For each batch of names, every named queue is transferred first; only then are the
/// names written to the destination registry and the batch committed on the source, so
/// the destination never lists a queue whose jobs have not arrived yet.
pub struct MultiQueueMover<S: QueueShape, C: Codec> {
    source: QueueRegistry<S>,
    dest: QueueRegistry<S>,
    codec: C,
    batch_size: usize,
    context: MoverContext,
}

impl<S, C> MultiQueueMover<S, C>
where
    S: QueueShape,
    C: Codec,
    C::Item: TransferJob,
{
    pub fn new(
        source: QueueRegistry<S>,
        dest: QueueRegistry<S>,
        codec: C,
        context: MoverContext,
    ) -> Self {
        Self {
            source,
            dest,
            codec,
            batch_size: DEFAULT_BATCH_SIZE,
            context,
        }
    }

    /// Batch size of the per-queue movers.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn transfer<F>(mut self, keep: F) -> Result<TransferStats, MoverError>
    where
        F: Fn(&C::Item) -> bool,
    {
        let registry_key = self.source.queue().original_key().to_string();

        if self.source.queue().recovery_already_exists().await? {
            tracing::info!(
                registry_key = %registry_key,
                "Resuming a transfer of queues at '{}', re-run to move currently enqueued jobs",
                registry_key
            );
        }

        if self.source.queue_mut().move_queue_to_recovery().await? == ClaimOutcome::Missing {
            tracing::debug!(registry_key = %registry_key, "No queues to recover");
            return Ok(TransferStats::default());
        }

        tracing::info!(registry_key = %registry_key, "Recovering jobs from queues at '{}'", registry_key);

        let mut stats = TransferStats::default();
        let mut queues_processed = 0u64;

        match self.drain(&keep, &mut stats, &mut queues_processed).await {
            Ok(()) => {
                tracing::info!(
                    registry_key = %registry_key,
                    num_queues = queues_processed,
                    num_moved = stats.moved,
                    num_dropped = stats.dropped,
                    "Finished recovery of queues at '{}'",
                    registry_key
                );
                Ok(stats)
            }
            Err(MoverError::Cancelled { stats: partial, .. }) => {
                // The interrupted queue's partial stats were never added to `stats`.
                stats += partial;
                tracing::info!(
                    registry_key = %registry_key,
                    num_queues = queues_processed,
                    num_moved = stats.moved,
                    num_dropped = stats.dropped,
                    num_reenqueued = stats.reenqueued,
                    "Recovery of job queues aborted"
                );
                Err(MoverError::Cancelled {
                    key: registry_key,
                    stats,
                })
            }
            Err(e) => {
                tracing::error!(
                    registry_key = %registry_key,
                    num_queues = queues_processed,
                    num_moved = stats.moved,
                    error = %e,
                    "Recovery of job queues failed"
                );
                Err(e)
            }
        }
    }

    async fn drain<F>(
        &mut self,
        keep: &F,
        stats: &mut TransferStats,
        queues_processed: &mut u64,
    ) -> Result<(), MoverError>
    where
        F: Fn(&C::Item) -> bool,
    {
        loop {
            self.context
                .ensure_running(self.source.queue().original_key(), TransferStats::default())?;

            let Some(names) = self.source.queue_mut().next_batch().await? else {
                return Ok(());
            };

            for name in &names {
                self.context
                    .ensure_running(self.source.queue().original_key(), TransferStats::default())?;

                let mover = QueueMover::new(
                    self.sub_queue(&self.source, &name.value),
                    self.sub_queue(&self.dest, &name.value),
                    self.context.clone(),
                );
                *stats += mover.transfer(keep).await?;
                *queues_processed += 1;

                tracing::info!(
                    registry_key = self.source.queue().original_key(),
                    queue = %name.value,
                    queues_processed = *queues_processed,
                    num_moved = stats.moved,
                    "Processed queue"
                );
            }

            self.dest.queue().append(&names).await?;
            // Names go back to the live registry: producers may still be using the queues.
            self.source.queue_mut().commit(&names).await?;
        }
    }

    fn sub_queue(&self, registry: &QueueRegistry<S>, name: &str) -> ListQueue<C> {
        ListQueue::new(
            registry.queue().redis().clone(),
            registry.queue_key(name),
            self.codec.clone(),
        )
        .with_batch_size(self.batch_size)
    }
}
