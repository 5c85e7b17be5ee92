use redis::aio::ConnectionManager;

use crate::codec::RawCodec;
use crate::error::MoverError;
use crate::queue::{QueueShape, RedisQueue};

/// A queue of queue names: a set (`queues`) or a sorted set of schedule buckets
/// (`delayed_queue_schedule`). Members are suffixes; the prefix turns them into the
/// sub-queue's key.
pub struct QueueRegistry<S: QueueShape> {
    queue: RedisQueue<S, RawCodec>,
    member_prefix: String,
}

impl<S: QueueShape + Default> QueueRegistry<S> {
    pub fn new(
        redis: ConnectionManager,
        key: impl Into<String>,
        member_prefix: impl Into<String>,
    ) -> Self {
        Self {
            queue: RedisQueue::new(redis, key, RawCodec),
            member_prefix: member_prefix.into(),
        }
    }
}

impl<S: QueueShape> QueueRegistry<S> {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.queue = self.queue.with_batch_size(batch_size);
        self
    }

    pub fn queue(&self) -> &RedisQueue<S, RawCodec> {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut RedisQueue<S, RawCodec> {
        &mut self.queue
    }

    pub fn member_prefix(&self) -> &str {
        &self.member_prefix
    }

    /// `queue:<name>` / `delayed:<timestamp>`
    pub fn queue_key(&self, name: &str) -> String {
        format!("{}{}", self.member_prefix, name)
    }

    /// Sum of the lengths of every registered sub-queue, for progress estimates.
    pub async fn total_entries(&self) -> Result<u64, MoverError> {
        let members = self.queue.raw_members().await?;
        if members.is_empty() {
            return Ok(0);
        }

        let mut pipe = redis::pipe();
        for member in &members {
            pipe.llen(self.queue_key(&member.member));
        }

        let lengths: Vec<u64> = pipe.query_async(&mut self.queue.redis().clone()).await?;
        Ok(lengths.into_iter().sum())
    }
}
