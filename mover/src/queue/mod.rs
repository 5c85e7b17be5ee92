//! Redis keys treated as resumable, batched migration sources.
//!
//! A queue starts out pointing at its original key. Claiming it renames that key to
//! `<key>:recovery`; from then on batches are read from the recovery copy, trimmed once
//! committed, and anything excluded goes back to the original (live) key.

mod list;
mod set;
mod sorted_set;

use std::future::Future;

use redis::{AsyncCommands, Pipeline, RedisError, RedisResult, aio::ConnectionManager};

use crate::codec::Codec;
use crate::error::MoverError;

pub use list::List;
pub use set::Set;
pub use sorted_set::SortedSet;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const RECOVERY_SUFFIX: &str = ":recovery";

pub type ListQueue<C> = RedisQueue<List, C>;
pub type SortedSetQueue<C> = RedisQueue<SortedSet, C>;
pub type SetQueue<C> = RedisQueue<Set, C>;

/// A member as stored in Redis, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub member: String,
    pub score: Option<f64>,
}

/// A decoded member. `score` is only present for sorted-set backed queues.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<T> {
    pub value: T,
    pub score: Option<f64>,
}

impl<T> Entry<T> {
    pub fn new(value: T) -> Self {
        Self { value, score: None }
    }

    pub fn scored(value: T, score: f64) -> Self {
        Self {
            value,
            score: Some(score),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The original key was renamed to the recovery key by this call.
    Claimed,
    /// A recovery copy from an earlier attempt exists and will be drained.
    Resumed,
    /// Neither key exists, nothing to migrate.
    Missing,
}

/// Storage-specific half of a queue. Implementors only know Redis commands, never jobs.
pub trait QueueShape: Clone + Send + Sync + 'static {
    /// Reads the inclusive window `[start, stop]`. Unordered shapes return everything.
    fn read(
        &self,
        conn: &mut ConnectionManager,
        key: &str,
        start: isize,
        stop: isize,
    ) -> impl Future<Output = RedisResult<Vec<RawEntry>>> + Send;

    /// Queues a write of `entries` to `key`. Callers never pass an empty slice.
    fn push(&self, pipe: &mut Pipeline, key: &str, entries: &[RawEntry]) -> Result<(), MoverError>;

    /// Queues removal of the first `count` entries of `key` and returns how far the read
    /// cursor has to move back once the removal is applied.
    fn trim(&self, pipe: &mut Pipeline, key: &str, count: usize) -> isize;

    fn len(
        &self,
        conn: &mut ConnectionManager,
        key: &str,
    ) -> impl Future<Output = RedisResult<u64>> + Send;
}

pub struct RedisQueue<S: QueueShape, C: Codec> {
    redis: ConnectionManager,
    shape: S,
    codec: C,
    original_key: String,
    key: String,
    batch_size: usize,
    offset: isize,
    handed_out: bool,
}

impl<S: QueueShape + Default, C: Codec> RedisQueue<S, C> {
    pub fn new(redis: ConnectionManager, key: impl Into<String>, codec: C) -> Self {
        Self::with_shape(redis, S::default(), key, codec)
    }
}

impl<S: QueueShape, C: Codec> RedisQueue<S, C> {
    pub fn with_shape(redis: ConnectionManager, shape: S, key: impl Into<String>, codec: C) -> Self {
        let key = key.into();
        Self {
            redis,
            shape,
            codec,
            original_key: key.clone(),
            key,
            batch_size: DEFAULT_BATCH_SIZE,
            offset: 0,
            handed_out: false,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn original_key(&self) -> &str {
        &self.original_key
    }

    /// Key batches are currently read from: the original key until claimed.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn recovery_key(&self) -> String {
        format!("{}{}", self.original_key, RECOVERY_SUFFIX)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn offset(&self) -> isize {
        self.offset
    }

    pub fn redis(&self) -> &ConnectionManager {
        &self.redis
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Reads up to `batch_size` entries at the current cursor. Empty means exhausted.
    pub async fn batch(&self) -> Result<Vec<Entry<C::Item>>, MoverError> {
        let mut conn = self.redis.clone();
        let stop = self.offset + self.batch_size as isize - 1;
        let raw = self.shape.read(&mut conn, &self.key, self.offset, stop).await?;

        raw.into_iter()
            .map(|entry| -> Result<Entry<C::Item>, MoverError> {
                let value = self
                    .codec
                    .decode(&entry.member)
                    .map_err(|e| MoverError::Decode {
                        key: self.key.clone(),
                        message: e.to_string(),
                    })?;
                Ok(Entry {
                    value,
                    score: entry.score,
                })
            })
            .collect()
    }

    /// Batch iteration driver: advances the cursor past the previously returned batch,
    /// then reads the next one. Returns `None` once the active key is exhausted.
    ///
    /// Callers commit (and thereby trim) each batch before asking for the next, so the
    /// advance and the trim cancel out and reads keep starting at the front.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<Entry<C::Item>>>, MoverError> {
        if self.handed_out {
            self.offset += self.batch_size as isize;
        }

        let batch = self.batch().await?;
        self.handed_out = !batch.is_empty();

        if batch.is_empty() { Ok(None) } else { Ok(Some(batch)) }
    }

    pub async fn append(&self, entries: &[Entry<C::Item>]) -> Result<(), MoverError> {
        self.append_to(entries, &self.key).await
    }

    /// Writes `entries` to `key`. Issues no command at all for an empty slice so that
    /// no key gets created by accident.
    pub async fn append_to(&self, entries: &[Entry<C::Item>], key: &str) -> Result<(), MoverError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        self.push_entries(&mut pipe, key, entries)?;
        pipe.query_async::<()>(&mut self.redis.clone()).await?;
        Ok(())
    }

    /// Returns entries to the live key so producers and consumers see them right away.
    pub async fn reenqueue(&self, entries: &[Entry<C::Item>]) -> Result<(), MoverError> {
        self.append_to(entries, &self.original_key).await
    }

    /// Removes the current batch range from the active key on its own.
    /// Prefer `commit`, which couples this with the re-enqueue of excluded entries.
    pub async fn trim(&mut self) -> Result<(), MoverError> {
        self.commit(&[]).await
    }

    /// Re-enqueues `excluded` to the original key and trims the consumed batch from the
    /// active key in a single MULTI/EXEC.
    pub async fn commit(&mut self, excluded: &[Entry<C::Item>]) -> Result<(), MoverError> {
        let mut pipe = redis::pipe();
        pipe.atomic();

        if !excluded.is_empty() {
            self.push_entries(&mut pipe, &self.original_key, excluded)?;
        }
        let rewind = self.shape.trim(&mut pipe, &self.key, self.batch_size);

        pipe.query_async::<()>(&mut self.redis.clone()).await?;
        self.offset -= rewind;
        Ok(())
    }

    /// Claims the queue by renaming it to its recovery key.
    ///
    /// RENAMENX keeps the claim atomic; if a recovery copy already exists it is resumed
    /// and entries that arrived on the original key since then are left alone.
    pub async fn move_queue_to_recovery(&mut self) -> Result<ClaimOutcome, MoverError> {
        let recovery_key = self.recovery_key();
        let mut conn = self.redis.clone();

        let renamed: RedisResult<bool> = conn.rename_nx(&self.original_key, &recovery_key).await;
        let outcome = match renamed {
            Ok(true) => ClaimOutcome::Claimed,
            Ok(false) => ClaimOutcome::Resumed,
            Err(e) if is_no_such_key(&e) => {
                let exists: bool = conn.exists(&recovery_key).await?;
                if !exists {
                    return Ok(ClaimOutcome::Missing);
                }
                ClaimOutcome::Resumed
            }
            Err(e) => return Err(e.into()),
        };

        self.key = recovery_key;
        self.offset = 0;
        self.handed_out = false;
        Ok(outcome)
    }

    pub async fn recovery_already_exists(&self) -> Result<bool, MoverError> {
        let exists: bool = self.redis.clone().exists(self.recovery_key()).await?;
        Ok(exists)
    }

    /// Length of the original key. Informational only.
    pub async fn size(&self) -> Result<u64, MoverError> {
        let mut conn = self.redis.clone();
        Ok(self.shape.len(&mut conn, &self.original_key).await?)
    }

    /// Every member of the original key, undecoded.
    pub(crate) async fn raw_members(&self) -> Result<Vec<RawEntry>, MoverError> {
        let mut conn = self.redis.clone();
        Ok(self.shape.read(&mut conn, &self.original_key, 0, -1).await?)
    }

    fn push_entries(
        &self,
        pipe: &mut Pipeline,
        key: &str,
        entries: &[Entry<C::Item>],
    ) -> Result<(), MoverError> {
        let raw = entries
            .iter()
            .map(|entry| {
                Ok(RawEntry {
                    member: self.codec.encode(&entry.value)?,
                    score: entry.score,
                })
            })
            .collect::<Result<Vec<_>, MoverError>>()?;

        self.shape.push(pipe, key, &raw)
    }
}

fn is_no_such_key(error: &RedisError) -> bool {
    error.to_string().to_lowercase().contains("no such key")
}
