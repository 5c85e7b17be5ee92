use std::time::Duration;

use redis::{AsyncCommands, aio::ConnectionManager};

use crate::error::MoverError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireLockResult {
    Acquired,
    /// Someone else holds the lock; carries the competing owner.
    AlreadyLocked(String),
}

impl AcquireLockResult {
    pub fn is_acquired(&self) -> bool {
        matches!(self, AcquireLockResult::Acquired)
    }
}

/// Lock request for one key.
#[derive(Debug, Clone, Copy)]
pub struct LockRequest<'a> {
    pub key: &'a str,
    pub owner: &'a str,
    pub ttl: Duration,
}

/// Set-if-absent lock keyed by name, bound to one Redis deployment.
/// The value stored under the key is the owner identity.
#[derive(Clone)]
pub struct RedisLock {
    connection_manager: ConnectionManager,
}

impl RedisLock {
    pub fn new(connection_manager: ConnectionManager) -> Self {
        Self { connection_manager }
    }

    pub fn conn(&self) -> &ConnectionManager {
        &self.connection_manager
    }

    /// Non-blocking acquisition: SET NX PX, no retry.
    pub async fn try_acquire(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<AcquireLockResult, MoverError> {
        let mut results = self.try_acquire_many(&[LockRequest { key, owner, ttl }]).await?;
        results.pop().ok_or_else(|| MoverError::Runtime {
            message: format!("No reply while acquiring lock {key}"),
        })
    }

    /// Acquires every lock in one round trip. Requests are applied in order, so a later
    /// request for a key claimed earlier in the same call loses to it.
    pub async fn try_acquire_many(
        &self,
        requests: &[LockRequest<'_>],
    ) -> Result<Vec<AcquireLockResult>, MoverError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn().clone();
        let mut pipe = redis::pipe();
        for request in requests {
            pipe.cmd("SET")
                .arg(request.key)
                .arg(request.owner)
                .arg("NX")
                .arg("PX")
                .arg(ttl_millis(request.ttl));
        }
        let replies: Vec<Option<String>> = pipe.query_async(&mut conn).await?;

        let mut contended = Vec::new();
        for (request, reply) in requests.iter().zip(&replies) {
            if reply.is_none() {
                contended.push(request.key);
            }
        }

        let owners: Vec<Option<String>> = if contended.is_empty() {
            Vec::new()
        } else {
            let mut pipe = redis::pipe();
            for key in &contended {
                pipe.get(*key);
            }
            pipe.query_async(&mut conn).await?
        };
        let mut owners = owners.into_iter();

        Ok(replies
            .into_iter()
            .map(|reply| match reply {
                Some(_) => AcquireLockResult::Acquired,
                // The holder may have expired in between, report it as unknown then.
                None => AcquireLockResult::AlreadyLocked(
                    owners
                        .next()
                        .flatten()
                        .unwrap_or_else(|| "unknown".to_string()),
                ),
            })
            .collect())
    }

    pub async fn owner(&self, key: &str) -> Result<Option<String>, MoverError> {
        let owner: Option<String> = self.conn().clone().get(key).await?;
        Ok(owner)
    }

    /// Unconditional release.
    pub async fn release(&self, key: &str) -> Result<bool, MoverError> {
        let deleted: usize = self.conn().clone().del(key).await?;
        Ok(deleted > 0)
    }

    pub async fn release_many(&self, keys: &[&str]) -> Result<(), MoverError> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.del(*key).ignore();
        }
        pipe.query_async::<()>(&mut self.conn().clone()).await?;
        Ok(())
    }

    /// Releases the lock only while `owner` still holds it.
    pub async fn release_if_owner(&self, key: &str, owner: &str) -> Result<bool, MoverError> {
        let script = redis::Script::new(
            r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            end
            return 0
            "#,
        );

        let deleted: i64 = script
            .key(key)
            .arg(owner)
            .invoke_async(&mut self.conn().clone())
            .await?;
        Ok(deleted > 0)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}
