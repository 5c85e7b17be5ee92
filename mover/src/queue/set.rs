use redis::{AsyncCommands, Pipeline, RedisResult, aio::ConnectionManager};

use super::{QueueShape, RawEntry};
use crate::error::MoverError;

/// Unordered set, used for registries of queue names.
///
/// Sets cannot be read in windows, so the whole set is one batch and trimming it
/// deletes the key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Set;

impl QueueShape for Set {
    async fn read(
        &self,
        conn: &mut ConnectionManager,
        key: &str,
        start: isize,
        _stop: isize,
    ) -> RedisResult<Vec<RawEntry>> {
        // Everything was handed out with the first window.
        if start > 0 {
            return Ok(Vec::new());
        }

        let mut members: Vec<String> = conn.smembers(key).await?;
        members.sort();
        Ok(members
            .into_iter()
            .map(|member| RawEntry {
                member,
                score: None,
            })
            .collect())
    }

    fn push(&self, pipe: &mut Pipeline, key: &str, entries: &[RawEntry]) -> Result<(), MoverError> {
        let members: Vec<&str> = entries.iter().map(|e| e.member.as_str()).collect();
        pipe.sadd(key, members).ignore();
        Ok(())
    }

    fn trim(&self, pipe: &mut Pipeline, key: &str, count: usize) -> isize {
        pipe.del(key).ignore();
        count as isize
    }

    async fn len(&self, conn: &mut ConnectionManager, key: &str) -> RedisResult<u64> {
        conn.scard(key).await
    }
}
