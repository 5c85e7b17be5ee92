use redis::{AsyncCommands, Pipeline, RedisResult, aio::ConnectionManager};

use super::{QueueShape, RawEntry};
use crate::error::MoverError;

/// FIFO list, as used for ready queues: LRANGE to read, RPUSH to append, LTRIM to trim.
#[derive(Debug, Clone, Copy, Default)]
pub struct List;

impl QueueShape for List {
    async fn read(
        &self,
        conn: &mut ConnectionManager,
        key: &str,
        start: isize,
        stop: isize,
    ) -> RedisResult<Vec<RawEntry>> {
        let members: Vec<String> = conn.lrange(key, start, stop).await?;
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
        pipe.rpush(key, members).ignore();
        Ok(())
    }

    fn trim(&self, pipe: &mut Pipeline, key: &str, count: usize) -> isize {
        pipe.ltrim(key, count as isize, -1).ignore();
        count as isize
    }

    async fn len(&self, conn: &mut ConnectionManager, key: &str) -> RedisResult<u64> {
        conn.llen(key).await
    }
}
