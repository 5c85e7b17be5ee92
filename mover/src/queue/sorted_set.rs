use redis::{AsyncCommands, Pipeline, RedisResult, aio::ConnectionManager};

use super::{QueueShape, RawEntry};
use crate::error::MoverError;

/// Sorted set ordered by scheduled timestamp. Scores are carried through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortedSet;

impl QueueShape for SortedSet {
    async fn read(
        &self,
        conn: &mut ConnectionManager,
        key: &str,
        start: isize,
        stop: isize,
    ) -> RedisResult<Vec<RawEntry>> {
        let members: Vec<(String, f64)> = conn.zrange_withscores(key, start, stop).await?;
        Ok(members
            .into_iter()
            .map(|(member, score)| RawEntry {
                member,
                score: Some(score),
            })
            .collect())
    }

    fn push(&self, pipe: &mut Pipeline, key: &str, entries: &[RawEntry]) -> Result<(), MoverError> {
        let items = entries
            .iter()
            .map(|e| {
                e.score
                    .map(|score| (score, e.member.as_str()))
                    .ok_or_else(|| MoverError::MissingScore {
                        key: key.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        pipe.zadd_multiple(key, items.as_slice()).ignore();
        Ok(())
    }

    fn trim(&self, pipe: &mut Pipeline, key: &str, count: usize) -> isize {
        pipe.zremrangebyrank(key, 0, count as isize - 1).ignore();
        count as isize
    }

    async fn len(&self, conn: &mut ConnectionManager, key: &str) -> RedisResult<u64> {
        conn.zcard(key).await
    }
}
