use redis::aio::ConnectionManager;

use crate::error::MoverError;
use crate::job::TransferJob;
use crate::queue::Entry;

/// Copies per-job status records for jobs that were appended to the destination, so
/// status lookups keep working once the job runs there.
#[derive(Clone)]
pub struct StatusCopier {
    source: ConnectionManager,
    dest: ConnectionManager,
}

impl StatusCopier {
    pub fn new(source: ConnectionManager, dest: ConnectionManager) -> Self {
        Self { source, dest }
    }

    /// Returns the number of status records written to the destination.
    pub async fn copy<T: TransferJob>(&self, entries: &[Entry<T>]) -> Result<usize, MoverError> {
        let keys: Vec<String> = entries.iter().filter_map(|e| e.value.status_key()).collect();
        if keys.is_empty() {
            return Ok(0);
        }

        let mut source = self.source.clone();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut source)
            .await?;

        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.pttl(key);
        }
        let ttls: Vec<i64> = pipe.query_async(&mut source).await?;

        let mut pipe = redis::pipe();
        let mut copied = 0;
        for ((key, value), ttl) in keys.iter().zip(values).zip(ttls) {
            let Some(value) = value else {
                continue;
            };

            // -1: no expiry, -2: vanished between the two reads
            match ttl {
                -2 => continue,
                ttl if ttl > 0 => {
                    pipe.cmd("SET").arg(key).arg(value).arg("PX").arg(ttl).ignore();
                }
                _ => {
                    pipe.set(key, value).ignore();
                }
            }
            copied += 1;
        }

        if copied > 0 {
            pipe.query_async::<()>(&mut self.dest.clone()).await?;
        }
        Ok(copied)
    }
}
