use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::Rng;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::hint::black_box;
use std::time::Duration;
use tokio::runtime::Runtime;

use transfer_mover::{
    CancellationToken, Codec, JobLock, ListQueue, MoverContext, MoverError, QueueMover,
    TransferJob, redis::aio::ConnectionManager,
};

const SOURCE_REDIS_URL: &str = "redis://127.0.0.1:6379/";
const DEST_REDIS_URL: &str = "redis://127.0.0.1:6379/1";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BenchmarkJob {
    pub job_id: String,
    pub lock_key: Option<String>,
    pub payload: String,
}

impl TransferJob for BenchmarkJob {
    fn id(&self) -> &str {
        &self.job_id
    }

    fn class_name(&self) -> &str {
        "BenchmarkJob"
    }

    fn lock(&self) -> Option<JobLock> {
        self.lock_key
            .as_ref()
            .map(|key| JobLock::new(key, &self.job_id).with_ttl(Duration::from_secs(60)))
    }
}

#[derive(Clone, Copy, Default)]
pub struct BenchmarkCodec;

impl Codec for BenchmarkCodec {
    type Item = BenchmarkJob;

    fn encode(&self, item: &BenchmarkJob) -> Result<String, MoverError> {
        Ok(serde_json::to_string(item)?)
    }

    fn decode(&self, raw: &str) -> Result<BenchmarkJob, MoverError> {
        Ok(serde_json::from_str(raw)?)
    }
}

async fn connect(url: &str) -> ConnectionManager {
    redis::Client::open(url)
        .unwrap()
        .get_connection_manager()
        .await
        .unwrap()
}

async fn cleanup(conn: &ConnectionManager, prefix: &str) {
    let mut conn = conn.clone();
    let keys: Vec<String> = redis::cmd("KEYS")
        .arg(format!("{prefix}:*"))
        .query_async(&mut conn)
        .await
        .unwrap_or_default();
    if !keys.is_empty() {
        let _: () = conn.del(keys).await.unwrap_or_default();
    }
}

/// Seeds `total_jobs` jobs (a `lock_ratio` share of them locked) and migrates them.
/// Returns the number of jobs that arrived in the destination.
async fn migrate_queue(total_jobs: usize, batch_size: usize, lock_ratio: f64) -> u64 {
    let source = connect(SOURCE_REDIS_URL).await;
    let dest = connect(DEST_REDIS_URL).await;
    let prefix = format!("bench_tj_{}", nanoid::nanoid!(6));
    let key = format!("{prefix}:queue:default");

    let payloads: Vec<String> = {
        let mut rng = rand::thread_rng();
        (0..total_jobs)
            .map(|i| {
                let lock_key = rng
                    .gen_bool(lock_ratio)
                    .then(|| format!("{prefix}:lock:{i}"));
                serde_json::to_string(&BenchmarkJob {
                    job_id: format!("job_{i}"),
                    lock_key,
                    payload: "x".repeat(rng.gen_range(64..512)),
                })
                .unwrap()
            })
            .collect()
    };

    for chunk in payloads.chunks(10_000) {
        let _: () = source.clone().rpush(&key, chunk).await.unwrap();
    }

    let mover = QueueMover::new(
        ListQueue::new(source.clone(), &key, BenchmarkCodec).with_batch_size(batch_size),
        ListQueue::new(dest.clone(), &key, BenchmarkCodec),
        MoverContext::new(source.clone(), dest.clone(), CancellationToken::new()),
    );
    let stats = mover.transfer(|_| true).await.unwrap();

    cleanup(&source, &prefix).await;
    cleanup(&dest, &prefix).await;

    stats.moved
}

// Batch size is the main knob: fewer round trips against larger pipelines
fn batch_size_impact(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("transfer_batch_size");
    group.measurement_time(Duration::from_secs(20));
    group.sample_size(10);

    let total_jobs = 10_000;
    group.throughput(Throughput::Elements(total_jobs as u64));

    for &batch_size in &[10, 100, 1000, 5000] {
        group.bench_with_input(
            BenchmarkId::new("batch_size", batch_size),
            &batch_size,
            |b, &batch_size| {
                b.to_async(&rt).iter(|| async move {
                    black_box(migrate_queue(total_jobs, batch_size, 0.0).await)
                });
            },
        );
    }

    group.finish();
}

// Lock hand-over adds two pipelines per batch
fn lock_ratio_impact(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("transfer_lock_ratio");
    group.measurement_time(Duration::from_secs(20));
    group.sample_size(10);

    for &lock_ratio in &[0.0, 0.1, 0.5, 1.0] {
        group.bench_with_input(
            BenchmarkId::new("locked_percentage", (lock_ratio * 100.0) as u32),
            &lock_ratio,
            |b, &lock_ratio| {
                b.to_async(&rt).iter(|| async move {
                    black_box(migrate_queue(5_000, 1000, lock_ratio).await)
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, batch_size_impact, lock_ratio_impact);
criterion_main!(benches);
