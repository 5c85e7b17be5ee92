
use std::sync::Arc;

use fixtures::{Deployments, TestCodec, TestJob, ids, jobs};
use redis::AsyncCommands;
use transfer_mover::{
    CancellationToken, MoverContext, MoverError, MultiQueueMover, QueueRegistry, TransferStats,
    progress::ProgressSink,
    queue::{Set, SortedSet},
};

fn context(env: &Deployments, cancel: CancellationToken) -> MoverContext {
    MoverContext::new(env.source.clone(), env.dest.clone(), cancel)
}

/// Cancels the run once any batch has been committed.
struct CancelOnAdvance(CancellationToken);

impl ProgressSink for CancelOnAdvance {
    fn advance(&self, _n: u64) {
        self.0.cancel();
    }

    fn complete(&self) {}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_moves_every_registered_queue() {
    let env = Deployments::connect().await;
    let registry_key = env.key("queues");
    let prefix = env.key("queue:");

    let default_jobs = jobs("default", 4);
    let mailer_jobs = jobs("mailers", 3);
    env.push_jobs(&env.source, &format!("{prefix}default"), &default_jobs).await;
    env.push_jobs(&env.source, &format!("{prefix}mailers"), &mailer_jobs).await;
    env.source
        .clone()
        .sadd::<_, _, ()>(&registry_key, vec!["default", "mailers", "idle"])
        .await
        .unwrap();

    let mover = MultiQueueMover::new(
        QueueRegistry::<Set>::new(env.source.clone(), &registry_key, &prefix),
        QueueRegistry::<Set>::new(env.dest.clone(), &registry_key, &prefix),
        TestCodec,
        context(&env, CancellationToken::new()),
    )
    .with_batch_size(2);

    let stats = mover.transfer(|_| true).await.expect("registry transfer failed");
    assert_eq!(stats.moved, 7);

    assert_eq!(
        ids(&env.list_jobs(&env.dest, &format!("{prefix}default")).await),
        ids(&default_jobs)
    );
    assert_eq!(
        ids(&env.list_jobs(&env.dest, &format!("{prefix}mailers")).await),
        ids(&mailer_jobs)
    );

    // Names are registered on both sides, the source keeps them for live producers.
    for conn in [&env.source, &env.dest] {
        let mut names: Vec<String> = conn.clone().smembers(&registry_key).await.unwrap();
        names.sort();
        assert_eq!(names, vec!["default", "idle", "mailers"]);
    }
    assert!(!env.exists(&env.source, &format!("{registry_key}:recovery")).await);
    assert!(!env.exists(&env.source, &format!("{prefix}default")).await);
    assert!(!env.exists(&env.dest, &format!("{prefix}idle")).await);

    env.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_moves_delayed_buckets_with_their_timestamps() {
    let env = Deployments::connect().await;
    let registry_key = env.key("delayed_queue_schedule");
    let prefix = env.key("delayed:");

    let buckets = [(1_700_000_100.0, "1700000100"), (1_700_000_050.0, "1700000050")];
    for (i, (_, bucket)) in buckets.iter().enumerate() {
        env.push_jobs(
            &env.source,
            &format!("{prefix}{bucket}"),
            &jobs(&format!("bucket{i}"), 2),
        )
        .await;
    }
    env.source
        .clone()
        .zadd_multiple::<_, _, _, ()>(&registry_key, &buckets)
        .await
        .unwrap();

    let mover = MultiQueueMover::new(
        QueueRegistry::<SortedSet>::new(env.source.clone(), &registry_key, &prefix).with_batch_size(1),
        QueueRegistry::<SortedSet>::new(env.dest.clone(), &registry_key, &prefix),
        TestCodec,
        context(&env, CancellationToken::new()),
    );
    let stats = mover.transfer(|_| true).await.unwrap();
    assert_eq!(stats.moved, 4);

    let expected = vec![
        ("1700000050".to_string(), 1_700_000_050.0),
        ("1700000100".to_string(), 1_700_000_100.0),
    ];
    for conn in [&env.source, &env.dest] {
        let schedule: Vec<(String, f64)> = conn
            .clone()
            .zrange_withscores(&registry_key, 0, -1)
            .await
            .unwrap();
        assert_eq!(schedule, expected);
    }
    assert_eq!(
        env.list_jobs(&env.dest, &format!("{prefix}1700000050")).await.len(),
        2
    );

    env.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_missing_registry_is_a_noop() {
    let env = Deployments::connect().await;
    let registry_key = env.key("queues");
    let prefix = env.key("queue:");

    let mover = MultiQueueMover::new(
        QueueRegistry::<Set>::new(env.source.clone(), &registry_key, &prefix),
        QueueRegistry::<Set>::new(env.dest.clone(), &registry_key, &prefix),
        TestCodec,
        context(&env, CancellationToken::new()),
    );

    assert_eq!(mover.transfer(|_| true).await.unwrap().moved, 0);
    assert!(!env.exists(&env.dest, &registry_key).await);

    env.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_registry_transfer_keeps_recovery_copy() {
    let env = Deployments::connect().await;
    let registry_key = env.key("queues");
    let prefix = env.key("queue:");

    env.push_jobs(&env.source, &format!("{prefix}default"), &jobs("default", 2)).await;
    env.source
        .clone()
        .sadd::<_, _, ()>(&registry_key, "default")
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = MultiQueueMover::new(
        QueueRegistry::<Set>::new(env.source.clone(), &registry_key, &prefix),
        QueueRegistry::<Set>::new(env.dest.clone(), &registry_key, &prefix),
        TestCodec,
        context(&env, cancel),
    )
    .transfer(|_| true)
    .await;

    assert!(matches!(
        result,
        Err(MoverError::Cancelled { ref key, stats }) if *key == registry_key && stats == TransferStats::default()
    ));
    assert!(env.exists(&env.source, &format!("{registry_key}:recovery")).await);
    assert!(!env.exists(&env.dest, &registry_key).await);
    assert_eq!(env.list_jobs(&env.source, &format!("{prefix}default")).await.len(), 2);

    env.cleanup().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_between_queues_then_resume() {
    let env = Deployments::connect().await;
    let registry_key = env.key("queues");
    let prefix = env.key("queue:");
    let first_key = format!("{prefix}a_first");
    let second_key = format!("{prefix}b_second");
    let lock_key = env.key("lock:taken");

    env.push_jobs(
        &env.source,
        &first_key,
        &[
            TestJob::new("kept"),
            TestJob::new("skipped").with_class("Skip"),
            TestJob::new("taken").with_lock(&lock_key),
        ],
    )
    .await;
    let second_jobs = jobs("second", 2);
    env.push_jobs(&env.source, &second_key, &second_jobs).await;
    env.source
        .clone()
        .sadd::<_, _, ()>(&registry_key, vec!["a_first", "b_second"])
        .await
        .unwrap();
    env.source.clone().set::<_, _, ()>(&lock_key, "taken").await.unwrap();
    env.dest.clone().set::<_, _, ()>(&lock_key, "other_job").await.unwrap();

    let keep = |job: &TestJob| job.class != "Skip";
    let cancel = CancellationToken::new();
    let result = MultiQueueMover::new(
        QueueRegistry::<Set>::new(env.source.clone(), &registry_key, &prefix),
        QueueRegistry::<Set>::new(env.dest.clone(), &registry_key, &prefix),
        TestCodec,
        context(&env, cancel.clone()).with_progress(Arc::new(CancelOnAdvance(cancel))),
    )
    .transfer(keep)
    .await;

    match result {
        Err(MoverError::Cancelled { key, stats }) => {
            assert_eq!(key, registry_key);
            assert_eq!(
                stats,
                TransferStats {
                    moved: 1,
                    dropped: 1,
                    reenqueued: 1
                }
            );
        }
        other => panic!("Expected Cancelled, got {other:?}"),
    }

    // The first queue is fully drained but its name is only registered once the batch of
    // names commits.
    assert_eq!(ids(&env.list_jobs(&env.dest, &first_key).await), vec!["kept"]);
    assert!(!env.exists(&env.dest, &registry_key).await);
    assert!(env.exists(&env.source, &format!("{registry_key}:recovery")).await);
    assert_eq!(ids(&env.list_jobs(&env.source, &second_key).await), ids(&second_jobs));
    assert!(!env.exists(&env.dest, &second_key).await);

    let stats = MultiQueueMover::new(
        QueueRegistry::<Set>::new(env.source.clone(), &registry_key, &prefix),
        QueueRegistry::<Set>::new(env.dest.clone(), &registry_key, &prefix),
        TestCodec,
        context(&env, CancellationToken::new()),
    )
    .transfer(keep)
    .await
    .expect("resumed registry transfer failed");

    assert_eq!(stats.moved, 2);
    assert_eq!(stats.reenqueued, 1);
    assert_eq!(ids(&env.list_jobs(&env.dest, &first_key).await), vec!["kept"]);
    assert_eq!(ids(&env.list_jobs(&env.dest, &second_key).await), ids(&second_jobs));
    assert_eq!(ids(&env.list_jobs(&env.source, &first_key).await), vec!["skipped"]);
    let mut names: Vec<String> = env.dest.clone().smembers(&registry_key).await.unwrap();
    names.sort();
    assert_eq!(names, vec!["a_first", "b_second"]);
    assert!(!env.exists(&env.source, &format!("{registry_key}:recovery")).await);

    env.cleanup().await;
}
