//! Resque's Redis layout: a `queues` set naming `queue:<name>` lists, and the
//! resque-scheduler `delayed_queue_schedule` sorted set naming `delayed:<timestamp>`
//! lists. Payloads are `{"class": ..., "args": [...], "queue": ...}`; the first argument
//! is an object carrying the serialized job and its locking metadata.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};
use transfer_mover::{
    Codec, JobLock, MoverError, RegistryPlan, TransferJob, TransferPlan,
};

use crate::namespaced;
use crate::sidekiq::value_to_tag;

pub const QUEUES_KEY: &str = "queues";
pub const QUEUE_PREFIX: &str = "queue:";
pub const DELAYED_SCHEDULE_KEY: &str = "delayed_queue_schedule";
pub const DELAYED_PREFIX: &str = "delayed:";

#[derive(Debug, Clone, Deserialize)]
struct ResquePayload {
    class: String,
    #[serde(default)]
    args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResqueJob {
    raw: String,
    id: String,
    class: String,
    pod_id: Option<String>,
    selects_pod: bool,
    lock: Option<JobLock>,
    lock_queue_key: Option<String>,
    status_key: Option<String>,
}

impl ResqueJob {
    pub fn parse(raw: impl Into<String>) -> Result<Self, serde_json::Error> {
        let raw = raw.into();
        let payload: ResquePayload = serde_json::from_str(&raw)?;

        let empty = Map::new();
        let job = payload
            .args
            .first()
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let string = |field: &str| job.get(field).and_then(Value::as_str).map(str::to_string);

        let id = string("job_id").unwrap_or_default();
        let lock = string("lock_key").map(|key| {
            let lock = JobLock::new(key, id.clone());
            match job.get("lock_timeout").and_then(Value::as_f64) {
                Some(secs) if secs > 0.0 => lock.with_ttl(Duration::from_secs_f64(secs)),
                _ => lock,
            }
        });

        Ok(Self {
            class: string("job_class").unwrap_or(payload.class),
            pod_id: job.get("pod_id").and_then(value_to_tag),
            selects_pod: job
                .get("select_pod")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            lock_queue_key: string("lock_queue_key"),
            status_key: string("status_key"),
            lock,
            id,
            raw,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl TransferJob for ResqueJob {
    fn id(&self) -> &str {
        &self.id
    }

    fn class_name(&self) -> &str {
        &self.class
    }

    fn affinity(&self) -> Option<&str> {
        self.pod_id.as_deref()
    }

    fn selects_affinity(&self) -> bool {
        self.selects_pod
    }

    fn lock(&self) -> Option<JobLock> {
        self.lock.clone()
    }

    fn lock_queue_key(&self) -> Option<String> {
        self.lock_queue_key.clone()
    }

    fn status_key(&self) -> Option<String> {
        self.status_key.clone()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResqueCodec;

impl Codec for ResqueCodec {
    type Item = ResqueJob;

    fn encode(&self, item: &ResqueJob) -> Result<String, MoverError> {
        Ok(item.raw.clone())
    }

    fn decode(&self, raw: &str) -> Result<ResqueJob, MoverError> {
        Ok(ResqueJob::parse(raw)?)
    }
}

/// Enqueued jobs, then the delayed buckets of resque-scheduler.
///
/// Newer schedulers keep delayed jobs in a single sorted set whose key is chosen by the
/// application, so it has no fixed name here. Add it with
/// [`TransferPlan::with_scheduled_queue`], or list it under `transfer.scheduled_queues`
/// in the CLI configuration.
pub fn plan(namespace: Option<&str>) -> TransferPlan {
    TransferPlan::new()
        .with_registry(RegistryPlan::set(
            namespaced(namespace, QUEUES_KEY),
            namespaced(namespace, QUEUE_PREFIX),
        ))
        .with_registry(RegistryPlan::sorted_set(
            namespaced(namespace, DELAYED_SCHEDULE_KEY),
            namespaced(namespace, DELAYED_PREFIX),
        ))
}
