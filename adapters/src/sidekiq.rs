//! Sidekiq's Redis layout: a `queues` set naming `queue:<name>` lists of JSON payloads,
//! plus the `schedule` and `retry` sorted sets scored by run-at timestamp.
//!
//! Payloads are carried verbatim. Only the fields needed for filtering and lock
//! hand-over are parsed.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use transfer_mover::{
    Codec, JobLock, MoverError, RegistryPlan, TransferJob, TransferPlan,
};

use crate::namespaced;

pub const QUEUES_KEY: &str = "queues";
pub const QUEUE_PREFIX: &str = "queue:";
pub const SCHEDULE_KEY: &str = "schedule";
pub const RETRY_KEY: &str = "retry";

#[derive(Debug, Clone, Deserialize)]
struct SidekiqItem {
    jid: String,
    class: String,
    #[serde(default)]
    pod_id: Option<Value>,
    #[serde(default)]
    unique: Option<Value>,
    #[serde(default)]
    unique_digest: Option<String>,
    #[serde(default)]
    unique_expiration: Option<f64>,
    #[serde(default)]
    lock_expiration: Option<f64>,
}

/// A Sidekiq job payload together with the fields the mover needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SidekiqJob {
    raw: String,
    jid: String,
    class: String,
    pod_id: Option<String>,
    lock: Option<JobLock>,
}

impl SidekiqJob {
    pub fn parse(raw: impl Into<String>) -> Result<Self, serde_json::Error> {
        let raw = raw.into();
        let item: SidekiqItem = serde_json::from_str(&raw)?;

        let lock = match (&item.unique, &item.unique_digest) {
            (Some(unique), Some(digest)) if is_truthy(unique) => {
                let lock = JobLock::new(digest.clone(), item.jid.clone());
                let ttl = item
                    .unique_expiration
                    .or(item.lock_expiration)
                    .filter(|secs| *secs > 0.0)
                    .map(Duration::from_secs_f64);
                Some(match ttl {
                    Some(ttl) => lock.with_ttl(ttl),
                    None => lock,
                })
            }
            _ => None,
        };

        Ok(Self {
            jid: item.jid,
            class: item.class,
            pod_id: item.pod_id.as_ref().and_then(value_to_tag),
            lock,
            raw,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn jid(&self) -> &str {
        &self.jid
    }
}

impl TransferJob for SidekiqJob {
    fn id(&self) -> &str {
        &self.jid
    }

    fn class_name(&self) -> &str {
        &self.class
    }

    fn affinity(&self) -> Option<&str> {
        self.pod_id.as_deref()
    }

    fn lock(&self) -> Option<JobLock> {
        self.lock.clone()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SidekiqCodec;

impl Codec for SidekiqCodec {
    type Item = SidekiqJob;

    fn encode(&self, item: &SidekiqJob) -> Result<String, MoverError> {
        Ok(item.raw.clone())
    }

    fn decode(&self, raw: &str) -> Result<SidekiqJob, MoverError> {
        Ok(SidekiqJob::parse(raw)?)
    }
}

/// Enqueued jobs plus the schedule. The retry set is left behind unless
/// `with_retries` is used.
pub fn plan(namespace: Option<&str>) -> TransferPlan {
    TransferPlan::new()
        .with_registry(RegistryPlan::set(
            namespaced(namespace, QUEUES_KEY),
            namespaced(namespace, QUEUE_PREFIX),
        ))
        .with_scheduled_queue(namespaced(namespace, SCHEDULE_KEY))
}

pub fn with_retries(plan: TransferPlan, namespace: Option<&str>) -> TransferPlan {
    plan.with_scheduled_queue(namespaced(namespace, RETRY_KEY))
}

// Ruby truthiness: everything but nil and false
fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

pub(crate) fn value_to_tag(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_job() {
        let raw = r#"{"class":"HardWorker","args":[1,"two"],"jid":"b4a577edbccf1d805744efa9","queue":"default","retry":true}"#;
        let job = SidekiqJob::parse(raw).unwrap();

        assert_eq!(job.id(), "b4a577edbccf1d805744efa9");
        assert_eq!(job.class_name(), "HardWorker");
        assert_eq!(job.affinity(), None);
        assert!(job.lock().is_none());
    }

    #[test]
    fn test_encode_is_byte_exact() {
        let raw = r#"{ "jid": "abc",  "class": "Spacey", "args": [ 1.50, "ü" ] }"#;
        let job = SidekiqCodec.decode(raw).unwrap();
        assert_eq!(SidekiqCodec.encode(&job).unwrap(), raw);
    }

    #[test]
    fn test_unique_job_carries_lock() {
        let raw = r#"{"class":"LockedJob","args":[],"jid":"j1","unique":"until_executed","unique_digest":"uniquejobs:5a1b","unique_expiration":120}"#;
        let lock = SidekiqJob::parse(raw).unwrap().lock().expect("lockable");

        assert_eq!(lock.key, "uniquejobs:5a1b");
        assert_eq!(lock.owner, "j1");
        assert_eq!(lock.ttl, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_lock_expiration_fallback_and_disabled_unique() {
        let raw = r#"{"class":"LockedJob","jid":"j2","unique":true,"unique_digest":"d","lock_expiration":30.5}"#;
        let lock = SidekiqJob::parse(raw).unwrap().lock().unwrap();
        assert_eq!(lock.ttl, Some(Duration::from_millis(30_500)));

        let raw = r#"{"class":"LockedJob","jid":"j3","unique":false,"unique_digest":"d"}"#;
        assert!(SidekiqJob::parse(raw).unwrap().lock().is_none());

        let raw = r#"{"class":"LockedJob","jid":"j4","unique":true,"unique_digest":"d"}"#;
        assert_eq!(SidekiqJob::parse(raw).unwrap().lock().unwrap().ttl, None);
    }

    #[test]
    fn test_numeric_pod_id() {
        let raw = r#"{"class":"PoddedJob","jid":"j5","pod_id":42}"#;
        assert_eq!(SidekiqJob::parse(raw).unwrap().affinity(), Some("42"));
    }

    #[test]
    fn test_invalid_payload() {
        assert!(matches!(
            SidekiqCodec.decode(r#"{"class":"NoJid"}"#),
            Err(MoverError::JsonError(_))
        ));
    }

    #[test]
    fn test_plans() {
        let plan = plan(None);
        assert_eq!(plan.registries, vec![RegistryPlan::set("queues", "queue:")]);
        assert_eq!(plan.scheduled_queues, vec!["schedule"]);

        let plan = with_retries(super::plan(Some("shop")), Some("shop"));
        assert_eq!(plan.registries[0].key, "shop:queues");
        assert_eq!(plan.registries[0].member_prefix, "shop:queue:");
        assert_eq!(plan.scheduled_queues, vec!["shop:schedule", "shop:retry"]);
    }
}
