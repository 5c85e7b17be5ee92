//! Payload codecs and key layouts of the job libraries `transfer-mover` can migrate.

pub mod resque;
pub mod sidekiq;

pub use resque::{ResqueCodec, ResqueJob};
pub use sidekiq::{SidekiqCodec, SidekiqJob};

/// Flavor of the job library whose Redis state is being moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    Sidekiq,
    Resque,
}

impl std::fmt::Display for Flavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Flavor::Sidekiq => write!(f, "sidekiq"),
            Flavor::Resque => write!(f, "resque"),
        }
    }
}

/// Prepends a redis-namespace style prefix (`<namespace>:<key>`).
pub(crate) fn namespaced(namespace: Option<&str>, key: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}:{key}"),
        _ => key.to_string(),
    }
}
