use std::{env, path::Path, time::Duration};

use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;
use transfer_adapters::{Flavor, resque, sidekiq};
use transfer_mover::{AffinityFilter, JobFilter, TransferOptions, TransferPlan};

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    pub source: RedisConfig,
    pub destination: RedisConfig,
    #[serde(default)]
    pub transfer: TransferSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    pub flavor: Flavor,
    /// redis-namespace prefix of the job library's keys, if any.
    pub namespace: Option<String>,
    pub batch_size: usize,
    pub lock_key: String,
    pub lock_wait_seconds: u64,
    pub lock_timeout_seconds: u64,
    pub job_lock_ttl_seconds: u64,
    /// `all`, `global` (or `master`), or a shard tag.
    pub affinity: String,
    pub blacklist: Vec<String>,
    /// Sidekiq only: also move the retry set.
    pub include_retries: bool,
    /// Additional sorted-set queues to move after the preset ones.
    pub scheduled_queues: Vec<String>,
}

impl Default for TransferSettings {
    fn default() -> Self {
        let options = TransferOptions::default();
        Self {
            flavor: Flavor::Sidekiq,
            namespace: None,
            batch_size: options.batch_size,
            lock_key: options.lock_key,
            lock_wait_seconds: options.lock_wait_time.as_secs(),
            lock_timeout_seconds: options.lock_timeout.as_secs(),
            job_lock_ttl_seconds: options.default_job_lock_ttl.as_secs(),
            affinity: "all".to_string(),
            blacklist: Vec::new(),
            include_retries: false,
            scheduled_queues: Vec::new(),
        }
    }
}

impl TransferSettings {
    pub fn options(&self) -> TransferOptions {
        TransferOptions {
            batch_size: self.batch_size.max(1),
            lock_key: self.lock_key.clone(),
            lock_wait_time: Duration::from_secs(self.lock_wait_seconds),
            lock_timeout: Duration::from_secs(self.lock_timeout_seconds),
            default_job_lock_ttl: Duration::from_secs(self.job_lock_ttl_seconds),
            ..TransferOptions::default()
        }
    }

    pub fn filter(&self) -> JobFilter {
        let affinity: AffinityFilter = self.affinity.parse().unwrap_or_default();
        JobFilter::new(affinity).with_blacklist(self.blacklist.iter().cloned())
    }

    pub fn plan(&self) -> TransferPlan {
        let namespace = self.namespace.as_deref();
        let plan = match self.flavor {
            Flavor::Sidekiq if self.include_retries => {
                sidekiq::with_retries(sidekiq::plan(namespace), namespace)
            }
            Flavor::Sidekiq => sidekiq::plan(namespace),
            Flavor::Resque => resque::plan(namespace),
        };

        self.scheduled_queues
            .iter()
            .fold(plan, |plan, key| plan.with_scheduled_queue(key.clone()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

pub fn get_config() -> Result<TransferConfig, ConfigError> {
    let base_path = env::current_dir()
        .map_err(|e| ConfigError::Message(format!("Failed to determine the current directory: {e}")))?;

    // Detect the running environment
    let environment: Environment = env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(ConfigError::Message)?;

    load_config(&base_path.join("configuration"), &environment)
}

pub fn load_config(
    configuration_directory: &Path,
    environment: &Environment,
) -> Result<TransferConfig, ConfigError> {
    let environment_filename = format!("transfer_{}.yaml", environment.as_str());

    Config::builder()
        .add_source(File::from(configuration_directory.join("transfer_base.yaml")))
        .add_source(File::from(configuration_directory.join(environment_filename)).required(false))
        .add_source(
            config::Environment::with_prefix("app")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("transfer.blacklist")
                .with_list_parse_key("transfer.scheduled_queues"),
        )
        .build()?
        .try_deserialize::<TransferConfig>()
}

/// Parses configuration from in-memory YAML layers, later layers winning.
pub fn from_yaml(layers: &[&str]) -> Result<TransferConfig, ConfigError> {
    layers
        .iter()
        .fold(Config::builder(), |builder, layer| {
            builder.add_source(File::from_str(layer, FileFormat::Yaml))
        })
        .build()?
        .try_deserialize::<TransferConfig>()
}

/// The possible runtime environment for our application.
pub enum Environment {
    Local,
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local`, `development`, or `production`.",
                other
            )),
        }
    }
}
