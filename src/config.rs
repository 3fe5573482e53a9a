use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub rest: RestEndpointConfig,
    /// Service-account credential; outbound calls go unauthenticated when absent
    #[serde(default)]
    pub credential: Option<CredentialConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Deadline for one saga (lookups, writes, publish)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database_name: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_driver")]
    pub driver: String,
    /// Pool acquire timeout, seconds
    #[serde(default = "default_db_timeout")]
    pub db_timeout: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_driver() -> String {
    "postgres".to_string()
}

fn default_db_timeout() -> u64 {
    5
}

fn default_max_connections() -> u32 {
    30
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    Kafka,
    Sqs,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    /// Event names (topics), shared by both backends
    #[serde(default)]
    pub topics: TopicConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub sqs: SqsConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub protocol: String,
    pub mechanism: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub client_id: String,
    /// Prefix; producer `n` uses `{transactional_id}-{n}`
    pub transactional_id: String,
    /// Transactional producers, i.e. sagas that can publish at once
    #[serde(default = "default_producers")]
    pub producers: usize,
    pub partitions: i32,
    pub replication_factor: i32,
}

fn default_producers() -> usize {
    4
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            protocol: "PLAINTEXT".to_string(),
            mechanism: "SCRAM-SHA-512".to_string(),
            username: String::new(),
            password: String::new(),
            client_id: "fund-transfer".to_string(),
            transactional_id: "fund-transfer-tx".to_string(),
            producers: default_producers(),
            partitions: 3,
            replication_factor: 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TopicConfig {
    pub credit: String,
    pub debit: String,
    pub transfer: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            credit: "topic.credit".to_string(),
            debit: "topic.debit".to_string(),
            transfer: "topic.transfer".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SqsConfig {
    pub queue_url: String,
    pub region: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RestEndpointConfig {
    pub service_url_domain: String,
    #[serde(default)]
    pub x_apigw_id: String,
    /// Overrides the `Host` header (local tunnels to the API gateway)
    #[serde(default)]
    pub server_host: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CredentialConfig {
    pub url: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Used when the token carries no `exp` claim
    #[serde(default = "default_lifetime_secs")]
    pub default_lifetime_secs: u64,
    /// Fraction of the lifetime reserved before expiry
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,
    #[serde(default = "default_retry_secs")]
    pub retry_secs: u64,
}

fn default_lifetime_secs() -> u64 {
    500
}

fn default_safety_margin() -> f64 {
    0.2
}

fn default_retry_secs() -> u64 {
    10
}

impl AppConfig {
    /// Load `config/{env}.yaml` and apply environment overrides.
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let path = format!("config/{}.yaml", env);
        let mut config = Self::load_from_path(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().display().to_string();
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Secrets are never committed to the yaml files.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("DB_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = lookup("KAFKA_PASSWORD") {
            self.queue.kafka.password = v;
        }
        if let Some(v) = lookup("SERVICE_URL_DOMAIN") {
            self.rest.service_url_domain = v;
        }
        if let Some(v) = lookup("X_APIGW_API_ID") {
            self.rest.x_apigw_id = v;
        }
        if let (Some(credential), Some(v)) = (self.credential.as_mut(), lookup("CREDENTIAL_PASSWORD"))
        {
            credential.password = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.request_timeout_secs must be > 0".to_string(),
            ));
        }
        if let Some(credential) = &self.credential
            && !(credential.safety_margin > 0.0 && credential.safety_margin < 1.0)
        {
            return Err(ConfigError::Invalid(format!(
                "credential.safety_margin must be in (0, 1), got {}",
                credential.safety_margin
            )));
        }
        if self.queue.backend == QueueBackend::Kafka && self.queue.kafka.producers == 0 {
            return Err(ConfigError::Invalid(
                "queue.kafka.producers must be > 0".to_string(),
            ));
        }
        if self.queue.backend == QueueBackend::Sqs && self.queue.sqs.queue_url.is_empty() {
            return Err(ConfigError::Invalid(
                "queue.sqs.queue_url is required for the sqs backend".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: fund-transfer.log
use_json: false
rotation: never
server:
  host: 0.0.0.0
  port: 5000
database:
  host: localhost
  port: 5432
  database_name: postgres
  user: postgres
queue:
  backend: kafka
rest:
  service_url_domain: http://localhost:5001
credential:
  url: http://localhost:5002
  user: svc
"#;

    fn minimal() -> AppConfig {
        serde_yaml::from_str(MINIMAL).unwrap()
    }

    #[test]
    fn test_defaults_fill_optional_fields() {
        let config = minimal();
        assert_eq!(config.server.request_timeout_secs, 60);
        assert_eq!(config.database.schema, "public");
        assert_eq!(config.database.db_timeout, 5);
        assert_eq!(config.queue.topics.transfer, "topic.transfer");
        assert_eq!(config.queue.kafka.producers, 4);
        let credential = config.credential.unwrap();
        assert_eq!(credential.default_lifetime_secs, 500);
        assert!((credential.safety_margin - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_env_overrides_secrets() {
        let mut config = minimal();
        config.apply_overrides(|key| match key {
            "DB_PASSWORD" => Some("db-secret".to_string()),
            "CREDENTIAL_PASSWORD" => Some("svc-secret".to_string()),
            _ => None,
        });
        assert_eq!(config.database.password, "db-secret");
        assert_eq!(config.credential.unwrap().password, "svc-secret");
        assert_eq!(config.queue.kafka.password, "");
    }

    #[test]
    fn test_validate_rejects_bad_margin() {
        let mut config = minimal();
        if let Some(c) = config.credential.as_mut() {
            c.safety_margin = 1.5;
        }
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_requires_queue_url_for_sqs() {
        let mut config = minimal();
        config.queue.backend = QueueBackend::Sqs;
        assert!(config.validate().is_err());
        config.queue.sqs.queue_url = "https://sqs.us-east-2.amazonaws.com/1/q.fifo".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_producer_pool() {
        let mut config = minimal();
        config.queue.kafka.producers = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_topics_apply_to_sqs_backend() {
        let yaml = MINIMAL.replace(
            "  backend: kafka\n",
            "  backend: sqs\n  topics:\n    credit: credits\n    debit: debits\n    transfer: transfers\n  sqs:\n    queue_url: https://sqs.us-east-2.amazonaws.com/1/q.fifo\n    region: us-east-2\n",
        );
        let config: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.queue.backend, QueueBackend::Sqs);
        assert_eq!(config.queue.topics.credit, "credits");
        assert_eq!(config.queue.topics.transfer, "transfers");
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = AppConfig::load_from_path("config/does-not-exist.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
