//! Fund Transfer - saga-coordinated transfer scheduling
//!
//! Validates a transfer, resolves accounts through the account service,
//! records the movement in PostgreSQL and publishes the matching event, with
//! the relational and broker transactions committed as one logical operation.
//!
//! # Modules
//!
//! - [`config`] - YAML configuration with environment overrides
//! - [`logging`] - tracing subscriber and rolling log files
//! - [`db`] - pooled PostgreSQL connections, startup retry
//! - [`publisher`] - transactional (Kafka) and fire-and-forget (SQS) event publishers
//! - [`credential`] - background credential cache for outbound calls
//! - [`account`] - account service client
//! - [`transfer`] - transfer types, storage and the saga orchestrator
//! - [`gateway`] - axum HTTP surface

pub mod config;
pub mod logging;

pub mod account;
pub mod credential;
pub mod db;
pub mod publisher;
pub mod transfer;

pub mod gateway;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use publisher::EventPublisher;
pub use transfer::{Transfer, TransferError, TransferOrchestrator, TransferStatus};
