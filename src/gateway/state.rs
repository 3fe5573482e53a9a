use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use crate::transfer::{TransferOrchestrator, TransferStore};

/// Static facts about the running process, served by `/info`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ServiceInfo {
    #[schema(example = "fund_transfer")]
    pub name: String,
    #[schema(example = "0.1.0")]
    pub version: String,
    pub git_hash: String,
    #[schema(example = "dev")]
    pub env: String,
    /// Active publisher backend
    #[schema(example = "kafka")]
    pub queue_backend: String,
}

impl ServiceInfo {
    pub fn new(env: &str, queue_backend: &str) -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_hash: env!("GIT_HASH").to_string(),
            env: env.to_string(),
            queue_backend: queue_backend.to_string(),
        }
    }
}

/// Gateway shared state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<TransferOrchestrator>,
    /// Read path and health checks
    pub store: Arc<dyn TransferStore>,
    pub info: ServiceInfo,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<TransferOrchestrator>,
        store: Arc<dyn TransferStore>,
        info: ServiceInfo,
    ) -> Self {
        Self {
            orchestrator,
            store,
            info,
        }
    }
}
