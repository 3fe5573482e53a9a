//! Fund Transfer service entry point
//!
//! ```text
//! config ─▶ logging ─▶ PostgreSQL ─▶ publisher ─▶ credential cache ─▶ gateway
//!                      (3 × 3s)      (kafka|sqs)   (optional)          (until SIGINT/SIGTERM)
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use fund_transfer::account::{AccountService, RestAccountClient};
use fund_transfer::config::AppConfig;
use fund_transfer::credential::{CredentialCache, OAuthCredentialSource, RefreshPolicy};
use fund_transfer::db::ConnectionManager;
use fund_transfer::gateway::{
    self,
    state::{AppState, ServiceInfo},
};
use fund_transfer::publisher::EventPublisher;
use fund_transfer::transfer::{PgTransferStore, TransferOrchestrator, TransferStore};

const CREDENTIAL_STOP_TIMEOUT: Duration = Duration::from_secs(5);

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> ExitCode {
    let env = get_env();
    let config = match AppConfig::load(&env) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(1);
        }
    };
    let _log_guard = fund_transfer::logging::init_logging(&config);

    info!(env = %env, version = env!("CARGO_PKG_VERSION"), "Starting fund transfer service");

    match run(&env, config).await {
        Ok(()) => {
            info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "Fatal");
            ExitCode::FAILURE
        }
    }
}

async fn run(env: &str, config: AppConfig) -> anyhow::Result<()> {
    let db = ConnectionManager::connect_with_retry(&config.database)
        .await
        .context("database unavailable")?;

    let publisher = match EventPublisher::from_config(&config.queue).await {
        Ok(publisher) => publisher,
        Err(e) => {
            db.close().await;
            return Err(e).context(format!("{:?} publisher setup failed", config.queue.backend));
        }
    };
    info!(
        backend = publisher.name(),
        transactional = publisher.is_transactional(),
        "Publisher ready"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (credentials, credential_task) = match &config.credential {
        Some(credential_config) => match OAuthCredentialSource::new(credential_config) {
            Ok(source) => {
                let (handle, task) = CredentialCache::spawn(
                    Arc::new(source),
                    RefreshPolicy::from(credential_config),
                    shutdown_rx.clone(),
                );
                (Some(handle), Some(task))
            }
            Err(e) => {
                db.close().await;
                return Err(e).context("credential source setup failed");
            }
        },
        None => {
            warn!("No credential configured, account service calls are unauthenticated");
            (None, None)
        }
    };

    let accounts: Arc<dyn AccountService> = match RestAccountClient::new(&config.rest, credentials) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            let _ = shutdown_tx.send(true);
            db.close().await;
            return Err(e).context("account client setup failed");
        }
    };

    let store: Arc<dyn TransferStore> = Arc::new(PgTransferStore::new(db.clone()));
    let info = ServiceInfo::new(env, publisher.name());
    let orchestrator = Arc::new(TransferOrchestrator::new(
        store.clone(),
        accounts,
        publisher,
        config.queue.topics.clone(),
        config.server.request_timeout(),
    ));
    let state = Arc::new(AppState::new(orchestrator, store, info));

    let server_shutdown = {
        let shutdown_tx = shutdown_tx.clone();
        async move {
            shutdown_signal().await;
            info!("Shutting down...");
            let _ = shutdown_tx.send(true);
        }
    };

    let served = gateway::run_server(&config.server, state, server_shutdown).await;

    // Server may have failed before the signal arrived
    let _ = shutdown_tx.send(true);
    if let Some(task) = credential_task
        && tokio::time::timeout(CREDENTIAL_STOP_TIMEOUT, task).await.is_err()
    {
        warn!("Credential cache shutdown timed out");
    }

    db.close().await;
    served.context("server error")
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
