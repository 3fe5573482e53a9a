//! Service Credential Cache
//!
//! One background task owns the current credential and hands out clones over
//! a bounded request channel (mpsc request, oneshot reply).
//!
//! ```text
//! FETCHING → VALID → (refresh timer) → FETCHING → VALID → …
//!                          ↓ shutdown
//!                       STOPPED
//! ```
//!
//! Requests are not read until the first fetch succeeds, so a caller never
//! sees an empty credential; it just waits. A failed refresh keeps serving
//! the previous credential and retries after `retry`.

pub mod source;

pub use source::{IssuedCredential, OAuthCredentialSource};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, error, info, warn};

use crate::config::CredentialConfig;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CredentialError {
    #[error("Credential request failed: {0}")]
    Request(String),

    #[error("Credential endpoint returned status {0}")]
    Status(u16),

    #[error("Credential response is malformed: {0}")]
    Malformed(String),

    #[error("Credential cache stopped")]
    Stopped,
}

/// Issues credentials (network call in production)
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch(&self) -> Result<IssuedCredential, CredentialError>;
}

/// Value served to callers
#[derive(Debug, Clone, PartialEq)]
pub struct CachedCredential {
    pub token: String,
    pub expires_at: Instant,
    /// Message of the most recent failed refresh, cleared on success
    pub last_error: Option<String>,
}

impl CachedCredential {
    fn issued(credential: IssuedCredential, now: Instant) -> Self {
        Self {
            token: credential.token,
            expires_at: now + credential.lifetime,
            last_error: None,
        }
    }

    /// Past its expiry (served anyway while refresh keeps failing)
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Refresh timing
#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    /// Fraction of the lifetime kept in reserve, in (0, 1)
    pub safety_margin: f64,
    /// Wait after a failed fetch
    pub retry: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            safety_margin: 0.2,
            retry: Duration::from_secs(10),
        }
    }
}

impl From<&CredentialConfig> for RefreshPolicy {
    fn from(config: &CredentialConfig) -> Self {
        Self {
            safety_margin: config.safety_margin,
            retry: Duration::from_secs(config.retry_secs),
        }
    }
}

impl RefreshPolicy {
    /// `lifetime − margin`, never below one second.
    pub fn refresh_after(&self, lifetime: Duration) -> Duration {
        lifetime
            .mul_f64(1.0 - self.safety_margin)
            .max(Duration::from_secs(1))
    }
}

const REQUEST_CHANNEL_SIZE: usize = 1;

type CredentialRequest = oneshot::Sender<CachedCredential>;

/// Caller side, cheap to clone
#[derive(Clone)]
pub struct CredentialHandle {
    tx: mpsc::Sender<CredentialRequest>,
}

impl CredentialHandle {
    /// Current credential. Waits for the first fetch if it has not completed.
    pub async fn token(&self) -> Result<CachedCredential, CredentialError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(reply_tx)
            .await
            .map_err(|_| CredentialError::Stopped)?;
        reply_rx.await.map_err(|_| CredentialError::Stopped)
    }
}

pub struct CredentialCache {
    source: Arc<dyn CredentialSource>,
    policy: RefreshPolicy,
    requests: mpsc::Receiver<CredentialRequest>,
    shutdown: watch::Receiver<bool>,
}

impl CredentialCache {
    /// Start the actor. It runs until `shutdown` turns `true` (or its sender is dropped).
    pub fn spawn(
        source: Arc<dyn CredentialSource>,
        policy: RefreshPolicy,
        shutdown: watch::Receiver<bool>,
    ) -> (CredentialHandle, JoinHandle<()>) {
        let (tx, requests) = mpsc::channel(REQUEST_CHANNEL_SIZE);
        let actor = Self {
            source,
            policy,
            requests,
            shutdown,
        };
        let task = tokio::spawn(actor.run());
        (CredentialHandle { tx }, task)
    }

    async fn run(mut self) {
        info!("Credential cache starting");
        let Some(mut current) = self.first_fetch().await else {
            info!("Credential cache stopped before first credential");
            return;
        };

        let lifetime = current.expires_at.saturating_duration_since(Instant::now());
        let refresh = sleep_until(Instant::now() + self.policy.refresh_after(lifetime));
        tokio::pin!(refresh);

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }

                _ = &mut refresh => {
                    let next = match self.source.fetch().await {
                        Ok(credential) => {
                            let refresh_in = self.policy.refresh_after(credential.lifetime);
                            current = CachedCredential::issued(credential, Instant::now());
                            info!(refresh_in_secs = refresh_in.as_secs(), "Credential refreshed");
                            refresh_in
                        }
                        Err(e) => {
                            error!(
                                error = %e,
                                retry_in_secs = self.policy.retry.as_secs(),
                                expired = current.is_expired(),
                                "Credential refresh failed, serving previous credential"
                            );
                            current.last_error = Some(e.to_string());
                            self.policy.retry
                        }
                    };
                    refresh.as_mut().reset(Instant::now() + next);
                }

                request = self.requests.recv() => match request {
                    Some(reply) => {
                        // Caller may have given up; nothing to do then
                        let _ = reply.send(current.clone());
                    }
                    None => break,
                },
            }
        }

        info!("Credential cache stopped");
    }

    /// Fetch until the first success. `None` if shut down first.
    async fn first_fetch(&mut self) -> Option<CachedCredential> {
        let mut attempt: u32 = 1;
        loop {
            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        return None;
                    }
                    continue;
                }

                result = self.source.fetch() => match result {
                    Ok(credential) => {
                        debug!(attempt, "Initial credential issued");
                        return Some(CachedCredential::issued(credential, Instant::now()));
                    }
                    Err(e) => {
                        warn!(
                            attempt,
                            error = %e,
                            retry_in_secs = self.policy.retry.as_secs(),
                            "Initial credential fetch failed"
                        );
                    }
                },
            }

            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        return None;
                    }
                }

                _ = sleep(self.policy.retry) => {}
            }
            attempt += 1;
        }
    }
}
