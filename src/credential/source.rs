//! OAuth-style credential endpoint
//!
//! `POST {url}/oauth_credential` with the service user and password, answer
//! `{"token": "..."}`. The lifetime comes from the token's `exp` claim when
//! it is a JWT, otherwise from `default_lifetime_secs`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CredentialError, CredentialSource};
use crate::config::CredentialConfig;

const HTTP_TIMEOUT: Duration = Duration::from_secs(29);

/// One credential as handed out by the endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedCredential {
    pub token: String,
    pub lifetime: Duration,
}

#[derive(Serialize)]
struct CredentialRequest<'a> {
    user: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct CredentialResponse {
    token: String,
}

#[derive(Deserialize)]
struct ExpiryClaims {
    exp: Option<u64>,
}

/// Remaining lifetime from an unverified JWT `exp`. `None` when the token is
/// not a JWT or carries no `exp`.
///
/// The signature is not checked: the token is only forwarded, never trusted here.
pub fn lifetime_from_jwt(token: &str, now_unix: u64) -> Option<Duration> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<ExpiryClaims>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    let exp = data.claims.exp?;
    Some(Duration::from_secs(exp.saturating_sub(now_unix)))
}

pub struct OAuthCredentialSource {
    http: reqwest::Client,
    endpoint: String,
    user: String,
    password: String,
    default_lifetime: Duration,
}

impl OAuthCredentialSource {
    pub fn new(config: &CredentialConfig) -> Result<Self, CredentialError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| CredentialError::Request(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}/oauth_credential", config.url.trim_end_matches('/')),
            user: config.user.clone(),
            password: config.password.clone(),
            default_lifetime: Duration::from_secs(config.default_lifetime_secs),
        })
    }
}

#[async_trait]
impl CredentialSource for OAuthCredentialSource {
    async fn fetch(&self) -> Result<IssuedCredential, CredentialError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&CredentialRequest {
                user: &self.user,
                password: &self.password,
            })
            .send()
            .await
            .map_err(|e| CredentialError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CredentialError::Status(status.as_u16()));
        }

        let body: CredentialResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Malformed(e.to_string()))?;
        if body.token.is_empty() {
            return Err(CredentialError::Malformed("empty token".to_string()));
        }

        let now_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let lifetime = lifetime_from_jwt(&body.token, now_unix).unwrap_or(self.default_lifetime);
        debug!(lifetime_secs = lifetime.as_secs(), "Credential issued");

        Ok(IssuedCredential {
            token: body.token,
            lifetime,
        })
    }
}
