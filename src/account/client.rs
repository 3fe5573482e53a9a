//! REST client for the account service
//!
//! Every call carries `x-apigw-api-id`, the saga's `X-Request-Id`, and the
//! cached service credential as a bearer token when one is configured.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Account, AccountBalance, AccountService};
use crate::config::RestEndpointConfig;
use crate::credential::CredentialHandle;
use crate::transfer::error::TransferError;
use crate::transfer::types::Transfer;

const HTTP_TIMEOUT: Duration = Duration::from_secs(29);
const HEADER_APIGW_ID: &str = "x-apigw-api-id";
const HEADER_REQUEST_ID: &str = "X-Request-Id";

pub struct RestAccountClient {
    http: reqwest::Client,
    base_url: String,
    x_apigw_id: String,
    host: Option<String>,
    credentials: Option<CredentialHandle>,
}

impl RestAccountClient {
    pub fn new(
        config: &RestEndpointConfig,
        credentials: Option<CredentialHandle>,
    ) -> Result<Self, TransferError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| TransferError::ServerError(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.service_url_domain.trim_end_matches('/').to_string(),
            x_apigw_id: config.x_apigw_id.clone(),
            host: config.server_host.clone().filter(|h| !h.is_empty()),
            credentials,
        })
    }

    async fn prepare(
        &self,
        request: RequestBuilder,
        request_id: Uuid,
    ) -> Result<RequestBuilder, TransferError> {
        let mut request = request
            .header(HEADER_APIGW_ID, &self.x_apigw_id)
            .header(HEADER_REQUEST_ID, request_id.to_string());
        if let Some(host) = &self.host {
            request = request.header(reqwest::header::HOST, host);
        }
        if let Some(credentials) = &self.credentials {
            let credential = credentials
                .token()
                .await
                .map_err(|e| TransferError::ServerError(e.to_string()))?;
            if credential.last_error.is_some() {
                warn!(
                    expired = credential.is_expired(),
                    "Using credential from before a failed refresh"
                );
            }
            request = request.bearer_auth(credential.token);
        }
        Ok(request)
    }

    async fn send(
        &self,
        request: RequestBuilder,
        request_id: Uuid,
        path: &str,
    ) -> Result<Response, TransferError> {
        let response = self
            .prepare(request, request_id)
            .await?
            .send()
            .await
            .map_err(|e| TransferError::ServerError(format!("{}: {}", path, e)))?;

        let status = response.status();
        debug!(path, status = status.as_u16(), %request_id, "Account service replied");
        if !status.is_success() {
            return Err(TransferError::from_upstream_status(status.as_u16()));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        account_id: &str,
        request_id: Uuid,
    ) -> Result<T, TransferError> {
        let url = format!("{}{}/{}", self.base_url, path, account_id);
        self.send(self.http.get(url), request_id, path)
            .await?
            .json()
            .await
            .map_err(|e| TransferError::ServerError(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl AccountService for RestAccountClient {
    async fn get_account(
        &self,
        account_id: &str,
        request_id: Uuid,
    ) -> Result<Account, TransferError> {
        self.get_json("/get", account_id, request_id).await
    }

    async fn get_fund_balance(
        &self,
        account_id: &str,
        request_id: Uuid,
    ) -> Result<AccountBalance, TransferError> {
        self.get_json("/fundBalanceAccount", account_id, request_id)
            .await
    }

    async fn transfer_fund(
        &self,
        transfer: &Transfer,
        request_id: Uuid,
    ) -> Result<(), TransferError> {
        let url = format!("{}/transferFund", self.base_url);
        self.send(self.http.post(url).json(transfer), request_id, "/transferFund")
            .await
            .map(|_| ())
    }
}
