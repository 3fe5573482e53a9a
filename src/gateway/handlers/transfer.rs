//! Transfer handlers
//!
//! Thin wrappers: decode, call the orchestrator, map the error.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
};

use super::super::state::AppState;
use super::super::types::{ApiResult, ok};
use crate::transfer::{Transfer, TransferRequest, TransferResponse};

type Body = Result<Json<TransferRequest>, JsonRejection>;

/// Get a transfer by id
///
/// GET /get/{id}
#[utoipa::path(
    get,
    path = "/get/{id}",
    params(("id" = i64, Path, description = "Transfer id")),
    responses(
        (status = 200, description = "Transfer found", body = Transfer),
        (status = 400, description = "Malformed id"),
        (status = 404, description = "Transfer not found")
    ),
    tag = "Transfer"
)]
pub async fn get_transfer(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Transfer> {
    let Path(id) = id?;
    ok(state.orchestrator.get_transfer(id).await?)
}

/// Record a transfer and have the account service move the funds
///
/// POST /add/transfer
#[utoipa::path(
    post,
    path = "/add/transfer",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Transfer recorded", body = TransferResponse),
        (status = 400, description = "Malformed request"),
        (status = 404, description = "Account not found"),
        (status = 409, description = "Business rule violated"),
        (status = 500, description = "Upstream, storage or deadline failure")
    ),
    tag = "Transfer"
)]
pub async fn add_transfer(State(state): State<Arc<AppState>>, body: Body) -> ApiResult<TransferResponse> {
    let Json(req) = body?;
    ok(state.orchestrator.add_transfer(req).await?)
}

/// Schedule an account-to-account transfer event
///
/// POST /add/transferEvent
#[utoipa::path(
    post,
    path = "/add/transferEvent",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Transfer event scheduled", body = TransferResponse),
        (status = 400, description = "Malformed request"),
        (status = 404, description = "Account not found"),
        (status = 409, description = "Business rule violated"),
        (status = 500, description = "Upstream, storage, broker or deadline failure")
    ),
    tag = "Transfer"
)]
pub async fn add_transfer_event(
    State(state): State<Arc<AppState>>,
    body: Body,
) -> ApiResult<TransferResponse> {
    let Json(req) = body?;
    ok(state.orchestrator.add_transfer_event(req).await?)
}

/// Schedule a credit event
///
/// POST /creditTransferEvent
#[utoipa::path(
    post,
    path = "/creditTransferEvent",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Credit event scheduled", body = TransferResponse),
        (status = 409, description = "Negative amount or invalid currency"),
        (status = 500, description = "Upstream, storage, broker or deadline failure")
    ),
    tag = "Transfer"
)]
pub async fn credit_transfer_event(
    State(state): State<Arc<AppState>>,
    body: Body,
) -> ApiResult<TransferResponse> {
    let Json(req) = body?;
    ok(state.orchestrator.credit_transfer_event(req).await?)
}

/// Schedule a debit event
///
/// POST /debitTransferEvent
#[utoipa::path(
    post,
    path = "/debitTransferEvent",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Debit event scheduled", body = TransferResponse),
        (status = 409, description = "Positive amount or invalid currency"),
        (status = 500, description = "Upstream, storage, broker or deadline failure")
    ),
    tag = "Transfer"
)]
pub async fn debit_transfer_event(
    State(state): State<Arc<AppState>>,
    body: Body,
) -> ApiResult<TransferResponse> {
    let Json(req) = body?;
    ok(state.orchestrator.debit_transfer_event(req).await?)
}

/// Balance-checked transfer
///
/// POST /transfer
#[utoipa::path(
    post,
    path = "/transfer",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Transfer done", body = TransferResponse),
        (status = 409, description = "Overdraft or business rule violated"),
        (status = 500, description = "Upstream, storage or deadline failure")
    ),
    tag = "Transfer"
)]
pub async fn transfer(State(state): State<Arc<AppState>>, body: Body) -> ApiResult<TransferResponse> {
    let Json(req) = body?;
    ok(state.orchestrator.transfer(req).await?)
}
