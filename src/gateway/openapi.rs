//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::OpenApi;

use crate::gateway::handlers::HealthResponse;
use crate::gateway::state::ServiceInfo;
use crate::transfer::types::{AccountStatement, Event, EventData, LegDirection};
use crate::transfer::{Transfer, TransferRequest, TransferResponse, TransferStatus, TransferType};

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Fund Transfer API",
        version = "1.0.0",
        description = "Schedules fund movements: one relational write and one broker event per request, committed together.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health::health_check,
        crate::gateway::handlers::health::live,
        crate::gateway::handlers::health::info,
        crate::gateway::handlers::transfer::get_transfer,
        crate::gateway::handlers::transfer::add_transfer,
        crate::gateway::handlers::transfer::add_transfer_event,
        crate::gateway::handlers::transfer::credit_transfer_event,
        crate::gateway::handlers::transfer::debit_transfer_event,
        crate::gateway::handlers::transfer::transfer,
    ),
    components(
        schemas(
            HealthResponse,
            ServiceInfo,
            TransferRequest,
            TransferResponse,
            Transfer,
            TransferType,
            TransferStatus,
            AccountStatement,
            LegDirection,
            Event,
            EventData,
        )
    ),
    tags(
        (name = "Transfer", description = "Transfers, credits and debits"),
        (name = "System", description = "Health checks and system info")
    )
)]
pub struct ApiDoc;
