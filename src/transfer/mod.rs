//! Transfer Saga
//!
//! Schedules fund movements by coordinating two independently failing
//! resources as one logical operation:
//! - **PostgreSQL** transaction holding the `transfer_moviment` row
//! - **Broker** publish of the matching event (Kafka transaction, or a
//!   fire-and-forget SQS send after the row commits)
//!
//! # State Machine
//!
//! ```text
//! IDLE → DB_TX_OPEN → [BROKER_TX_OPEN] → RULES_EVALUATED → PERSISTED → [PUBLISHED] → COMMITTED
//!              ↓                                                        ↓
//!           ABORTING → ABORTED  ←───────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! 1. **No orphan rows**: a row is only committed after its event is committed
//!    (transactional broker)
//! 2. **At-least-once**: an event whose row later fails to commit is logged, not retracted
//! 3. **Original error wins**: abort-path failures are logged and never replace
//!    the error that triggered the abort

pub mod api;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod state;
pub mod types;

#[cfg(test)]
mod integration_tests;

pub use api::{TransferRequest, TransferResponse};
pub use coordinator::TransferOrchestrator;
pub use db::{PgTransferStore, TransferStore, TransferTx};
pub use error::TransferError;
pub use state::SagaState;
pub use types::{Event, Transfer, TransferStatus, TransferType};
