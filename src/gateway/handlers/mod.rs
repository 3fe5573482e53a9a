//! HTTP handlers

pub mod health;
pub mod transfer;

pub use health::{HealthResponse, health_check, info, live};
pub use transfer::{
    add_transfer, add_transfer_event, credit_transfer_event, debit_transfer_event, get_transfer,
    transfer,
};
