//! Gateway types module
//!
//! - [`ApiResponse<T>`]: Unified API response wrapper
//! - [`ApiError`]: Status + error code, rendered as an `ApiResponse`
//! - [`error_codes`]: Stable numeric codes

pub mod response;

pub use response::{ApiError, ApiResponse, ApiResult, error_codes, ok};
