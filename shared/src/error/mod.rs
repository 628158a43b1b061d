//! Unified error system for PxBox
//!
//! This module provides a comprehensive error handling system with:
//! - [`ErrorCode`]: Standardized error codes for all error types
//! - [`ErrorCategory`]: Classification of errors by domain
//! - [`AppError`]: Rich error type with codes, messages, and details
//! - [`ApiResponse`]: Unified API response format
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Entity errors
//! - 3xxx: Request errors
//! - 4xxx: Flow errors
//! - 5xxx: Schema errors
//! - 6xxx: File errors
//! - 9xxx: System errors
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCode, ApiResponse};
//!
//! // Create a simple error
//! let err = AppError::new(ErrorCode::RequestNotFound);
//!
//! // Create an error with custom message
//! let err = AppError::with_message(ErrorCode::SchemaViolation, "missing property 'name'");
//!
//! // Create an error with details
//! let err = AppError::claim_conflict("01ARZ3NDEKTSV4RRFFQ69G5FAV");
//!
//! // Convert to API response
//! let response = ApiResponse::<()>::error(&err);
//! ```

mod category;
mod codes;
mod http;
mod types;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{ApiResponse, AppError, AppResult};
