//! Unified error codes for PxBox
//!
//! This module defines all error codes used across the broker server and
//! client tooling. Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Entity errors
//! - 3xxx: Request errors
//! - 4xxx: Flow errors
//! - 5xxx: Schema errors
//! - 6xxx: File errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request (malformed envelope, missing required fields)
    InvalidRequest = 5,
    /// Required field missing
    RequiredField = 6,

    // ==================== 1xxx: Auth ====================
    /// Caller is not authenticated
    NotAuthenticated = 1001,
    /// Token has expired
    TokenExpired = 1002,
    /// Token is invalid
    TokenInvalid = 1003,

    // ==================== 2xxx: Entity ====================
    /// Entity not found (unknown ID or handle)
    EntityNotFound = 2001,
    /// Entity handle already taken
    HandleExists = 2002,
    /// Ambiguous entity reference (both ID and handle, or neither)
    EntityAmbiguous = 2003,

    // ==================== 3xxx: Request ====================
    /// Request not found
    RequestNotFound = 3001,
    /// Claim lost: request is no longer PENDING
    ClaimConflict = 3002,
    /// Mutation attempted on a terminal or incompatible status
    InvalidTransition = 3003,
    /// Response not found
    ResponseNotFound = 3004,
    /// Reminder not found
    ReminderNotFound = 3005,

    // ==================== 4xxx: Flow ====================
    /// Flow not found
    FlowNotFound = 4001,
    /// Flow is in a terminal status
    FlowTerminal = 4002,
    /// No runner registered for the flow kind
    RunnerNotFound = 4003,

    // ==================== 5xxx: Schema ====================
    /// Schema document failed to compile
    SchemaInvalid = 5001,
    /// Response payload does not satisfy the compiled schema
    SchemaViolation = 5002,
    /// $ref URL not covered by the configured allowlist
    RefNotAllowed = 5003,

    // ==================== 6xxx: Files ====================
    /// File rejected by the request's file policy
    FilePolicyViolation = 6001,
    /// File metadata missing required fields or malformed
    FileMetadataInvalid = 6002,
    /// File storage backend failure
    FileStorageFailed = 6003,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Storage layer failure
    StorageUnavailable = 9002,
    /// Event log failure
    EventLogError = 9003,
    /// Operation timeout
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,
    /// Subscriber evicted (outbound queue overflow)
    SubscriberEvicted = 9101,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Stable snake_case name, used in session error frames
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Success => "ok",
            ErrorCode::Unknown => "unknown",
            ErrorCode::ValidationFailed => "validation_failed",
            ErrorCode::NotFound => "not_found",
            ErrorCode::AlreadyExists => "already_exists",
            ErrorCode::InvalidRequest => "invalid_input",
            ErrorCode::RequiredField => "required_field",
            ErrorCode::NotAuthenticated => "unauthorized",
            ErrorCode::TokenExpired => "token_expired",
            ErrorCode::TokenInvalid => "token_invalid",
            ErrorCode::EntityNotFound => "entity_not_found",
            ErrorCode::HandleExists => "handle_exists",
            ErrorCode::EntityAmbiguous => "entity_ambiguous",
            ErrorCode::RequestNotFound => "request_not_found",
            ErrorCode::ClaimConflict => "claim_conflict",
            ErrorCode::InvalidTransition => "invalid_transition",
            ErrorCode::ResponseNotFound => "response_not_found",
            ErrorCode::ReminderNotFound => "reminder_not_found",
            ErrorCode::FlowNotFound => "flow_not_found",
            ErrorCode::FlowTerminal => "flow_terminal",
            ErrorCode::RunnerNotFound => "runner_not_found",
            ErrorCode::SchemaInvalid => "schema_invalid",
            ErrorCode::SchemaViolation => "schema_violation",
            ErrorCode::RefNotAllowed => "ref_not_allowed",
            ErrorCode::FilePolicyViolation => "file_policy_violation",
            ErrorCode::FileMetadataInvalid => "file_metadata_invalid",
            ErrorCode::FileStorageFailed => "file_storage_failed",
            ErrorCode::InternalError => "internal",
            ErrorCode::StorageUnavailable => "storage_unavailable",
            ErrorCode::EventLogError => "event_log_error",
            ErrorCode::TimeoutError => "timeout",
            ErrorCode::ConfigError => "config_error",
            ErrorCode::SubscriberEvicted => "subscriber_evicted",
        }
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::RequiredField => "Required field is missing",

            // Auth
            ErrorCode::NotAuthenticated => "Caller is not authenticated",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::TokenInvalid => "Authentication token is invalid",

            // Entity
            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::HandleExists => "Entity handle already exists",
            ErrorCode::EntityAmbiguous => "Supply exactly one of entity id or handle",

            // Request
            ErrorCode::RequestNotFound => "Request not found",
            ErrorCode::ClaimConflict => "Request has already been claimed",
            ErrorCode::InvalidTransition => "Request status does not permit this operation",
            ErrorCode::ResponseNotFound => "Response not found",
            ErrorCode::ReminderNotFound => "Reminder not found",

            // Flow
            ErrorCode::FlowNotFound => "Flow not found",
            ErrorCode::FlowTerminal => "Flow is in a terminal status",
            ErrorCode::RunnerNotFound => "No runner registered for this flow kind",

            // Schema
            ErrorCode::SchemaInvalid => "Schema failed to compile",
            ErrorCode::SchemaViolation => "Payload does not satisfy the schema",
            ErrorCode::RefNotAllowed => "$ref URL is not in the allowlist",

            // Files
            ErrorCode::FilePolicyViolation => "File rejected by the file policy",
            ErrorCode::FileMetadataInvalid => "File metadata is invalid",
            ErrorCode::FileStorageFailed => "File storage failed",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::StorageUnavailable => "Storage layer is unavailable",
            ErrorCode::EventLogError => "Event log failure",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::SubscriberEvicted => "Subscriber queue overflow",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::RequiredField),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1002 => Ok(ErrorCode::TokenExpired),
            1003 => Ok(ErrorCode::TokenInvalid),

            // Entity
            2001 => Ok(ErrorCode::EntityNotFound),
            2002 => Ok(ErrorCode::HandleExists),
            2003 => Ok(ErrorCode::EntityAmbiguous),

            // Request
            3001 => Ok(ErrorCode::RequestNotFound),
            3002 => Ok(ErrorCode::ClaimConflict),
            3003 => Ok(ErrorCode::InvalidTransition),
            3004 => Ok(ErrorCode::ResponseNotFound),
            3005 => Ok(ErrorCode::ReminderNotFound),

            // Flow
            4001 => Ok(ErrorCode::FlowNotFound),
            4002 => Ok(ErrorCode::FlowTerminal),
            4003 => Ok(ErrorCode::RunnerNotFound),

            // Schema
            5001 => Ok(ErrorCode::SchemaInvalid),
            5002 => Ok(ErrorCode::SchemaViolation),
            5003 => Ok(ErrorCode::RefNotAllowed),

            // Files
            6001 => Ok(ErrorCode::FilePolicyViolation),
            6002 => Ok(ErrorCode::FileMetadataInvalid),
            6003 => Ok(ErrorCode::FileStorageFailed),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::StorageUnavailable),
            9003 => Ok(ErrorCode::EventLogError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),
            9101 => Ok(ErrorCode::SubscriberEvicted),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::ValidationFailed.code(), 2);
        assert_eq!(ErrorCode::NotFound.code(), 3);
        assert_eq!(ErrorCode::InvalidRequest.code(), 5);

        assert_eq!(ErrorCode::NotAuthenticated.code(), 1001);
        assert_eq!(ErrorCode::TokenInvalid.code(), 1003);

        assert_eq!(ErrorCode::EntityNotFound.code(), 2001);
        assert_eq!(ErrorCode::RequestNotFound.code(), 3001);
        assert_eq!(ErrorCode::ClaimConflict.code(), 3002);
        assert_eq!(ErrorCode::InvalidTransition.code(), 3003);
        assert_eq!(ErrorCode::FlowNotFound.code(), 4001);
        assert_eq!(ErrorCode::SchemaInvalid.code(), 5001);
        assert_eq!(ErrorCode::SchemaViolation.code(), 5002);
        assert_eq!(ErrorCode::RefNotAllowed.code(), 5003);
        assert_eq!(ErrorCode::FilePolicyViolation.code(), 6001);

        assert_eq!(ErrorCode::InternalError.code(), 9001);
        assert_eq!(ErrorCode::StorageUnavailable.code(), 9002);
        assert_eq!(ErrorCode::SubscriberEvicted.code(), 9101);
    }

    #[test]
    fn test_is_success() {
        assert!(ErrorCode::Success.is_success());
        assert!(!ErrorCode::Unknown.is_success());
        assert!(!ErrorCode::ClaimConflict.is_success());
    }

    #[test]
    fn test_try_from_valid() {
        assert_eq!(ErrorCode::try_from(0), Ok(ErrorCode::Success));
        assert_eq!(ErrorCode::try_from(1001), Ok(ErrorCode::NotAuthenticated));
        assert_eq!(ErrorCode::try_from(3002), Ok(ErrorCode::ClaimConflict));
        assert_eq!(ErrorCode::try_from(5002), Ok(ErrorCode::SchemaViolation));
        assert_eq!(ErrorCode::try_from(9001), Ok(ErrorCode::InternalError));
    }

    #[test]
    fn test_try_from_invalid() {
        assert_eq!(ErrorCode::try_from(999), Err(InvalidErrorCode(999)));
        assert_eq!(ErrorCode::try_from(7001), Err(InvalidErrorCode(7001)));
        assert_eq!(ErrorCode::try_from(10000), Err(InvalidErrorCode(10000)));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let codes = [
            ErrorCode::Success,
            ErrorCode::NotAuthenticated,
            ErrorCode::ClaimConflict,
            ErrorCode::SchemaViolation,
            ErrorCode::InternalError,
        ];

        for code in codes {
            let json = serde_json::to_string(&code).unwrap();
            let parsed: ErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(code, parsed);
        }
    }

    #[test]
    fn test_serialize_as_number() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::ClaimConflict).unwrap(),
            "3002"
        );
        assert_eq!(serde_json::to_string(&ErrorCode::NotFound).unwrap(), "3");
    }

    #[test]
    fn test_as_str_stable() {
        assert_eq!(ErrorCode::ClaimConflict.as_str(), "claim_conflict");
        assert_eq!(ErrorCode::InvalidRequest.as_str(), "invalid_input");
        assert_eq!(ErrorCode::SchemaViolation.as_str(), "schema_violation");
        assert_eq!(ErrorCode::NotAuthenticated.as_str(), "unauthorized");
    }

    #[test]
    fn test_message() {
        assert_eq!(ErrorCode::NotFound.message(), "Resource not found");
        assert_eq!(
            ErrorCode::ClaimConflict.message(),
            "Request has already been claimed"
        );
        assert_eq!(ErrorCode::InternalError.message(), "Internal server error");
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ErrorCode::Success), "0");
        assert_eq!(format!("{}", ErrorCode::ClaimConflict), "3002");
    }
}
