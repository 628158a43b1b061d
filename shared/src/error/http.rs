//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Success
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound
            | Self::EntityNotFound
            | Self::RequestNotFound
            | Self::ResponseNotFound
            | Self::ReminderNotFound
            | Self::FlowNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict — claim races and terminal-state mutations
            Self::AlreadyExists
            | Self::HandleExists
            | Self::ClaimConflict
            | Self::InvalidTransition
            | Self::FlowTerminal => StatusCode::CONFLICT,

            // 401 Unauthorized
            Self::NotAuthenticated | Self::TokenExpired | Self::TokenInvalid => {
                StatusCode::UNAUTHORIZED
            }

            // 422 Unprocessable Entity — the payload parsed but failed the schema
            Self::SchemaViolation => StatusCode::UNPROCESSABLE_ENTITY,

            // 503 Service Unavailable (transient errors, client can retry)
            Self::TimeoutError => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            Self::InternalError
            | Self::StorageUnavailable
            | Self::EventLogError
            | Self::ConfigError
            | Self::FileStorageFailed
            | Self::SubscriberEvicted => StatusCode::INTERNAL_SERVER_ERROR,

            // 400 Bad Request (default for validation/business errors)
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_status() {
        assert_eq!(ErrorCode::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::EntityNotFound.http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ErrorCode::RequestNotFound.http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ErrorCode::FlowNotFound.http_status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_conflict_status() {
        assert_eq!(ErrorCode::ClaimConflict.http_status(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::InvalidTransition.http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(ErrorCode::FlowTerminal.http_status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_unauthorized_status() {
        assert_eq!(
            ErrorCode::NotAuthenticated.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::TokenInvalid.http_status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_schema_statuses() {
        // Compile failures are bad input; payload failures are unprocessable
        assert_eq!(
            ErrorCode::SchemaInvalid.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::RefNotAllowed.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::SchemaViolation.http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_file_policy_status() {
        assert_eq!(
            ErrorCode::FilePolicyViolation.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::FileMetadataInvalid.http_status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_internal_error_status() {
        assert_eq!(
            ErrorCode::InternalError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorCode::StorageUnavailable.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorCode::EventLogError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_bad_request_default() {
        assert_eq!(
            ErrorCode::ValidationFailed.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::InvalidRequest.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::EntityAmbiguous.http_status(),
            StatusCode::BAD_REQUEST
        );
    }
}
