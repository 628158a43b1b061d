//! Error category classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Error category classification based on error code ranges
///
/// Categories are determined by the leading digit of the error code:
/// - 0xxx: General errors
/// - 1xxx: Authentication errors
/// - 2xxx: Entity errors
/// - 3xxx: Request errors
/// - 4xxx: Flow errors
/// - 5xxx: Schema errors
/// - 6xxx: File errors
/// - 9xxx: System errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// General errors (0xxx)
    General,
    /// Authentication errors (1xxx)
    Auth,
    /// Entity errors (2xxx)
    Entity,
    /// Request errors (3xxx)
    Request,
    /// Flow errors (4xxx)
    Flow,
    /// Schema errors (5xxx)
    Schema,
    /// File errors (6xxx)
    File,
    /// System errors (9xxx)
    System,
}

impl ErrorCategory {
    /// Determine category from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            0..1000 => Self::General,
            1000..2000 => Self::Auth,
            2000..3000 => Self::Entity,
            3000..4000 => Self::Request,
            4000..5000 => Self::Flow,
            5000..6000 => Self::Schema,
            6000..7000 => Self::File,
            _ => Self::System,
        }
    }

    /// Get the string name for this category
    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Auth => "auth",
            Self::Entity => "entity",
            Self::Request => "request",
            Self::Flow => "flow",
            Self::Schema => "schema",
            Self::File => "file",
            Self::System => "system",
        }
    }
}

impl ErrorCode {
    /// Get the category for this error code
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_code() {
        assert_eq!(ErrorCategory::from_code(0), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(999), ErrorCategory::General);

        assert_eq!(ErrorCategory::from_code(1001), ErrorCategory::Auth);
        assert_eq!(ErrorCategory::from_code(2001), ErrorCategory::Entity);
        assert_eq!(ErrorCategory::from_code(3002), ErrorCategory::Request);
        assert_eq!(ErrorCategory::from_code(4001), ErrorCategory::Flow);
        assert_eq!(ErrorCategory::from_code(5002), ErrorCategory::Schema);
        assert_eq!(ErrorCategory::from_code(6001), ErrorCategory::File);
        assert_eq!(ErrorCategory::from_code(9001), ErrorCategory::System);
        assert_eq!(ErrorCategory::from_code(10000), ErrorCategory::System);
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::Success.category(), ErrorCategory::General);
        assert_eq!(ErrorCode::NotAuthenticated.category(), ErrorCategory::Auth);
        assert_eq!(ErrorCode::EntityNotFound.category(), ErrorCategory::Entity);
        assert_eq!(ErrorCode::ClaimConflict.category(), ErrorCategory::Request);
        assert_eq!(ErrorCode::FlowNotFound.category(), ErrorCategory::Flow);
        assert_eq!(ErrorCode::SchemaViolation.category(), ErrorCategory::Schema);
        assert_eq!(
            ErrorCode::FilePolicyViolation.category(),
            ErrorCategory::File
        );
        assert_eq!(ErrorCode::InternalError.category(), ErrorCategory::System);
    }

    #[test]
    fn test_category_serialize() {
        let json = serde_json::to_string(&ErrorCategory::Schema).unwrap();
        assert_eq!(json, "\"schema\"");

        let category: ErrorCategory = serde_json::from_str("\"request\"").unwrap();
        assert_eq!(category, ErrorCategory::Request);
    }
}
