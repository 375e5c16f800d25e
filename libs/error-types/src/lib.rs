use serde::{Deserialize, Serialize};

/// API error body shared by every REST endpoint of the chat relay
///
/// `error` carries the human-readable message clients display as-is
/// (e.g. `"Already friends"`); `code` is the stable machine identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Human-readable message
    pub error: String,

    /// HTTP status code
    pub status: u16,

    /// Broad category for client-side routing, see [`error_types`]
    pub error_type: String,

    /// Stable code for localisation and tracing, see [`error_codes`]
    pub code: String,

    /// Extra detail, only for non-sensitive failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// ISO 8601
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

pub mod error_codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";

    // Identity
    pub const USER_NOT_FOUND: &str = "USER_NOT_FOUND";
    pub const USERNAME_TAKEN: &str = "USERNAME_TAKEN";

    // Friend graph
    pub const SELF_REQUEST: &str = "SELF_REQUEST";
    pub const ALREADY_FRIENDS: &str = "ALREADY_FRIENDS";
    pub const REQUEST_PENDING: &str = "REQUEST_PENDING";
    pub const NO_SUCH_REQUEST: &str = "NO_SUCH_REQUEST";

    // Messaging
    pub const EMPTY_MESSAGE: &str = "EMPTY_MESSAGE";
    pub const INVALID_MEDIA: &str = "INVALID_MEDIA";
    pub const NOT_GROUP_MEMBER: &str = "NOT_GROUP_MEMBER";

    // Request/System
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const CONFLICT_ERROR: &str = "conflict_error";
    pub const SERVER_ERROR: &str = "server_error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_creation() {
        let error = ErrorResponse::new(
            "User not found",
            404,
            error_types::NOT_FOUND_ERROR,
            error_codes::USER_NOT_FOUND,
        );

        assert_eq!(error.status, 404);
        assert_eq!(error.error, "User not found");
        assert_eq!(error.code, error_codes::USER_NOT_FOUND);
    }

    #[test]
    fn test_details_omitted_when_absent() {
        let error = ErrorResponse::new(
            "Already friends",
            400,
            error_types::CONFLICT_ERROR,
            error_codes::ALREADY_FRIENDS,
        );
        let json = serde_json::to_value(&error).unwrap();
        assert!(json.get("details").is_none());
        assert_eq!(json["error"], "Already friends");

        let json = serde_json::to_value(error.with_details("bob")).unwrap();
        assert_eq!(json["details"], "bob");
    }
}
