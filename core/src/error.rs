use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Structured rejection body of the operations backend.
///
/// Backends also answer with a bare `{ "detail": "..." }` or with
/// `{ "success": false, "error": { "code", "message" } }`; the dispatcher
/// reads all three. This struct is the flat form.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Machine code (see [`codes`])
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub message: String,
    /// Offending field, for validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Value the backend rejected, echoed back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

impl ApiError {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            error_code: None,
            message: message.into(),
            field: None,
            received: None,
            request_id: uuid::Uuid::now_v7().to_string(),
            docs_hint: None,
        }
    }

    pub fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    pub fn with_received(mut self, received: serde_json::Value) -> Self {
        self.received = Some(received);
        self
    }

    pub fn with_docs_hint(mut self, hint: impl Into<String>) -> Self {
        self.docs_hint = Some(hint.into());
        self
    }
}

pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const UNAUTHENTICATED: &str = "unauthenticated";
    pub const FORBIDDEN: &str = "forbidden";
    pub const PERMISSION_DENIED: &str = "permission_denied";
    pub const ALREADY_IN_TERMINAL_STATE: &str = "already_in_terminal_state";
    pub const SIGNATURE_REQUIRED: &str = "signature_required";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_context_is_omitted_until_set() {
        let bare = serde_json::to_value(ApiError::new(codes::FORBIDDEN, "no")).unwrap();
        for key in ["error_code", "field", "received", "docs_hint"] {
            assert!(bare.get(key).is_none(), "{key} should be omitted");
        }

        let full = ApiError::new(codes::VALIDATION_FAILED, "priority is invalid")
            .with_field("priority")
            .with_received(json!("urgent"))
            .with_docs_hint("Use one of: routine, important, critical");
        let value = serde_json::to_value(&full).unwrap();
        assert_eq!(value["received"], "urgent");
        assert_eq!(value["docs_hint"], "Use one of: routine, important, critical");
        let back: ApiError = serde_json::from_value(value).unwrap();
        assert_eq!(back.field.as_deref(), Some("priority"));
    }
}
