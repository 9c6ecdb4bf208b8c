use serde::Serialize;
use serde_json::Value;

/// Structured error payload — designed for agents, not humans.
/// Every error contains enough information for an agent to understand
/// what went wrong and how to fix it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    /// Machine-readable error code (e.g. "validation_failed", "not_connected")
    pub error: String,
    /// Human/agent-readable description of what went wrong
    pub message: String,
    /// Which tool argument caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
    /// Raw context, e.g. the Salesforce error list for remote failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Error codes used across the MCP surface
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_CONNECTED: &str = "not_connected";
    pub const NOT_FOUND: &str = "not_found";
    pub const SALESFORCE_ERROR: &str = "salesforce_error";
    pub const SESSION_EXPIRED: &str = "session_expired";
    pub const TRANSPORT_ERROR: &str = "transport_error";
    pub const UNKNOWN_TOOL: &str = "unknown_tool";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let payload = ErrorPayload {
            error: codes::NOT_CONNECTED.to_string(),
            message: "Salesforce connection not established.".to_string(),
            field: None,
            docs_hint: None,
            details: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({
                "error": "not_connected",
                "message": "Salesforce connection not established."
            })
        );
    }
}
