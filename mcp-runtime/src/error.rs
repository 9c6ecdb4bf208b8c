use serde_json::{Value, json};
use sforce_core::error::{ErrorPayload, codes};

/// Failures raised by the Salesforce client itself.
#[derive(Debug, thiserror::Error)]
pub enum SalesforceError {
    #[error("Salesforce login failed: {0}")]
    Login(String),

    #[error("Failed to reach Salesforce at {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Salesforce returned HTTP {status}: {message}")]
    Api {
        status: u16,
        message: String,
        body: Value,
    },

    #[error("Invalid Salesforce URL: {0}")]
    InvalidUrl(String),

    #[error("Unexpected Salesforce response: {0}")]
    UnexpectedResponse(String),
}

impl SalesforceError {
    /// Build an API error from a non-2xx response body.
    ///
    /// REST endpoints answer with `[{"message", "errorCode"}]`; OAuth endpoints
    /// with `{"error", "error_description"}`. Anything else is echoed as-is.
    pub fn from_response(status: u16, body: Value) -> Self {
        let message = match &body {
            Value::Array(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .filter_map(|item| {
                        let message = item.get("message").and_then(Value::as_str)?;
                        Some(match item.get("errorCode").and_then(Value::as_str) {
                            Some(code) => format!("{code}: {message}"),
                            None => message.to_string(),
                        })
                    })
                    .collect();
                if parts.is_empty() {
                    body.to_string()
                } else {
                    parts.join("; ")
                }
            }
            Value::Object(map) => map
                .get("error_description")
                .or_else(|| map.get("message"))
                .or_else(|| map.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string()),
            Value::String(text) => text.clone(),
            Value::Null => "empty response body".to_string(),
            other => other.to_string(),
        };
        Self::Api {
            status,
            message,
            body,
        }
    }
}

/// Error surfaced to the MCP client as an `isError` tool result.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    pub field: Option<String>,
    pub docs_hint: Option<String>,
    pub details: Option<Value>,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
            docs_hint: None,
            details: None,
        }
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::new(codes::VALIDATION_FAILED, message).with_field(field)
    }

    pub fn not_connected() -> Self {
        Self::new(
            codes::NOT_CONNECTED,
            "Salesforce connection not established.",
        )
        .with_docs_hint(
            "Set SALESFORCE_ACCESS_TOKEN + SALESFORCE_INSTANCE_URL, or SALESFORCE_USERNAME, SALESFORCE_PASSWORD and SALESFORCE_SECURITY_TOKEN, then restart the server.",
        )
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_docs_hint(mut self, docs_hint: impl Into<String>) -> Self {
        self.docs_hint = Some(docs_hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            error: self.code.clone(),
            message: self.message.clone(),
            field: self.field.clone(),
            docs_hint: self.docs_hint.clone(),
            details: self.details.clone(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self.to_payload()).unwrap_or_else(|_| {
            json!({
                "error": self.code,
                "message": self.message
            })
        })
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ToolError {}

impl From<SalesforceError> for ToolError {
    fn from(err: SalesforceError) -> Self {
        match err {
            SalesforceError::Api {
                status,
                message,
                body,
            } => {
                let details = json!({ "status": status, "errors": body });
                match status {
                    401 => ToolError::new(codes::SESSION_EXPIRED, message)
                        .with_details(details)
                        .with_docs_hint(
                            "The Salesforce session is no longer valid. Refresh SALESFORCE_ACCESS_TOKEN or restart with username/password credentials.",
                        ),
                    404 => ToolError::new(codes::NOT_FOUND, message).with_details(details),
                    _ => ToolError::new(codes::SALESFORCE_ERROR, message).with_details(details),
                }
            }
            SalesforceError::Transport { .. } => {
                ToolError::new(codes::TRANSPORT_ERROR, err.to_string()).with_docs_hint(
                    "Check network access and that SALESFORCE_INSTANCE_URL points at your org.",
                )
            }
            SalesforceError::InvalidUrl(_) => {
                ToolError::new(codes::VALIDATION_FAILED, err.to_string())
            }
            SalesforceError::Login(_) | SalesforceError::UnexpectedResponse(_) => {
                ToolError::new(codes::SALESFORCE_ERROR, err.to_string())
            }
        }
    }
}
