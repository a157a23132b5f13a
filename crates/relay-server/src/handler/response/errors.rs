use std::borrow::Cow;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Tracing target for error responses.
const TRACING_TARGET: &str = "relay_server::handler::errors";

/// JSON body of every error response.
///
/// `context` and `status` are kept for logging and the status line; they are
/// never serialized.
#[must_use = "error responses do nothing unless serialized"]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse<'a> {
    /// The error name/type identifier
    pub name: Cow<'a, str>,
    /// User-friendly error message safe for client display
    pub message: Cow<'a, str>,
    /// The resource that the error relates to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Cow<'a, str>>,
    /// Helpful suggestion for resolving the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<Cow<'a, str>>,

    /// Internal context for debugging
    #[serde(skip)]
    pub context: Option<Cow<'a, str>>,
    /// HTTP status code
    #[serde(skip)]
    pub status: StatusCode,
}

impl<'a> ErrorResponse<'a> {
    // 4xx Client Errors
    pub const BAD_REQUEST: Self = Self::new(
        "bad_request",
        "Invalid request data.",
        StatusCode::BAD_REQUEST,
    );
    pub const NOT_FOUND: Self =
        Self::new("not_found", "Resource not found.", StatusCode::NOT_FOUND);
    pub const PAYLOAD_TOO_LARGE: Self = Self::new(
        "payload_too_large",
        "Payload too large.",
        StatusCode::PAYLOAD_TOO_LARGE,
    );
    pub const UNSUPPORTED_MEDIA_TYPE: Self = Self::new(
        "unsupported_media_type",
        "Unsupported media type.",
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
    );

    // 5xx Server Errors
    pub const INTERNAL_SERVER_ERROR: Self = Self::new(
        "internal_server_error",
        "Internal server error.",
        StatusCode::INTERNAL_SERVER_ERROR,
    );
    pub const SERVICE_UNAVAILABLE: Self = Self::new(
        "service_unavailable",
        "Service unavailable.",
        StatusCode::SERVICE_UNAVAILABLE,
    );
    pub const GATEWAY_TIMEOUT: Self = Self::new(
        "gateway_timeout",
        "Request timed out.",
        StatusCode::GATEWAY_TIMEOUT,
    );

    /// Creates a new error response.
    #[inline]
    pub const fn new(name: &'a str, message: &'a str, status: StatusCode) -> Self {
        Self {
            name: Cow::Borrowed(name),
            message: Cow::Borrowed(message),
            resource: None,
            suggestion: None,
            context: None,
            status,
        }
    }

    /// Sets the resource, joining it to an existing one with `/`.
    pub fn with_resource(mut self, resource: impl Into<Cow<'a, str>>) -> Self {
        let new_resource = resource.into();
        self.resource = Some(match self.resource {
            Some(existing) => Cow::Owned(format!("{existing}/{new_resource}")),
            None => new_resource,
        });
        self
    }

    /// Appends a sentence to the message.
    pub fn with_message(mut self, message: impl Into<Cow<'a, str>>) -> Self {
        let new_message = message.into();
        let base = self.message.trim_end_matches('.');
        self.message = Cow::Owned(format!("{base}. {new_message}"));
        self
    }

    /// Attaches context, joining it to existing context with `; `.
    pub fn with_context(mut self, context: impl Into<Cow<'a, str>>) -> Self {
        let new_context = context.into();
        self.context = Some(match self.context {
            Some(existing) => Cow::Owned(format!("{existing}; {new_context}")),
            None => new_context,
        });
        self
    }

    /// Attaches a suggestion, joining it to an existing one with `; `.
    pub fn with_suggestion(mut self, suggestion: impl Into<Cow<'a, str>>) -> Self {
        let new_suggestion = suggestion.into();
        self.suggestion = Some(match self.suggestion {
            Some(existing) => Cow::Owned(format!("{existing}; {new_suggestion}")),
            None => new_suggestion,
        });
        self
    }
}

impl Default for ErrorResponse<'_> {
    #[inline]
    fn default() -> Self {
        Self::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for ErrorResponse<'_> {
    fn into_response(self) -> Response {
        tracing::warn!(
            target: TRACING_TARGET,
            status = %self.status,
            name = %self.name,
            message = %self.message,
            resource = ?self.resource,
            context = ?self.context,
            "HTTP error response"
        );
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_merging_resource() {
        let response = ErrorResponse::NOT_FOUND
            .with_resource("chat")
            .with_resource("stream");

        assert_eq!(response.resource.as_deref(), Some("chat/stream"));
    }

    #[test]
    fn error_response_merging_message() {
        let response = ErrorResponse::BAD_REQUEST
            .with_message("Invalid format")
            .with_message("Missing required field");

        assert_eq!(
            &response.message,
            "Invalid request data. Invalid format. Missing required field"
        );
    }

    #[test]
    fn error_response_merging_context() {
        let response = ErrorResponse::SERVICE_UNAVAILABLE
            .with_context("limit reached")
            .with_context("8 open streams");

        assert_eq!(
            response.context.as_deref(),
            Some("limit reached; 8 open streams")
        );
    }

    #[test]
    fn error_response_serialization_hides_internal_fields() {
        let response = ErrorResponse::BAD_REQUEST
            .with_resource("request")
            .with_message("Prompt is empty")
            .with_context("length 0")
            .with_suggestion("Send a non-empty prompt");

        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["name"], "bad_request");
        assert_eq!(json["resource"], "request");
        assert_eq!(json["suggestion"], "Send a non-empty prompt");
        assert!(json.get("context").is_none());
        assert!(json.get("status").is_none());
    }
}
