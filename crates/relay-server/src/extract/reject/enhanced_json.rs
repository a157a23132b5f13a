//! JSON extractor with descriptive rejections.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Json as AxumJson, Request};
use axum::response::{IntoResponse, Response};
use derive_more::{Deref, DerefMut, From};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::handler::{Error, ErrorKind};

/// Default request body limit applied by axum (2 MiB).
const MAX_JSON_PAYLOAD_SIZE: usize = 2 * 1024 * 1024;

/// JSON extractor and response wrapper.
///
/// Behaves like [`axum::Json`], but every rejection is turned into a
/// `bad_request` error whose message tells the client what to fix.
#[must_use]
#[derive(Debug, Clone, Copy, Default, Deref, DerefMut, From)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Creates a new [`Json`] wrapper around the provided value.
    #[inline]
    pub fn new(inner: T) -> Self {
        Self(inner)
    }

    /// Returns the inner value.
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = Error<'static>;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extractor = <AxumJson<T> as FromRequest<S>>::from_request(req, state).await;
        extractor.map(|x| Self::new(x.0)).map_err(Into::into)
    }
}

impl<T> IntoResponse for Json<T>
where
    T: Serialize,
{
    #[inline]
    fn into_response(self) -> Response {
        AxumJson(self.0).into_response()
    }
}

impl From<JsonRejection> for Error<'static> {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => ErrorKind::BadRequest
                .with_message("Invalid request data format")
                .with_context(format!(
                    "JSON deserialization failed: {}",
                    sanitize_error_message(&err.body_text())
                ))
                .with_suggestion("Check that required fields are present and have the right types"),
            JsonRejection::JsonSyntaxError(err) => ErrorKind::BadRequest
                .with_message("Invalid JSON syntax in request body")
                .with_context(format!(
                    "JSON parsing failed: {}",
                    sanitize_error_message(&err.body_text())
                )),
            JsonRejection::MissingJsonContentType(_) => ErrorKind::UnsupportedMediaType
                .with_message("Expected a JSON request body")
                .with_suggestion("Set the Content-Type header to application/json"),
            JsonRejection::BytesRejection(err) => {
                let message = err.body_text();
                if message.contains("length limit") {
                    ErrorKind::PayloadTooLarge.with_context(format!(
                        "Request body exceeds the maximum of {MAX_JSON_PAYLOAD_SIZE} bytes"
                    ))
                } else {
                    ErrorKind::BadRequest
                        .with_message("Failed to read request body")
                        .with_context(sanitize_error_message(&message))
                }
            }
            other => ErrorKind::InternalServerError
                .with_message("Request processing failed")
                .with_context(format!("Unexpected JSON rejection: {other:?}")),
        }
    }
}

/// Keeps rejection details short enough for a response body.
fn sanitize_error_message(message: &str) -> String {
    let lines = message.lines().take(3).collect::<Vec<_>>();
    lines.join(" ").chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_truncates_long_messages() {
        let message = format!("first\nsecond\nthird\nfourth {}", "x".repeat(500));
        let sanitized = sanitize_error_message(&message);

        assert!(sanitized.starts_with("first second third"));
        assert!(!sanitized.contains("fourth"));
        assert!(sanitized.chars().count() <= 200);
    }
}
