//! Request-scoped relay errors
//!
//! Every failure the relay can hit before response headers are committed maps
//! to a status code and a fixed public message. Internal detail goes to the
//! log, never to the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

/// Errors that can occur while relaying an upload
#[derive(Error, Debug)]
pub enum RelayError {
    /// A required form field was absent or empty
    #[error("missing {0}")]
    MissingField(&'static str),

    /// The inbound file could not be read or spooled
    #[error("cannot open uploaded file: {0}")]
    UploadRead(String),

    /// The inbound body exceeded the configured size limit
    #[error("request body too large: {0}")]
    PayloadTooLarge(String),

    /// The outbound request could not be constructed
    #[error("ml request build failed: {0}")]
    RequestBuild(String),

    /// Connection, timeout or transport failure talking to the scoring service
    #[error("ml service unreachable: {0}")]
    UpstreamUnreachable(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MissingField(_) | RelayError::UploadRead(_) => StatusCode::BAD_REQUEST,
            RelayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::RequestBuild(_) | RelayError::UpstreamUnreachable(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Message returned to the client in `{"error": ...}`
    pub fn public_message(&self) -> String {
        match self {
            RelayError::MissingField(field) => format!("missing {field}"),
            RelayError::UploadRead(_) => "cannot open uploaded file".to_string(),
            RelayError::PayloadTooLarge(_) => "request body too large".to_string(),
            RelayError::RequestBuild(_) => "ml request build failed".to_string(),
            RelayError::UpstreamUnreachable(_) => "ml service unreachable".to_string(),
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            RelayError::MissingField(_) => "validation",
            RelayError::UploadRead(_) => "upload_read",
            RelayError::PayloadTooLarge(_) => "payload_too_large",
            RelayError::RequestBuild(_) => "request_build",
            RelayError::UpstreamUnreachable(_) => "upstream",
        }
    }

    /// Map a reqwest failure from `send()` or a body read
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::UpstreamUnreachable(format!("request timed out: {err}"))
        } else if err.is_connect() {
            RelayError::UpstreamUnreachable(format!("failed to connect: {err}"))
        } else if err.is_builder() {
            RelayError::RequestBuild(err.to_string())
        } else {
            RelayError::UpstreamUnreachable(format!("request failed: {err}"))
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(
                error_type = self.category(),
                error_message = %self,
                "Relay failed"
            );
        } else {
            warn!(
                error_type = self.category(),
                error_message = %self,
                "Rejected upload"
            );
        }

        let body = Json(serde_json::json!({ "error": self.public_message() }));
        (status, body).into_response()
    }
}
