//! Error types for the connectivity validator

use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use connectivity_core::RouteError;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::directory::DirectoryError;

/// Result type alias for the connectivity validator
pub type Result<T> = std::result::Result<T, Error>;

/// Error category, mapped one-to-one onto an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed request (400)
    BadRequest,
    /// Caller is not an authorized client of the application (403)
    Forbidden,
    /// No destination for the request path (404)
    NotFound,
    /// Gateway-side failure (500)
    Internal,
    /// Backend could not be reached (502)
    BadGateway,
}

impl ErrorKind {
    /// HTTP status for this kind
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadGateway => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Connectivity validator errors
#[derive(Error, Debug)]
pub enum Error {
    /// Forwarded-certificate header absent
    #[error("{0} header not found")]
    MissingCertificateHeader(&'static str),

    /// Application name absent from the route
    #[error("Application name not specified")]
    MissingApplication,

    /// Identity lookup failed
    #[error("failed to resolve identity for application {application}: {source}")]
    Identity {
        /// Application being resolved
        application: String,
        /// Directory failure
        #[source]
        source: DirectoryError,
    },

    /// No presented subject satisfies the authorization policy
    #[error("No valid subject found")]
    Forbidden,

    /// Request path matched no destination
    #[error(transparent)]
    Route(#[from] RouteError),

    /// Backend unreachable
    #[error("Failed to reach {destination} backend: {message}")]
    Upstream {
        /// Destination that failed
        destination: String,
        /// Transport error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Category of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingApplication => ErrorKind::BadRequest,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::Route(RouteError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Upstream { .. } => ErrorKind::BadGateway,
            Self::MissingCertificateHeader(_)
            | Self::Identity { .. }
            | Self::Config(_)
            | Self::Io(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let body = json!({
            "error": {
                "kind": kind,
                "message": self.to_string(),
            }
        });
        (kind.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(
            Error::MissingApplication.kind().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::Forbidden.kind().status(), StatusCode::FORBIDDEN);
        assert_eq!(
            Error::from(RouteError::NotFound { path: "/x".into() })
                .kind()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::MissingCertificateHeader("X-Forwarded-Client-Cert")
                .kind()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::Upstream {
                destination: "event_mesh".into(),
                message: "refused".into()
            }
            .kind()
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn identity_error_carries_context() {
        let err = Error::Identity {
            application: "app1".into(),
            source: DirectoryError::NotFound("app1".into()),
        };
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(
            err.to_string()
                .starts_with("failed to resolve identity for application app1")
        );
    }

    #[test]
    fn missing_header_message_names_header() {
        let err = Error::MissingCertificateHeader("X-Forwarded-Client-Cert");
        assert_eq!(err.to_string(), "X-Forwarded-Client-Cert header not found");
    }

    #[test]
    fn response_uses_mapped_status() {
        let response = Error::Forbidden.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
