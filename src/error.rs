//! Error taxonomy.
//!
//! # Responsibilities
//! - Classify action failures into client input, rate limiting, auth,
//!   not found, deprecation and internal errors
//! - Map every class to a status code and an envelope error code
//! - Describe registration and WebSocket session failures
//!
//! # Design Decisions
//! - Handlers propagate `ActionError` with `?`; panics are only a safety net
//! - Internal descriptions are elided by the responder in deployment mode,
//!   never here

use axum::http::StatusCode;
use thiserror::Error;

use crate::http::response::{ErrCode, Reply, Responder};

/// Failure raised while handling a single action.
#[derive(Debug, Error)]
pub enum ActionError {
    /// A named argument was missing or malformed.
    #[error("invalid argument: \"{0}\"")]
    InvalidArgument(String),

    /// Malformed method, body or other client input.
    #[error("{0}")]
    ClientInput(String),

    /// The request body could not be decoded as JSON.
    #[error("malformed json body: {0}")]
    Json(#[from] serde_json::Error),

    /// The request body could not be read.
    #[error("failed to read request body: {0}")]
    Body(String),

    /// Admission control rejected the request.
    #[error("too many requests")]
    RateLimited,

    /// Missing or invalid credential.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The route is deprecated in favour of `substitute`.
    #[error("deprecated. use {substitute} instead")]
    Deprecated { substitute: String },

    /// Unexpected failure inside the server.
    #[error("{0}")]
    Internal(String),

    /// A WebSocket session operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ActionError {
    /// HTTP status carried by the envelope for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ActionError::InvalidArgument(_)
            | ActionError::ClientInput(_)
            | ActionError::Json(_)
            | ActionError::Body(_)
            | ActionError::RateLimited => StatusCode::BAD_REQUEST,
            ActionError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ActionError::NotFound(_) => StatusCode::NOT_FOUND,
            ActionError::Deprecated { .. } => StatusCode::OK,
            ActionError::Internal(_) | ActionError::Session(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Envelope error code for this error.
    pub fn code(&self) -> ErrCode {
        match self {
            ActionError::InvalidArgument(_)
            | ActionError::ClientInput(_)
            | ActionError::Json(_)
            | ActionError::Body(_) => ErrCode::InvalidArgument,
            ActionError::RateLimited => ErrCode::RateLimited,
            ActionError::Unauthorized(_) => ErrCode::Unauthorized,
            ActionError::NotFound(_) => ErrCode::NotFound,
            ActionError::Deprecated { .. } => ErrCode::Deprecated,
            ActionError::Internal(_) | ActionError::Session(_) => ErrCode::Sys,
        }
    }

    /// Convert into an envelope reply, honouring the responder's run mode.
    pub fn into_reply(self, responder: &Responder) -> Reply {
        let status = self.status();
        let envelope = responder.make(self.to_string(), self.code());
        Reply::new(envelope, status)
    }
}

/// Failure raised while installing action groups at startup.
#[derive(Debug, Error)]
pub enum RegisterError {
    /// A registrant refused to complete.
    #[error("{0}")]
    Failed(String),

    /// A registrant for `group` failed; startup must abort.
    #[error("action group {group} failed to register")]
    Group {
        group: String,
        #[source]
        source: Box<RegisterError>,
    },
}

impl RegisterError {
    pub fn failed(reason: impl Into<String>) -> Self {
        RegisterError::Failed(reason.into())
    }
}

/// Failure of a WebSocket session operation.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The peer sent a close frame or the stream ended.
    #[error("websocket closed by peer")]
    Disconnected,

    /// The session was already released by the adapter.
    #[error("websocket session already closed")]
    Closed,

    #[error("websocket read failed: {0}")]
    Read(#[source] axum::Error),

    #[error("websocket write failed: {0}")]
    Write(#[source] axum::Error),

    #[error("websocket payload is not valid json: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode websocket payload: {0}")]
    Encode(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunMode;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ActionError::RateLimited.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ActionError::Unauthorized("token".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ActionError::NotFound("/x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ActionError::Internal("boom".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ActionError::Deprecated { substitute: "/v2".into() }.status(),
            StatusCode::OK
        );
    }

    #[test]
    fn test_internal_error_reply_is_elided_in_deployment() {
        let reply = ActionError::Internal("db password wrong".into())
            .into_reply(&Responder::new(RunMode::Deployment));
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reply.envelope.err_cod, ErrCode::Sys.as_str());
        assert!(!reply.envelope.desc.contains("db password wrong"));
    }

    #[test]
    fn test_client_error_reply_keeps_description() {
        let reply = ActionError::InvalidArgument("name".into())
            .into_reply(&Responder::new(RunMode::Deployment));
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.envelope.desc, "invalid argument: \"name\"");
    }

    #[test]
    fn test_group_error_keeps_source() {
        let err = RegisterError::Group {
            group: "/api".into(),
            source: Box::new(RegisterError::failed("missing dependency")),
        };
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("missing dependency"));
    }
}
