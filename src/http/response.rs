//! Response envelope and status helpers.
//!
//! # Responsibilities
//! - Define the `{ErrCod, Desc, Data}` wire envelope
//! - Build envelopes with deployment-aware error elision
//! - Serialize envelopes to responses inside a failure boundary
//! - Bound the size of envelopes written to the log
//!
//! # Design Decisions
//! - Status code is chosen independently of the envelope body
//! - Only the logged copy is truncated, never the transmitted body
//! - A failed write degrades to a bare 500 with an empty body

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::config::RunMode;

/// Description substituted for system errors in deployment mode.
pub const INTERNAL_ERROR_DESC: &str = "server internal error";

/// Default number of `Data` bytes kept in the logged envelope copy.
pub const LOG_DATA_LIMIT: usize = 1024;

/// Symbolic envelope error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrCode {
    Ok,
    Sys,
    InvalidArgument,
    Unauthorized,
    NotFound,
    RateLimited,
    Deprecated,
}

impl ErrCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrCode::Ok => "0",
            ErrCode::Sys => "-1",
            ErrCode::InvalidArgument => "-2",
            ErrCode::Unauthorized => "-3",
            ErrCode::NotFound => "-4",
            ErrCode::RateLimited => "-5",
            ErrCode::Deprecated => "-8",
        }
    }
}

impl fmt::Display for ErrCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ErrCode> for String {
    fn from(code: ErrCode) -> Self {
        code.as_str().to_string()
    }
}

/// The uniform JSON result wrapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "ErrCod")]
    pub err_cod: String,
    #[serde(rename = "Desc")]
    pub desc: String,
    #[serde(rename = "Data")]
    pub data: String,
}

impl Envelope {
    pub fn new(code: impl Into<String>, desc: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            err_cod: code.into(),
            desc: desc.into(),
            data: data.into(),
        }
    }

    /// Canned body returned in place of a deprecated route.
    pub fn deprecated(substitute: &str) -> Self {
        Self::new(
            ErrCode::Deprecated,
            format!("deprecated. use {} instead", substitute),
            "",
        )
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }

    pub fn is_system_error(&self) -> bool {
        self.err_cod == ErrCode::Sys.as_str()
    }

    /// Copy of the envelope safe to write to the log.
    pub fn log_view(&self, limit: usize) -> Envelope {
        Envelope {
            err_cod: self.err_cod.clone(),
            desc: self.desc.clone(),
            data: truncate_for_log(&self.data, limit).to_string(),
        }
    }
}

/// Keep the first `limit` bytes of `data`, backing off to a char boundary.
pub fn truncate_for_log(data: &str, limit: usize) -> &str {
    if data.len() <= limit {
        return data;
    }
    let mut end = limit;
    while !data.is_char_boundary(end) {
        end -= 1;
    }
    &data[..end]
}

/// An envelope paired with its HTTP status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub envelope: Envelope,
    pub status: StatusCode,
}

impl Reply {
    pub fn new(envelope: Envelope, status: StatusCode) -> Self {
        Self { envelope, status }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.envelope.data = data.into();
        self
    }
}

/// Builds and writes envelopes for a given run mode.
#[derive(Debug, Clone, Copy)]
pub struct Responder {
    mode: RunMode,
    log_data_limit: usize,
}

impl Responder {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            log_data_limit: LOG_DATA_LIMIT,
        }
    }

    pub fn with_log_limit(mut self, limit: usize) -> Self {
        self.log_data_limit = limit;
        self
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Create an envelope. In deployment mode a system error never carries
    /// its original description.
    pub fn make(&self, desc: impl Into<String>, code: impl Into<String>) -> Envelope {
        let code = code.into();
        if self.mode.is_deployment() && code == ErrCode::Sys.as_str() {
            return Envelope::new(code, INTERNAL_ERROR_DESC, "");
        }
        Envelope::new(code, desc, "")
    }

    /// 200 OK.
    pub fn make_200(&self, desc: impl Into<String>, code: impl Into<String>) -> Reply {
        Reply::new(self.make(desc, code), StatusCode::OK)
    }

    /// 400 Bad Request: check the description and retry.
    pub fn make_400(&self, desc: impl Into<String>, code: impl Into<String>) -> Reply {
        Reply::new(self.make(desc, code), StatusCode::BAD_REQUEST)
    }

    /// 401 Unauthorized.
    pub fn make_401(&self, desc: impl Into<String>, code: impl Into<String>) -> Reply {
        Reply::new(self.make(desc, code), StatusCode::UNAUTHORIZED)
    }

    /// 404 Not Found.
    pub fn make_404(&self, desc: impl Into<String>, code: impl Into<String>) -> Reply {
        Reply::new(self.make(desc, code), StatusCode::NOT_FOUND)
    }

    /// 500 Internal Server Error.
    pub fn make_500(&self, desc: impl Into<String>, code: impl Into<String>) -> Reply {
        Reply::new(self.make(desc, code), StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn ok(&self) -> Reply {
        self.make_200("ok", ErrCode::Ok)
    }

    pub fn ok_with_data(&self, data: impl Into<String>) -> Reply {
        self.ok().with_data(data)
    }

    pub fn arg_invalid(&self, arg_name: &str) -> Reply {
        self.make_200(
            format!("invalid argument: \"{}\"", arg_name),
            ErrCode::InvalidArgument,
        )
    }

    /// Serialize `reply` into a JSON response.
    pub fn write(&self, reply: &Reply, path: &str) -> Response {
        let written = catch_unwind(AssertUnwindSafe(|| serde_json::to_vec(&reply.envelope)));
        let body = match written {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                tracing::error!(path = %path, error = %e, "Failed to serialize envelope");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            Err(_) => {
                tracing::error!(path = %path, "Panic while serializing envelope");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        tracing::debug!(
            path = %path,
            status = reply.status.as_u16(),
            envelope = ?reply.envelope.log_view(self.log_data_limit),
            "HttpReturn"
        );

        (
            reply.status,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }

    /// Write only the `Data` field, without status or error wrapping.
    pub fn write_data_only(&self, reply: &Reply, path: &str) -> Response {
        tracing::debug!(
            path = %path,
            data = truncate_for_log(&reply.envelope.data, self.log_data_limit),
            "HttpReturn (data only)"
        );
        (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            reply.envelope.data.clone(),
        )
            .into_response()
    }
}

/// Content type for audio payloads served by content handlers.
pub fn content_type_for(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "wav" => Some("audio/wav"),
        "mp3" => Some("audio/mp3"),
        "flac" => Some("audio/x-flac,audio/flac"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_deployment_mode_hides_system_error() {
        let responder = Responder::new(RunMode::Deployment);
        let envelope = responder.make("connection refused at 10.0.0.3", ErrCode::Sys);
        assert_eq!(envelope.desc, INTERNAL_ERROR_DESC);
        assert_eq!(envelope.err_cod, "-1");
    }

    #[test]
    fn test_development_mode_keeps_system_error() {
        let responder = Responder::new(RunMode::Development);
        let envelope = responder.make("connection refused", ErrCode::Sys);
        assert_eq!(envelope.desc, "connection refused");
    }

    #[test]
    fn test_deployment_mode_keeps_other_errors() {
        let responder = Responder::new(RunMode::Deployment);
        let envelope = responder.make("missing field", ErrCode::InvalidArgument);
        assert_eq!(envelope.desc, "missing field");
    }

    #[test]
    fn test_deprecated_wire_format() {
        let json = serde_json::to_string(&Envelope::deprecated("/v2/echo")).unwrap();
        assert_eq!(
            json,
            r#"{"ErrCod":"-8","Desc":"deprecated. use /v2/echo instead","Data":""}"#
        );
    }

    #[test]
    fn test_log_view_keeps_leading_bytes() {
        let data = format!("X{}", "a".repeat(2047));
        let envelope = Envelope::new(ErrCode::Ok, "ok", data.clone());
        let logged = envelope.log_view(LOG_DATA_LIMIT);

        assert_eq!(logged.data.len(), LOG_DATA_LIMIT);
        assert!(logged.data.starts_with('X'));
        assert_eq!(&logged.data[..], &data[..LOG_DATA_LIMIT]);
        // the original is untouched
        assert_eq!(envelope.data.len(), 2048);
    }

    #[test]
    fn test_log_view_short_data_untouched() {
        let envelope = Envelope::new(ErrCode::Ok, "ok", "short");
        assert_eq!(envelope.log_view(LOG_DATA_LIMIT), envelope);

        let exact = "b".repeat(LOG_DATA_LIMIT);
        assert_eq!(truncate_for_log(&exact, LOG_DATA_LIMIT).len(), LOG_DATA_LIMIT);
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        // 'é' is two bytes; a cut at 3 falls inside the second one
        let data = "éé";
        assert_eq!(truncate_for_log(data, 3), "é");
    }

    #[tokio::test]
    async fn test_write_transmits_full_data() {
        let responder = Responder::new(RunMode::Development);
        let data = "z".repeat(4096);
        let reply = responder.ok_with_data(data.clone());

        let response = responder.write(&reply, "/api/big");
        assert_eq!(response.status(), StatusCode::OK);

        let envelope: Envelope = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(envelope.data.len(), 4096);
        assert_eq!(envelope.data, data);
    }

    #[tokio::test]
    async fn test_write_logs_truncated_data_only() {
        use crate::observability::logging::capture::with_captured_logs;

        let responder = Responder::new(RunMode::Development);
        let data = format!("{}{}", "7".repeat(LOG_DATA_LIMIT), "9".repeat(LOG_DATA_LIMIT));
        let reply = responder.ok_with_data(data.clone());

        let (response, logs) = with_captured_logs(|| responder.write(&reply, "/api/big"));

        let line = logs
            .lines()
            .find(|l| l.contains("HttpReturn"))
            .expect("envelope was logged");
        assert!(line.contains(&format!("data: \"{}\"", "7".repeat(LOG_DATA_LIMIT))));
        assert!(!line.contains(&"9".repeat(4)));

        let envelope: Envelope = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(envelope.data.len(), 2 * LOG_DATA_LIMIT);
        assert_eq!(envelope.data, data);
    }

    #[tokio::test]
    async fn test_write_uses_independent_status() {
        let responder = Responder::new(RunMode::Development);
        let reply = responder.make_401("token expired", ErrCode::Unauthorized);
        let response = responder.write(&reply, "/api/me");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_write_data_only() {
        let responder = Responder::new(RunMode::Development);
        let reply = responder.ok_with_data("raw-value");
        let response = responder.write_data_only(&reply, "/api/raw");
        assert_eq!(body_string(response).await, "raw-value");
    }

    #[test]
    fn test_arg_invalid_helper() {
        let reply = Responder::new(RunMode::Development).arg_invalid("page");
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.envelope.err_cod, ErrCode::InvalidArgument.as_str());
        assert_eq!(reply.envelope.desc, "invalid argument: \"page\"");
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("WAV"), Some("audio/wav"));
        assert_eq!(content_type_for("flac"), Some("audio/x-flac,audio/flac"));
        assert_eq!(content_type_for("ogg"), None);
    }
}
