//! Asynchronous access recording.
//!
//! The access event is logged from a detached task so it never delays the
//! response, and it never takes part in the allow/deny decision.

use axum::{
    body::Body,
    http::{header, Request},
};

use super::{Handler, Middleware};
use crate::http::request::client_ip;

/// Fire-and-forget access log.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLog;

impl Middleware for AccessLog {
    fn name(&self) -> &'static str {
        "access_log"
    }

    fn wrap(&self, next: Handler) -> Handler {
        Handler::new(move |req: Request<Body>| {
            let next = next.clone();
            let client = client_ip(&req);
            let method = req.method().to_string();
            let path = req.uri().path().to_string();
            let user_agent = req
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string();

            tokio::spawn(async move {
                tracing::info!(
                    client = %client,
                    method = %method,
                    path = %path,
                    user_agent = %user_agent,
                    "Access"
                );
            });

            next.call(req)
        })
    }
}
