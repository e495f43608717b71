//! Method restriction.
//!
//! Rejects (400) any request whose verb differs from the route's declared
//! verb. WebSocket routes are exempt: upgrade negotiation is their verb.

use std::fmt;

use axum::{
    body::Body,
    http::{Method, Request},
};
use serde::Serialize;

use super::{Handler, Middleware};
use crate::http::response::{ErrCode, Responder};

/// Declared verb of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MethodKind {
    Get,
    Post,
    Ws,
}

impl MethodKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MethodKind::Get => "GET",
            MethodKind::Post => "POST",
            MethodKind::Ws => "WS",
        }
    }

    /// Whether `method` is acceptable for a route of this kind.
    pub fn allows(self, method: &Method) -> bool {
        match self {
            MethodKind::Get => *method == Method::GET,
            MethodKind::Post => *method == Method::POST,
            MethodKind::Ws => true,
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-route verb check.
#[derive(Debug, Clone, Copy)]
pub struct MethodFilter {
    kind: MethodKind,
    responder: Responder,
}

impl MethodFilter {
    pub fn new(kind: MethodKind, responder: Responder) -> Self {
        Self { kind, responder }
    }
}

impl Middleware for MethodFilter {
    fn name(&self) -> &'static str {
        "method"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let kind = self.kind;
        let responder = self.responder;
        Handler::new(move |req: Request<Body>| {
            let next = next.clone();
            async move {
                if kind == MethodKind::Ws {
                    tracing::debug!(path = %req.uri().path(), "Method WS");
                } else if !kind.allows(req.method()) {
                    let path = req.uri().path().to_string();
                    tracing::error!(
                        path = %path,
                        target_method = %req.method(),
                        register_method = %kind,
                        "Method mismatch"
                    );
                    let reply = responder.make_400(
                        format!("method {} not allowed, expected {}", req.method(), kind),
                        ErrCode::InvalidArgument,
                    );
                    return responder.write(&reply, &path);
                }
                next.call(req).await
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunMode;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    fn filtered(kind: MethodKind) -> Handler {
        MethodFilter::new(kind, Responder::new(RunMode::Development))
            .wrap(Handler::new(|_req| async { StatusCode::OK.into_response() }))
    }

    fn request(method: Method) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri("/api/x")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_matching_method_passes() {
        assert_eq!(filtered(MethodKind::Get).call(request(Method::GET)).await.status(), StatusCode::OK);
        assert_eq!(filtered(MethodKind::Post).call(request(Method::POST)).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_mismatched_method_is_400() {
        let response = filtered(MethodKind::Post).call(request(Method::GET)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = filtered(MethodKind::Get).call(request(Method::DELETE)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ws_is_exempt() {
        let response = filtered(MethodKind::Ws).call(request(Method::POST)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
