//! Response header middleware for browser clients.

use axum::{
    body::Body,
    http::{header, HeaderValue, Request},
};

use super::{Handler, Middleware};

/// Allows credentialed (cookie carrying) cross-origin requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnableCookie;

impl Middleware for EnableCookie {
    fn name(&self) -> &'static str {
        "enable_cookie"
    }

    fn wrap(&self, next: Handler) -> Handler {
        Handler::new(move |req: Request<Body>| {
            let next = next.clone();
            async move {
                let mut response = next.call(req).await;
                response.headers_mut().insert(
                    header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                    HeaderValue::from_static("true"),
                );
                response
            }
        })
    }
}

/// Allows any origin. Meant for testing deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAnyOrigin;

impl Middleware for AllowAnyOrigin {
    fn name(&self) -> &'static str {
        "allow_any_origin"
    }

    fn wrap(&self, next: Handler) -> Handler {
        Handler::new(move |req: Request<Body>| {
            let next = next.clone();
            async move {
                let mut response = next.call(req).await;
                response.headers_mut().insert(
                    header::ACCESS_CONTROL_ALLOW_ORIGIN,
                    HeaderValue::from_static("*"),
                );
                response
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::middleware::MiddlewareChain;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn test_cors_headers_added() {
        let handler = MiddlewareChain::new()
            .with(EnableCookie)
            .with(AllowAnyOrigin)
            .compose(Handler::new(|_req| async { StatusCode::OK.into_response() }));

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = handler.call(req).await;
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
