//! Request latency measurement.
//!
//! Must be registered first so that the measured time covers every other
//! middleware as well as the handler.

use std::time::Instant;

use axum::{body::Body, http::Request};

use super::{Handler, Middleware};
use crate::observability::metrics;

/// Logs total latency and records request metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timing;

impl Middleware for Timing {
    fn name(&self) -> &'static str {
        "timing"
    }

    fn wrap(&self, next: Handler) -> Handler {
        Handler::new(move |req: Request<Body>| {
            let next = next.clone();
            async move {
                let method = req.method().to_string();
                let path = req.uri().path().to_string();
                tracing::debug!(path = %path, "Time started recording");

                let start = Instant::now();
                let response = next.call(req).await;
                let status = response.status().as_u16();

                tracing::debug!(
                    path = %path,
                    status,
                    elapsed = ?start.elapsed(),
                    "Time used"
                );
                metrics::record_request(&method, status, &path, start);
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
    async fn test_timing_passes_response_through() {
        let handler = MiddlewareChain::new()
            .with(Timing)
            .compose(Handler::new(|_req| async { (StatusCode::CREATED, "made").into_response() }));

        let req = Request::builder().uri("/t").body(Body::empty()).unwrap();
        let response = handler.call(req).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
