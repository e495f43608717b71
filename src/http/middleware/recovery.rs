//! Panic recovery boundary.
//!
//! Every handler invocation runs inside `catch_unwind`. A panic from any
//! downstream middleware or handler is logged with a backtrace and turned
//! into an internal-error envelope with status 500.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;

use axum::{body::Body, http::Request};
use futures_util::FutureExt;

use super::{Handler, Middleware};
use crate::http::response::{ErrCode, Responder};
use crate::observability::metrics;

/// Converts downstream panics into 500 envelopes.
#[derive(Debug, Clone, Copy)]
pub struct Recovery {
    responder: Responder,
}

impl Recovery {
    pub fn new(responder: Responder) -> Self {
        Self { responder }
    }
}

impl Middleware for Recovery {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let responder = self.responder;
        Handler::new(move |req: Request<Body>| {
            let next = next.clone();
            let path = req.uri().path().to_string();
            async move {
                let outcome = AssertUnwindSafe(async move { next.call(req).await })
                    .catch_unwind()
                    .await;

                match outcome {
                    Ok(response) => response,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        tracing::error!(
                            path = %path,
                            panic = %message,
                            backtrace = %Backtrace::force_capture(),
                            "Recovered from panic"
                        );
                        metrics::record_panic(&path);
                        let reply = responder.make_500(message, ErrCode::Sys);
                        responder.write(&reply, &path)
                    }
                }
            }
        })
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
