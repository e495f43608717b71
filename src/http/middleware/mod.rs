//! Middleware composition.
//!
//! # Data Flow
//! ```text
//! register(Timing) → register(Recovery) → register(TrafficGuard) → register(AccessLog)
//!
//! compose(handler):
//!     Timing( Recovery( TrafficGuard( AccessLog( handler ))))
//! ```
//!
//! # Design Decisions
//! - Order is data: the chain is a list, first registered is outermost
//! - A middleware may run code before and after delegating, or short-circuit
//! - The chain is frozen once routes are installed (shared via `Arc`)

pub mod access_log;
pub mod headers;
pub mod method;
pub mod recovery;
pub mod timing;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response};

pub use access_log::AccessLog;
pub use headers::{AllowAnyOrigin, EnableCookie};
pub use method::{MethodFilter, MethodKind};
pub use recovery::Recovery;
pub use timing::Timing;

/// Boxed response future returned by every handler.
pub type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// A type-erased request handler.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<dyn Fn(Request<Body>) -> ResponseFuture + Send + Sync>,
}

impl Handler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |req| Box::pin(f(req))),
        }
    }

    pub fn call(&self, req: Request<Body>) -> ResponseFuture {
        (self.inner)(req)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

/// A cross-cutting behavior that wraps a handler.
pub trait Middleware: Send + Sync + 'static {
    /// Name used in startup logs.
    fn name(&self) -> &'static str;

    /// Return a handler that runs this middleware around `next`.
    fn wrap(&self, next: Handler) -> Handler;
}

/// Ordered list of middleware applied identically to every route.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `middleware`; it runs inside everything registered before it.
    pub fn register(&mut self, middleware: impl Middleware) -> &mut Self {
        tracing::debug!(middleware = middleware.name(), position = self.layers.len(), "Middleware registered");
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.register(middleware);
        self
    }

    /// Wrap `handler` so that the first registered middleware is outermost.
    pub fn compose(&self, handler: Handler) -> Handler {
        self.layers
            .iter()
            .rev()
            .fold(handler, |next, layer| layer.wrap(next))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::sync::Mutex;

    /// Records "<name>:before" and "<name>:after" around the inner handler.
    struct Trace {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Trace {
        fn name(&self) -> &'static str {
            self.name
        }

        fn wrap(&self, next: Handler) -> Handler {
            let name = self.name;
            let log = self.log.clone();
            Handler::new(move |req| {
                let next = next.clone();
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(format!("{}:before", name));
                    let response = next.call(req).await;
                    log.lock().unwrap().push(format!("{}:after", name));
                    response
                }
            })
        }
    }

    struct Deny;

    impl Middleware for Deny {
        fn name(&self) -> &'static str {
            "deny"
        }

        fn wrap(&self, _next: Handler) -> Handler {
            Handler::new(|_req| async { StatusCode::FORBIDDEN.into_response() })
        }
    }

    fn must_not_run() -> Response {
        panic!("handler must not run")
    }

    fn request() -> Request<Body> {
        Request::builder().uri("/t").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_registration_order_is_nesting_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new()
            .with(Trace { name: "a", log: log.clone() })
            .with(Trace { name: "b", log: log.clone() });

        let inner_log = log.clone();
        let handler = chain.compose(Handler::new(move |_req| {
            let log = inner_log.clone();
            async move {
                log.lock().unwrap().push("handler".to_string());
                StatusCode::OK.into_response()
            }
        }));

        let response = handler.call(request()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:before", "b:before", "handler", "b:after", "a:after"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new()
            .with(Trace { name: "outer", log: log.clone() })
            .with(Deny);

        let handler = chain.compose(Handler::new(|_req| async { must_not_run() }));

        let response = handler.call(request()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(*log.lock().unwrap(), vec!["outer:before", "outer:after"]);
    }

    #[tokio::test]
    async fn test_empty_chain_is_identity() {
        let chain = MiddlewareChain::new();
        assert!(chain.is_empty());
        let handler = chain.compose(Handler::new(|_req| async { StatusCode::ACCEPTED.into_response() }));
        assert_eq!(handler.call(request()).await.status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn test_names_follow_registration() {
        let mut chain = MiddlewareChain::new();
        chain.register(Deny);
        chain.register(Timing);
        assert_eq!(chain.names(), vec!["deny", "timing"]);
        assert_eq!(chain.len(), 2);
    }
}
