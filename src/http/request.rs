//! Request handling for actions.
//!
//! # Responsibilities
//! - Resolve the client identifier used by logging and the traffic guard,
//!   trusting forwarded headers only from configured proxies
//! - Wrap the inbound request as an [`ActionPackage`] for handlers
//! - Decode bodies, form values and cookies
//!
//! # Design Decisions
//! - Large bodies are read through the shared buffer pool
//! - Cookies set by a handler are carried back through a shared header map
//!   and merged into the final response

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, Request},
    response::Response,
};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;

use crate::error::ActionError;
use crate::http::buffer::BufferPool;
use crate::http::response::Responder;

/// Client identifier resolved once per request at dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

/// Resolves the client behind a request.
///
/// `X-Forwarded-For` (first entry) and `X-Real-IP` are honoured only when
/// the socket peer is a trusted proxy; any other peer is keyed on its own
/// address.
#[derive(Debug, Clone, Default)]
pub struct ClientResolver {
    trusted_proxies: Arc<Vec<IpAddr>>,
}

impl ClientResolver {
    pub fn new(trusted_proxies: &[IpAddr]) -> Self {
        Self {
            trusted_proxies: Arc::new(trusted_proxies.to_vec()),
        }
    }

    pub fn resolve<B>(&self, req: &Request<B>) -> String {
        let Some(peer) = peer_ip(req) else {
            return "unknown".to_string();
        };
        if self.trusted_proxies.contains(&peer) {
            return forwarded_ip(req.headers()).unwrap_or(peer).to_string();
        }
        if forwarded_ip(req.headers()).is_some() {
            tracing::debug!(peer = %peer, "Ignoring forwarded headers from untrusted peer");
        }
        peer.to_string()
    }

    /// Tag `req` with its resolved [`ClientId`].
    pub fn tag<B>(&self, req: &mut Request<B>) {
        let client = self.resolve(req);
        req.extensions_mut().insert(ClientId(client));
    }
}

fn peer_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header_ip = |name: &str, first_only: bool| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| if first_only { v.split(',').next() } else { Some(v) })
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };
    header_ip("x-forwarded-for", true).or_else(|| header_ip("x-real-ip", false))
}

/// The client identifier of `req`: the [`ClientId`] tagged at dispatch,
/// otherwise the socket peer.
pub fn client_ip<B>(req: &Request<B>) -> String {
    if let Some(ClientId(client)) = req.extensions().get::<ClientId>() {
        return client.clone();
    }
    peer_ip(req)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Shared services every action package needs.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub responder: Responder,
    pub buffers: Arc<BufferPool>,
    pub max_body_size: usize,
}

/// The request as seen by an action handler.
#[derive(Debug)]
pub struct ActionPackage {
    parts: Parts,
    body: Option<Body>,
    client: String,
    context: ActionContext,
    response_headers: Arc<Mutex<HeaderMap>>,
}

impl ActionPackage {
    pub fn new(req: Request<Body>, context: ActionContext) -> Self {
        let client = client_ip(&req);
        let (parts, body) = req.into_parts();
        Self {
            parts,
            body: Some(body),
            client,
            context,
            response_headers: Arc::new(Mutex::new(HeaderMap::new())),
        }
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn client_ip(&self) -> &str {
        &self.client
    }

    /// Envelope helpers bound to the process run mode.
    pub fn responder(&self) -> &Responder {
        &self.context.responder
    }

    /// Query-string value for `key`; empty when absent.
    pub fn form_value(&self, key: &str) -> String {
        let value = self
            .parts
            .uri
            .query()
            .and_then(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.into_owned())
            })
            .unwrap_or_default();
        if value.is_empty() {
            tracing::warn!(
                key = %key,
                path = %self.path(),
                "Form value is empty; this may be invalid"
            );
        }
        value
    }

    /// Like [`form_value`](Self::form_value) but an empty value is an error.
    pub fn require_value(&self, key: &str) -> Result<String, ActionError> {
        let value = self.form_value(key);
        if value.is_empty() {
            return Err(ActionError::InvalidArgument(key.to_string()));
        }
        Ok(value)
    }

    fn take_body(&mut self) -> Result<Body, ActionError> {
        self.body
            .take()
            .ok_or_else(|| ActionError::Body("request body already consumed".to_string()))
    }

    /// Decode the JSON body through a pooled buffer. Suited to large bodies.
    pub async fn body_json<T: DeserializeOwned>(&mut self) -> Result<T, ActionError> {
        let body = self.take_body()?;
        let limit = self.context.max_body_size;
        let mut buf = self.context.buffers.checkout();

        let mut stream = body.into_data_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ActionError::Body(e.to_string()))?;
            if buf.len() + chunk.len() > limit {
                return Err(ActionError::ClientInput(format!(
                    "request body exceeds {} bytes",
                    limit
                )));
            }
            buf.extend_from_slice(&chunk);
        }

        Ok(serde_json::from_slice(&buf)?)
    }

    /// Decode a small JSON body (< 1 MB) without touching the pool.
    pub async fn body_json_small<T: DeserializeOwned>(&mut self) -> Result<T, ActionError> {
        let body = self.take_body()?;
        let bytes = axum::body::to_bytes(body, self.context.max_body_size)
            .await
            .map_err(|e| ActionError::Body(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Value of the request cookie `key`.
    pub fn cookie(&self, key: &str) -> Result<String, ActionError> {
        let found = self
            .parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.to_string());

        match found {
            Some(value) => {
                tracing::info!(key = %key, value = %value, "Cookie");
                Ok(value)
            }
            None => {
                tracing::error!(key = %key, "Cookie not found; it may be a proxy problem");
                Err(ActionError::NotFound(format!("cookie {}", key)))
            }
        }
    }

    /// Add a `Set-Cookie` header (e.g. `"sid=abc; Path=/; HttpOnly"`) to the response.
    pub fn set_cookie(&self, cookie: &str) -> Result<(), ActionError> {
        let value = HeaderValue::from_str(cookie)
            .map_err(|e| ActionError::Internal(format!("invalid cookie: {}", e)))?;
        self.response_headers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(header::SET_COOKIE, value);
        Ok(())
    }

    /// Handle to the headers the handler asked to add to its response.
    pub(crate) fn pending_headers(&self) -> PendingHeaders {
        PendingHeaders(Arc::clone(&self.response_headers))
    }
}

/// Headers queued by a handler, applied once its response exists.
#[derive(Debug, Clone)]
pub(crate) struct PendingHeaders(Arc<Mutex<HeaderMap>>);

impl PendingHeaders {
    pub(crate) fn apply(&self, response: &mut Response) {
        let queued = std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner));
        let mut current = None;
        for (name, value) in queued {
            if let Some(name) = name {
                current = Some(name);
            }
            if let Some(name) = &current {
                response.headers_mut().append(name.clone(), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunMode;
    use axum::response::IntoResponse;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Login {
        user: String,
        age: u32,
    }

    fn context() -> ActionContext {
        ActionContext {
            responder: Responder::new(RunMode::Development),
            buffers: BufferPool::new(8),
            max_body_size: 64,
        }
    }

    fn package(req: Request<Body>) -> ActionPackage {
        ActionPackage::new(req, context())
    }

    fn from_peer(peer: &str, forwarded_for: &str, real_ip: &str) -> Request<()> {
        let mut req = Request::builder()
            .header("x-forwarded-for", forwarded_for)
            .header("x-real-ip", real_ip)
            .body(())
            .unwrap();
        let addr: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    #[test]
    fn test_trusted_proxy_forwards_client() {
        let resolver = ClientResolver::new(&["10.0.0.1".parse().unwrap()]);
        let req = from_peer("10.0.0.1:4000", "203.0.113.9, 10.0.0.1", "198.51.100.2");
        assert_eq!(resolver.resolve(&req), "203.0.113.9");

        let req = from_peer("10.0.0.1:4000", "not-an-ip", "198.51.100.2");
        assert_eq!(resolver.resolve(&req), "198.51.100.2");

        let req = from_peer("10.0.0.1:4000", "", "");
        assert_eq!(resolver.resolve(&req), "10.0.0.1");
    }

    #[test]
    fn test_untrusted_peer_headers_ignored() {
        let resolver = ClientResolver::default();
        let req = from_peer("192.0.2.7:5555", "203.0.113.9", "198.51.100.2");
        assert_eq!(resolver.resolve(&req), "192.0.2.7");

        let resolver = ClientResolver::new(&["10.0.0.1".parse().unwrap()]);
        assert_eq!(resolver.resolve(&req), "192.0.2.7");
    }

    #[test]
    fn test_client_ip_reads_tag_then_peer() {
        let mut req = Request::builder()
            .header("x-forwarded-for", "203.0.113.9")
            .body(())
            .unwrap();
        assert_eq!(client_ip(&req), "unknown");

        let addr: SocketAddr = "192.0.2.7:5555".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_ip(&req), "192.0.2.7");

        ClientResolver::new(&[addr.ip()]).tag(&mut req);
        assert_eq!(client_ip(&req), "203.0.113.9");
    }

    #[test]
    fn test_form_value() {
        let pkg = package(
            Request::builder()
                .uri("/api/echo?a=hello%20world&b=2")
                .body(Body::empty())
                .unwrap(),
        );
        assert_eq!(pkg.form_value("a"), "hello world");
        assert_eq!(pkg.form_value("missing"), "");
        assert!(matches!(pkg.require_value("missing"), Err(ActionError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_body_json_returns_buffer() {
        let ctx = context();
        let pool = ctx.buffers.clone();
        let mut pkg = ActionPackage::new(
            Request::builder()
                .method(Method::POST)
                .body(Body::from(r#"{"user":"mami","age":15}"#))
                .unwrap(),
            ctx,
        );

        let login: Login = pkg.body_json().await.unwrap();
        assert_eq!(login, Login { user: "mami".into(), age: 15 });
        assert_eq!(pool.idle(), 1);

        // the body can be read only once
        assert!(matches!(pkg.body_json::<Login>().await, Err(ActionError::Body(_))));
    }

    #[tokio::test]
    async fn test_body_json_rejects_oversized_and_malformed() {
        let ctx = context();
        let pool = ctx.buffers.clone();
        let mut pkg = ActionPackage::new(
            Request::builder().body(Body::from("x".repeat(100))).unwrap(),
            ctx.clone(),
        );
        assert!(matches!(pkg.body_json::<Login>().await, Err(ActionError::ClientInput(_))));
        assert_eq!(pool.idle(), 1);

        let mut pkg = ActionPackage::new(Request::builder().body(Body::from("{oops")).unwrap(), ctx);
        assert!(matches!(pkg.body_json_small::<Login>().await, Err(ActionError::Json(_))));
    }

    #[test]
    fn test_cookie_lookup() {
        let pkg = package(
            Request::builder()
                .header(header::COOKIE, "theme=dark; sid=abc123")
                .body(Body::empty())
                .unwrap(),
        );
        assert_eq!(pkg.cookie("sid").unwrap(), "abc123");
        assert!(matches!(pkg.cookie("nope"), Err(ActionError::NotFound(_))));
    }

    #[test]
    fn test_set_cookie_reaches_response() {
        let pkg = package(Request::builder().body(Body::empty()).unwrap());
        pkg.set_cookie("sid=1; Path=/").unwrap();
        pkg.set_cookie("theme=dark").unwrap();
        let pending = pkg.pending_headers();

        let mut response = "ok".into_response();
        pending.apply(&mut response);
        let cookies: Vec<_> = response.headers().get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 2);
    }
}
