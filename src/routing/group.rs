//! Action groups.
//!
//! An [`ActionGroup`] is a path prefix sharing a deprecation flag and a
//! request frequency. Every route it installs passes the middleware chain,
//! then the route's method filter, then the handler.

use std::future::Future;
use std::sync::Arc;

use axum::response::Response;

use crate::error::ActionError;
use crate::http::middleware::{Handler, Middleware, MethodFilter, MethodKind, MiddlewareChain};
use crate::http::request::{ActionContext, ActionPackage};
use crate::http::websocket::{upgrade_handler, WsSession};
use crate::routing::action::{
    content_handler, data_only_handler, deprecated_handler, envelope_handler, ActionResult,
};
use crate::routing::policy::{GroupPolicies, GroupPolicy};
use crate::routing::table::{Route, RouteTable};

/// Services a group installs into.
#[derive(Debug)]
pub(crate) struct Installer {
    pub table: Arc<RouteTable>,
    pub policies: Arc<GroupPolicies>,
    pub chain: MiddlewareChain,
    pub context: ActionContext,
}

/// A path prefix whose routes share deprecation and frequency policy.
///
/// Modifiers return a new group, so a policy applies to the routes
/// installed through the returned value:
///
/// ```ignore
/// router.add_group("/v1", |g| {
///     g.clone().deprecated("/v2").get("/echo", echo);
///     g.set_freq(5.0).post("/upload", upload);
///     Ok(())
/// });
/// ```
#[derive(Debug, Clone)]
pub struct ActionGroup {
    path: String,
    freq: f64,
    deprecated: bool,
    substitute: String,
    installer: Arc<Installer>,
}

impl ActionGroup {
    pub(crate) fn new(path: impl Into<String>, installer: Arc<Installer>) -> Self {
        Self {
            path: path.into(),
            freq: 0.0,
            deprecated: false,
            substitute: String::new(),
            installer,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn freq(&self) -> f64 {
        self.freq
    }

    /// Mark every route installed through the returned group deprecated in
    /// favour of `substitute`.
    pub fn deprecated(mut self, substitute: impl Into<String>) -> Self {
        self.deprecated = true;
        self.substitute = substitute.into();
        tracing::warn!(
            group = %self.path,
            substitute = %self.substitute,
            "API below was deprecated"
        );
        self
    }

    /// Requests per second allowed per client on each route of the group.
    /// Non-positive values fall back to the default.
    pub fn set_freq(mut self, freq_per_sec: f64) -> Self {
        self.freq = freq_per_sec;
        self
    }

    /// Record the group's policy for `sub_path` and, when the group is
    /// deprecated, install the redirect responder in place of the route.
    pub fn is_deprecated(&self, kind: MethodKind, sub_path: &str) -> bool {
        let full_path = format!("{}{}", self.path, sub_path);
        self.installer.policies.activate(
            GroupPolicy {
                path: self.path.clone(),
                freq: self.freq,
                deprecated: self.deprecated,
                substitute: self.substitute.clone(),
            },
            &full_path,
        );
        tracing::debug!(path = %full_path, freq = self.installer.policies.frequency_for(&full_path), "Freq");

        if !self.deprecated {
            return false;
        }
        tracing::warn!(method = %kind, path = %full_path, "Route was deprecated");
        let responder = self.installer.context.responder;
        self.install(
            kind,
            sub_path,
            deprecated_handler(self.substitute.clone(), responder),
        );
        true
    }

    /// Install a GET route answering with an envelope.
    pub fn get<F, Fut>(&self, sub_path: &str, handler: F)
    where
        F: Fn(ActionPackage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        self.add(MethodKind::Get, sub_path, |ctx| envelope_handler(handler, ctx));
    }

    /// Install a POST route answering with an envelope.
    pub fn post<F, Fut>(&self, sub_path: &str, handler: F)
    where
        F: Fn(ActionPackage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        self.add(MethodKind::Post, sub_path, |ctx| envelope_handler(handler, ctx));
    }

    /// Install a WebSocket route. Conventionally `sub_path` ends in `/ws`.
    pub fn ws<F, Fut>(&self, sub_path: &str, handler: F)
    where
        F: Fn(ActionPackage, WsSession) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
    {
        if !sub_path.ends_with("/ws") {
            tracing::warn!(
                path = %format!("{}{}", self.path, sub_path),
                "WebSocket route does not end with /ws"
            );
        }
        self.add(MethodKind::Ws, sub_path, |ctx| upgrade_handler(handler, ctx));
    }

    /// Install a GET route writing only the reply's `Data`.
    pub fn get_data_only<F, Fut>(&self, sub_path: &str, handler: F)
    where
        F: Fn(ActionPackage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        self.add(MethodKind::Get, sub_path, |ctx| data_only_handler(handler, ctx));
    }

    /// Install a GET route whose handler builds the response itself.
    pub fn get_content<F, Fut>(&self, sub_path: &str, handler: F)
    where
        F: Fn(ActionPackage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, ActionError>> + Send + 'static,
    {
        self.add(MethodKind::Get, sub_path, |ctx| content_handler(handler, ctx));
    }

    /// Install a POST route whose handler builds the response itself.
    pub fn post_content<F, Fut>(&self, sub_path: &str, handler: F)
    where
        F: Fn(ActionPackage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, ActionError>> + Send + 'static,
    {
        self.add(MethodKind::Post, sub_path, |ctx| content_handler(handler, ctx));
    }

    fn add(&self, kind: MethodKind, sub_path: &str, build: impl FnOnce(ActionContext) -> Handler) {
        check_path(sub_path);
        if self.is_deprecated(kind, sub_path) {
            return;
        }
        tracing::info!(method = %kind, path = %format!("{}{}", self.path, sub_path), "[action]");
        let base = build(self.installer.context.clone());
        self.install(kind, sub_path, base);
    }

    fn install(&self, kind: MethodKind, sub_path: &str, base: Handler) {
        let filtered = MethodFilter::new(kind, self.installer.context.responder).wrap(base);
        self.installer.table.insert(Route {
            group: self.path.clone(),
            sub_path: sub_path.to_string(),
            kind,
            deprecated: self.deprecated,
            substitute: self.substitute.clone(),
            handler: self.installer.chain.compose(filtered),
        });
    }
}

/// Paths are empty or start with `/` and do not end with `/`.
/// Violations are only warned about.
pub fn check_path(path: &str) -> bool {
    let ok = path.is_empty() || (path.starts_with('/') && !path.ends_with('/'));
    if !ok {
        tracing::warn!(path = %path, "url may not be correct; is it the expected url path?");
    }
    ok
}
