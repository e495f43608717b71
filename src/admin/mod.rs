//! Admin introspection API.
//!
//! Served on its own listener, every route behind a bearer token.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{middleware, routing::get, Router};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::config::RunMode;
use crate::routing::{ActionRouter, GroupPolicies, RouteTable};
use crate::security::TrafficGuard;

/// Shared state of the admin router.
#[derive(Clone)]
pub struct AdminState {
    pub api_key: Arc<str>,
    pub run_mode: RunMode,
    pub started: Instant,
    pub table: Arc<RouteTable>,
    pub policies: Arc<GroupPolicies>,
    pub guard: Option<TrafficGuard>,
}

impl AdminState {
    pub fn new(api_key: &str, run_mode: RunMode, actions: &ActionRouter) -> Self {
        Self {
            api_key: Arc::from(api_key),
            run_mode,
            started: Instant::now(),
            table: actions.table(),
            policies: actions.policies(),
            guard: actions.guard(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .route("/admin/traffic", get(get_traffic))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
