//! Action router.
//!
//! # Responsibilities
//! - Collect group registrants keyed by base path
//! - Install every group once at startup
//! - Own the route table and group policies shared with the server
//!
//! # Design Decisions
//! - Registration is two-phase: `add_group` only stores, `register_all`
//!   installs, so middleware can be configured in between
//! - The first failing registrant aborts startup; nothing is rolled back

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::ServerConfig;
use crate::error::RegisterError;
use crate::http::buffer::BufferPool;
use crate::http::middleware::{AccessLog, MiddlewareChain, Recovery, Timing};
use crate::http::request::ActionContext;
use crate::http::response::Responder;
use crate::routing::group::{check_path, ActionGroup, Installer};
use crate::routing::policy::GroupPolicies;
use crate::routing::table::{RouteInfo, RouteTable};
use crate::security::TrafficGuard;

/// Idle request-body buffers kept for reuse.
const POOLED_BUFFERS: usize = 64;

type Registrant = Box<dyn FnOnce(ActionGroup) -> Result<(), RegisterError> + Send>;

pub struct ActionRouter {
    registrants: Mutex<HashMap<String, Registrant>>,
    table: Arc<RouteTable>,
    policies: Arc<GroupPolicies>,
    chain: MiddlewareChain,
    context: ActionContext,
    guard: Option<TrafficGuard>,
}

impl ActionRouter {
    /// Router with an explicit middleware chain.
    pub fn new(config: &ServerConfig, chain: MiddlewareChain, policies: Arc<GroupPolicies>) -> Self {
        let responder = Responder::new(config.run_mode).with_log_limit(config.limits.log_data_limit);
        tracing::info!(
            capacity = config.routes.initial_capacity,
            middleware = ?chain,
            "Action router created"
        );
        Self {
            registrants: Mutex::new(HashMap::new()),
            table: Arc::new(RouteTable::with_capacity(config.routes.initial_capacity)),
            policies,
            chain,
            context: ActionContext {
                responder,
                buffers: BufferPool::new(POOLED_BUFFERS),
                max_body_size: config.limits.max_body_size,
            },
            guard: None,
        }
    }

    /// Router with the standard chain: timing, recovery, traffic guard,
    /// access log.
    pub fn with_standard_chain(config: &ServerConfig) -> Self {
        let responder = Responder::new(config.run_mode).with_log_limit(config.limits.log_data_limit);
        let policies = Arc::new(GroupPolicies::new(config.traffic.default_freq));
        let guard = TrafficGuard::from_config(&config.traffic, policies.clone(), responder);

        let chain = MiddlewareChain::new()
            .with(Timing)
            .with(Recovery::new(responder))
            .with(guard.clone())
            .with(AccessLog);

        let mut router = Self::new(config, chain, policies);
        router.guard = Some(guard);
        router
    }

    /// Store `registrant` for `base_path`. A second registrant for the same
    /// path replaces the first.
    pub fn add_group<F>(&self, base_path: &str, registrant: F)
    where
        F: FnOnce(ActionGroup) -> Result<(), RegisterError> + Send + 'static,
    {
        check_path(base_path);
        let mut registrants = self.registrants.lock().unwrap_or_else(PoisonError::into_inner);
        if registrants.contains_key(base_path) {
            tracing::warn!(group = %base_path, "Action group already exists; replaced");
        }
        registrants.insert(base_path.to_string(), Box::new(registrant));
    }

    /// Run every stored registrant once. Stops at the first failure.
    pub fn register_all(&self) -> Result<(), RegisterError> {
        let pending: Vec<_> = self
            .registrants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        let installer = Arc::new(Installer {
            table: self.table.clone(),
            policies: self.policies.clone(),
            chain: self.chain.clone(),
            context: self.context.clone(),
        });

        for (path, registrant) in pending {
            let group = ActionGroup::new(path.clone(), installer.clone());
            if let Err(e) = registrant(group) {
                tracing::error!(group = %path, error = %e, "Action group failed to register");
                return Err(RegisterError::Group {
                    group: path,
                    source: Box::new(e),
                });
            }
        }

        tracing::info!(routes = self.table.len(), "Actions registered");
        Ok(())
    }

    pub fn routes(&self) -> Vec<RouteInfo> {
        self.table.routes()
    }

    pub fn table(&self) -> Arc<RouteTable> {
        self.table.clone()
    }

    pub fn policies(&self) -> Arc<GroupPolicies> {
        self.policies.clone()
    }

    /// The traffic guard of the standard chain, if this router uses it.
    pub fn guard(&self) -> Option<TrafficGuard> {
        self.guard.clone()
    }

    pub fn responder(&self) -> Responder {
        self.context.responder
    }
}
