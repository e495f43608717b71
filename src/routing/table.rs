//! Route table.
//!
//! # Responsibilities
//! - Store installed routes keyed by (method kind, full path)
//! - Resolve an inbound request to a handler
//! - List installed routes for introspection
//!
//! # Design Decisions
//! - Read-mostly: one `RwLock`, readers clone the handler and release the
//!   lock before the handler runs
//! - Re-registration replaces the previous route with a warning
//! - Exact path match only

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use axum::http::Method;
use serde::Serialize;

use crate::http::middleware::{Handler, MethodKind};

/// Identity of a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub kind: MethodKind,
    pub path: String,
}

/// An installed route.
#[derive(Debug, Clone)]
pub struct Route {
    pub group: String,
    pub sub_path: String,
    pub kind: MethodKind,
    pub deprecated: bool,
    pub substitute: String,
    pub handler: Handler,
}

impl Route {
    pub fn full_path(&self) -> String {
        format!("{}{}", self.group, self.sub_path)
    }
}

/// Serializable description of an installed route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub method: MethodKind,
    pub path: String,
    pub group: String,
    pub deprecated: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub substitute: String,
}

#[derive(Debug)]
pub struct RouteTable {
    routes: RwLock<HashMap<RouteKey, Route>>,
}

impl RouteTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            routes: RwLock::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Install `route`, replacing any route with the same method and path.
    pub fn insert(&self, route: Route) {
        let key = RouteKey {
            kind: route.kind,
            path: route.full_path(),
        };
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        if routes.contains_key(&key) {
            tracing::warn!(
                method = %key.kind,
                path = %key.path,
                "Route already registered; replacing previous handler"
            );
        }
        routes.insert(key, route);
    }

    /// Find the handler for a request.
    ///
    /// An upgrade request prefers the WS route, GET prefers GET then WS,
    /// POST prefers POST. A path registered only under another kind still
    /// resolves, to that kind's handler, so its method filter can reject
    /// the request.
    pub fn resolve(&self, method: &Method, path: &str, is_upgrade: bool) -> Option<Handler> {
        let preferred: &[MethodKind] = if is_upgrade {
            &[MethodKind::Ws, MethodKind::Get]
        } else if *method == Method::GET {
            &[MethodKind::Get, MethodKind::Ws]
        } else if *method == Method::POST {
            &[MethodKind::Post]
        } else {
            &[]
        };

        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let lookup = |kind: MethodKind| {
            routes.get(&RouteKey {
                kind,
                path: path.to_string(),
            })
        };

        let handler = preferred
            .iter()
            .copied()
            .chain([MethodKind::Get, MethodKind::Post, MethodKind::Ws])
            .find_map(lookup)
            .map(|route| route.handler.clone());
        handler
    }

    /// Installed routes, sorted by path then method.
    pub fn routes(&self) -> Vec<RouteInfo> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let mut infos: Vec<_> = routes
            .iter()
            .map(|(key, route)| RouteInfo {
                method: key.kind,
                path: key.path.clone(),
                group: route.group.clone(),
                deprecated: route.deprecated,
                substitute: route.substitute.clone(),
            })
            .collect();
        infos.sort_by(|a, b| (&a.path, a.method).cmp(&(&b.path, b.method)));
        infos
    }

    pub fn len(&self) -> usize {
        self.routes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}
