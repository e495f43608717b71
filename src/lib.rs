//! Action gateway library: route registration, middleware chain, traffic
//! guard, response envelopes and WebSocket sessions on top of Axum.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::ServerConfig;
pub use error::{ActionError, RegisterError, SessionError};
pub use http::{ActionPackage, HttpServer, Reply, Responder, WsSession};
pub use lifecycle::Shutdown;
pub use routing::{ActionGroup, ActionResult, ActionRouter};
