//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, body limit, dispatch)
//!     → middleware/ (timing, recovery, traffic guard, access log, method)
//!     → request.rs (ActionPackage handed to the action)
//!     → response.rs (envelope written back)
//!
//! Upgrade: websocket
//!     → websocket.rs (session adapter)
//! ```

pub mod buffer;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::{client_ip, ActionContext, ActionPackage, ClientId, ClientResolver};
pub use response::{content_type_for, Envelope, ErrCode, Reply, Responder, INTERNAL_ERROR_DESC};
pub use server::HttpServer;
pub use websocket::WsSession;
