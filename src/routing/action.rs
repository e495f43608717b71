//! Action handler shapes and their adapters to [`Handler`].
//!
//! | Kind          | Handler returns              | Written as                  |
//! |---------------|------------------------------|-----------------------------|
//! | envelope      | `Result<Reply, ActionError>` | `{ErrCod, Desc, Data}` JSON |
//! | data only     | `Result<Reply, ActionError>` | `Data` text, status 200     |
//! | content       | `Result<Response, ActionError>` | the response as built    |
//! | websocket     | `Result<(), ActionError>`    | upgraded session            |

use std::future::Future;
use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response};

use crate::error::ActionError;
use crate::http::middleware::Handler;
use crate::http::request::{ActionContext, ActionPackage};
use crate::http::response::{Envelope, Reply, Responder};
use crate::http::websocket::WsSession;

pub type ActionResult = Result<Reply, ActionError>;

/// Handler producing an envelope.
pub trait Action: Send + Sync + 'static {
    type Future: Future<Output = ActionResult> + Send + 'static;

    fn invoke(&self, pkg: ActionPackage) -> Self::Future;
}

impl<F, Fut> Action for F
where
    F: Fn(ActionPackage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActionResult> + Send + 'static,
{
    type Future = Fut;

    fn invoke(&self, pkg: ActionPackage) -> Fut {
        self(pkg)
    }
}

/// Handler building its own response (binary payloads, files).
pub trait ContentAction: Send + Sync + 'static {
    type Future: Future<Output = Result<Response, ActionError>> + Send + 'static;

    fn invoke(&self, pkg: ActionPackage) -> Self::Future;
}

impl<F, Fut> ContentAction for F
where
    F: Fn(ActionPackage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, ActionError>> + Send + 'static,
{
    type Future = Fut;

    fn invoke(&self, pkg: ActionPackage) -> Fut {
        self(pkg)
    }
}

/// Handler driving an upgraded WebSocket session.
pub trait WsAction: Send + Sync + 'static {
    type Future: Future<Output = Result<(), ActionError>> + Send + 'static;

    fn invoke(&self, pkg: ActionPackage, session: WsSession) -> Self::Future;
}

impl<F, Fut> WsAction for F
where
    F: Fn(ActionPackage, WsSession) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
{
    type Future = Fut;

    fn invoke(&self, pkg: ActionPackage, session: WsSession) -> Fut {
        self(pkg, session)
    }
}

/// Run `action` and turn an error into its envelope reply.
async fn run_action<A: Action>(action: &A, pkg: ActionPackage, responder: &Responder) -> Reply {
    let path = pkg.path().to_string();
    match action.invoke(pkg).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Action failed");
            e.into_reply(responder)
        }
    }
}

pub(crate) fn envelope_handler<A: Action>(action: A, context: ActionContext) -> Handler {
    let action = Arc::new(action);
    Handler::new(move |req: Request<Body>| {
        let action = action.clone();
        let context = context.clone();
        async move {
            let path = req.uri().path().to_string();
            let responder = context.responder;
            let pkg = ActionPackage::new(req, context);
            let pending = pkg.pending_headers();

            let reply = run_action(action.as_ref(), pkg, &responder).await;
            let mut response = responder.write(&reply, &path);
            pending.apply(&mut response);
            response
        }
    })
}

pub(crate) fn data_only_handler<A: Action>(action: A, context: ActionContext) -> Handler {
    let action = Arc::new(action);
    Handler::new(move |req: Request<Body>| {
        let action = action.clone();
        let context = context.clone();
        async move {
            let path = req.uri().path().to_string();
            let responder = context.responder;
            let pkg = ActionPackage::new(req, context);
            let pending = pkg.pending_headers();

            let reply = run_action(action.as_ref(), pkg, &responder).await;
            let mut response = responder.write_data_only(&reply, &path);
            pending.apply(&mut response);
            response
        }
    })
}

pub(crate) fn content_handler<C: ContentAction>(action: C, context: ActionContext) -> Handler {
    let action = Arc::new(action);
    Handler::new(move |req: Request<Body>| {
        let action = action.clone();
        let context = context.clone();
        async move {
            let path = req.uri().path().to_string();
            let responder = context.responder;
            let pkg = ActionPackage::new(req, context);
            let pending = pkg.pending_headers();

            let mut response = match action.invoke(pkg).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(path = %path, error = %e, "Content action failed");
                    responder.write(&e.into_reply(&responder), &path)
                }
            };
            pending.apply(&mut response);
            response
        }
    })
}

/// Fixed responder installed in place of a deprecated route.
pub(crate) fn deprecated_handler(substitute: String, responder: Responder) -> Handler {
    Handler::new(move |req: Request<Body>| {
        let substitute = substitute.clone();
        async move {
            let path = req.uri().path().to_string();
            let reply = Reply::new(Envelope::deprecated(&substitute), axum::http::StatusCode::OK);
            responder.write(&reply, &path)
        }
    })
}
