//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router dispatching into the action route table
//! - Wire up tower-http layers (request ID, tracing, body limit)
//! - Serve with client connect info and graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::http::request::ClientResolver;
use crate::http::response::{ErrCode, Responder};
use crate::routing::{ActionRouter, RouteTable};

/// State of the dispatching fallback.
#[derive(Clone)]
pub struct DispatchState {
    pub table: Arc<RouteTable>,
    pub responder: Responder,
    pub clients: ClientResolver,
}

/// HTTP server for registered actions.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    /// Create a server over the routes installed in `actions`.
    pub fn new(config: ServerConfig, actions: &ActionRouter) -> Self {
        let state = DispatchState {
            table: actions.table(),
            responder: actions.responder(),
            clients: ClientResolver::new(&config.traffic.trusted_proxies),
        };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ServerConfig, state: DispatchState) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_size))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The assembled router, for serving elsewhere or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            mode = ?self.config.run_mode,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Tag the client, then resolve the request against the route table.
/// Unregistered paths get a 404 envelope without passing the middleware chain.
async fn dispatch(State(state): State<DispatchState>, mut req: Request<Body>) -> Response {
    state.clients.tag(&mut req);

    let is_upgrade = req
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));

    match state.table.resolve(req.method(), req.uri().path(), is_upgrade) {
        Some(handler) => handler.call(req).await,
        None => {
            let path = req.uri().path().to_string();
            tracing::warn!(method = %req.method(), path = %path, "No action matched");
            let reply = state
                .responder
                .make_404(format!("no action registered for {}", path), ErrCode::NotFound);
            state.responder.write(&reply, &path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::ActionPackage;
    use crate::http::response::Envelope;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn server() -> HttpServer {
        let config = ServerConfig::default();
        let actions = ActionRouter::with_standard_chain(&config);
        actions.add_group("/api", |g| {
            g.get("/echo", |pkg: ActionPackage| async move {
                Ok(pkg.responder().ok_with_data(pkg.form_value("a")))
            });
            Ok(())
        });
        actions.register_all().unwrap();
        HttpServer::new(config, &actions)
    }

    async fn envelope_of(response: Response) -> Envelope {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_dispatches_to_action() {
        let response = server()
            .router()
            .oneshot(Request::builder().uri("/api/echo?a=hey").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(envelope_of(response).await.data, "hey");
    }

    #[tokio::test]
    async fn test_unknown_path_is_404_envelope() {
        let response = server()
            .router()
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(envelope_of(response).await.err_cod, ErrCode::NotFound.as_str());
    }

    #[tokio::test]
    async fn test_dispatch_tags_peer_not_forwarded_header() {
        let config = ServerConfig::default();
        let actions = ActionRouter::with_standard_chain(&config);
        actions.add_group("/api", |g| {
            g.get("/whoami", |pkg: ActionPackage| async move {
                Ok(pkg.responder().ok_with_data(pkg.client_ip()))
            });
            Ok(())
        });
        actions.register_all().unwrap();
        let router = HttpServer::new(config, &actions).router();

        let mut req = Request::builder()
            .uri("/api/whoami")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(axum::extract::ConnectInfo(SocketAddr::from(([192, 0, 2, 7], 5555))));

        let response = router.oneshot(req).await.unwrap();
        assert_eq!(envelope_of(response).await.data, "192.0.2.7");
    }

    #[tokio::test]
    async fn test_wrong_method_is_400() {
        let response = server()
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/echo")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(envelope_of(response).await.err_cod, ErrCode::InvalidArgument.as_str());
    }
}
