//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;

use action_gateway::http::Envelope;
use action_gateway::{ActionRouter, HttpServer, ServerConfig, Shutdown};
use tokio::net::TcpListener;

/// A gateway serving on an ephemeral local port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gateway with the standard middleware chain and the groups added
/// by `register`.
pub async fn spawn_gateway<F>(config: ServerConfig, register: F) -> TestGateway
where
    F: FnOnce(&ActionRouter),
{
    let actions = ActionRouter::with_standard_chain(&config);
    register(&actions);
    actions.register_all().expect("action groups register");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let server = HttpServer::new(config, &actions);
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestGateway { addr, shutdown }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
}

/// Status and decoded envelope of a response.
pub async fn envelope(res: reqwest::Response) -> (u16, Envelope) {
    let status = res.status().as_u16();
    let envelope = res.json::<Envelope>().await.expect("envelope body");
    (status, envelope)
}
