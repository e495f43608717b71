//! WebSocket session adapter.
//!
//! # Data Flow
//! ```text
//! GET + Upgrade: websocket
//!     → negotiate (failure: log, reply with the rejection, never open)
//!     → open: handler(ActionPackage, WsSession) in its own task
//!     → closed: close frame sent and socket released, on every exit path
//! ```
//!
//! # Design Decisions
//! - The session is shared between the handler and the adapter so the
//!   adapter can close it after the handler returns or panics
//! - Sink and stream halves are locked separately; a pending read never
//!   holds up a write from another task
//! - A close frame or end of stream surfaces as `SessionError::Disconnected`
//! - Ping/pong frames are answered by the transport and skipped by reads

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        FromRequestParts,
    },
    http::Request,
    response::IntoResponse,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    FutureExt, SinkExt, StreamExt,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::SessionError;
use crate::http::middleware::recovery::panic_message;
use crate::http::middleware::Handler;
use crate::http::request::{ActionContext, ActionPackage};
use crate::observability::metrics;
use crate::routing::action::WsAction;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

/// Handle to an open WebSocket connection. Clones share the connection.
#[derive(Clone)]
pub struct WsSession {
    id: Uuid,
    sink: Arc<Mutex<Option<WsSink>>>,
    stream: Arc<Mutex<Option<WsStream>>>,
}

impl WsSession {
    pub fn new(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        Self {
            id: Uuid::new_v4(),
            sink: Arc::new(Mutex::new(Some(sink))),
            stream: Arc::new(Mutex::new(Some(stream))),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn is_open(&self) -> bool {
        self.sink.lock().await.is_some()
    }

    /// Next data frame. Ping and pong frames are skipped.
    async fn next_message(&self) -> Result<Message, SessionError> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(SessionError::Closed)?;
        loop {
            match stream.next().await {
                None => return Err(SessionError::Disconnected),
                Some(Err(e)) => return Err(SessionError::Read(e)),
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(session = %self.id, frame = ?frame, "WS closed by peer");
                    return Err(SessionError::Disconnected);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(message)) => return Ok(message),
            }
        }
    }

    /// Read one frame and decode it as JSON.
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, SessionError> {
        match self.next_message().await? {
            Message::Binary(bytes) => {
                tracing::warn!(session = %self.id, "WS: reading binary message but decoding it as json");
                serde_json::from_slice(&bytes).map_err(SessionError::Decode)
            }
            Message::Text(text) => serde_json::from_str(text.as_str()).map_err(SessionError::Decode),
            _ => Err(SessionError::Disconnected),
        }
    }

    /// Read one frame as text. Binary frames are converted lossily.
    pub async fn read_text(&self) -> Result<String, SessionError> {
        match self.next_message().await? {
            Message::Binary(bytes) => {
                tracing::warn!(session = %self.id, "WS: reading binary message but stringifying it");
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            Message::Text(text) => Ok(text.as_str().to_owned()),
            _ => Err(SessionError::Disconnected),
        }
    }

    /// Read one frame as raw bytes.
    pub async fn read_binary(&self) -> Result<Vec<u8>, SessionError> {
        match self.next_message().await? {
            Message::Binary(bytes) => Ok(bytes.to_vec()),
            Message::Text(text) => Ok(text.as_str().as_bytes().to_vec()),
            _ => Err(SessionError::Disconnected),
        }
    }

    async fn send(&self, message: Message) -> Result<(), SessionError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(SessionError::Closed)?;
        sink.send(message).await.map_err(SessionError::Write)
    }

    /// Send `value` as a JSON text frame.
    pub async fn write_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), SessionError> {
        let text = serde_json::to_string(value).map_err(SessionError::Encode)?;
        self.send(Message::Text(text.into())).await
    }

    pub async fn write_text(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(Message::Text(text.into().into())).await
    }

    pub async fn write_binary(&self, bytes: impl Into<Vec<u8>>) -> Result<(), SessionError> {
        self.send(Message::Binary(bytes.into().into())).await
    }

    /// Send a normal close frame and release the socket. Idempotent.
    ///
    /// A read still pending in another task keeps the stream half until the
    /// peer answers the close or the connection ends.
    pub async fn close(&self) {
        let Some(mut sink) = self.sink.lock().await.take() else {
            return;
        };
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        };
        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
            tracing::debug!(session = %self.id, error = %e, "WS close frame not delivered");
        }
        if let Ok(mut stream) = self.stream.try_lock() {
            stream.take();
        }
    }
}

impl fmt::Debug for WsSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsSession").field("id", &self.id).finish()
    }
}

/// Adapt a WebSocket action into a route handler.
pub(crate) fn upgrade_handler<W: WsAction>(action: W, context: ActionContext) -> Handler {
    let action = Arc::new(action);
    Handler::new(move |req: Request<Body>| {
        let action = action.clone();
        let context = context.clone();
        async move {
            let path = req.uri().path().to_string();
            tracing::info!(path = %path, "WS: start upgrade");

            let (mut parts, body) = req.into_parts();
            let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
                Ok(upgrade) => upgrade,
                Err(rejection) => {
                    tracing::error!(path = %path, error = %rejection, "WS upgrade rejected");
                    return rejection.into_response();
                }
            };
            let pkg = ActionPackage::new(Request::from_parts(parts, body), context);

            let failed_path = path.clone();
            upgrade
                .on_failed_upgrade(move |e| {
                    tracing::error!(path = %failed_path, error = %e, "WS upgrade failed");
                })
                .on_upgrade(move |socket| async move {
                    let session = WsSession::new(socket);
                    tracing::info!(path = %path, session = %session.id(), "WS open");

                    let outcome = AssertUnwindSafe(action.invoke(pkg, session.clone()))
                        .catch_unwind()
                        .await;
                    match outcome {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::error!(path = %path, session = %session.id(), error = %e, "WS handler failed");
                        }
                        Err(payload) => {
                            tracing::error!(
                                path = %path,
                                session = %session.id(),
                                panic = %panic_message(payload.as_ref()),
                                "WS handler panicked"
                            );
                            metrics::record_panic(&path);
                        }
                    }

                    session.close().await;
                    tracing::info!(path = %path, session = %session.id(), "WS closed");
                })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunMode;
    use crate::error::ActionError;
    use crate::http::buffer::BufferPool;
    use crate::http::response::Responder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context() -> ActionContext {
        ActionContext {
            responder: Responder::new(RunMode::Development),
            buffers: BufferPool::new(2),
            max_body_size: 1024,
        }
    }

    #[tokio::test]
    async fn test_plain_request_is_rejected_without_opening() {
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = opened.clone();
        let handler = upgrade_handler(
            move |_pkg: ActionPackage, _session: WsSession| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<(), ActionError>(()) }
            },
            context(),
        );

        let req = Request::builder().uri("/api/chat/ws").body(Body::empty()).unwrap();
        let response = handler.call(req).await;
        assert!(response.status().is_client_error());
        assert_eq!(opened.load(Ordering::SeqCst), 0);
    }
}
