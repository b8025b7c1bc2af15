//! HTTP+SSE transport for MCP server.
//!
//! - `GET <sse_path>` opens a session. The first event is `endpoint`, whose
//!   data is the URL to POST to: `<message_path>?session_id=<id>`
//! - `POST <message_path>?session_id=<id>` carries one JSON-RPC message and
//!   returns `202 Accepted`; the reply arrives as a `message` event
//! - Every session has its own [`McpServer`]; the FreeCAD client is shared
//! - A session lives as long as its event stream. When the client
//!   disconnects, the stream is dropped and the session goes with it

use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::Router;
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::config::{normalize_http_path, ServerConfig};
use crate::error::ConfigError;
use crate::freecad::FreeCadRpc;
use crate::mcp::server::McpServer;
use crate::mcp::transport::encode_line;

/// Events buffered per session before a POST waits for the client to read.
const SESSION_BUFFER: usize = 32;

/// Interval between keep-alive comments on idle streams.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// One open SSE connection.
struct Session {
    server: Arc<Mutex<McpServer>>,
    events: mpsc::Sender<Event>,
}

/// State shared by every request handler.
struct Shared {
    freecad: Arc<dyn FreeCadRpc>,
    only_text_feedback: bool,
    message_path: String,
    sessions: Mutex<HashMap<String, Session>>,
}

impl Shared {
    /// Drops every session, which ends their event streams.
    async fn close_all(&self) {
        let mut sessions = self.sessions.lock().await;
        for session in sessions.values() {
            session.server.lock().await.shut_down();
        }
        tracing::info!(count = sessions.len(), "Closing SSE sessions");
        sessions.clear();
    }
}

/// Removes its session from the map when the event stream is dropped.
struct SessionGuard {
    id: String,
    shared: Arc<Shared>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut sessions) = self.shared.sessions.try_lock() {
            if sessions.remove(&self.id).is_some() {
                tracing::info!(session = %self.id, "SSE stream closed, session removed");
            }
            return;
        }

        // The map is busy; finish the removal on the runtime
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let id = std::mem::take(&mut self.id);
        let shared = Arc::clone(&self.shared);
        runtime.spawn(async move {
            if shared.sessions.lock().await.remove(&id).is_some() {
                tracing::info!(session = %id, "SSE stream closed, session removed");
            }
        });
    }
}

/// A session's event stream, holding the guard that ends the session.
struct GuardedStream<S> {
    inner: S,
    _guard: SessionGuard,
}

impl<S: Stream + Unpin> Stream for GuardedStream<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// The HTTP+SSE MCP server.
pub struct SseServer {
    host: String,
    port: u16,
    sse_path: String,
    shared: Arc<Shared>,
}

impl SseServer {
    /// Creates the server from the `server` config section.
    ///
    /// # Errors
    ///
    /// Returns an error if either HTTP path is invalid or both are the same.
    pub fn new(
        config: &ServerConfig,
        freecad: Arc<dyn FreeCadRpc>,
        only_text_feedback: bool,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            sse_path: normalize_http_path(&config.sse_path)?,
            shared: Arc::new(Shared {
                freecad,
                only_text_feedback,
                message_path: normalize_http_path(&config.message_path)?,
                sessions: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// The normalised path clients open event streams on.
    #[must_use]
    pub fn sse_path(&self) -> &str {
        &self.sse_path
    }

    /// The normalised path clients POST messages to.
    #[must_use]
    pub fn message_path(&self) -> &str {
        &self.shared.message_path
    }

    /// Number of open sessions.
    pub async fn session_count(&self) -> usize {
        self.shared.sessions.lock().await.len()
    }

    /// Builds the axum router for both endpoints.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.sse_path, get(open_session))
            .route(&self.shared.message_path, post(post_message))
            .with_state(Arc::clone(&self.shared))
    }

    /// Binds the listener and serves until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or serving fails.
    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind((self.host.as_str(), self.port)).await?;
        tracing::info!(
            address = %listener.local_addr()?,
            sse_path = %self.sse_path,
            message_path = %self.shared.message_path,
            "SSE transport listening"
        );

        let shared = Arc::clone(&self.shared);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                shared.close_all().await;
            })
            .await
    }
}

/// `GET <sse_path>`: registers a session and streams its events.
async fn open_session(
    State(shared): State<Arc<Shared>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let id = uuid::Uuid::new_v4().simple().to_string();
    let (events, receiver) = mpsc::channel(SESSION_BUFFER);

    let server = McpServer::new(Arc::clone(&shared.freecad), shared.only_text_feedback);
    shared.sessions.lock().await.insert(
        id.clone(),
        Session {
            server: Arc::new(Mutex::new(server)),
            events,
        },
    );
    tracing::info!(session = %id, "SSE session opened");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{}?session_id={id}", shared.message_path));

    let guard = SessionGuard {
        id,
        shared: Arc::clone(&shared),
    };
    let stream = GuardedStream {
        inner: tokio_stream::once(endpoint).chain(ReceiverStream::new(receiver)),
        _guard: guard,
    }
    .map(Ok);

    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    session_id: Option<String>,
}

/// `POST <message_path>?session_id=<id>`: handles one message.
async fn post_message(
    State(shared): State<Arc<Shared>>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> (StatusCode, &'static str) {
    let Some(id) = query.session_id else {
        return (StatusCode::BAD_REQUEST, "session_id is required");
    };

    let (server, events) = {
        let sessions = shared.sessions.lock().await;
        let Some(session) = sessions.get(&id) else {
            tracing::debug!(session = %id, "Message for unknown session");
            return (StatusCode::NOT_FOUND, "Could not find session");
        };
        (Arc::clone(&session.server), session.events.clone())
    };

    let Some(reply) = server.lock().await.handle_line(&body).await else {
        return (StatusCode::ACCEPTED, "Accepted");
    };

    let data = match encode_line(&reply) {
        Ok(data) => data,
        Err(e) => {
            tracing::error!(session = %id, error = %e, "Failed to serialise reply");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to serialise reply");
        }
    };

    if events
        .send(Event::default().event("message").data(data))
        .await
        .is_err()
    {
        tracing::info!(session = %id, "SSE client went away, closing session");
        shared.sessions.lock().await.remove(&id);
        return (StatusCode::GONE, "Session closed");
    }

    (StatusCode::ACCEPTED, "Accepted")
}

/// Resolves on SIGINT or SIGTERM (Ctrl+C on Windows).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (Ok(mut sigint), Ok(mut sigterm)) = (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) else {
            tracing::error!("Failed to install signal handlers");
            return std::future::pending().await;
        };

        tokio::select! {
            _ = sigint.recv() => tracing::info!("Received SIGINT, initiating graceful shutdown"),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
        }
    }

    #[cfg(windows)]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            return std::future::pending().await;
        }
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::freecad::FreeCadConnection;

    fn freecad() -> Arc<dyn FreeCadRpc> {
        Arc::new(FreeCadConnection::new("127.0.0.1", 9, Duration::from_secs(1)).unwrap())
    }

    #[test]
    fn paths_are_normalised() {
        let config = ServerConfig {
            sse_path: " events ".to_string(),
            message_path: "rpc".to_string(),
            ..ServerConfig::default()
        };
        let server = SseServer::new(&config, freecad(), false).unwrap();
        assert_eq!(server.sse_path(), "/events");
        assert_eq!(server.message_path(), "/rpc");
    }

    #[test]
    fn identical_paths_rejected() {
        let config = ServerConfig {
            sse_path: "/mcp".to_string(),
            message_path: "mcp".to_string(),
            ..ServerConfig::default()
        };
        assert!(SseServer::new(&config, freecad(), false).is_err());
    }

    fn insert_session(server: &SseServer, id: &str) -> mpsc::Receiver<Event> {
        let (events, receiver) = mpsc::channel(1);
        server
            .shared
            .sessions
            .try_lock()
            .unwrap()
            .insert(
                id.to_string(),
                Session {
                    server: Arc::new(Mutex::new(McpServer::new(freecad(), false))),
                    events,
                },
            );
        receiver
    }

    #[tokio::test]
    async fn guard_removes_session_on_drop() {
        let server = SseServer::new(&ServerConfig::default(), freecad(), false).unwrap();
        let _receiver = insert_session(&server, "abc");

        drop(SessionGuard {
            id: "abc".to_string(),
            shared: Arc::clone(&server.shared),
        });
        assert_eq!(server.session_count().await, 0);
    }

    #[tokio::test]
    async fn guard_defers_removal_while_map_is_locked() {
        let server = SseServer::new(&ServerConfig::default(), freecad(), false).unwrap();
        let _receiver = insert_session(&server, "abc");

        {
            let _held = server.shared.sessions.lock().await;
            drop(SessionGuard {
                id: "abc".to_string(),
                shared: Arc::clone(&server.shared),
            });
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while server.session_count().await > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn post_after_stream_closed_is_gone() {
        let server = SseServer::new(&ServerConfig::default(), freecad(), false).unwrap();
        drop(insert_session(&server, "abc"));

        let (status, _) = post_message(
            State(Arc::clone(&server.shared)),
            Query(MessageQuery {
                session_id: Some("abc".to_string()),
            }),
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#.to_string(),
        )
        .await;

        assert_eq!(status, StatusCode::GONE);
        assert_eq!(server.session_count().await, 0);
    }

    #[tokio::test]
    async fn close_all_empties_sessions() {
        let server = SseServer::new(&ServerConfig::default(), freecad(), false).unwrap();
        let _receiver = insert_session(&server, "abc");
        assert_eq!(server.session_count().await, 1);

        server.shared.close_all().await;
        assert_eq!(server.session_count().await, 0);
    }
}
