//! HTTP transport using server-sent events.
//!
//! `GET /sse` opens an event stream. Its first event, `endpoint`, carries
//! the URL the client posts JSON-RPC messages to
//! (`{base_url}/message?sessionId=...`). Responses are delivered on the
//! stream as `message` events; the POST itself only answers `202 Accepted`.
//! Each open stream is one connection with its own in-flight calls, and
//! closing the stream ends the session.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{McpError, Result};
use crate::server::{Connection, McpServer};

/// Path of the event stream.
pub const SSE_PATH: &str = "/sse";
/// Path clients post messages to.
pub const MESSAGE_PATH: &str = "/message";

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
const RESPONSE_BUFFER: usize = 64;

type Sessions = Arc<Mutex<HashMap<String, Connection>>>;

#[derive(Clone)]
struct SseState {
    server: Arc<McpServer>,
    base_url: String,
    sessions: Sessions,
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// Removes its session when the event stream is dropped.
struct SessionGuard {
    id: String,
    sessions: Sessions,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(&self.id);
        }
        tracing::debug!(session = %self.id, "SSE client disconnected");
    }
}

/// Router serving the SSE transport for `server`.
///
/// `base_url` prefixes the message endpoint announced to clients, e.g.
/// `http://localhost:8080`. An empty base URL announces a relative path.
pub fn sse_router(server: Arc<McpServer>, base_url: &str) -> Router {
    let state = SseState {
        server,
        base_url: base_url.trim_end_matches('/').to_string(),
        sessions: Arc::default(),
    };

    Router::new()
        .route(SSE_PATH, get(open_stream))
        .route(MESSAGE_PATH, post(post_message))
        .with_state(state)
}

/// Serve the SSE transport on `address` until the process stops.
pub async fn serve_sse(server: Arc<McpServer>, address: &str, base_url: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|e| McpError::Io(format!("failed to bind {}: {}", address, e)))?;
    tracing::info!(address, base_url, "SSE transport listening");

    axum::serve(listener, sse_router(server, base_url)).await?;
    Ok(())
}

async fn open_stream(
    State(state): State<SseState>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, StatusCode>
{
    let id = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);
    state
        .sessions
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .insert(id.clone(), Connection::new(tx));
    tracing::debug!(session = %id, "SSE client connected");

    let endpoint = format!("{}{}?sessionId={}", state.base_url, MESSAGE_PATH, id);
    let guard = SessionGuard {
        id,
        sessions: Arc::clone(&state.sessions),
    };

    let announce = stream::once(async move {
        Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint))
    });
    let responses = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let response = rx.recv().await?;
        let event = match serde_json::to_string(&response) {
            Ok(json) => Event::default().event("message").data(json),
            Err(e) => {
                tracing::error!(session = %guard.id, error = %e, "failed to encode response");
                Event::default().comment("dropped unencodable response")
            }
        };
        Some((Ok::<_, Infallible>(event), (rx, guard)))
    });

    Ok(Sse::new(announce.chain(responses))
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

async fn post_message(
    State(state): State<SseState>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> StatusCode {
    let conn = match state.sessions.lock() {
        Ok(sessions) => sessions.get(&query.session_id).cloned(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR,
    };
    let Some(conn) = conn else {
        tracing::debug!(session = %query.session_id, "message for unknown session");
        return StatusCode::NOT_FOUND;
    };

    if let Some(response) = state.server.handle_message(&body, &conn).await {
        if !conn.send(response).await {
            return StatusCode::GONE;
        }
    }
    StatusCode::ACCEPTED
}
