//! HTTP + WebSocket surface of the relay.
//!
//! `GET /` does double duty the way a browser expects from `ws://host:8080`:
//! requests carrying upgrade headers become WebSocket connections registered
//! in the [`ConnectionSet`], plain requests get the client page.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, trace};

use super::registry::ConnectionSet;

const INDEX_HTML: &str = include_str!("../../assets/index.html");
const PAGE_SCRIPT: &str = include_str!("../../assets/stock_level.js");
const ALARM_SOUND: &[u8] = include_bytes!("../../assets/alarm.wav");

/// How long a peer gets to answer our Close frame before the socket is dropped.
pub const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct AppState {
    pub connections: Arc<ConnectionSet>,
    pub topic: String,
    pub broker: String,
    pub threshold: f64,
}

#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub connections: usize,
    pub topic: String,
    pub broker: String,
    pub threshold: f64,
}

pub fn router(state: AppState, assets_dir: &Path) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/stock_level.js", get(page_script))
        .route("/alarm.wav", get(alarm_sound))
        .route("/status", get(status))
        .fallback_service(ServeDir::new(assets_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root(State(state): State<AppState>, ws: Option<WebSocketUpgrade>) -> Response {
    match ws {
        Some(ws) => ws
            .on_upgrade(move |socket| handle_socket(socket, state.connections))
            .into_response(),
        None => Html(INDEX_HTML).into_response(),
    }
}

async fn page_script() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/javascript; charset=utf-8")], PAGE_SCRIPT)
}

async fn alarm_sound() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "audio/wav")], ALARM_SOUND)
}

async fn status(State(state): State<AppState>) -> Json<StatusBody> {
    Json(StatusBody {
        connections: state.connections.len(),
        topic: state.topic.clone(),
        broker: state.broker.clone(),
        threshold: state.threshold,
    })
}

/// Drive one upgraded connection until either side goes away.
///
/// A sender task forwards broadcast frames from the registry channel to the
/// sink; inbound frames are read only to notice Close or errors. When the
/// sender stops first (we sent Close, or the sink failed) the peer gets
/// [`CLOSE_HANDSHAKE_TIMEOUT`] to answer before the socket is dropped.
async fn handle_socket(socket: WebSocket, connections: Arc<ConnectionSet>) {
    let (conn_id, mut rx) = connections.add();
    info!(conn_id, total = connections.len(), "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                debug!(conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let peer_closed = tokio::select! {
        _ = read_until_closed(&mut stream, conn_id) => true,
        _ = &mut send_task => false,
    };
    if !peer_closed
        && tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, read_until_closed(&mut stream, conn_id))
            .await
            .is_err()
    {
        debug!(conn_id, "Peer did not answer Close, dropping socket");
    }

    connections.remove(conn_id);
    send_task.abort();
    info!(conn_id, total = connections.len(), "WebSocket disconnected");
}

async fn read_until_closed(stream: &mut SplitStream<WebSocket>, conn_id: u64) {
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => trace!(conn_id, "Ignoring inbound frame"),
            Err(e) => {
                debug!(conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }
}
