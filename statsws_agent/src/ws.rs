//! WebSocket upgrade and per-connection pump.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::net::SocketAddr;
use tracing::{debug, info, trace, warn};

use crate::registry::{Registry, Subscription};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

pub async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> Response {
    info!("[ {addr} ]\t{method} {uri}");
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, addr, state)),
        Err(e) => {
            warn!("[ {addr} ]\tupgrade failed: {e}");
            (StatusCode::BAD_REQUEST, "Could not open websocket connection").into_response()
        }
    }
}

async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: AppState) {
    let sub = match state.registry.connect(addr.to_string()) {
        Ok(sub) => sub,
        Err(e) => {
            warn!("[ {addr} ]\tcould not register: {e}");
            return;
        }
    };
    let (sink, stream) = socket.split();
    serve_observer(&state.registry, sub, sink, stream).await;
}

/// Drive one observer until either side ends: the writer drains the observer's
/// queue onto the socket, the reader ignores payloads and watches for close or
/// error, and the registry may ask for the connection to be dropped (a stalled
/// writer never notices its queue closing). Whichever comes first, the observer
/// is marked closing, the socket halves are released and it is removed.
pub async fn serve_observer<Si, St, E>(
    registry: &Registry,
    sub: Subscription,
    mut sink: Si,
    mut stream: St,
) where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let Subscription {
        id,
        mut frames,
        mut closed,
    } = sub;

    let writer = async {
        while let Some(frame) = frames.recv().await {
            trace!(observer = %id, "sending {frame}");
            if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                debug!(observer = %id, "write failed: {e}");
                return;
            }
        }
        // registry dropped us; say goodbye
        let _ = sink.close().await;
    };

    let reader = async {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(observer = %id, "read failed: {e}");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = writer => {}
        _ = reader => {}
        _ = &mut closed => debug!(observer = %id, "closed by registry"),
    }
    registry.close(&id);
    drop(sink);
    drop(stream);
    registry.disconnect(&id);
}
