//! WebSocket server implementation.
//!
//! Accepts connections at `/ws`. A client joins rooms with
//! `{"action":"join","room":"user:s1"}` and from then on receives every
//! notice addressed to those rooms as `{"type":"event",...}`.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::hub::{NotificationHub, RoomEvent};
use crate::rooms::{is_valid_room, ClientMessage, ClientRooms, ServerMessage};

type Sink = Arc<tokio::sync::Mutex<SplitSink<WebSocket, Message>>>;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("websocket server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct WebSocketServer {
    pub port: u16,
    pub hub: Arc<NotificationHub>,
}

impl WebSocketServer {
    pub fn new(port: u16, hub: Arc<NotificationHub>) -> Self {
        Self { port, hub }
    }

    /// Serve until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), WsError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = router(Arc::clone(&self.hub));
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(%addr, "WebSocket server listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

pub fn router(hub: Arc<NotificationHub>) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(hub)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<NotificationHub>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<NotificationHub>) {
    let (sink, mut stream) = socket.split();
    let sink: Sink = Arc::new(tokio::sync::Mutex::new(sink));
    let rooms = Arc::new(Mutex::new(ClientRooms::new()));

    let forwarder = tokio::spawn(forward_events(
        hub.subscribe(),
        Arc::clone(&sink),
        Arc::clone(&rooms),
    ));
    debug!("client connected");

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "websocket receive error");
                break;
            }
        };
        match msg {
            Message::Text(text) => {
                let reply = handle_text(&text, &rooms);
                if sink.lock().await.send(Message::Text(reply.to_text())).await.is_err() {
                    break;
                }
            }
            Message::Ping(data) => {
                let _ = sink.lock().await.send(Message::Pong(data)).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    forwarder.abort();
    debug!("client disconnected");
}

/// Apply one client message to the connection's room set and build the reply.
pub(crate) fn handle_text(text: &str, rooms: &Mutex<ClientRooms>) -> ServerMessage {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            return ServerMessage::Error {
                message: format!("invalid message: {e}"),
            }
        }
    };
    let mut rooms = rooms.lock().unwrap_or_else(|e| e.into_inner());
    match msg {
        ClientMessage::Join { room } => {
            if !is_valid_room(&room) {
                return ServerMessage::Error {
                    message: format!("invalid room: {room}"),
                };
            }
            rooms.join(room.clone());
            ServerMessage::Ack {
                action: "join".into(),
                room,
            }
        }
        ClientMessage::Leave { room } => {
            if rooms.leave(&room) {
                ServerMessage::Ack {
                    action: "leave".into(),
                    room,
                }
            } else {
                ServerMessage::Error {
                    message: format!("not in room {room}"),
                }
            }
        }
        ClientMessage::Ping => ServerMessage::Pong,
    }
}

async fn forward_events(
    mut rx: broadcast::Receiver<Arc<RoomEvent>>,
    sink: Sink,
    rooms: Arc<Mutex<ClientRooms>>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let wanted = rooms
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .contains(&event.room);
                if !wanted {
                    continue;
                }
                let msg = ServerMessage::Event {
                    event: event.event.clone(),
                    room: event.room.clone(),
                    data: event.data.clone(),
                };
                if sink.lock().await.send(Message::Text(msg.to_text())).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "client lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_leave_and_errors() {
        let rooms = Mutex::new(ClientRooms::new());
        assert!(matches!(
            handle_text(r#"{"action":"join","room":"user:s1"}"#, &rooms),
            ServerMessage::Ack { .. }
        ));
        assert!(rooms.lock().unwrap().contains("user:s1"));
        assert!(matches!(
            handle_text(r#"{"action":"join","room":"lobby"}"#, &rooms),
            ServerMessage::Error { .. }
        ));
        assert!(matches!(
            handle_text(r#"{"action":"leave","room":"role:faculty"}"#, &rooms),
            ServerMessage::Error { .. }
        ));
        assert!(matches!(
            handle_text(r#"{"action":"leave","room":"user:s1"}"#, &rooms),
            ServerMessage::Ack { .. }
        ));
        assert_eq!(handle_text(r#"{"action":"ping"}"#, &rooms), ServerMessage::Pong);
        assert!(matches!(handle_text("not json", &rooms), ServerMessage::Error { .. }));
    }
}
