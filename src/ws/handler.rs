//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{InputEvent, PlayerInput};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    info!(conn_id = %conn_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();

    // Direct channel must exist before the join is processed or the bootstrap
    // is lost. The broadcast subscription comes back from the world task so it
    // starts after the bootstrap.
    let (direct_tx, direct_rx) = mpsc::channel::<ServerMsg>(64);
    state.world.clients.register(conn_id, direct_tx);

    let input_tx = state.world.input_tx.clone();
    let (events_tx, events_rx) = oneshot::channel();
    if input_tx
        .send(PlayerInput {
            conn_id,
            event: InputEvent::Joined { events: events_tx },
        })
        .await
        .is_err()
    {
        error!(conn_id = %conn_id, "World task is gone");
        state.world.clients.unregister(&conn_id);
        return;
    }

    let broadcast_rx = match events_rx.await {
        Ok(rx) => rx,
        Err(_) => {
            warn!(conn_id = %conn_id, "Join rejected, closing connection");
            state.world.clients.unregister(&conn_id);
            return;
        }
    };

    run_session(conn_id, ws_sink, ws_stream, &input_tx, direct_rx, broadcast_rx).await;

    // Cleanup on disconnect
    let _ = input_tx
        .send(PlayerInput {
            conn_id,
            event: InputEvent::Left,
        })
        .await;
    state.world.clients.unregister(&conn_id);

    info!(conn_id = %conn_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    conn_id: Uuid,
    ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    input_tx: &mpsc::Sender<PlayerInput>,
    direct_rx: mpsc::Receiver<ServerMsg>,
    broadcast_rx: broadcast::Receiver<ServerMsg>,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    // Spawn writer task: direct + broadcast messages -> WebSocket
    let writer_handle = tokio::spawn(write_loop(conn_id, ws_sink, direct_rx, broadcast_rx));

    // Reader loop: WebSocket -> world task
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(conn_id = %conn_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        let input = PlayerInput {
                            conn_id,
                            event: InputEvent::Msg(client_msg),
                        };

                        if input_tx.send(input).await.is_err() {
                            debug!(conn_id = %conn_id, "Input channel closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(conn_id = %conn_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(conn_id = %conn_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

async fn write_loop(
    conn_id: Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut direct_rx: mpsc::Receiver<ServerMsg>,
    mut broadcast_rx: broadcast::Receiver<ServerMsg>,
) {
    loop {
        let msg = tokio::select! {
            // Direct messages first so the bootstrap precedes the roster sent with it
            biased;
            direct = direct_rx.recv() => match direct {
                Some(msg) => msg,
                None => break,
            },
            broadcast = broadcast_rx.recv() => match broadcast {
                Ok(msg) => msg,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(conn_id = %conn_id, lagged_count = n, "Client lagged, skipping {} messages", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(conn_id = %conn_id, "Broadcast channel closed");
                    break;
                }
            },
        };

        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(conn_id = %conn_id, event = msg.event(), error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
