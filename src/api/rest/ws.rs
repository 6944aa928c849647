use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::event::{ClientMessage, ServerEvent};
use crate::models::identity::{Identity, Role};
use crate::state::AppState;
use crate::store::connections::ConnectionHandle;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

fn error_event(err: &AppError) -> ServerEvent {
    ServerEvent::Error {
        code: err.code().to_string(),
        message: err.to_string(),
    }
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "failed to serialize event for ws");
            return Ok(());
        }
    };
    socket.send(Message::Text(json.into())).await
}

async fn await_join(
    socket: &mut WebSocket,
    state: &AppState,
    wait: Duration,
) -> Result<Identity, AppError> {
    let frame = match timeout(wait, socket.recv()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(_) => {
            return Err(AppError::InvalidArguments(
                "expected a join frame".to_string(),
            ));
        }
        Err(_) => {
            return Err(AppError::InvalidArguments(
                "join frame not received in time".to_string(),
            ));
        }
    };

    match serde_json::from_str::<ClientMessage>(&frame) {
        Ok(ClientMessage::Join { role, id }) => {
            if role == Role::Captain {
                state.captains.get(&id)?;
            }
            Ok(Identity { role, id })
        }
        Ok(_) => Err(AppError::InvalidArguments(
            "expected a join frame".to_string(),
        )),
        Err(err) => Err(AppError::InvalidArguments(format!(
            "malformed frame: {err}"
        ))),
    }
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let heartbeat = state.heartbeat_timeout;

    let identity = match await_join(&mut socket, &state, heartbeat).await {
        Ok(identity) => identity,
        Err(err) => {
            debug!(error = %err, "websocket join rejected");
            let _ = send_event(&mut socket, &error_event(&err)).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let (handle, mut outbound) = ConnectionHandle::channel(state.connection_buffer);
    let mut session = state.dispatcher.open_session(identity, handle);
    info!(identity = %identity, connection_id = %outbound.connection_id(), "websocket client joined");

    let joined = ServerEvent::Joined {
        role: identity.role,
        id: identity.id,
    };
    if send_event(&mut socket, &joined).await.is_err() {
        session.close();
        return;
    }

    let mut deadline = Instant::now() + heartbeat;

    loop {
        tokio::select! {
            event = outbound.recv() => match event {
                Some(event) => {
                    if send_event(&mut socket, &event).await.is_err() {
                        break;
                    }
                }
                None => {
                    info!(identity = %identity, "connection superseded");
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
            inbound = socket.recv() => {
                deadline = Instant::now() + heartbeat;
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(message) => session
                                .handle(message)
                                .await
                                .unwrap_or_else(|err| error_event(&err)),
                            Err(err) => error_event(&AppError::InvalidArguments(format!(
                                "malformed frame: {err}"
                            ))),
                        };
                        if send_event(&mut socket, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            _ = sleep_until(deadline) => {
                warn!(identity = %identity, "heartbeat missed; dropping connection");
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }

    session.close();
    info!(identity = %identity, "websocket client disconnected");
}
