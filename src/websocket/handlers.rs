use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::websocket::events::ServerEvent;
use crate::websocket::message_types::{ClientEvent, ClientFrame};
use crate::websocket::ConnectionHandle;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.to_string())
}

/// Upgrade endpoint. Credentials ride in the query string or the
/// Authorization header; a bad credential rejects the upgrade with 401.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let token = query
        .token
        .or_else(|| bearer_token(&headers))
        .ok_or(AppError::Unauthorized)?;
    let user_id = state.verifier.verify(&token).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let handle = ConnectionHandle::new(user_id, tx);

    let came_online = state.registry.register(&handle).await;
    info!(%user_id, conn_id = %handle.id.0, "websocket connected");

    handle.send(ServerEvent::Authenticated { user_id });
    if came_online {
        state.presence.broadcast_online(user_id).await;
    }

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(event) = outbound else { break };
                let Ok(text) = serde_json::to_string(&event) else { continue };
                if ws_tx.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_text_frame(&state, &handle, &text).await;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => {}
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                }
            }
        }
    }

    state.topics.leave_all(handle.id).await;
    let went_offline = state.registry.unregister(user_id, handle.id).await;
    info!(%user_id, conn_id = %handle.id.0, "websocket disconnected");
    if went_offline {
        state.presence.broadcast_offline(user_id).await;
        state.calls.cleanup_user(user_id).await;
    }
}

async fn handle_text_frame(state: &AppState, handle: &ConnectionHandle, text: &str) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(user_id = %handle.user_id, error = %e, "unparseable frame");
            handle.send(ServerEvent::error_from(&AppError::Validation(
                e.to_string(),
            )));
            return;
        }
    };

    let ack_id = frame.ack_id;
    match dispatch_event(state, handle, frame.event).await {
        Ok(()) => {
            if let Some(ack_id) = ack_id {
                handle.send(ServerEvent::Ack {
                    ack_id,
                    ok: true,
                    error: None,
                });
            }
        }
        Err(e) => {
            warn!(user_id = %handle.user_id, error = %e, "event failed");
            handle.send(ServerEvent::error_from(&e));
            if let Some(ack_id) = ack_id {
                handle.send(ServerEvent::Ack {
                    ack_id,
                    ok: false,
                    error: Some(e.error_type().to_string()),
                });
            }
        }
    }
}

/// Routes one inbound event. Split out from the socket loop so the
/// whole vocabulary is exercisable without a network connection.
pub async fn dispatch_event(
    state: &AppState,
    handle: &ConnectionHandle,
    event: ClientEvent,
) -> AppResult<()> {
    match event {
        ClientEvent::JoinChats { chat_ids } => {
            let outcome = state.messages.join_chats(handle, chat_ids).await;
            handle.send(outcome);
            Ok(())
        }
        ClientEvent::SendMessage {
            chat_id,
            message_type,
            content,
            meta,
        } => {
            let ack = state
                .messages
                .send_message(handle, chat_id, message_type, content, meta)
                .await?;
            handle.send(ack);
            Ok(())
        }
        ClientEvent::Typing { chat_id, is_typing } => {
            state
                .topics
                .broadcast(
                    chat_id,
                    &ServerEvent::Typing {
                        chat_id,
                        user_id: handle.user_id,
                        is_typing,
                    },
                    Some(handle.id),
                )
                .await;
            Ok(())
        }
        ClientEvent::StopTyping { chat_id } => {
            state
                .topics
                .broadcast(
                    chat_id,
                    &ServerEvent::StopTyping {
                        chat_id,
                        user_id: handle.user_id,
                    },
                    Some(handle.id),
                )
                .await;
            Ok(())
        }
        ClientEvent::MessageDelivered {
            chat_id,
            message_id,
        } => {
            state
                .delivery
                .mark_delivered(chat_id, message_id, handle.user_id)
                .await
        }
        ClientEvent::MessageSeen {
            chat_id,
            message_id,
        } => {
            state
                .delivery
                .mark_seen(chat_id, message_id, handle.user_id)
                .await
        }
        ClientEvent::CallInitiate {
            target_user_id,
            call_type,
        } => {
            state
                .calls
                .initiate(handle.user_id, target_user_id, call_type)
                .await
        }
        ClientEvent::CallOffer {
            target_user_id,
            offer,
        } => {
            state
                .calls
                .relay_offer(handle.user_id, target_user_id, offer)
                .await
        }
        ClientEvent::CallAnswer {
            target_user_id,
            answer,
        } => {
            state
                .calls
                .relay_answer(handle.user_id, target_user_id, answer)
                .await
        }
        ClientEvent::CallIceCandidate {
            target_user_id,
            candidate,
        } => {
            state
                .calls
                .relay_ice_candidate(handle.user_id, target_user_id, candidate)
                .await
        }
        ClientEvent::CallAccept { target_user_id } => {
            state.calls.accept(handle.user_id, target_user_id).await
        }
        ClientEvent::CallReject { target_user_id } => {
            state.calls.reject(handle.user_id, target_user_id).await
        }
        ClientEvent::CallEnd { target_user_id } => {
            state.calls.end(handle.user_id, target_user_id).await
        }
    }
}
