//! Game socket
//!
//! One websocket per player session. Inbound text frames go to
//! [`GameEngine::handle_frame`]; engine events arrive on the connection's
//! outbox and are written out as JSON. A `logout` event closes the socket.

use super::{
    errors::ApiError,
    handlers::AppState,
    middleware::RequestId,
    models::GameSocketQuery,
};
use crate::directory::DirectoryError;
use crate::game::GameEngine;
use crate::protocol::ServerEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    Extension,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// GET /ws?token=&game_id=
pub async fn game_socket_handler(
    ws: WebSocketUpgrade,
    Extension(request_id): Extension<RequestId>,
    Query(params): Query<GameSocketQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let (token, game_id) = match (params.token, params.game_id) {
        (Some(token), Some(game_id)) if !token.is_empty() && !game_id.is_empty() => {
            (token, game_id)
        }
        _ => {
            return Err(ApiError::bad_request(
                request_id.0,
                "token and game_id are required",
            ))
        }
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, token, game_id)))
}

/// Write one event. Returns false once the socket is gone.
async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &ServerEvent) -> bool {
    match event.to_json() {
        Ok(json) => sender.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            warn!(event = event.name(), error = %e, "Failed to encode event");
            true
        }
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, token: String, game_id: String) {
    let conn_id = Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();

    let profile = match state.directory.resolve(&token, &game_id).await {
        Ok(profile) => profile,
        Err(err) => {
            let message = match &err {
                DirectoryError::UnknownToken => "User not authenticated",
                DirectoryError::Unavailable(_) => "Something went wrong",
            };
            warn!(conn_id = %conn_id, error = %err, "Rejecting game socket");
            send_event(&mut sender, &ServerEvent::Logout(message.to_string())).await;
            let _ = sender.close().await;
            return;
        }
    };

    let (outbox, mut events) = mpsc::unbounded_channel::<ServerEvent>();
    let engine: GameEngine = state.engine.clone();
    if let Err(err) = engine
        .connect(&conn_id, &profile, &token, &game_id, outbox)
        .await
    {
        warn!(conn_id = %conn_id, error = %err, "Failed to open session");
        send_event(&mut sender, &ServerEvent::BetError(err.client_message().to_string())).await;
        engine.disconnect(&conn_id).await;
        let _ = sender.close().await;
        return;
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let logout = matches!(event, ServerEvent::Logout(_));
            if !send_event(&mut sender, &event).await {
                break;
            }
            if logout {
                let _ = sender.close().await;
                break;
            }
        }
    });

    let recv_engine = engine.clone();
    let recv_conn = conn_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => recv_engine.handle_frame(&recv_conn, &text).await,
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(conn_id = %recv_conn, error = %e, "Socket read failed");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    engine.disconnect(&conn_id).await;
    info!(conn_id = %conn_id, "Game socket closed");
}
