//! One task pair per socket: a writer draining the observer queue and a
//! reader dispatching [`ClientRequest`] frames.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use server_api::BookingOrigin;
use shared::{
    domain::ActorId,
    error::{ApiError, ErrorCode},
    protocol::{ClientRequest, ServerEvent},
};
use tracing::{debug, warn};

use crate::app_state::AppState;

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let actor = ActorId::new_random();
    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.api.connect(actor).await;

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(error) => {
                    warn!(%actor, %error, "failed to encode server event");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        // Queue ended: the hub dropped this observer.
        debug!(%actor, "observer queue ended; closing socket");
        let close = CloseFrame {
            code: close_code::AGAIN,
            reason: "event queue overflowed; reconnect to resync".into(),
        };
        let _ = sender.send(Message::Close(Some(close))).await;
    });

    let recv_state = Arc::clone(&state);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => handle_client_frame(&recv_state, actor, &text).await,
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    state.api.disconnect(actor).await;
}

pub(crate) async fn handle_client_frame(state: &AppState, actor: ActorId, text: &str) {
    let request = match serde_json::from_str::<ClientRequest>(text) {
        Ok(request) => request,
        Err(error) => {
            warn!(%actor, %error, "rejected client frame");
            let reply = ServerEvent::Error(ApiError::new(
                ErrorCode::Validation,
                format!("invalid message: {error}"),
            ));
            state.api.send_to(actor, reply).await;
            return;
        }
    };

    match request {
        ClientRequest::CreateBooking { booking } => {
            if let Err(error) = state
                .api
                .create_booking(booking, BookingOrigin::Actor(actor))
                .await
            {
                state.api.send_to(actor, ServerEvent::Error(error)).await;
            }
        }
        ClientRequest::RequestAction { booking_id, action } => {
            state.api.request_action(actor, booking_id, action).await;
        }
        ClientRequest::RequestSnapshot => {
            state.api.request_snapshot(actor).await;
        }
        ClientRequest::Ping => {
            debug!(%actor, "ping");
            let pong = ServerEvent::Pong {
                timestamp: Utc::now(),
            };
            state.api.send_to(actor, pong).await;
        }
        ClientRequest::RequestServerStatus => {
            let status = state.api.server_status().await;
            state
                .api
                .send_to(actor, ServerEvent::ServerStatus(status))
                .await;
        }
    }
}
