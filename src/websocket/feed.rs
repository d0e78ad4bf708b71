use crate::error::AppError;
use crate::state::AppState;
use crate::utils::cookie::{read_cookie, SESSION_COOKIE};
use crate::websocket::hub::Subscription;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::IntoResponse,
    Extension,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct FeedQuery {
    pub token: Option<String>,
}

/// `GET /ws?token=...`. Browsers on the same origin may rely on the
/// session cookie instead.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<FeedQuery>,
    Extension(state): Extension<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| read_cookie(&headers, SESSION_COOKIE))
        .ok_or(AppError::Unauthorized)?;
    let identity = state.auth.session(&token).await?;

    let subscription = state.feed.subscribe(identity.user_id);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, subscription)))
}

async fn handle_socket(socket: WebSocket, mut subscription: Subscription) {
    let user_id = subscription.user_id();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    tracing::info!("Change feed connected for user {}", user_id);

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!("Failed to encode feed event: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                return;
            }
        }
        // The feed closed this subscription, e.g. on sign-out.
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    // Whichever side ends first takes the other down, dropping the subscription.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!("Change feed disconnected for user {}", user_id);
}
