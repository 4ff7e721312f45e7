use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use taskfeed_core::types::TenantContext;

use crate::context::tenant_from_headers;
use crate::state::AppState;
use crate::ws::manager::WsManager;

/// GET /api/v1/ws -- upgrade to a WebSocket receiving invalidation pushes.
///
/// Connections without tenant headers still receive cache invalidations but
/// no organization-scoped banners.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let tenant = tenant_from_headers(&headers).ok();
    ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager, tenant))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Registers with `WsManager`, forwards manager messages to the sink from a
/// spawned task, and drains inbound frames until the client disconnects.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>, tenant: Option<TenantContext>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let organization_id = tenant.map(|t| t.organization_id);
    tracing::info!(conn_id = %conn_id, organization_id, "WebSocket connected");

    let mut rx = ws_manager
        .add(conn_id.clone(), organization_id, tenant.map(|t| t.user_id))
        .await;

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Clients only listen; inbound frames other than Close are ignored.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
