use std::sync::Arc;

use taskfeed_workflow::TaskFeedService;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: inner data is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Database pool, absent when running against an in-memory store.
    pub pool: Option<taskfeed_db::DbPool>,
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    /// The task feed engine.
    pub task_feed: TaskFeedService,
}
