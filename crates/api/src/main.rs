use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskfeed_api::config::ServerConfig;
use taskfeed_api::realtime::{start_realtime, WsInvalidator};
use taskfeed_api::router::build_app_router;
use taskfeed_api::state::AppState;
use taskfeed_api::ws;
use taskfeed_events::{ChangeHub, PgChangeListener, RealtimeSync, WebhookDelivery};
use taskfeed_workflow::{HttpCmmsClient, PgTaskFeedStore, TaskFeedService, WebhookNotifier};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskfeed_api=debug,taskfeed_workflow=debug,tower_http=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = taskfeed_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    taskfeed_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    taskfeed_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    // --- WebSocket manager ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // --- Change feed ---
    let change_hub = Arc::new(ChangeHub::default());
    let listener_cancel = CancellationToken::new();
    let listener = PgChangeListener::new(pool.clone(), Arc::clone(&change_hub));
    let listener_token = listener_cancel.clone();
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = listener.run(listener_token).await {
            tracing::error!(error = %e, "Change listener stopped, realtime updates unavailable");
        }
    });

    let realtime = RealtimeSync::new(
        Arc::clone(&change_hub),
        Arc::new(WsInvalidator::new(Arc::clone(&ws_manager))),
    )
    .with_debounce(config.realtime_debounce());
    let subscriptions = start_realtime(&realtime, Arc::clone(&ws_manager));

    // --- Task feed service ---
    let mut task_feed = TaskFeedService::new(Arc::new(PgTaskFeedStore::new(pool.clone())));
    if let Some(url) = &config.cmms_url {
        let cmms = HttpCmmsClient::new(url.as_str()).expect("Failed to build CMMS client");
        task_feed = task_feed.with_cmms(Arc::new(cmms));
        tracing::info!(%url, "CMMS integration enabled");
    }
    if let Some(url) = &config.alert_webhook_url {
        let delivery = WebhookDelivery::new().expect("Failed to build webhook client");
        task_feed = task_feed.with_notifier(Arc::new(WebhookNotifier::new(delivery, url.as_str())));
        tracing::info!(%url, "Personnel alert webhook enabled");
    }

    // --- App state ---
    let state = AppState {
        pool: Some(pool),
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        task_feed,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let grace = config.shutdown_timeout();

    for subscription in &subscriptions {
        subscription.unsubscribe();
    }
    listener_cancel.cancel();
    let _ = tokio::time::timeout(grace, listener_handle).await;
    change_hub.close();
    tracing::info!("Change feed shut down");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    let _ = tokio::time::timeout(Duration::from_secs(1), heartbeat_handle).await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
