use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use task_notify::{
    db::{create_pool, run_migrations},
    notification::{start_notification_sync, HttpNotificationApi, NotificationStore},
    routes::create_router,
    state::{AppState, Config},
    timer::{SqliteTimerStorage, SystemClock, TimerRegistry, TimerWorker, ViewAlertSink},
    transport::PushClient,
    websocket::ConnectionManager,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,task_notify=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env().context("invalid configuration")?);

    tracing::info!("Opening timer database...");
    let db = create_pool(&config.timer_database_url)
        .await
        .context("failed to open timer database")?;
    run_migrations(&db).await.context("failed to run migrations")?;

    // Timers
    let ws_connections = ConnectionManager::new();
    let registry = Arc::new(TimerRegistry::new(
        Arc::new(SqliteTimerStorage::new(db.clone())),
        Arc::new(SystemClock),
        Arc::new(ViewAlertSink::new(ws_connections.clone())),
        ws_connections.clone(),
    ));
    let worker = TimerWorker::new(registry.clone(), ws_connections.clone());
    worker.activate().await?;

    // Notifications
    let api = Arc::new(HttpNotificationApi::new(
        &config.api_base_url,
        config.auth_token.clone(),
    )?);
    let store = Arc::new(NotificationStore::new(api));
    let push = PushClient::with_reconnect_delay(config.push_url.clone(), config.reconnect_delay);
    let _subscriptions = store.attach(&push);
    push.connect(&config.auth_token, |e| {
        tracing::warn!("Push channel error: {}", e);
    });

    if let Err(e) = store.fetch().await {
        tracing::warn!("Initial notification fetch failed: {}", e);
    }

    let mut scheduler = start_notification_sync(store.clone(), &config.sync_cron)
        .await
        .map_err(|e| anyhow::anyhow!("failed to schedule notification sync: {}", e))?;

    let state = AppState {
        store: store.clone(),
        registry,
        worker: worker.clone(),
        ws_connections,
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Hub listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Scheduler shutdown failed: {}", e);
    }
    worker.shutdown();
    store.detach(&push);
    push.disconnect();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
