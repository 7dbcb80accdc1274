use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{AppError, Result},
    notification::NotificationStore,
    timer::{TimerRegistry, TimerWorker},
    websocket::ConnectionManager,
};

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
const DEFAULT_TIMER_DATABASE_URL: &str = "sqlite://timers.db?mode=rwc";
const DEFAULT_SYNC_CRON: &str = "0/30 * * * * *";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<NotificationStore>,
    pub registry: Arc<TimerRegistry>,
    pub worker: TimerWorker,
    pub ws_connections: ConnectionManager,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_base_url: String,
    pub push_url: String,
    pub auth_token: String,
    pub timer_database_url: String,
    pub host: String,
    pub port: u16,
    pub reconnect_delay: Duration,
    pub sync_cron: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_base_url =
            std::env::var("API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
        let push_url = match std::env::var("PUSH_URL") {
            Ok(url) => url,
            Err(_) => derive_push_url(&api_base_url)?,
        };
        let auth_token = std::env::var("AUTH_TOKEN")
            .map_err(|_| AppError::Config("AUTH_TOKEN must be set".to_string()))?;

        Ok(Self {
            api_base_url,
            push_url,
            auth_token,
            timer_database_url: std::env::var("TIMER_DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_TIMER_DATABASE_URL.to_string()),
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3030".to_string())
                .parse()
                .map_err(|_| AppError::Config("PORT must be a number".to_string()))?,
            reconnect_delay: Duration::from_secs(
                std::env::var("RECONNECT_DELAY_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Config("RECONNECT_DELAY_SECS must be a number".to_string())
                    })?,
            ),
            sync_cron: std::env::var("SYNC_CRON").unwrap_or_else(|_| DEFAULT_SYNC_CRON.to_string()),
        })
    }
}

/// `http://host:port/api` becomes `ws://host:port/ws`.
pub fn derive_push_url(api_base_url: &str) -> Result<String> {
    let mut url = reqwest::Url::parse(api_base_url)
        .map_err(|e| AppError::Config(format!("invalid API_BASE_URL: {}", e)))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| AppError::Config("API_BASE_URL must be http(s)".to_string()))?;
    url.set_path("/ws");
    url.set_query(None);
    Ok(url.to_string())
}
