use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::Value;

use crate::error::{AppError, Result};

/// The notification endpoints the store depends on. List and count calls
/// return the raw body; shape normalization happens in the caller.
#[async_trait]
pub trait NotificationApi: Send + Sync + 'static {
    async fn list(&self) -> Result<Value>;
    async fn unread_count(&self) -> Result<Value>;
    async fn mark_read(&self, id: &str) -> Result<()>;
    async fn mark_all_read(&self) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct HttpNotificationApi {
    client: Client,
    base_url: Url,
    token: String,
}

impl HttpNotificationApi {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("invalid API_BASE_URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(
                "API_BASE_URL must be a hierarchical URL".to_string(),
            ));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            token: token.into(),
        })
    }

    /// Appends percent-encoded path segments to the base URL.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config("API_BASE_URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();

        match status {
            StatusCode::TOO_MANY_REQUESTS => return Err(AppError::RateLimited),
            StatusCode::UNAUTHORIZED => {
                return Err(AppError::Unauthorized("credential rejected".to_string()))
            }
            StatusCode::NOT_FOUND => {
                return Err(AppError::NotFound(response.url().path().to_string()))
            }
            s if !s.is_success() => {
                let message = response.text().await.unwrap_or_default();
                return Err(AppError::Upstream {
                    status: s.as_u16(),
                    message,
                });
            }
            _ => {}
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or_else(|e| {
            tracing::warn!("Non-JSON body from notification endpoint: {}", e);
            Value::Null
        }))
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn list(&self) -> Result<Value> {
        self.send(self.client.get(self.url(&["notifications"])?))
            .await
    }

    async fn unread_count(&self) -> Result<Value> {
        self.send(self.client.get(self.url(&["notifications", "unread-count"])?))
            .await
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        self.send(self.client.put(self.url(&["notifications", id, "read"])?))
            .await
            .map(|_| ())
    }

    async fn mark_all_read(&self) -> Result<()> {
        self.send(self.client.patch(self.url(&["notifications", "read"])?))
            .await
            .map(|_| ())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.send(self.client.delete(self.url(&["notifications", id])?))
            .await
            .map(|_| ())
    }

    async fn clear(&self) -> Result<()> {
        self.send(self.client.delete(self.url(&["notifications"])?))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::{delete, get, patch, put},
        Json, Router,
    };
    use serde_json::json;

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .map(|h| h == "Bearer secret")
            .unwrap_or(false)
    }

    async fn spawn_server() -> String {
        let app = Router::new()
            .route(
                "/api/notifications",
                get(|headers: HeaderMap| async move {
                    if !authorized(&headers) {
                        return Err(AxumStatus::UNAUTHORIZED);
                    }
                    Ok(Json(json!({ "items": [] })))
                })
                .delete(|| async { AxumStatus::NO_CONTENT }),
            )
            .route(
                "/api/notifications/unread-count",
                get(|| async { Json(json!({ "unreadCount": 3 })) }),
            )
            .route(
                "/api/notifications/read",
                patch(|| async { AxumStatus::TOO_MANY_REQUESTS }),
            )
            .route(
                "/api/notifications/:id/read",
                put(|Path(id): Path<String>| async move { Json(json!({ "id": id, "isRead": true })) }),
            )
            .route(
                "/api/notifications/:id",
                delete(|Path(id): Path<String>| async move {
                    match id.as_str() {
                        "n1" | "a/b c" => AxumStatus::NO_CONTENT,
                        _ => AxumStatus::NOT_FOUND,
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api", addr)
    }

    #[tokio::test]
    async fn test_endpoints_and_status_mapping() {
        let base = spawn_server().await;
        let api = HttpNotificationApi::new(&base, "secret").unwrap();

        assert_eq!(api.list().await.unwrap(), json!({ "items": [] }));
        assert_eq!(api.unread_count().await.unwrap(), json!({ "unreadCount": 3 }));
        assert!(api.mark_read("n1").await.is_ok());
        assert!(api.delete("n1").await.is_ok());
        assert!(api.clear().await.is_ok());
        assert_eq!(api.mark_all_read().await, Err(AppError::RateLimited));
        assert!(matches!(api.delete("missing").await, Err(AppError::NotFound(_))));

        let wrong = HttpNotificationApi::new(&base, "other").unwrap();
        assert!(matches!(wrong.list().await, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_ids_are_sent_as_single_path_segments() {
        let base = spawn_server().await;
        let api = HttpNotificationApi::new(&format!("{}/", base), "secret").unwrap();

        assert!(api.delete("a/b c").await.is_ok());
        assert!(matches!(api.delete("n1/read").await, Err(AppError::NotFound(_))));
        assert_eq!(
            api.url(&["notifications", "a/b c"]).unwrap().path(),
            "/api/notifications/a%2Fb%20c"
        );
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        assert!(HttpNotificationApi::new("not a url", "t").is_err());
        assert!(HttpNotificationApi::new("mailto:someone@example.com", "t").is_err());
    }
}
