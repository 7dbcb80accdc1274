use crate::{
    notification::{
        clear_notifications, delete_notification, get_notifications, mark_all_read, mark_read,
        notification_stream, open_notification,
    },
    state::AppState,
    timer::{self, StartTimerRequest, TimerResponse},
    websocket::ws_handler,
};
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        timer::timer_handlers::list_timers,
        timer::timer_handlers::get_timer,
        timer::timer_handlers::start_timer,
        timer::timer_handlers::stop_timer,
    ),
    components(
        schemas(
            StartTimerRequest,
            TimerResponse,
        )
    ),
    tags(
        (name = "timers", description = "Task countdown timers")
    )
)]
pub struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let timer_routes = Router::new()
        .route("/", get(timer::list_timers))
        .route("/:task_id", get(timer::get_timer).delete(timer::stop_timer))
        .route("/:task_id/start", post(timer::start_timer));

    let notification_routes = Router::new()
        .route("/", get(get_notifications).delete(clear_notifications))
        .route("/stream", get(notification_stream))
        .route("/read-all", post(mark_all_read))
        .route("/:id", delete(delete_notification))
        .route("/:id/read", post(mark_read))
        .route("/:id/open", post(open_notification));

    let api_routes = Router::new()
        .nest("/timers", timer_routes)
        .nest("/notifications", notification_routes);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/ws", get(ws_handler))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        notification::{NotificationApi, NotificationStore},
        timer::{ManualClock, MemoryTimerStorage, TimerRegistry, TimerWorker, ViewAlertSink},
        websocket::ConnectionManager,
        error::Result,
    };
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct EmptyApi;

    #[async_trait]
    impl NotificationApi for EmptyApi {
        async fn list(&self) -> Result<Value> {
            Ok(json!([]))
        }
        async fn unread_count(&self) -> Result<Value> {
            Ok(json!(0))
        }
        async fn mark_read(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn mark_all_read(&self) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    fn test_state() -> AppState {
        let views = ConnectionManager::new();
        let registry = Arc::new(TimerRegistry::new(
            Arc::new(MemoryTimerStorage::new()),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            Arc::new(ViewAlertSink::new(views.clone())),
            views.clone(),
        ));
        AppState {
            store: Arc::new(NotificationStore::new(Arc::new(EmptyApi))),
            worker: TimerWorker::new(registry.clone(), views.clone()),
            registry,
            ws_connections: views,
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn start_request(task_id: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/api/timers/{}/start", task_id))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_timer_lifecycle_over_http() {
        let state = test_state();
        let app = create_router(state.clone());

        let response = app
            .clone()
            .oneshot(start_request("T1", json!({ "duration": 90 })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["phase"], "Running");
        assert_eq!(body["taskId"], "T1");
        assert_eq!(body["timeLeft"], 90);

        let response = app
            .clone()
            .oneshot(start_request("T1", json!({ "duration": 10, "auto": true })))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["timeLeft"], 90);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/timers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/timers/T1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(Request::builder().uri("/api/timers/T1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        state.worker.shutdown();
    }

    #[tokio::test]
    async fn test_start_rejects_out_of_range_duration() {
        let app = create_router(test_state());
        let response = app
            .oneshot(start_request("T1", json!({ "duration": 0 })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_notification_snapshot() {
        let state = test_state();
        let app = create_router(state.clone());

        let response = app
            .oneshot(Request::builder().uri("/api/notifications").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "notifications": [], "unreadCount": 0 })
        );
    }

    #[tokio::test]
    async fn test_notification_actions() {
        let state = test_state();
        let app = create_router(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/notifications/read-all")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/notifications/missing/open")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
