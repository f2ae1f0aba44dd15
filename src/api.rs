use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::db::Database;
use crate::error::NotifierError;
use crate::news::{FeedQuery, FeedReader, NewsStore};
use crate::devices::DeviceRegistry;
use crate::notify::{send_to_all, PushTransport};
use crate::scheduler::PipelineScheduler;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub scheduler: Arc<PipelineScheduler>,
    pub transport: Arc<dyn PushTransport>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/news/feed", get(feed))
        .route("/api/news/:id", get(get_news))
        .route("/api/devices/register", post(register_device))
        .route("/api/devices/:uuid/deactivate", post(deactivate_device))
        .route("/admin/scheduler/status", get(scheduler_status))
        .route("/admin/scheduler/run-now", post(run_now))
        .route("/admin/news", delete(clear_news))
        .route("/admin/notifications/test", post(test_broadcast))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Error wrapper mapping the crate taxonomy onto HTTP statuses. The body
/// is always `{"error": {"kind", "message"}}`.
struct ApiError(NotifierError);

impl From<NotifierError> for ApiError {
    fn from(e: NotifierError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            NotifierError::Validation(_) => StatusCode::BAD_REQUEST,
            NotifierError::NotFound(_) => StatusCode::NOT_FOUND,
            NotifierError::Upstream(_) | NotifierError::Delivery(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({
            "error": {
                "kind": self.0.kind(),
                "message": self.0.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

/// Query wrapper turning extractor rejections (unparseable parameters)
/// into the same error envelope as domain validation failures.
struct ApiQuery<T>(T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(e) => Err(NotifierError::Validation(e.to_string()).into()),
        }
    }
}

/// Path wrapper with the same rejection mapping as `ApiQuery`.
struct ApiPath<T>(T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(e) => Err(NotifierError::Validation(e.to_string()).into()),
        }
    }
}

async fn feed(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<FeedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = FeedReader::new(state.db.pool()).page(&query).await?;
    Ok(Json(page))
}

async fn get_news(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let item = NewsStore::new(state.db.pool())
        .get_by_id(id)
        .await?
        .ok_or_else(|| NotifierError::NotFound(format!("news item {id}")))?;
    Ok(Json(item))
}

#[derive(Deserialize)]
struct RegisterReq {
    device_uuid: Uuid,
    push_token: String,
}

async fn register_device(
    State(state): State<AppState>,
    Json(body): Json<RegisterReq>,
) -> Result<impl IntoResponse, ApiError> {
    if body.push_token.trim().is_empty() {
        return Err(NotifierError::Validation("push_token must not be empty".to_string()).into());
    }
    let device = DeviceRegistry::new(state.db.pool())
        .register(body.device_uuid, &body.push_token)
        .await?;
    Ok(Json(device))
}

async fn deactivate_device(
    State(state): State<AppState>,
    ApiPath(uuid): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let existed = DeviceRegistry::new(state.db.pool()).deactivate(uuid).await?;
    if !existed {
        return Err(NotifierError::NotFound(format!("device {uuid}")).into());
    }
    Ok(Json(serde_json::json!({ "status": "deactivated" })))
}

async fn scheduler_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.status())
}

/// Fires a pipeline run in the background and returns immediately.
async fn run_now(State(state): State<AppState>) -> impl IntoResponse {
    state.scheduler.trigger_now();
    Json(serde_json::json!({ "status": "triggered" }))
}

async fn clear_news(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let summary = NewsStore::new(state.db.pool()).clear_all().await?;
    Ok(Json(summary))
}

#[derive(Deserialize)]
struct TestBroadcastReq {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

/// Sends a test notification to every active device.
async fn test_broadcast(
    State(state): State<AppState>,
    Json(req): Json<TestBroadcastReq>,
) -> Result<impl IntoResponse, ApiError> {
    let tokens = DeviceRegistry::new(state.db.pool()).tokens(true).await?;
    let title = req.title.as_deref().unwrap_or("Test Notification");
    let body = req.body.as_deref().unwrap_or("This is a test notification.");
    let data = serde_json::json!({ "type": "test" });
    let summary = send_to_all(state.transport.as_ref(), &tokens, title, body, &data).await;
    Ok(Json(summary))
}
