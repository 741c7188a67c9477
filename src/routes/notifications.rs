use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::notification::model::{GroupedFeed, NotificationError, NotificationRecord, UnseenFeed};
use crate::notification::service::NotificationService;
use crate::notification::source::RedisNotificationSource;
use crate::websocket::notifications::{ws_handler, NotificationState};

// A publisher racing the request can keep superseding our computation;
// give up after a few rounds and serve whatever is latest then.
const MAX_REGROUP_ATTEMPTS: usize = 3;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PublishResponse {
    /// Sequence token stamped on the accepted snapshot.
    pub seq: u64,
    pub record_count: usize,
}

fn error_response(err: NotificationError) -> (StatusCode, Json<ErrorResponse>) {
    error!("Notification feed request failed: {}", err);
    let (status, code) = match &err {
        NotificationError::CacheError(_) => (StatusCode::SERVICE_UNAVAILABLE, "CACHE_ERROR"),
        NotificationError::DecodeError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DECODE_ERROR"),
        NotificationError::SourceNotConfigured => {
            (StatusCode::SERVICE_UNAVAILABLE, "SOURCE_NOT_CONFIGURED")
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: code.to_string(),
        }),
    )
}

/// Grouped notification feed
///
/// Returns the user's latest snapshot folded into day/category/subject
/// groups, ordered for the feed UI. Users with no published snapshot get
/// an empty feed.
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/notifications/grouped",
    params(
        ("user_id" = String, Path, description = "User identifier")
    ),
    responses(
        (status = 200, description = "Grouped feed", body = GroupedFeed),
        (status = 400, description = "Malformed user id"),
        (status = 503, description = "Snapshot store unavailable", body = ErrorResponse)
    ),
    tag = "notifications"
)]
pub async fn get_grouped_feed(
    Path(user_id): Path<Uuid>,
    State(service): State<Arc<NotificationService>>,
) -> impl IntoResponse {
    // Only hand out a feed computed from the snapshot that is still the
    // latest; a result superseded mid-computation is recomputed instead
    for _ in 0..MAX_REGROUP_ATTEMPTS {
        match service.fresh_grouped_feed(&user_id).await {
            Ok(Some(feed)) => return (StatusCode::OK, Json(feed)).into_response(),
            Ok(None) => continue,
            Err(err) => return error_response(err).into_response(),
        }
    }

    match service.grouped_feed(&user_id).await {
        Ok(feed) => (StatusCode::OK, Json(feed)).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

/// Unseen notifications
///
/// Flat list of the user's not-yet-viewed notifications, input order
/// preserved.
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/notifications/unseen",
    params(
        ("user_id" = String, Path, description = "User identifier")
    ),
    responses(
        (status = 200, description = "Unseen notifications", body = UnseenFeed),
        (status = 400, description = "Malformed user id"),
        (status = 503, description = "Snapshot store unavailable", body = ErrorResponse)
    ),
    tag = "notifications"
)]
pub async fn get_unseen_feed(
    Path(user_id): Path<Uuid>,
    State(service): State<Arc<NotificationService>>,
) -> impl IntoResponse {
    match service.unseen_feed(&user_id).await {
        Ok(feed) => (StatusCode::OK, Json(feed)).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

/// Unseen notifications, grouped
///
/// The grouped feed computed over the unseen subset only.
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/notifications/unseen/grouped",
    params(
        ("user_id" = String, Path, description = "User identifier")
    ),
    responses(
        (status = 200, description = "Grouped unseen feed", body = GroupedFeed),
        (status = 400, description = "Malformed user id"),
        (status = 503, description = "Snapshot store unavailable", body = ErrorResponse)
    ),
    tag = "notifications"
)]
pub async fn get_unseen_grouped_feed(
    Path(user_id): Path<Uuid>,
    State(service): State<Arc<NotificationService>>,
) -> impl IntoResponse {
    match service.unseen_grouped_feed(&user_id).await {
        Ok(feed) => (StatusCode::OK, Json(feed)).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

/// Replace a user's notification snapshot
///
/// Ingest side of the boundary: accepts the full replacement list from the
/// upstream data source, stamps the next sequence token, stores the
/// snapshot and fans it out to live listeners.
#[utoipa::path(
    post,
    path = "/api/users/{user_id}/notifications",
    params(
        ("user_id" = String, Path, description = "User identifier")
    ),
    request_body = Vec<NotificationRecord>,
    responses(
        (status = 200, description = "Snapshot accepted", body = PublishResponse),
        (status = 400, description = "Malformed user id or body"),
        (status = 503, description = "Snapshot store unavailable", body = ErrorResponse)
    ),
    tag = "notifications"
)]
pub async fn publish_snapshot(
    Path(user_id): Path<Uuid>,
    State(source): State<Option<Arc<RedisNotificationSource>>>,
    Json(records): Json<Vec<NotificationRecord>>,
) -> impl IntoResponse {
    let Some(source) = source else {
        return error_response(NotificationError::SourceNotConfigured).into_response();
    };

    match source.publish_snapshot(&user_id, records).await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(PublishResponse {
                seq: snapshot.seq,
                record_count: snapshot.records.len(),
            }),
        )
            .into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

/// Create a router for the notification feed endpoints
pub fn routes(service: Arc<NotificationService>) -> Router {
    Router::new()
        .route(
            "/api/users/:user_id/notifications/grouped",
            get(get_grouped_feed),
        )
        .route(
            "/api/users/:user_id/notifications/unseen",
            get(get_unseen_feed),
        )
        .route(
            "/api/users/:user_id/notifications/unseen/grouped",
            get(get_unseen_grouped_feed),
        )
        .with_state(service)
}

/// Create a router for the snapshot ingest endpoint
pub fn ingest_routes(source: Option<Arc<RedisNotificationSource>>) -> Router {
    Router::new()
        .route("/api/users/:user_id/notifications", post(publish_snapshot))
        .with_state(source)
}

/// Create a router for the live feed websocket
pub fn live_routes(notification_state: Arc<NotificationState>) -> Router {
    Router::new()
        .route("/api/users/:user_id/notifications/ws", get(ws_handler))
        .with_state(notification_state)
}
