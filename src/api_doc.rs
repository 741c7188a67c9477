use utoipa::OpenApi;

/// API documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Notification Feed Backend API",
        version = "0.1.0",
        description = "REST API serving grouped, display-ready notification feeds"
    ),
    paths(
        // Health check endpoint
        crate::routes::health::health_check,
        // Notification feed endpoints
        crate::routes::notifications::get_grouped_feed,
        crate::routes::notifications::get_unseen_feed,
        crate::routes::notifications::get_unseen_grouped_feed,
        crate::routes::notifications::publish_snapshot
    ),
    components(
        schemas(
            // Health schemas
            crate::routes::health::HealthResponse,
            // Notification schemas
            crate::notification::model::NotificationRecord,
            crate::notification::model::NotificationGroup,
            crate::notification::model::GroupCategory,
            crate::notification::model::NotificationSnapshot,
            crate::notification::model::GroupedFeed,
            crate::notification::model::UnseenFeed,
            crate::routes::notifications::ErrorResponse,
            crate::routes::notifications::PublishResponse,
            // External type schemas
            crate::schema_ext::DateTimeWrapper
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "notifications", description = "Grouped notification feed endpoints")
    )
)]
pub struct ApiDoc;
