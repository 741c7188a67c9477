mod api_doc;
mod cache;
mod notification;
mod routes;
mod schema_ext;
mod websocket;

use axum::{routing::get, Router};
use chrono::FixedOffset;
use redis::Client;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api_doc::ApiDoc;
use crate::cache::redis::RedisCache;
use crate::notification::grouping::GroupingContext;
use crate::notification::service::NotificationService;
use crate::notification::source::{NotificationSource, RedisNotificationSource};
use crate::websocket::notifications::NotificationState;

// Simple app config struct
#[derive(Debug, Clone)]
struct AppConfig {
    redis_url: Option<String>,
    /// Fixed day-boundary offset for the grouping engine, minutes east of
    /// UTC. Never derived from the host timezone.
    feed_utc_offset_minutes: i32,
    /// Comma-separated override of the income classification set.
    income_source_types: Option<Vec<String>>,
}

fn load_config() -> AppConfig {
    AppConfig {
        redis_url: std::env::var("REDIS_URL").ok(),
        feed_utc_offset_minutes: std::env::var("FEED_UTC_OFFSET_MINUTES")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0),
        income_source_types: std::env::var("INCOME_SOURCE_TYPES").ok().map(|raw| {
            raw.split(',')
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect()
        }),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    tracing_subscriber::fmt::init();

    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let app_config = load_config();

    // Initialize the snapshot store if configured
    let redis_cache = if let Some(url) = &app_config.redis_url {
        info!("Initializing snapshot store with URL: {}", url);
        match Client::open(url.clone()) {
            Ok(client) => Some(Arc::new(RedisCache::new(client))),
            Err(e) => {
                error!("Failed to connect to Redis: {}", e);
                None
            }
        }
    } else {
        info!("No Redis URL configured, serving empty feeds");
        None
    };

    let day_offset = FixedOffset::east_opt(app_config.feed_utc_offset_minutes * 60)
        .unwrap_or_else(|| {
            warn!("FEED_UTC_OFFSET_MINUTES out of range, falling back to UTC");
            FixedOffset::east_opt(0).unwrap()
        });

    let grouping_context = match &app_config.income_source_types {
        Some(types) if !types.is_empty() => GroupingContext::new(types.clone(), day_offset),
        _ => GroupingContext::with_offset(day_offset),
    };

    // Wire the service: snapshot source behind the trait, engine context
    let redis_source = redis_cache
        .as_ref()
        .map(|cache| Arc::new(RedisNotificationSource::new((**cache).clone())));
    let source = redis_source
        .clone()
        .map(|source| source as Arc<dyn NotificationSource>);
    let notification_service = Arc::new(NotificationService::new(source, grouping_context));

    let notification_state = Arc::new(NotificationState {
        service: notification_service.clone(),
        redis_cache: redis_cache.clone(),
    });

    // Build the router
    let app = Router::new()
        // API documentation
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Health routes
        .merge(routes::health::routes())
        // Notification feed routes
        .merge(routes::notifications::routes(notification_service.clone()))
        // Snapshot ingest
        .merge(routes::notifications::ingest_routes(redis_source))
        // Live feed websocket
        .merge(routes::notifications::live_routes(notification_state))
        // Add welcome route
        .route(
            "/",
            get(|| async { "Welcome to Notification Feed Backend API" }),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Try different ports
    let mut port = 9500;
    let max_tries = 5;
    for attempt in 1..=max_tries {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        match axum::Server::try_bind(&addr) {
            Ok(server) => {
                println!(
                    "🚀 Server started successfully at http://localhost:{}",
                    port
                );
                println!("📄 API Documentation: http://localhost:{}/docs", port);
                println!(
                    "🔔 Live Feed API: ws://localhost:{}/api/users/<user_id>/notifications/ws",
                    port
                );
                return server
                    .serve(app.into_make_service())
                    .await
                    .map_err(|e| e.into());
            }
            Err(_) => {
                if attempt == max_tries {
                    return Err("Failed to bind to any port".into());
                }
                port += 1;
            }
        }
    }

    Err("Failed to bind to any port".into())
}
