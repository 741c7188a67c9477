use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, time};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::cache::redis::{channel_name, RedisCache};
use crate::notification::model::{GroupedFeed, NotificationError, NotificationSnapshot};
use crate::notification::service::NotificationService;

const HEARTBEAT_INTERVAL_SECONDS: u64 = 30;

/// Application state for the live notification feed
pub struct NotificationState {
    pub service: Arc<NotificationService>,
    pub redis_cache: Option<Arc<RedisCache>>,
}

/// A delivery only counts when its token advances past what the client
/// already has; pub/sub can replay or reorder under reconnects.
fn supersedes(last_sent: Option<u64>, incoming: u64) -> bool {
    last_sent.map(|last| incoming > last).unwrap_or(true)
}

/// Handle a socket we cannot serve (no snapshot store behind us)
async fn handle_invalid_socket(mut socket: WebSocket, error_message: String) {
    // Send error message to client
    if let Err(e) = socket
        .send(Message::Text(format!(
            r#"{{"error": "{}"}}"#,
            error_message
        )))
        .await
    {
        error!("Error sending error message on WS: {}", e);
    }

    // Close the connection
    let _ = socket.close().await;
}

/// Handle a live feed connection for one user
async fn handle_valid_connection(
    socket: WebSocket,
    user_id: Uuid,
    service: Arc<NotificationService>,
    redis_cache: Arc<RedisCache>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(100);

    // Push the current grouped feed before anything else, and remember its
    // token so replayed deliveries are dropped as stale
    let initial_seq = match service.grouped_feed(&user_id).await {
        Ok(feed) => {
            let seq = feed.seq;
            match serde_json::to_string(&feed) {
                Ok(json) => {
                    if let Err(e) = tx.send(Message::Text(json)).await {
                        error!("Failed to queue initial feed: {}", e);
                    }
                }
                Err(e) => error!("Failed to serialize initial feed: {}", e),
            }
            seq
        }
        Err(e) => {
            error!("Failed to compute initial feed for user {}: {}", user_id, e);
            None
        }
    };

    // Task to follow snapshot publishes for this user
    let tx_updates = tx.clone();
    let service_updates = service.clone();
    let update_task = tokio::spawn(async move {
        follow_snapshot_updates(user_id, redis_cache, service_updates, initial_seq, tx_updates)
            .await;
    });

    // Forward messages from channel to WebSocket
    let forward_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_sender.send(message).await {
                error!("Error forwarding message to WebSocket: {}", e);
                break;
            }
        }
    });

    // Heartbeat task
    let tx_heartbeat = tx.clone();
    let heartbeat_task = tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECONDS));
        loop {
            interval.tick().await;
            if let Err(e) = tx_heartbeat.send(Message::Ping(vec![])).await {
                error!("Error sending heartbeat: {}", e);
                break;
            }
        }
    });

    // Process incoming WebSocket messages
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                info!("WebSocket closed by client");
                break;
            }
            Ok(Message::Pong(_)) => {
                // Client responded to our ping
                debug!("Received pong from client");
            }
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    // Clean up
    update_task.abort();
    forward_task.abort();
    heartbeat_task.abort();

    info!("WebSocket connection closed for user: {}", user_id);
}

/// Handle incoming WebSocket connection
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<Uuid>,
    State(state): State<Arc<NotificationState>>,
) -> impl IntoResponse {
    let Some(redis_cache) = state.redis_cache.clone() else {
        return ws.on_upgrade(move |socket| async move {
            handle_invalid_socket(socket, NotificationError::SourceNotConfigured.to_string())
                .await;
        });
    };

    info!("User {} connected to notifications WebSocket", user_id);
    let service = state.service.clone();
    ws.on_upgrade(move |socket| async move {
        handle_valid_connection(socket, user_id, service, redis_cache).await;
    })
}

/// Subscribe to the user's snapshot channel and push a freshly grouped
/// feed for every delivery that supersedes the last one sent
async fn follow_snapshot_updates(
    user_id: Uuid,
    redis_cache: Arc<RedisCache>,
    service: Arc<NotificationService>,
    mut last_sent: Option<u64>,
    tx: mpsc::Sender<Message>,
) {
    let channel = channel_name(&user_id);
    info!("Subscribing to Redis channel: {}", channel);

    if let Ok(mut pubsub) = redis_cache.get_client().get_async_pubsub().await {
        // Subscribe to the channel
        if let Err(e) = pubsub.subscribe(&channel).await {
            error!("Failed to subscribe to Redis channel: {}", e);
            return;
        }

        info!("Successfully subscribed to Redis channel: {}", channel);

        let mut pubsub_stream = pubsub.on_message();

        while let Some(msg) = pubsub_stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to get message payload: {}", e);
                    continue;
                }
            };

            let snapshot: NotificationSnapshot = match serde_json::from_str(&payload) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!("Failed to decode snapshot delivery: {}", e);
                    continue;
                }
            };

            if !supersedes(last_sent, snapshot.seq) {
                debug!(
                    "Dropping stale snapshot {} for user {} (last sent {:?})",
                    snapshot.seq, user_id, last_sent
                );
                continue;
            }

            let feed = GroupedFeed {
                seq: Some(snapshot.seq),
                generated_at: chrono::Utc::now(),
                groups: service.group_records(&snapshot.records),
            };
            let json = match serde_json::to_string(&feed) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize grouped feed: {}", e);
                    continue;
                }
            };

            last_sent = Some(snapshot.seq);
            if let Err(e) = tx.send(Message::Text(json)).await {
                error!("Failed to forward grouped feed to WebSocket: {}", e);
                break;
            }
        }
    } else {
        error!("Failed to get Redis PubSub connection");
    }
}
