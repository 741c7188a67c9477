use redis::{AsyncCommands, Client, RedisError};
use tracing::info;
use uuid::Uuid;

// Redis key layout for the per-user snapshot boundary
pub const USER_KEY_PREFIX: &str = "notifications:user";

/// Key holding the latest full-replacement snapshot JSON for a user.
pub fn snapshot_key(user_id: &Uuid) -> String {
    format!("{}:{}:snapshot", USER_KEY_PREFIX, user_id)
}

/// Key holding the monotonically increasing sequence counter for a user.
pub fn sequence_key(user_id: &Uuid) -> String {
    format!("{}:{}:seq", USER_KEY_PREFIX, user_id)
}

/// Pub/sub channel snapshots are fanned out on for live listeners.
pub fn channel_name(user_id: &Uuid) -> String {
    format!("{}:{}", USER_KEY_PREFIX, user_id)
}

#[derive(Debug, Clone)]
pub struct RedisCache {
    client: Client,
}

impl RedisCache {
    pub fn new(client: Client) -> Self {
        // Connection validation happens on first use
        Self { client }
    }

    // Get the client (websocket subscribers need raw pub/sub connections)
    pub fn get_client(&self) -> &Client {
        &self.client
    }

    // Latest snapshot JSON for a user, if any has been published
    pub async fn get_snapshot(&self, user_id: &Uuid) -> Result<Option<String>, RedisError> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;

        let result: Option<String> = connection.get(snapshot_key(user_id)).await?;

        if result.is_some() {
            info!("Snapshot hit for user: {}", user_id);
        } else {
            info!("No snapshot published yet for user: {}", user_id);
        }

        Ok(result)
    }

    // Replace the stored snapshot for a user
    pub async fn store_snapshot(&self, user_id: &Uuid, json_data: &str) -> Result<(), RedisError> {
        self.get_client()
            .get_multiplexed_async_connection()
            .await?
            .set(snapshot_key(user_id), json_data)
            .await
            .map(|_: ()| ())
    }

    // Stamp and return the next sequence token for a user's snapshots
    pub async fn next_sequence(&self, user_id: &Uuid) -> Result<u64, RedisError> {
        let mut connection = self.get_client().get_multiplexed_async_connection().await?;

        let seq: u64 = connection.incr(sequence_key(user_id), 1).await?;
        Ok(seq)
    }

    // Highest sequence token stamped so far; 0 before the first publish
    pub async fn latest_sequence(&self, user_id: &Uuid) -> Result<u64, RedisError> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;

        let seq: Option<u64> = connection.get(sequence_key(user_id)).await?;
        Ok(seq.unwrap_or(0))
    }

    // Fan the snapshot out to live listeners on the user's channel
    pub async fn publish_snapshot(&self, user_id: &Uuid, json_data: &str) -> Result<(), RedisError> {
        let mut connection = self.get_client().get_multiplexed_async_connection().await?;

        let _: () = connection.publish(channel_name(user_id), json_data).await?;
        info!("Published snapshot update for user: {}", user_id);
        Ok(())
    }
}
