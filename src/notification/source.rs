use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::redis::RedisCache;
use crate::notification::model::{NotificationError, NotificationRecord, NotificationSnapshot};

/// Read side of the per-user snapshot boundary.
///
/// Publishers replace the whole list on every update; consumers only ever
/// ask for the latest state. There is no diffing and no history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSource: Send + Sync {
    /// Most recently published snapshot for the user, or `None` when
    /// nothing has been published yet.
    async fn latest_snapshot(
        &self,
        user_id: &Uuid,
    ) -> Result<Option<NotificationSnapshot>, NotificationError>;

    /// Highest sequence token stamped so far for the user. Used to detect
    /// that a computed result is already stale.
    async fn latest_sequence(&self, user_id: &Uuid) -> Result<u64, NotificationError>;
}

/// Snapshot source backed by the Redis snapshot key and pub/sub channel.
#[derive(Debug, Clone)]
pub struct RedisNotificationSource {
    cache: RedisCache,
}

impl RedisNotificationSource {
    pub fn new(cache: RedisCache) -> Self {
        Self { cache }
    }

    /// Stamp the next sequence token, replace the stored snapshot and fan
    /// it out on the user's channel. This is the ingest side of the
    /// boundary, also used by integration-style tooling.
    pub async fn publish_snapshot(
        &self,
        user_id: &Uuid,
        records: Vec<NotificationRecord>,
    ) -> Result<NotificationSnapshot, NotificationError> {
        let seq = self.cache.next_sequence(user_id).await?;
        let snapshot = NotificationSnapshot { seq, records };
        let json = serde_json::to_string(&snapshot)?;

        self.cache.store_snapshot(user_id, &json).await?;
        self.cache.publish_snapshot(user_id, &json).await?;

        info!(
            "Published snapshot {} with {} records for user {}",
            snapshot.seq,
            snapshot.records.len(),
            user_id
        );
        Ok(snapshot)
    }
}

#[async_trait]
impl NotificationSource for RedisNotificationSource {
    async fn latest_snapshot(
        &self,
        user_id: &Uuid,
    ) -> Result<Option<NotificationSnapshot>, NotificationError> {
        match self.cache.get_snapshot(user_id).await? {
            Some(json) => {
                let snapshot: NotificationSnapshot = serde_json::from_str(&json)?;
                debug!(
                    "Decoded snapshot {} ({} records) for user {}",
                    snapshot.seq,
                    snapshot.records.len(),
                    user_id
                );
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    async fn latest_sequence(&self, user_id: &Uuid) -> Result<u64, NotificationError> {
        Ok(self.cache.latest_sequence(user_id).await?)
    }
}
