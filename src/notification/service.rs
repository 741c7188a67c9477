use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::notification::grouping::{self, GroupingContext};
use crate::notification::model::{
    GroupedFeed, NotificationError, NotificationGroup, NotificationRecord, NotificationSnapshot,
    UnseenFeed,
};
use crate::notification::source::NotificationSource;

/// Orchestrates the snapshot source and the grouping engine.
///
/// Runs without a source in degraded mode: every feed is served empty with
/// a null sequence token, so a missing Redis URL never breaks the read
/// path. Grouping itself never touches the source.
#[derive(Clone)]
pub struct NotificationService {
    source: Option<Arc<dyn NotificationSource>>,
    ctx: GroupingContext,
}

impl NotificationService {
    pub fn new(source: Option<Arc<dyn NotificationSource>>, ctx: GroupingContext) -> Self {
        Self { source, ctx }
    }

    /// Runs the engine over an arbitrary record list with this service's
    /// context. The websocket layer groups pub/sub deliveries through this.
    pub fn group_records(&self, records: &[NotificationRecord]) -> Vec<NotificationGroup> {
        grouping::group_notifications(&self.ctx, records)
    }

    async fn latest(
        &self,
        user_id: &Uuid,
    ) -> Result<Option<NotificationSnapshot>, NotificationError> {
        match &self.source {
            Some(source) => source.latest_snapshot(user_id).await,
            None => {
                debug!("No snapshot source configured, serving empty feed");
                Ok(None)
            }
        }
    }

    /// Grouped view of the user's latest snapshot. No snapshot published
    /// yet is an empty feed, not an error.
    pub async fn grouped_feed(&self, user_id: &Uuid) -> Result<GroupedFeed, NotificationError> {
        let snapshot = self.latest(user_id).await?;
        let (seq, groups) = match snapshot {
            Some(snapshot) => (
                Some(snapshot.seq),
                grouping::group_notifications(&self.ctx, &snapshot.records),
            ),
            None => (None, Vec::new()),
        };

        Ok(GroupedFeed {
            seq,
            generated_at: Utc::now(),
            groups,
        })
    }

    /// Flat list of the user's unviewed notifications.
    pub async fn unseen_feed(&self, user_id: &Uuid) -> Result<UnseenFeed, NotificationError> {
        let snapshot = self.latest(user_id).await?;
        let (seq, notifications) = match snapshot {
            Some(snapshot) => (
                Some(snapshot.seq),
                grouping::unseen_notifications(&snapshot.records),
            ),
            None => (None, Vec::new()),
        };

        Ok(UnseenFeed {
            seq,
            generated_at: Utc::now(),
            notifications,
        })
    }

    /// Grouped view of the unviewed subset only.
    pub async fn unseen_grouped_feed(
        &self,
        user_id: &Uuid,
    ) -> Result<GroupedFeed, NotificationError> {
        let snapshot = self.latest(user_id).await?;
        let (seq, groups) = match snapshot {
            Some(snapshot) => (
                Some(snapshot.seq),
                grouping::group_unseen_notifications(&self.ctx, &snapshot.records),
            ),
            None => (None, Vec::new()),
        };

        Ok(GroupedFeed {
            seq,
            generated_at: Utc::now(),
            groups,
        })
    }

    /// Grouped feed that is guaranteed current: recomputes, then discards
    /// the result when the source stamped a newer snapshot meanwhile.
    /// `None` means "superseded, ask again".
    pub async fn fresh_grouped_feed(
        &self,
        user_id: &Uuid,
    ) -> Result<Option<GroupedFeed>, NotificationError> {
        let feed = self.grouped_feed(user_id).await?;
        let Some(source) = &self.source else {
            return Ok(Some(feed));
        };

        let latest = source.latest_sequence(user_id).await?;
        if feed.seq.unwrap_or(0) < latest {
            debug!(
                "Discarding grouped feed for user {}: computed from seq {:?}, source is at {}",
                user_id, feed.seq, latest
            );
            return Ok(None);
        }
        Ok(Some(feed))
    }
}
