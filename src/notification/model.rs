use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::schema_ext::DateTimeWrapper;

/// One atomic notification event delivered to a user.
///
/// Records arrive from the snapshot source exactly as published. `is_seen`
/// is flipped by the upstream system that marks notifications viewed; this
/// service only reads and aggregates it. Extra JSON fields on the wire
/// (actor, text, links) are ignored on decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NotificationRecord {
    pub id: String,
    /// Creation timestamp in epoch milliseconds. Must be a valid timestamp;
    /// out-of-range values land in the `invalid-date` day bucket.
    pub created_time: i64,
    pub is_seen: bool,
    /// Open origin tag ("tip", "comment", ...). Absent counts as normal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    /// Subject entity (e.g. a market) this notification is about, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_contract_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GroupCategory {
    Income,
    Normal,
}

/// A display cluster of notifications sharing day, category and (for
/// normal groups) subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NotificationGroup {
    /// Synthesized key, unique within one grouping pass: `"income" + day`
    /// for income groups, the raw subject id (or "" when absent) otherwise.
    pub group_key: String,
    /// Calendar-day label all members fall on.
    pub time_period: String,
    pub category: GroupCategory,
    /// Newest-first for multi-member normal groups; input order for income.
    pub members: Vec<NotificationRecord>,
    /// Seen rollup. For normal groups: true when at least one member is
    /// still unseen. For income groups: a passthrough of the first member's
    /// `is_seen`, NOT an aggregate — the polarity differs from normal
    /// groups, so unread badges derived from income groups may undercount.
    pub is_seen: bool,
}

/// One full-replacement delivery of a user's notification list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NotificationSnapshot {
    /// Monotonically increasing token stamped by the publisher. Consumers
    /// drop results computed from a snapshot that is no longer the latest.
    pub seq: u64,
    pub records: Vec<NotificationRecord>,
}

/// Grouped view of the latest snapshot, as served to the feed UI.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupedFeed {
    /// Sequence token of the snapshot this feed was computed from; `None`
    /// when the user has no published snapshot yet.
    pub seq: Option<u64>,
    #[schema(value_type = DateTimeWrapper)]
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub groups: Vec<NotificationGroup>,
}

/// Flat unseen-only view of the latest snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UnseenFeed {
    pub seq: Option<u64>,
    #[schema(value_type = DateTimeWrapper)]
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub notifications: Vec<NotificationRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Cache error: {0}")]
    CacheError(#[from] redis::RedisError),

    #[error("Snapshot decode error: {0}")]
    DecodeError(#[from] serde_json::Error),

    #[error("Snapshot source not configured")]
    SourceNotConfigured,
}
