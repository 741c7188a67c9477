use chrono::{FixedOffset, TimeZone, Utc};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use crate::notification::model::{GroupCategory, NotificationGroup, NotificationRecord};

/// Origin tags treated as income. The set is configuration, not an inline
/// check, so the classification boundary stays a single reviewable list.
pub const DEFAULT_INCOME_SOURCE_TYPES: [&str; 5] = [
    "bonus",
    "tip",
    "loan",
    "betting_streak_bonus",
    "tip_and_like",
];

/// Shared group key for records that carry no subject id. All subjectless
/// normal records of a day collapse into this one group.
pub const NO_SUBJECT_KEY: &str = "";

/// Day bucket for records whose timestamp is outside the representable
/// range. A caller contract violation, kept total instead of panicking.
pub const INVALID_DAY_LABEL: &str = "invalid-date";

/// Classification set and day boundary for one grouping pass.
///
/// The day boundary is an explicit fixed offset supplied by the caller, so
/// grouping never depends on the ambient process timezone and the same
/// input yields the same output on any host.
#[derive(Debug, Clone)]
pub struct GroupingContext {
    income_source_types: HashSet<String>,
    day_offset: FixedOffset,
}

impl GroupingContext {
    pub fn new<I, S>(income_source_types: I, day_offset: FixedOffset) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            income_source_types: income_source_types.into_iter().map(Into::into).collect(),
            day_offset,
        }
    }

    /// Default income set with a caller-chosen day boundary.
    pub fn with_offset(day_offset: FixedOffset) -> Self {
        Self::new(DEFAULT_INCOME_SOURCE_TYPES, day_offset)
    }

    fn is_income(&self, record: &NotificationRecord) -> bool {
        record
            .source_type
            .as_deref()
            .map(|tag| self.income_source_types.contains(tag))
            .unwrap_or(false)
    }

    fn day_label(&self, created_time: i64) -> String {
        match Utc.timestamp_millis_opt(created_time) {
            chrono::LocalResult::Single(instant) => instant
                .with_timezone(&self.day_offset)
                .format("%Y-%m-%d")
                .to_string(),
            _ => INVALID_DAY_LABEL.to_string(),
        }
    }
}

impl Default for GroupingContext {
    fn default() -> Self {
        Self::with_offset(FixedOffset::east_opt(0).unwrap())
    }
}

/// Partitions a user's notification list into display-ready groups.
///
/// Days appear in the order they first appear in the input. Within a day,
/// the income group (if any) comes first, then one group per subject id in
/// first-appearance order. Every input record lands in exactly one group;
/// nothing is dropped or duplicated, and the same input always produces
/// the same output.
pub fn group_notifications(
    ctx: &GroupingContext,
    records: &[NotificationRecord],
) -> Vec<NotificationGroup> {
    partition_ordered(records, |record| ctx.day_label(record.created_time))
        .into_iter()
        .flat_map(|(day, day_records)| group_day(ctx, &day, day_records))
        .collect()
}

/// The records the user has not viewed yet, input order preserved.
pub fn unseen_notifications(records: &[NotificationRecord]) -> Vec<NotificationRecord> {
    records
        .iter()
        .filter(|record| !record.is_seen)
        .cloned()
        .collect()
}

/// Grouping applied to the unseen subset only. Pure composition of
/// [`unseen_notifications`] and [`group_notifications`].
pub fn group_unseen_notifications(
    ctx: &GroupingContext,
    records: &[NotificationRecord],
) -> Vec<NotificationGroup> {
    group_notifications(ctx, &unseen_notifications(records))
}

/// Buckets records by key, keys ordered by first appearance in the input.
fn partition_ordered<F>(
    records: &[NotificationRecord],
    mut key_of: F,
) -> Vec<(String, Vec<NotificationRecord>)>
where
    F: FnMut(&NotificationRecord) -> String,
{
    let mut buckets: Vec<(String, Vec<NotificationRecord>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for record in records {
        let key = key_of(record);
        match index.get(&key) {
            Some(&slot) => buckets[slot].1.push(record.clone()),
            None => {
                index.insert(key.clone(), buckets.len());
                buckets.push((key, vec![record.clone()]));
            }
        }
    }
    buckets
}

fn group_day(
    ctx: &GroupingContext,
    day: &str,
    records: Vec<NotificationRecord>,
) -> Vec<NotificationGroup> {
    let (income, normal): (Vec<_>, Vec<_>) =
        records.into_iter().partition(|record| ctx.is_income(record));

    // Income rollup is a passthrough of one member, not an any-unseen
    // aggregate. Normal groups below use the aggregate. Kept asymmetric.
    let income_group = income.first().map(|first| NotificationGroup {
        group_key: format!("income{day}"),
        time_period: day.to_string(),
        category: GroupCategory::Income,
        is_seen: first.is_seen,
        members: income.clone(),
    });

    let subject_groups = partition_ordered(&normal, |record| {
        record
            .source_contract_id
            .clone()
            .unwrap_or_else(|| NO_SUBJECT_KEY.to_string())
    })
    .into_iter()
    .map(|(subject, mut members)| {
        // Stable sort: equal timestamps keep their input order.
        members.sort_by_key(|record| Reverse(record.created_time));
        NotificationGroup {
            group_key: subject,
            time_period: day.to_string(),
            category: GroupCategory::Normal,
            is_seen: members.iter().any(|record| !record.is_seen),
            members,
        }
    });

    income_group.into_iter().chain(subject_groups).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY1_NOON: i64 = 1672574400000; // 2023-01-01T12:00:00Z
    const DAY1_LATE: i64 = 1672615800000; // 2023-01-01T23:30:00Z
    const DAY2_NOON: i64 = 1672660800000; // 2023-01-02T12:00:00Z

    fn record(
        id: &str,
        created_time: i64,
        is_seen: bool,
        source_type: Option<&str>,
        source_contract_id: Option<&str>,
    ) -> NotificationRecord {
        NotificationRecord {
            id: id.to_string(),
            created_time,
            is_seen,
            source_type: source_type.map(str::to_string),
            source_contract_id: source_contract_id.map(str::to_string),
        }
    }

    fn ctx() -> GroupingContext {
        GroupingContext::default()
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(group_notifications(&ctx(), &[]).is_empty());
    }

    #[test]
    fn income_and_normal_split_within_a_day() {
        let records = vec![
            record("a", DAY1_NOON, false, Some("tip"), None),
            record("b", DAY1_NOON + 1000, false, Some("comment"), Some("m1")),
        ];

        let groups = group_notifications(&ctx(), &records);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].category, GroupCategory::Income);
        assert_eq!(groups[0].group_key, "income2023-01-01");
        assert_eq!(groups[0].members.len(), 1);
        assert_eq!(groups[0].members[0].id, "a");
        assert_eq!(groups[1].category, GroupCategory::Normal);
        assert_eq!(groups[1].group_key, "m1");
        assert_eq!(groups[1].members[0].id, "b");
    }

    #[test]
    fn normal_group_members_sort_newest_first() {
        let records = vec![
            record("a", 300, true, None, Some("m1")),
            record("b", 100, true, None, Some("m1")),
            record("c", 200, true, None, Some("m1")),
        ];

        let groups = group_notifications(&ctx(), &records);

        assert_eq!(groups.len(), 1);
        let times: Vec<i64> = groups[0].members.iter().map(|r| r.created_time).collect();
        assert_eq!(times, vec![300, 200, 100]);
    }

    #[test]
    fn normal_sort_ties_keep_input_order() {
        let records = vec![
            record("a", 100, true, None, Some("m1")),
            record("b", 100, true, None, Some("m1")),
            record("c", 200, true, None, Some("m1")),
        ];

        let groups = group_notifications(&ctx(), &records);

        let ids: Vec<&str> = groups[0].members.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn normal_rollup_is_true_when_any_member_unseen() {
        let records = vec![
            record("a", DAY1_NOON, true, None, Some("m1")),
            record("b", DAY1_NOON + 1000, false, None, Some("m1")),
        ];

        let groups = group_notifications(&ctx(), &records);

        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_seen);
    }

    #[test]
    fn normal_rollup_is_false_when_all_members_seen() {
        let records = vec![
            record("a", DAY1_NOON, true, None, Some("m1")),
            record("b", DAY1_NOON + 1000, true, None, Some("m1")),
        ];

        let groups = group_notifications(&ctx(), &records);

        assert!(!groups[0].is_seen);
    }

    #[test]
    fn income_rollup_mirrors_first_member_only() {
        // First income record seen, a later one unseen: the flag follows
        // the first member, it is not an aggregate.
        let records = vec![
            record("a", DAY1_NOON, true, Some("bonus"), None),
            record("b", DAY1_NOON + 1000, false, Some("tip"), None),
        ];

        let groups = group_notifications(&ctx(), &records);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].category, GroupCategory::Income);
        assert!(groups[0].is_seen);
    }

    #[test]
    fn income_members_keep_input_order() {
        let records = vec![
            record("a", DAY1_LATE, false, Some("tip"), None),
            record("b", DAY1_NOON, false, Some("bonus"), None),
        ];

        let groups = group_notifications(&ctx(), &records);

        let ids: Vec<&str> = groups[0].members.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn every_default_income_tag_classifies_as_income() {
        for tag in DEFAULT_INCOME_SOURCE_TYPES {
            let records = vec![record("a", DAY1_NOON, false, Some(tag), Some("m1"))];
            let groups = group_notifications(&ctx(), &records);
            assert_eq!(groups.len(), 1, "tag {tag} should form an income group");
            assert_eq!(groups[0].category, GroupCategory::Income);
        }
    }

    #[test]
    fn untagged_records_are_normal() {
        let records = vec![record("a", DAY1_NOON, false, None, None)];

        let groups = group_notifications(&ctx(), &records);

        assert_eq!(groups[0].category, GroupCategory::Normal);
    }

    #[test]
    fn custom_income_set_overrides_default() {
        let ctx = GroupingContext::new(["airdrop"], FixedOffset::east_opt(0).unwrap());
        let records = vec![
            record("a", DAY1_NOON, false, Some("airdrop"), None),
            record("b", DAY1_NOON, false, Some("tip"), Some("m1")),
        ];

        let groups = group_notifications(&ctx, &records);

        assert_eq!(groups[0].category, GroupCategory::Income);
        assert_eq!(groups[0].members[0].id, "a");
        assert_eq!(groups[1].category, GroupCategory::Normal);
        assert_eq!(groups[1].members[0].id, "b");
    }

    #[test]
    fn subjectless_records_collapse_into_one_group() {
        let records = vec![
            record("a", DAY1_NOON, false, None, None),
            record("b", DAY1_NOON + 1000, false, None, Some("m1")),
            record("c", DAY1_NOON + 2000, false, None, None),
        ];

        let groups = group_notifications(&ctx(), &records);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].group_key, NO_SUBJECT_KEY);
        let ids: Vec<&str> = groups[0].members.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(groups[1].group_key, "m1");
    }

    #[test]
    fn days_split_and_follow_first_appearance_order() {
        // Day 2 appears first in the input, so it leads the output.
        let records = vec![
            record("a", DAY2_NOON, false, None, Some("m1")),
            record("b", DAY1_NOON, false, Some("tip"), None),
            record("c", DAY2_NOON + 1000, false, None, Some("m2")),
        ];

        let groups = group_notifications(&ctx(), &records);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].time_period, "2023-01-02");
        assert_eq!(groups[0].group_key, "m1");
        assert_eq!(groups[1].time_period, "2023-01-02");
        assert_eq!(groups[1].group_key, "m2");
        assert_eq!(groups[2].time_period, "2023-01-01");
        assert_eq!(groups[2].category, GroupCategory::Income);
    }

    #[test]
    fn subject_groups_follow_first_appearance_order_within_a_day() {
        let records = vec![
            record("a", DAY1_NOON, false, None, Some("m2")),
            record("b", DAY1_NOON + 1000, false, None, Some("m1")),
            record("c", DAY1_NOON + 2000, false, None, Some("m2")),
        ];

        let groups = group_notifications(&ctx(), &records);

        let keys: Vec<&str> = groups.iter().map(|g| g.group_key.as_str()).collect();
        assert_eq!(keys, vec!["m2", "m1"]);
    }

    #[test]
    fn partition_property_no_loss_no_duplication() {
        let records = vec![
            record("a", DAY1_NOON, false, Some("tip"), None),
            record("b", DAY1_LATE, true, None, Some("m1")),
            record("c", DAY2_NOON, false, None, Some("m1")),
            record("d", DAY2_NOON, true, Some("loan"), Some("m2")),
            record("e", DAY2_NOON + 500, false, None, None),
        ];

        let groups = group_notifications(&ctx(), &records);

        let mut grouped_ids: Vec<&str> = groups
            .iter()
            .flat_map(|g| g.members.iter().map(|r| r.id.as_str()))
            .collect();
        grouped_ids.sort_unstable();
        assert_eq!(grouped_ids, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn grouping_is_deterministic() {
        let records = vec![
            record("a", DAY1_NOON, false, Some("tip"), None),
            record("b", DAY1_LATE, true, None, Some("m1")),
            record("c", DAY2_NOON, false, None, Some("m1")),
            record("d", DAY2_NOON, true, Some("loan"), Some("m2")),
        ];

        let first = group_notifications(&ctx(), &records);
        let second = group_notifications(&ctx(), &records);

        assert_eq!(first, second);
    }

    #[test]
    fn group_keys_are_unique_per_pass() {
        let records = vec![
            record("a", DAY1_NOON, false, Some("tip"), None),
            record("b", DAY1_NOON, false, None, Some("m1")),
            record("c", DAY1_NOON, false, None, None),
            record("d", DAY2_NOON, false, Some("bonus"), None),
            record("e", DAY2_NOON, false, None, Some("m2")),
        ];

        let groups = group_notifications(&ctx(), &records);

        let mut keys: Vec<&str> = groups.iter().map(|g| g.group_key.as_str()).collect();
        keys.sort_unstable();
        let before = keys.len();
        keys.dedup();
        assert_eq!(keys.len(), before);
    }

    #[test]
    fn normal_group_members_share_one_subject() {
        let records = vec![
            record("a", DAY1_NOON, false, None, Some("m1")),
            record("b", DAY1_NOON + 1000, false, None, Some("m2")),
            record("c", DAY1_NOON + 2000, false, None, Some("m1")),
            record("d", DAY1_NOON + 3000, false, None, None),
        ];

        let groups = group_notifications(&ctx(), &records);

        for group in groups.iter().filter(|g| g.category == GroupCategory::Normal) {
            let subjects: Vec<&str> = group
                .members
                .iter()
                .map(|r| r.source_contract_id.as_deref().unwrap_or(NO_SUBJECT_KEY))
                .collect();
            assert!(subjects.iter().all(|s| *s == group.group_key));
        }
    }

    #[test]
    fn members_share_their_group_day() {
        let records = vec![
            record("a", DAY1_NOON, false, Some("tip"), None),
            record("b", DAY1_LATE, false, Some("bonus"), None),
            record("c", DAY2_NOON, false, None, Some("m1")),
        ];

        let groups = group_notifications(&ctx(), &records);

        for group in &groups {
            for member in &group.members {
                assert_eq!(ctx().day_label(member.created_time), group.time_period);
            }
        }
    }

    #[test]
    fn day_boundary_follows_the_supplied_offset() {
        // 23:30 UTC crosses into the next day one hour east of UTC.
        let utc = GroupingContext::with_offset(FixedOffset::east_opt(0).unwrap());
        let east = GroupingContext::with_offset(FixedOffset::east_opt(3600).unwrap());
        let records = vec![record("a", DAY1_LATE, false, None, None)];

        assert_eq!(group_notifications(&utc, &records)[0].time_period, "2023-01-01");
        assert_eq!(group_notifications(&east, &records)[0].time_period, "2023-01-02");
    }

    #[test]
    fn out_of_range_timestamp_degrades_to_invalid_day() {
        let records = vec![record("a", i64::MAX, false, None, Some("m1"))];

        let groups = group_notifications(&ctx(), &records);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].time_period, INVALID_DAY_LABEL);
        assert_eq!(groups[0].members[0].id, "a");
    }

    #[test]
    fn unseen_filter_keeps_only_unviewed_records() {
        let records = vec![
            record("a", DAY1_NOON, true, None, Some("m1")),
            record("b", DAY1_NOON, false, None, Some("m1")),
            record("c", DAY1_NOON, false, Some("tip"), None),
        ];

        let unseen = unseen_notifications(&records);

        let ids: Vec<&str> = unseen.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn unseen_grouping_composes_filter_then_engine() {
        let records = vec![
            record("a", DAY1_NOON, true, None, Some("m1")),
            record("b", DAY1_NOON, false, None, Some("m1")),
            record("c", DAY1_NOON, false, Some("tip"), None),
        ];

        let direct = group_unseen_notifications(&ctx(), &records);
        let composed = group_notifications(&ctx(), &unseen_notifications(&records));

        assert_eq!(direct, composed);
        assert_eq!(direct.len(), 2);
        assert!(direct
            .iter()
            .all(|g| g.members.iter().all(|r| !r.is_seen)));
    }
}
