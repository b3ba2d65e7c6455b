use adgate_shared::{AdEvent, AdType, ConfirmationType};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Immutable view of ad event history taken at the start of a pipeline pass.
///
/// Every exclusion rule in one pass reads the same snapshot, so a write landing
/// mid-evaluation is never observed.
#[derive(Debug, Clone, Default)]
pub struct AdEventSnapshot {
    events: Arc<Vec<AdEvent>>,
}

impl AdEventSnapshot {
    pub fn new(events: Arc<Vec<AdEvent>>) -> Self {
        Self { events }
    }

    pub fn from_events(events: Vec<AdEvent>) -> Self {
        Self::new(Arc::new(events))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &AdEvent> {
        self.events.iter()
    }

    /// Timestamps for an `(ad_type, confirmation_type)` pair, in insertion order
    pub fn timestamps(&self, ad_type: AdType, confirmation_type: ConfirmationType) -> Vec<DateTime<Utc>> {
        self.events
            .iter()
            .filter(|e| e.ad_type == ad_type && e.confirmation_type == confirmation_type)
            .map(|e| e.created_at)
            .collect()
    }

    /// Count matching events created inside `(now - window, now]`.
    /// A `None` window counts all history up to `now`.
    pub fn count_within<F>(&self, now: DateTime<Utc>, window: Option<Duration>, predicate: F) -> usize
    where
        F: Fn(&AdEvent) -> bool,
    {
        self.events
            .iter()
            .filter(|e| is_within(e.created_at, now, window))
            .filter(|e| predicate(e))
            .count()
    }

    pub fn count_for_creative_instance(
        &self,
        creative_instance_id: &str,
        confirmation_type: ConfirmationType,
        now: DateTime<Utc>,
        window: Option<Duration>,
    ) -> usize {
        self.count_within(now, window, |e| {
            e.confirmation_type == confirmation_type && e.creative_instance_id == creative_instance_id
        })
    }

    pub fn count_for_ad_type(
        &self,
        ad_type: AdType,
        confirmation_type: ConfirmationType,
        now: DateTime<Utc>,
        window: Option<Duration>,
    ) -> usize {
        self.count_within(now, window, |e| {
            e.confirmation_type == confirmation_type && e.ad_type == ad_type
        })
    }

    /// Most recent matching event at or before `now`
    pub fn latest<F>(&self, now: DateTime<Utc>, predicate: F) -> Option<&AdEvent>
    where
        F: Fn(&AdEvent) -> bool,
    {
        self.events
            .iter()
            .filter(|e| e.created_at <= now)
            .filter(|e| predicate(e))
            .max_by_key(|e| e.created_at)
    }
}

fn is_within(created_at: DateTime<Utc>, now: DateTime<Utc>, window: Option<Duration>) -> bool {
    if created_at > now {
        return false;
    }
    match window {
        Some(window) => created_at > now - window,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn served(id: &str, created_at: DateTime<Utc>) -> AdEvent {
        AdEvent::for_id(id, AdType::NotificationAd, ConfirmationType::Served, created_at)
    }

    #[test]
    fn test_window_excludes_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap();
        let snapshot = AdEventSnapshot::from_events(vec![
            served("ci-1", now - Duration::days(1)),
            served("ci-1", now - Duration::hours(23)),
            served("ci-1", now),
        ]);

        let count = snapshot.count_for_creative_instance(
            "ci-1",
            ConfirmationType::Served,
            now,
            Some(Duration::days(1)),
        );
        assert_eq!(count, 2);

        let all_time =
            snapshot.count_for_creative_instance("ci-1", ConfirmationType::Served, now, None);
        assert_eq!(all_time, 3);
    }

    #[test]
    fn test_future_events_ignored() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap();
        let snapshot = AdEventSnapshot::from_events(vec![served("ci-1", now + Duration::minutes(5))]);

        assert_eq!(
            snapshot.count_for_ad_type(AdType::NotificationAd, ConfirmationType::Served, now, None),
            0
        );
        assert!(snapshot.latest(now, |_| true).is_none());
    }

    #[test]
    fn test_timestamps_keep_insertion_order() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap();
        let later = now + Duration::minutes(1);
        let earlier = now - Duration::minutes(1);
        let snapshot = AdEventSnapshot::from_events(vec![
            served("a", later),
            served("b", earlier),
        ]);

        assert_eq!(
            snapshot.timestamps(AdType::NotificationAd, ConfirmationType::Served),
            vec![later, earlier]
        );
    }
}
