use async_trait::async_trait;
use adgate_core::repository::AdEventRepository;
use adgate_core::{AdEventSnapshot, Clock, CoreResult};
use adgate_shared::{AdEvent, AdType, ConfirmationType};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// In-memory ad event history.
///
/// All writes are serialized through one lock. Readers take a cheap `Arc`
/// snapshot; a write that happens while a snapshot is alive copies the log
/// first, so the snapshot is never observed half-written.
pub struct AdEventStore {
    events: RwLock<Arc<Vec<AdEvent>>>,
    clock: Arc<dyn Clock>,
}

impl AdEventStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            events: RwLock::new(Arc::new(Vec::new())),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn append(&self, event: AdEvent) {
        let mut events = self.events.write().await;
        debug!(
            creative_instance_id = %event.creative_instance_id,
            ad_type = %event.ad_type,
            confirmation_type = %event.confirmation_type,
            "Recording ad event"
        );
        Arc::make_mut(&mut *events).push(event);
    }
}

#[async_trait]
impl AdEventRepository for AdEventStore {
    async fn record(&self, event: &AdEvent) -> CoreResult<()> {
        self.append(event.clone()).await;
        Ok(())
    }

    async fn record_for_id(
        &self,
        id: &str,
        ad_type: AdType,
        confirmation_type: ConfirmationType,
        created_at: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.append(AdEvent::for_id(id, ad_type, confirmation_type, created_at)).await;
        Ok(())
    }

    async fn get(
        &self,
        ad_type: AdType,
        confirmation_type: ConfirmationType,
    ) -> CoreResult<Vec<DateTime<Utc>>> {
        Ok(self.snapshot().await?.timestamps(ad_type, confirmation_type))
    }

    async fn snapshot(&self) -> CoreResult<AdEventSnapshot> {
        let events = self.events.read().await;
        Ok(AdEventSnapshot::new(Arc::clone(&*events)))
    }

    async fn purge_older_than(&self, max_age: Duration) -> CoreResult<usize> {
        let cutoff = self.clock.now() - max_age;
        let mut events = self.events.write().await;

        let before = events.len();
        Arc::make_mut(&mut *events).retain(|e| e.created_at >= cutoff);
        let purged = before - events.len();

        if purged > 0 {
            info!(purged, %cutoff, "Purged expired ad events");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adgate_core::ManualClock;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_get_returns_insertion_order() {
        let store = AdEventStore::new(Arc::new(ManualClock::new(start())));
        let times = [
            start() - Duration::hours(3),
            start() - Duration::hours(2),
            start() - Duration::hours(1),
        ];

        for (i, time) in times.iter().enumerate() {
            store
                .record_for_id(&format!("ci-{i}"), AdType::NotificationAd, ConfirmationType::Served, *time)
                .await
                .unwrap();
        }
        store
            .record_for_id("ci-x", AdType::NotificationAd, ConfirmationType::Clicked, start())
            .await
            .unwrap();

        let served = store.get(AdType::NotificationAd, ConfirmationType::Served).await.unwrap();
        assert_eq!(served, times.to_vec());

        // Restartable: a second read yields the same sequence
        let again = store.get(AdType::NotificationAd, ConfirmationType::Served).await.unwrap();
        assert_eq!(again, served);
    }

    #[tokio::test]
    async fn test_purge_keeps_remainder_intact() {
        let clock = Arc::new(ManualClock::new(start()));
        let store = AdEventStore::new(clock.clone());

        let old = AdEvent::for_id("old", AdType::NewTabPageAd, ConfirmationType::Served, start() - Duration::days(91));
        let boundary = AdEvent::for_id("edge", AdType::NewTabPageAd, ConfirmationType::Viewed, start() - Duration::days(90));
        let recent = AdEvent::for_id("new", AdType::NewTabPageAd, ConfirmationType::Served, start() - Duration::days(1));

        store.record(&old).await.unwrap();
        store.record(&boundary).await.unwrap();
        store.record(&recent).await.unwrap();

        let purged = store.purge_older_than(Duration::days(90)).await.unwrap();
        assert_eq!(purged, 1);

        let remaining: Vec<AdEvent> = store.snapshot().await.unwrap().iter().cloned().collect();
        assert_eq!(remaining, vec![boundary, recent]);
    }

    #[tokio::test]
    async fn test_snapshot_unaffected_by_later_writes() {
        let store = AdEventStore::new(Arc::new(ManualClock::new(start())));
        store
            .record_for_id("ci-1", AdType::NotificationAd, ConfirmationType::Served, start())
            .await
            .unwrap();

        let snapshot = store.snapshot().await.unwrap();
        store
            .record_for_id("ci-2", AdType::NotificationAd, ConfirmationType::Served, start())
            .await
            .unwrap();
        store.purge_older_than(Duration::zero() - Duration::days(1)).await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(store.is_empty().await);
    }
}
