use adgate_core::repository::AdEventRepository;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{error, info};

use crate::app_config::HistoryConfig;

/// Periodically drop ad events older than the configured retention.
/// The first sweep runs immediately.
pub fn spawn_purge_worker(
    ad_events: Arc<dyn AdEventRepository>,
    config: HistoryConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.purge_interval_secs.max(1)));
        info!(
            purge_after_days = config.purge_after_days,
            "Ad event purge worker started"
        );

        loop {
            ticker.tick().await;
            match ad_events.purge_older_than(config.purge_after()).await {
                Ok(purged) => info!(purged, "Ad event purge sweep finished"),
                Err(e) => error!("Ad event purge failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ad_event_store::AdEventStore;
    use adgate_core::ManualClock;
    use adgate_shared::{AdType, ConfirmationType};
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_first_sweep_purges_old_events() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let store = Arc::new(AdEventStore::new(Arc::new(ManualClock::new(now))));
        store
            .record_for_id("old", AdType::NotificationAd, ConfirmationType::Served, now - chrono::Duration::days(120))
            .await
            .unwrap();
        store
            .record_for_id("new", AdType::NotificationAd, ConfirmationType::Served, now)
            .await
            .unwrap();

        let handle = spawn_purge_worker(store.clone(), HistoryConfig::default());

        let mut remaining = store.len().await;
        for _ in 0..100 {
            if remaining == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            remaining = store.len().await;
        }
        handle.abort();

        assert_eq!(remaining, 1);
    }
}
