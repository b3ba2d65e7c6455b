use adgate_eligibility::BanditProcessor;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::notifications::NotificationHub;

/// Feed lifecycle notifications into the bandit until the hub closes
pub fn spawn_bandit_feedback(processor: Arc<BanditProcessor>, notifications: &NotificationHub) -> JoinHandle<()> {
    let mut rx = notifications.subscribe_ad_events();

    tokio::spawn(async move {
        info!("Bandit feedback worker started");
        loop {
            match rx.recv().await {
                Ok(notification) => {
                    if let Err(e) = processor.on_notification(&notification).await {
                        error!("Failed to update bandit arms: {}", e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Bandit feedback lagged behind notifications");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("Bandit feedback worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use adgate_core::repository::ArmStateRepository;
    use adgate_shared::{Ad, AdNotification, AdType};
    use adgate_store::InMemoryArmStore;

    fn ad(segment: &str) -> Ad {
        Ad {
            placement_id: "p-1".to_string(),
            ad_type: AdType::NotificationAd,
            creative_instance_id: "ci-1".to_string(),
            creative_set_id: "cs-1".to_string(),
            campaign_id: "c-1".to_string(),
            advertiser_id: "a-1".to_string(),
            segment: segment.to_string(),
            title: String::new(),
            body: String::new(),
            target_url: "https://brave.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_feedback_drains_until_hub_closes() {
        let store = Arc::new(InMemoryArmStore::new());
        let processor = Arc::new(BanditProcessor::new(store.clone(), vec!["sports".to_string()]));
        let hub = NotificationHub::default();

        let handle = spawn_bandit_feedback(processor, &hub);
        hub.publish_ad_event(AdNotification::Viewed { ad: ad("sports-soccer") });
        hub.publish_ad_event(AdNotification::TimedOut { ad: ad("sports-soccer") });
        drop(hub);

        handle.await.unwrap();

        let state = store.load().await.unwrap().unwrap();
        assert_eq!(state.arms["sports"].pulls, 1);
        assert_eq!(state.arms["sports"].value, 0.0);
    }
}
