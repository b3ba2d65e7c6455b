use adgate_shared::{AdNotification, ServingNotification};
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out of lifecycle and serving notifications to any number of subscribers
#[derive(Clone)]
pub struct NotificationHub {
    ad_tx: broadcast::Sender<AdNotification>,
    serving_tx: broadcast::Sender<ServingNotification>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (ad_tx, _) = broadcast::channel(capacity);
        let (serving_tx, _) = broadcast::channel(capacity);
        Self { ad_tx, serving_tx }
    }

    pub fn subscribe_ad_events(&self) -> broadcast::Receiver<AdNotification> {
        self.ad_tx.subscribe()
    }

    pub fn subscribe_serving(&self) -> broadcast::Receiver<ServingNotification> {
        self.serving_tx.subscribe()
    }

    pub fn publish_ad_event(&self, notification: AdNotification) {
        // No subscribers is fine
        if self.ad_tx.send(notification).is_err() {
            trace!("No ad event subscribers");
        }
    }

    pub fn publish_serving(&self, notification: ServingNotification) {
        if self.serving_tx.send(notification).is_err() {
            trace!("No serving subscribers");
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adgate_shared::AdType;

    #[tokio::test]
    async fn test_fan_out_to_every_subscriber() {
        let hub = NotificationHub::default();
        let mut first = hub.subscribe_serving();
        let mut second = hub.subscribe_serving();

        let notification = ServingNotification::NoEligibleAds {
            ad_type: AdType::NotificationAd,
            reason: "nothing left".to_string(),
        };
        hub.publish_serving(notification.clone());

        assert_eq!(first.recv().await.unwrap(), notification);
        assert_eq!(second.recv().await.unwrap(), notification);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = NotificationHub::default();
        hub.publish_serving(ServingNotification::NotAllowed {
            ad_type: AdType::NewTabPageAd,
            reason: "capped".to_string(),
        });
    }
}
