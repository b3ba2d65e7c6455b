use adgate_core::repository::AdEventRepository;
use adgate_core::targeting::ConversionQueue;
use adgate_shared::{AdEvent, AdEventType, ConfirmationType, ServedAd};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error};

use crate::lifecycle::AdEventError;

/// Collaborators an event needs while firing
pub struct FireContext {
    pub events: Arc<dyn AdEventRepository>,
    pub conversions: Arc<dyn ConversionQueue>,
    pub now: DateTime<Utc>,
}

/// Persists one kind of ad event and runs its side effects
#[async_trait]
pub trait AdEventFirer: Send + Sync {
    fn event_type(&self) -> AdEventType;

    async fn fire(&self, served: &ServedAd, context: &FireContext) -> Result<(), AdEventError>;
}

pub fn event_firer(event_type: AdEventType) -> Box<dyn AdEventFirer> {
    match event_type {
        AdEventType::Served => Box::new(ServedEvent),
        AdEventType::Viewed => Box::new(ViewedEvent),
        AdEventType::Clicked => Box::new(ClickedEvent),
        AdEventType::Dismissed => Box::new(DismissedEvent),
        AdEventType::TimedOut => Box::new(TimedOutEvent),
    }
}

async fn record(
    served: &ServedAd,
    confirmation_type: ConfirmationType,
    context: &FireContext,
) -> Result<(), AdEventError> {
    let event = AdEvent::new(&served.ad, confirmation_type, context.now);
    context.events.record(&event).await.map_err(|e| {
        error!(placement_id = %served.ad.placement_id, "Failed to record ad event: {}", e);
        AdEventError::Persistence(e.to_string())
    })
}

/// Hand the ad to conversion tracking. The event is already recorded by the
/// time this runs, so a failing queue is logged and does not fail the fire.
async fn queue_conversion(served: &ServedAd, confirmation_type: ConfirmationType, context: &FireContext) {
    if !served.conversion {
        return;
    }

    debug!(creative_instance_id = %served.ad.creative_instance_id, %confirmation_type, "Queueing conversion");
    if let Err(e) = context.conversions.add(&served.ad, confirmation_type).await {
        error!(
            creative_instance_id = %served.ad.creative_instance_id,
            %confirmation_type,
            "Failed to queue conversion: {}",
            e
        );
    }
}

struct ServedEvent;

#[async_trait]
impl AdEventFirer for ServedEvent {
    fn event_type(&self) -> AdEventType {
        AdEventType::Served
    }

    async fn fire(&self, served: &ServedAd, context: &FireContext) -> Result<(), AdEventError> {
        record(served, ConfirmationType::Served, context).await
    }
}

struct ViewedEvent;

#[async_trait]
impl AdEventFirer for ViewedEvent {
    fn event_type(&self) -> AdEventType {
        AdEventType::Viewed
    }

    async fn fire(&self, served: &ServedAd, context: &FireContext) -> Result<(), AdEventError> {
        record(served, ConfirmationType::Viewed, context).await?;
        queue_conversion(served, ConfirmationType::Viewed, context).await;
        Ok(())
    }
}

struct ClickedEvent;

#[async_trait]
impl AdEventFirer for ClickedEvent {
    fn event_type(&self) -> AdEventType {
        AdEventType::Clicked
    }

    async fn fire(&self, served: &ServedAd, context: &FireContext) -> Result<(), AdEventError> {
        record(served, ConfirmationType::Clicked, context).await?;
        queue_conversion(served, ConfirmationType::Clicked, context).await;
        Ok(())
    }
}

struct DismissedEvent;

#[async_trait]
impl AdEventFirer for DismissedEvent {
    fn event_type(&self) -> AdEventType {
        AdEventType::Dismissed
    }

    async fn fire(&self, served: &ServedAd, context: &FireContext) -> Result<(), AdEventError> {
        record(served, ConfirmationType::Dismissed, context).await
    }
}

struct TimedOutEvent;

#[async_trait]
impl AdEventFirer for TimedOutEvent {
    fn event_type(&self) -> AdEventType {
        AdEventType::TimedOut
    }

    async fn fire(&self, served: &ServedAd, context: &FireContext) -> Result<(), AdEventError> {
        record(served, ConfirmationType::TimedOut, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adgate_core::ManualClock;
    use adgate_shared::{Ad, AdType};
    use adgate_store::{AdEventStore, StaticResources};
    use chrono::{Duration, TimeZone};

    fn served(conversion: bool) -> ServedAd {
        let ad = Ad {
            placement_id: "p-1".to_string(),
            ad_type: AdType::NotificationAd,
            creative_instance_id: "ci-1".to_string(),
            creative_set_id: "cs-1".to_string(),
            campaign_id: "c-1".to_string(),
            advertiser_id: "a-1".to_string(),
            segment: "sports".to_string(),
            title: String::new(),
            body: String::new(),
            target_url: "https://brave.com".to_string(),
        };
        ServedAd::new(ad, conversion, Utc::now(), Duration::hours(1))
    }

    #[test]
    fn test_factory_is_keyed_on_event_type() {
        for event_type in [
            AdEventType::Served,
            AdEventType::Viewed,
            AdEventType::Clicked,
            AdEventType::Dismissed,
            AdEventType::TimedOut,
        ] {
            assert_eq!(event_firer(event_type).event_type(), event_type);
        }
    }

    #[tokio::test]
    async fn test_clicked_records_and_queues_conversion() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let store = Arc::new(AdEventStore::new(Arc::new(ManualClock::new(now))));
        let resources = Arc::new(StaticResources::default());
        let context = FireContext {
            events: store.clone(),
            conversions: resources.clone(),
            now,
        };

        event_firer(AdEventType::Clicked).fire(&served(true), &context).await.unwrap();
        event_firer(AdEventType::Dismissed).fire(&served(true), &context).await.unwrap();

        let clicked = store.get(AdType::NotificationAd, ConfirmationType::Clicked).await.unwrap();
        assert_eq!(clicked, vec![now]);
        assert_eq!(
            resources.queued_conversions(),
            vec![("ci-1".to_string(), ConfirmationType::Clicked)]
        );
    }

    #[tokio::test]
    async fn test_no_conversion_without_flag() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let resources = Arc::new(StaticResources::default());
        let context = FireContext {
            events: Arc::new(AdEventStore::new(Arc::new(ManualClock::new(now)))),
            conversions: resources.clone(),
            now,
        };

        event_firer(AdEventType::Viewed).fire(&served(false), &context).await.unwrap();
        assert!(resources.queued_conversions().is_empty());
    }
}
