use adgate_core::repository::{AdEventRepository, CreativeAdRepository};
use adgate_core::targeting::ConversionQueue;
use adgate_core::Clock;
use adgate_shared::{Ad, AdEventType, AdNotification, ServedAd};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::event_factory::{event_firer, FireContext};
use crate::notifications::NotificationHub;

struct Placement {
    served: ServedAd,
    /// Events fired or being fired
    fired: HashSet<AdEventType>,
    /// A terminal event is being written
    retiring: bool,
}

impl Placement {
    fn new(served: ServedAd) -> Self {
        Self {
            served,
            fired: HashSet::new(),
            retiring: false,
        }
    }
}

/// An event reserved on a placement while its write is in flight
struct Claim {
    served: ServedAd,
    /// The placement was created by this fire and goes away if it fails
    inserted: bool,
}

/// Tracks served placements and fires their lifecycle events.
///
/// Placements advance `Served -> Viewed -> Clicked | Dismissed | TimedOut`.
/// The order is not enforced, but each of served/viewed/clicked fires at most
/// once per placement and a terminal event retires the placement.
///
/// The registry lock only covers bookkeeping. Writes to history and the
/// conversion queue run unlocked, with the event marked in flight so that
/// concurrent duplicates are still rejected.
pub struct AdEventLifecycleHandler {
    events: Arc<dyn AdEventRepository>,
    creative_ads: Arc<dyn CreativeAdRepository>,
    conversions: Arc<dyn ConversionQueue>,
    notifications: NotificationHub,
    clock: Arc<dyn Clock>,
    served_ad_ttl: Duration,
    placements: Mutex<HashMap<String, Placement>>,
}

impl AdEventLifecycleHandler {
    pub fn new(
        events: Arc<dyn AdEventRepository>,
        creative_ads: Arc<dyn CreativeAdRepository>,
        conversions: Arc<dyn ConversionQueue>,
        notifications: NotificationHub,
        clock: Arc<dyn Clock>,
        served_ad_ttl: Duration,
    ) -> Self {
        Self {
            events,
            creative_ads,
            conversions,
            notifications,
            clock,
            served_ad_ttl,
            placements: Mutex::new(HashMap::new()),
        }
    }

    /// Bind a fresh placement to the ad chosen for it. Nothing is recorded
    /// until the served event fires.
    pub async fn register(&self, ad: Ad, conversion: bool) -> ServedAd {
        let served = ServedAd::new(ad, conversion, self.clock.now(), self.served_ad_ttl);
        self.placements
            .lock()
            .await
            .insert(served.ad.placement_id.clone(), Placement::new(served.clone()));
        served
    }

    /// Forget a placement, e.g. when its served event could not be recorded
    pub async fn remove_placement(&self, placement_id: &str) -> Option<ServedAd> {
        self.placements
            .lock()
            .await
            .remove(placement_id)
            .map(|p| p.served)
    }

    pub async fn placement(&self, placement_id: &str) -> Option<ServedAd> {
        self.placements
            .lock()
            .await
            .get(placement_id)
            .map(|p| p.served.clone())
    }

    pub async fn placement_count(&self) -> usize {
        self.placements.lock().await.len()
    }

    /// Drop placements whose TTL ran out without a terminal event
    pub async fn purge_expired_placements(&self) -> usize {
        let now = self.clock.now();
        let mut placements = self.placements.lock().await;
        let before = placements.len();
        placements.retain(|_, p| !p.served.is_expired(now));
        let purged = before - placements.len();

        if purged > 0 {
            debug!(purged, "Purged expired placements");
        }
        purged
    }

    /// Fire `event_type` for a placement.
    ///
    /// A placement that was never registered can still be served when the
    /// creative instance id is known. Every failure is published as
    /// `FailedToFire` and leaves history untouched.
    pub async fn fire_event(
        &self,
        placement_id: &str,
        creative_instance_id: Option<&str>,
        event_type: AdEventType,
    ) -> Result<Ad, AdEventError> {
        debug_assert!(!placement_id.is_empty(), "placement_id must not be empty");
        debug_assert!(
            creative_instance_id.map_or(true, |id| !id.is_empty()),
            "creative_instance_id must not be empty"
        );

        match self.try_fire(placement_id, creative_instance_id, event_type).await {
            Ok(ad) => {
                info!(
                    placement_id,
                    creative_instance_id = %ad.creative_instance_id,
                    %event_type,
                    "Fired ad event"
                );
                self.notifications
                    .publish_ad_event(AdNotification::fired(event_type, ad.clone()));
                Ok(ad)
            }
            Err(e) => {
                warn!(placement_id, %event_type, "Failed to fire ad event: {}", e);
                self.notifications.publish_ad_event(AdNotification::FailedToFire {
                    placement_id: placement_id.to_string(),
                    creative_instance_id: creative_instance_id.map(str::to_string),
                    event_type,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn try_fire(
        &self,
        placement_id: &str,
        creative_instance_id: Option<&str>,
        event_type: AdEventType,
    ) -> Result<Ad, AdEventError> {
        if placement_id.is_empty() {
            return Err(AdEventError::InvalidArgument("empty placement_id".to_string()));
        }
        if creative_instance_id == Some("") {
            return Err(AdEventError::InvalidArgument("empty creative_instance_id".to_string()));
        }

        let now = self.clock.now();
        let claim = self
            .claim(placement_id, creative_instance_id, event_type, now)
            .await?;

        let context = FireContext {
            events: self.events.clone(),
            conversions: self.conversions.clone(),
            now,
        };
        let fired = event_firer(event_type).fire(&claim.served, &context).await;

        self.settle(placement_id, event_type, claim.inserted, fired.is_ok())
            .await;
        fired?;
        Ok(claim.served.ad)
    }

    /// Validate the event against the registry and mark it in flight
    async fn claim(
        &self,
        placement_id: &str,
        creative_instance_id: Option<&str>,
        event_type: AdEventType,
        now: DateTime<Utc>,
    ) -> Result<Claim, AdEventError> {
        let unmapped = {
            let mut placements = self.placements.lock().await;
            if placements
                .get(placement_id)
                .is_some_and(|p| p.served.is_expired(now))
            {
                placements.remove(placement_id);
                return Err(AdEventError::NotFound(format!("placement {} expired", placement_id)));
            }
            !placements.contains_key(placement_id)
        };

        let resolved = if unmapped {
            Some(
                self.resolve_unmapped(placement_id, creative_instance_id, event_type)
                    .await?,
            )
        } else {
            None
        };

        let mut placements = self.placements.lock().await;
        let mut inserted = false;
        if let Some(served) = resolved {
            if !placements.contains_key(placement_id) {
                placements.insert(placement_id.to_string(), Placement::new(served));
                inserted = true;
            }
        }

        let placement = placements
            .get_mut(placement_id)
            .ok_or_else(|| AdEventError::NotFound(format!("placement {}", placement_id)))?;

        if let Err(e) = validate(placement, placement_id, creative_instance_id, event_type) {
            if inserted {
                placements.remove(placement_id);
            }
            return Err(e);
        }

        if event_type.is_terminal() {
            placement.retiring = true;
        } else {
            placement.fired.insert(event_type);
        }

        Ok(Claim {
            served: placement.served.clone(),
            inserted,
        })
    }

    /// Commit or roll back the registry once the write finished
    async fn settle(&self, placement_id: &str, event_type: AdEventType, inserted: bool, succeeded: bool) {
        let mut placements = self.placements.lock().await;

        if succeeded {
            if event_type.is_terminal() {
                placements.remove(placement_id);
            } else if event_type == AdEventType::Viewed {
                if let Some(placement) = placements.get_mut(placement_id) {
                    placement.served.viewed = true;
                }
            }
        } else if inserted {
            placements.remove(placement_id);
        } else if let Some(placement) = placements.get_mut(placement_id) {
            if event_type.is_terminal() {
                placement.retiring = false;
            } else {
                placement.fired.remove(&event_type);
            }
        }
    }

    /// Look up the creative for a placement served outside the orchestrator
    async fn resolve_unmapped(
        &self,
        placement_id: &str,
        creative_instance_id: Option<&str>,
        event_type: AdEventType,
    ) -> Result<ServedAd, AdEventError> {
        let not_found = || AdEventError::NotFound(format!("placement {}", placement_id));

        let Some(id) = creative_instance_id else {
            return Err(not_found());
        };
        if event_type != AdEventType::Served {
            return Err(not_found());
        }

        let creative_ad = self
            .creative_ads
            .get_by_creative_instance_id(id)
            .await
            .map_err(|e| AdEventError::Persistence(e.to_string()))?
            .ok_or_else(|| AdEventError::NotFound(format!("creative instance {}", id)))?;

        let ad = Ad::from_creative(placement_id.to_string(), &creative_ad);
        Ok(ServedAd::new(
            ad,
            creative_ad.conversion,
            self.clock.now(),
            self.served_ad_ttl,
        ))
    }
}

fn validate(
    placement: &Placement,
    placement_id: &str,
    creative_instance_id: Option<&str>,
    event_type: AdEventType,
) -> Result<(), AdEventError> {
    if placement.retiring {
        return Err(AdEventError::NotFound(format!("placement {} is being retired", placement_id)));
    }

    if let Some(id) = creative_instance_id {
        if id != placement.served.ad.creative_instance_id {
            return Err(AdEventError::NotFound(format!(
                "creative instance {} for placement {}",
                id, placement_id
            )));
        }
    }

    let ad_type = placement.served.ad.ad_type;
    if !ad_type.supports(event_type) {
        return Err(AdEventError::InvalidArgument(format!(
            "{} does not support {}",
            ad_type, event_type
        )));
    }

    if placement.fired.contains(&event_type) {
        return Err(AdEventError::AlreadyFired {
            placement_id: placement_id.to_string(),
            event_type,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdEventError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{event_type} already fired for placement {placement_id}")]
    AlreadyFired {
        placement_id: String,
        event_type: AdEventType,
    },

    #[error("Persistence failure: {0}")]
    Persistence(String),
}
