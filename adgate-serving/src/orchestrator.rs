use adgate_core::repository::{AdEventRepository, ArmStateRepository, CreativeAdRepository};
use adgate_core::targeting::{
    AdPreferences, AntiTargetingResource, BrowsingHistory, ConversionQueue, ConversionStore,
    SplitTestAssignment, SubdivisionTargeting, UserModelBuilder,
};
use adgate_core::{AdEventSnapshot, Clock, CoreError};
use adgate_eligibility::{
    AdRanker, BanditProcessor, EligibilityContext, EpsilonGreedyBandit, ExclusionRuleEngine,
    PacingSampler, SegmentMatcher,
};
use adgate_shared::{Ad, AdEventType, AdType, CreativeAd, PlacementContext, ServingNotification};
use adgate_store::app_config::{Config, ExclusionConfig};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::lifecycle::{AdEventError, AdEventLifecycleHandler};
use crate::notifications::NotificationHub;
use crate::permission::ServingPermission;

/// External collaborators the pipeline reads from
#[derive(Clone)]
pub struct ServingResources {
    pub creative_ads: Arc<dyn CreativeAdRepository>,
    pub subdivision: Arc<dyn SubdivisionTargeting>,
    pub anti_targeting: Arc<dyn AntiTargetingResource>,
    pub browsing_history: Arc<dyn BrowsingHistory>,
    pub conversions: Arc<dyn ConversionStore>,
    pub conversion_queue: Arc<dyn ConversionQueue>,
    pub split_test: Arc<dyn SplitTestAssignment>,
    pub preferences: Arc<dyn AdPreferences>,
    pub user_model: Arc<dyn UserModelBuilder>,
}

impl ServingResources {
    /// Use one object for every targeting collaborator
    pub fn from_shared<T>(creative_ads: Arc<dyn CreativeAdRepository>, shared: Arc<T>) -> Self
    where
        T: SubdivisionTargeting
            + AntiTargetingResource
            + BrowsingHistory
            + ConversionStore
            + ConversionQueue
            + SplitTestAssignment
            + AdPreferences
            + UserModelBuilder
            + 'static,
    {
        Self {
            creative_ads,
            subdivision: shared.clone(),
            anti_targeting: shared.clone(),
            browsing_history: shared.clone(),
            conversions: shared.clone(),
            conversion_queue: shared.clone(),
            split_test: shared.clone(),
            preferences: shared.clone(),
            user_model: shared,
        }
    }
}

/// What a serving attempt produced
#[derive(Debug, Clone, PartialEq)]
pub enum ServeOutcome {
    Served(Ad),
    /// Candidates ran out somewhere in the pipeline
    NoEligibleAds(String),
    /// Serving policy refused the opportunity
    NotAllowed(String),
}

impl ServeOutcome {
    pub fn had_opportunity(&self) -> bool {
        matches!(self, ServeOutcome::Served(_))
    }

    pub fn ad(&self) -> Option<&Ad> {
        match self {
            ServeOutcome::Served(ad) => Some(ad),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServingError {
    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CoreError> for ServingError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Persistence(msg) => ServingError::Persistence(msg),
            other => ServingError::Internal(other.to_string()),
        }
    }
}

impl From<AdEventError> for ServingError {
    fn from(e: AdEventError) -> Self {
        match e {
            AdEventError::Persistence(msg) => ServingError::Persistence(msg),
            other => ServingError::Internal(other.to_string()),
        }
    }
}

/// Single entry point deciding whether and which ad to serve
pub struct ServingOrchestrator {
    events: Arc<dyn AdEventRepository>,
    resources: ServingResources,
    exclusion: ExclusionConfig,
    permission: ServingPermission,
    matcher: SegmentMatcher,
    pacing: PacingSampler,
    bandit: EpsilonGreedyBandit,
    bandit_processor: Arc<BanditProcessor>,
    ranker: AdRanker,
    lifecycle: Arc<AdEventLifecycleHandler>,
    notifications: NotificationHub,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    served_contexts: Mutex<HashSet<String>>,
}

impl ServingOrchestrator {
    pub fn new(
        config: &Config,
        events: Arc<dyn AdEventRepository>,
        resources: ServingResources,
        arms: Arc<dyn ArmStateRepository>,
        clock: Arc<dyn Clock>,
        notifications: NotificationHub,
    ) -> Self {
        let lifecycle = Arc::new(AdEventLifecycleHandler::new(
            events.clone(),
            resources.creative_ads.clone(),
            resources.conversion_queue.clone(),
            notifications.clone(),
            clock.clone(),
            config.serving.served_ad_ttl(),
        ));

        let rng = match config.serving.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            events,
            resources,
            exclusion: config.exclusion.clone(),
            permission: ServingPermission::new(config.serving.clone()),
            matcher: SegmentMatcher::new(),
            pacing: PacingSampler::new(),
            bandit: EpsilonGreedyBandit::new(config.bandit.epsilon),
            bandit_processor: Arc::new(BanditProcessor::new(arms, config.bandit.segments.clone())),
            ranker: AdRanker::new(),
            lifecycle,
            notifications,
            clock,
            rng: Mutex::new(rng),
            served_contexts: Mutex::new(HashSet::new()),
        }
    }

    pub fn lifecycle(&self) -> Arc<AdEventLifecycleHandler> {
        self.lifecycle.clone()
    }

    pub fn bandit_processor(&self) -> Arc<BanditProcessor> {
        self.bandit_processor.clone()
    }

    pub fn notifications(&self) -> &NotificationHub {
        &self.notifications
    }

    /// Decide whether to serve an ad for `context`, and serve it.
    ///
    /// Running out of candidates is an outcome, not an error; only failing
    /// collaborators produce `Err`.
    pub async fn maybe_serve_ad(&self, context: &PlacementContext) -> Result<ServeOutcome, ServingError> {
        match self.serve(context).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(ad_type = %context.ad_type, "Failed to serve ad: {}", e);
                self.notifications.publish_serving(ServingNotification::FailedToServeAd {
                    ad_type: context.ad_type,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn serve(&self, context: &PlacementContext) -> Result<ServeOutcome, ServingError> {
        let ad_type = context.ad_type;

        // 1. One history snapshot for the whole pass
        let history = self.events.snapshot().await?;
        let now = self.clock.now();

        // 2. Policy, reserving the tab context under the same lock
        let permitted = {
            let mut served_contexts = self.lock(&self.served_contexts)?;
            let checked = self.permission.check(context, &history, now, &served_contexts);
            checked.map(|()| {
                let key = context.tab_id.map(|_| context.key());
                if let Some(key) = &key {
                    served_contexts.insert(key.clone());
                }
                ContextReservation {
                    contexts: &self.served_contexts,
                    key,
                }
            })
        };
        let reservation = match permitted {
            Ok(reservation) => reservation,
            Err(reason) => {
                info!(%ad_type, %reason, "Serving not allowed");
                self.notifications.publish_serving(ServingNotification::NotAllowed {
                    ad_type,
                    reason: reason.clone(),
                });
                return Ok(ServeOutcome::NotAllowed(reason));
            }
        };

        // 3. User model
        let user_model = self.resources.user_model.build().await?;
        self.notifications
            .publish_serving(ServingNotification::OpportunityAroseToServeAd {
                ad_type,
                segments: user_model.segments(),
            });

        // 4. Candidates
        let creative_ads = self.fetch_candidates(context).await?;
        debug!(%ad_type, candidates = creative_ads.len(), "Fetched creative ads");
        if creative_ads.is_empty() {
            return Ok(self.no_eligible_ads(ad_type, "no creative ads"));
        }

        // 5. Exclusion
        let eligibility = self.eligibility_context(history, now).await?;
        let creative_ads = ExclusionRuleEngine::new(eligibility, &self.exclusion).apply(creative_ads);
        if creative_ads.is_empty() {
            return Ok(self.no_eligible_ads(ad_type, "all creative ads excluded"));
        }

        // 6. Segments
        let matched = self.matcher.match_segments(&user_model, creative_ads);
        if matched.is_empty() {
            return Ok(self.no_eligible_ads(ad_type, "no creative ads match the user model"));
        }

        // 7. Pacing
        let creative_ads = self.with_rng(|rng| self.pacing.admit(matched.creative_ads, rng))?;
        if creative_ads.is_empty() {
            return Ok(self.no_eligible_ads(ad_type, "all creative ads paced out"));
        }

        // 8. Winner
        let arms = self.bandit_processor.eligible_arms().await?;
        let selection = self.with_rng(|rng| {
            let segments = self.bandit.get_segments(&arms, rng);
            self.ranker.select(creative_ads, &segments, rng)
        })?;
        let Some(selection) = selection else {
            return Ok(self.no_eligible_ads(ad_type, "no winner selected"));
        };
        debug!(strategy = ?selection.strategy, "Selected creative ad");

        // 9. Serve
        let ad = self.serve_creative(&selection.creative_ad).await?;
        reservation.commit();

        info!(
            placement_id = %ad.placement_id,
            creative_instance_id = %ad.creative_instance_id,
            segment = %ad.segment,
            "Served ad"
        );
        self.notifications
            .publish_serving(ServingNotification::ServedAd { ad: ad.clone() });
        Ok(ServeOutcome::Served(ad))
    }

    async fn fetch_candidates(&self, context: &PlacementContext) -> Result<Vec<CreativeAd>, ServingError> {
        let creative_ads = self.resources.creative_ads.get_for_type(context.ad_type).await?;

        Ok(match &context.dimensions {
            Some(dimensions) => creative_ads
                .into_iter()
                .filter(|c| c.dimensions.as_deref().map_or(true, |d| d == dimensions))
                .collect(),
            None => creative_ads,
        })
    }

    async fn eligibility_context(
        &self,
        history: AdEventSnapshot,
        now: DateTime<Utc>,
    ) -> Result<EligibilityContext, ServingError> {
        Ok(EligibilityContext {
            now,
            local_offset: self.clock.local_offset(),
            history,
            subdivision_code: self.resources.subdivision.code().await,
            browsing_history: self
                .resources
                .browsing_history
                .recent_sites()
                .await?
                .into_iter()
                .collect(),
            converted_creative_sets: self.resources.conversions.converted_creative_set_ids().await?,
            split_test_group: self.resources.split_test.group(),
            preferences: self.resources.preferences.snapshot().await?,
            anti_targeting: self.resources.anti_targeting.clone(),
        })
    }

    async fn serve_creative(&self, creative_ad: &CreativeAd) -> Result<Ad, ServingError> {
        let placement_id = Uuid::new_v4().to_string();
        let ad = Ad::from_creative(placement_id.clone(), creative_ad);

        self.lifecycle.register(ad, creative_ad.conversion).await;
        let served = self
            .lifecycle
            .fire_event(
                &placement_id,
                Some(&creative_ad.creative_instance_id),
                AdEventType::Served,
            )
            .await;

        if served.is_err() {
            self.lifecycle.remove_placement(&placement_id).await;
        }
        Ok(served?)
    }

    fn no_eligible_ads(&self, ad_type: AdType, reason: &str) -> ServeOutcome {
        info!(%ad_type, reason, "No eligible ads");
        self.notifications.publish_serving(ServingNotification::NoEligibleAds {
            ad_type,
            reason: reason.to_string(),
        });
        ServeOutcome::NoEligibleAds(reason.to_string())
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> Result<T, ServingError> {
        let mut rng = self.lock(&self.rng)?;
        Ok(f(&mut *rng))
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> Result<std::sync::MutexGuard<'a, T>, ServingError> {
        mutex
            .lock()
            .map_err(|_| ServingError::Internal("Lock poisoned".to_string()))
    }
}

/// A tab context held for an in-progress serve. Unless committed, dropping
/// it releases the context so the tab can be served again.
struct ContextReservation<'a> {
    contexts: &'a Mutex<HashSet<String>>,
    key: Option<String>,
}

impl ContextReservation<'_> {
    fn commit(mut self) {
        self.key = None;
    }
}

impl Drop for ContextReservation<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.contexts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
        }
    }
}
