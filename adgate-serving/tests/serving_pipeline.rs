use adgate_core::repository::{AdEventRepository, ArmStateRepository, CreativeAdRepository};
use adgate_core::{AdEventSnapshot, CoreError, CoreResult, ManualClock};
use adgate_serving::{
    spawn_bandit_feedback, AdEventError, NotificationHub, ServeOutcome, ServingError,
    ServingOrchestrator, ServingResources,
};
use adgate_shared::{
    AdEvent, AdEventType, AdType, ArmState, ConfirmationType, CreativeAd, FrequencyCaps,
    PlacementContext, ServingNotification, UserModel,
};
use adgate_store::app_config::Config;
use adgate_store::{AdEventStore, InMemoryArmStore, InMemoryCreativeAdRepository, StaticResources};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

struct Harness {
    orchestrator: ServingOrchestrator,
    store: Arc<AdEventStore>,
    arms: Arc<InMemoryArmStore>,
    clock: Arc<ManualClock>,
    resources: Arc<StaticResources>,
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 10, 12, 0, 0).unwrap()
}

fn creative_ad(id: &str, segment: &str) -> CreativeAd {
    CreativeAd {
        creative_instance_id: id.to_string(),
        creative_set_id: format!("cs-{}", id),
        campaign_id: format!("c-{}", id),
        advertiser_id: format!("a-{}", id),
        ad_type: AdType::NotificationAd,
        segment: segment.to_string(),
        pass_through_rate: 1.0,
        priority: 1,
        caps: FrequencyCaps::default(),
        dayparts: Vec::new(),
        geo_targets: Vec::new(),
        split_test_group: None,
        conversion: false,
        target_url: "https://brave.com".to_string(),
        title: "Title".to_string(),
        body: "Body".to_string(),
        dimensions: None,
    }
}

fn harness(creative_ads: Vec<CreativeAd>, user_model: UserModel) -> Harness {
    let mut config = Config::default();
    config.serving.rng_seed = Some(42);

    let clock = Arc::new(ManualClock::new(start()));
    let store = Arc::new(AdEventStore::new(clock.clone()));
    let arms = Arc::new(InMemoryArmStore::new());
    let resources = Arc::new(StaticResources::new(user_model));
    let catalog = Arc::new(InMemoryCreativeAdRepository::new(creative_ads));

    let orchestrator = ServingOrchestrator::new(
        &config,
        store.clone(),
        ServingResources::from_shared(catalog, resources.clone()),
        arms.clone(),
        clock.clone(),
        NotificationHub::default(),
    );

    Harness { orchestrator, store, arms, clock, resources }
}

fn interest(segment: &str) -> UserModel {
    UserModel {
        interest_segments: vec![segment.to_string()],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_serves_matching_ad_and_records_served() {
    let h = harness(
        vec![creative_ad("A", "technology-ai"), creative_ad("B", "sports")],
        interest("technology-ai"),
    );
    let mut serving_rx = h.orchestrator.notifications().subscribe_serving();

    let outcome = h
        .orchestrator
        .maybe_serve_ad(&PlacementContext::new(AdType::NotificationAd))
        .await
        .unwrap();

    assert!(outcome.had_opportunity());
    let ad = outcome.ad().unwrap();
    assert_eq!(ad.creative_instance_id, "A");
    assert!(!ad.placement_id.is_empty());

    let served = h.store.get(AdType::NotificationAd, ConfirmationType::Served).await.unwrap();
    assert_eq!(served, vec![start()]);

    assert!(matches!(
        serving_rx.recv().await.unwrap(),
        ServingNotification::OpportunityAroseToServeAd { .. }
    ));
    assert!(matches!(
        serving_rx.recv().await.unwrap(),
        ServingNotification::ServedAd { .. }
    ));
}

#[tokio::test]
async fn test_placements_are_unique() {
    let h = harness(vec![creative_ad("A", "sports")], UserModel::default());
    let context = PlacementContext::new(AdType::NotificationAd);

    let first = h.orchestrator.maybe_serve_ad(&context).await.unwrap();
    let second = h.orchestrator.maybe_serve_ad(&context).await.unwrap();

    assert_ne!(first.ad().unwrap().placement_id, second.ad().unwrap().placement_id);
}

#[tokio::test]
async fn test_no_candidates_is_not_an_error() {
    let h = harness(Vec::new(), UserModel::default());

    let outcome = h
        .orchestrator
        .maybe_serve_ad(&PlacementContext::new(AdType::NotificationAd))
        .await
        .unwrap();

    assert!(!outcome.had_opportunity());
    assert!(matches!(outcome, ServeOutcome::NoEligibleAds(_)));
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_non_matching_user_model_yields_no_ads() {
    let h = harness(vec![creative_ad("A", "sports")], interest("food"));

    let outcome = h
        .orchestrator
        .maybe_serve_ad(&PlacementContext::new(AdType::NotificationAd))
        .await
        .unwrap();
    assert!(matches!(outcome, ServeOutcome::NoEligibleAds(_)));

    h.resources.set_user_model(UserModel::default());
    let outcome = h
        .orchestrator
        .maybe_serve_ad(&PlacementContext::new(AdType::NotificationAd))
        .await
        .unwrap();
    assert!(outcome.had_opportunity());
}

#[tokio::test]
async fn test_daily_cap_lifts_after_a_day() {
    let mut capped = creative_ad("A", "technology-ai");
    capped.caps.per_day = 2;
    let h = harness(vec![capped], interest("technology-ai"));
    let context = PlacementContext::new(AdType::NotificationAd);

    assert!(h.orchestrator.maybe_serve_ad(&context).await.unwrap().had_opportunity());
    h.clock.advance(Duration::hours(1));
    assert!(h.orchestrator.maybe_serve_ad(&context).await.unwrap().had_opportunity());
    h.clock.advance(Duration::hours(1));

    let outcome = h.orchestrator.maybe_serve_ad(&context).await.unwrap();
    assert!(matches!(outcome, ServeOutcome::NoEligibleAds(_)));

    h.clock.advance(Duration::hours(24));
    assert!(h.orchestrator.maybe_serve_ad(&context).await.unwrap().had_opportunity());
}

#[tokio::test]
async fn test_paced_out_candidates() {
    let mut paced = creative_ad("A", "sports");
    paced.pass_through_rate = 0.0;
    let h = harness(vec![paced], UserModel::default());

    let outcome = h
        .orchestrator
        .maybe_serve_ad(&PlacementContext::new(AdType::NotificationAd))
        .await
        .unwrap();
    assert!(matches!(outcome, ServeOutcome::NoEligibleAds(_)));
}

#[tokio::test]
async fn test_tab_context_served_once_per_session() {
    let mut inline = creative_ad("A", "sports");
    inline.ad_type = AdType::InlineContentAd;
    inline.dimensions = Some("900x750".to_string());
    let h = harness(vec![inline], UserModel::default());
    let context = PlacementContext::new(AdType::InlineContentAd)
        .with_tab(1)
        .with_dimensions("900x750");

    assert!(h.orchestrator.maybe_serve_ad(&context).await.unwrap().had_opportunity());
    let outcome = h.orchestrator.maybe_serve_ad(&context).await.unwrap();
    assert!(matches!(outcome, ServeOutcome::NotAllowed(_)));

    let other_size = PlacementContext::new(AdType::InlineContentAd)
        .with_tab(2)
        .with_dimensions("300x250");
    let outcome = h.orchestrator.maybe_serve_ad(&other_size).await.unwrap();
    assert!(matches!(outcome, ServeOutcome::NoEligibleAds(_)));
}

#[tokio::test]
async fn test_unknown_placement_leaves_history_unchanged() {
    let h = harness(vec![creative_ad("A", "sports")], UserModel::default());
    h.orchestrator
        .maybe_serve_ad(&PlacementContext::new(AdType::NotificationAd))
        .await
        .unwrap();
    let before = h.store.len().await;

    let result = h
        .orchestrator
        .lifecycle()
        .fire_event("no-such-placement", Some("A"), AdEventType::Clicked)
        .await;

    assert!(matches!(result, Err(AdEventError::NotFound(_))));
    assert_eq!(h.store.len().await, before);
}

#[tokio::test]
async fn test_click_feeds_bandit() {
    let h = harness(vec![creative_ad("A", "sports-soccer")], UserModel::default());
    let feedback = spawn_bandit_feedback(h.orchestrator.bandit_processor(), h.orchestrator.notifications());

    let outcome = h
        .orchestrator
        .maybe_serve_ad(&PlacementContext::new(AdType::NotificationAd))
        .await
        .unwrap();
    let placement_id = outcome.ad().unwrap().placement_id.clone();

    let lifecycle = h.orchestrator.lifecycle();
    lifecycle.fire_event(&placement_id, None, AdEventType::Viewed).await.unwrap();
    lifecycle.fire_event(&placement_id, None, AdEventType::Dismissed).await.unwrap();

    drop(lifecycle);
    drop(h.orchestrator);
    feedback.await.unwrap();

    let state = h.arms.load().await.unwrap().unwrap();
    assert_eq!(state.arms["sports"].pulls, 1);
    assert_eq!(state.arms["sports"].value, 0.0);
}

/// Catalog that yields to the scheduler before answering
struct YieldingCatalog(InMemoryCreativeAdRepository);

#[async_trait]
impl CreativeAdRepository for YieldingCatalog {
    async fn get_for_type(&self, ad_type: AdType) -> CoreResult<Vec<CreativeAd>> {
        tokio::task::yield_now().await;
        self.0.get_for_type(ad_type).await
    }

    async fn get_for_segments(&self, ad_type: AdType, segments: &[String]) -> CoreResult<Vec<CreativeAd>> {
        self.0.get_for_segments(ad_type, segments).await
    }

    async fn get_by_creative_instance_id(&self, creative_instance_id: &str) -> CoreResult<Option<CreativeAd>> {
        self.0.get_by_creative_instance_id(creative_instance_id).await
    }
}

struct UnavailableCatalog;

#[async_trait]
impl CreativeAdRepository for UnavailableCatalog {
    async fn get_for_type(&self, _ad_type: AdType) -> CoreResult<Vec<CreativeAd>> {
        Err(CoreError::Persistence("catalog unavailable".to_string()))
    }

    async fn get_for_segments(&self, _ad_type: AdType, _segments: &[String]) -> CoreResult<Vec<CreativeAd>> {
        Err(CoreError::Persistence("catalog unavailable".to_string()))
    }

    async fn get_by_creative_instance_id(&self, _creative_instance_id: &str) -> CoreResult<Option<CreativeAd>> {
        Err(CoreError::Persistence("catalog unavailable".to_string()))
    }
}

struct UnavailableArms;

#[async_trait]
impl ArmStateRepository for UnavailableArms {
    async fn load(&self) -> CoreResult<Option<ArmState>> {
        Err(CoreError::Persistence("arm state unavailable".to_string()))
    }

    async fn save(&self, _state: &ArmState) -> CoreResult<()> {
        Err(CoreError::Persistence("arm state unavailable".to_string()))
    }

    async fn load_eligible_segments(&self) -> CoreResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn save_eligible_segments(&self, _segments: &[String]) -> CoreResult<()> {
        Ok(())
    }
}

/// History that can be read but rejects appends
struct ReadOnlyEvents(Arc<AdEventStore>);

#[async_trait]
impl AdEventRepository for ReadOnlyEvents {
    async fn record(&self, _event: &AdEvent) -> CoreResult<()> {
        Err(CoreError::Persistence("history is read only".to_string()))
    }

    async fn record_for_id(
        &self,
        _id: &str,
        _ad_type: AdType,
        _confirmation_type: ConfirmationType,
        _created_at: DateTime<Utc>,
    ) -> CoreResult<()> {
        Err(CoreError::Persistence("history is read only".to_string()))
    }

    async fn get(&self, ad_type: AdType, confirmation_type: ConfirmationType) -> CoreResult<Vec<DateTime<Utc>>> {
        self.0.get(ad_type, confirmation_type).await
    }

    async fn snapshot(&self) -> CoreResult<AdEventSnapshot> {
        self.0.snapshot().await
    }

    async fn purge_older_than(&self, max_age: Duration) -> CoreResult<usize> {
        self.0.purge_older_than(max_age).await
    }
}

fn orchestrator_with(
    catalog: Arc<dyn CreativeAdRepository>,
    events: Arc<dyn AdEventRepository>,
    arms: Arc<dyn ArmStateRepository>,
) -> ServingOrchestrator {
    let mut config = Config::default();
    config.serving.rng_seed = Some(42);
    let resources = Arc::new(StaticResources::new(UserModel::default()));

    ServingOrchestrator::new(
        &config,
        events,
        ServingResources::from_shared(catalog, resources),
        arms,
        Arc::new(ManualClock::new(start())),
        NotificationHub::default(),
    )
}

/// Serve once and return the outcome with every serving notification it published
async fn serve_and_collect(
    orchestrator: &ServingOrchestrator,
) -> (Result<ServeOutcome, ServingError>, Vec<ServingNotification>) {
    let mut rx = orchestrator.notifications().subscribe_serving();
    let result = orchestrator
        .maybe_serve_ad(&PlacementContext::new(AdType::NotificationAd))
        .await;

    let mut published = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        published.push(notification);
    }
    (result, published)
}

fn assert_failed_to_serve(result: Result<ServeOutcome, ServingError>, published: &[ServingNotification]) {
    assert!(matches!(result, Err(ServingError::Persistence(_))), "got {:?}", result);
    assert!(published
        .iter()
        .any(|n| matches!(n, ServingNotification::FailedToServeAd { .. })));
    assert!(!published
        .iter()
        .any(|n| matches!(n, ServingNotification::NoEligibleAds { .. })));
}

#[tokio::test]
async fn test_concurrent_serves_for_one_tab_serve_once() {
    let mut inline = creative_ad("A", "sports");
    inline.ad_type = AdType::InlineContentAd;

    let clock = Arc::new(ManualClock::new(start()));
    let store = Arc::new(AdEventStore::new(clock.clone()));
    let catalog = Arc::new(YieldingCatalog(InMemoryCreativeAdRepository::new(vec![inline])));
    let resources = Arc::new(StaticResources::new(UserModel::default()));
    let mut config = Config::default();
    config.serving.rng_seed = Some(42);
    let orchestrator = ServingOrchestrator::new(
        &config,
        store.clone(),
        ServingResources::from_shared(catalog, resources),
        Arc::new(InMemoryArmStore::new()),
        clock,
        NotificationHub::default(),
    );

    let context = PlacementContext::new(AdType::InlineContentAd).with_tab(1);
    let (first, second) = tokio::join!(
        orchestrator.maybe_serve_ad(&context),
        orchestrator.maybe_serve_ad(&context),
    );
    let outcomes = [first.unwrap(), second.unwrap()];

    assert_eq!(outcomes.iter().filter(|o| o.had_opportunity()).count(), 1);
    assert!(outcomes.iter().any(|o| matches!(o, ServeOutcome::NotAllowed(_))));
    let served = store.get(AdType::InlineContentAd, ConfirmationType::Served).await.unwrap();
    assert_eq!(served.len(), 1);
}

#[tokio::test]
async fn test_tab_is_released_when_nothing_was_served() {
    let mut inline = creative_ad("A", "sports");
    inline.ad_type = AdType::InlineContentAd;
    let h = harness(vec![inline], interest("food"));
    let context = PlacementContext::new(AdType::InlineContentAd).with_tab(7);

    let outcome = h.orchestrator.maybe_serve_ad(&context).await.unwrap();
    assert!(matches!(outcome, ServeOutcome::NoEligibleAds(_)));

    h.resources.set_user_model(UserModel::default());
    assert!(h.orchestrator.maybe_serve_ad(&context).await.unwrap().had_opportunity());

    let outcome = h.orchestrator.maybe_serve_ad(&context).await.unwrap();
    assert!(matches!(outcome, ServeOutcome::NotAllowed(_)));
}

#[tokio::test]
async fn test_catalog_failure_is_an_error() {
    let clock = Arc::new(ManualClock::new(start()));
    let orchestrator = orchestrator_with(
        Arc::new(UnavailableCatalog),
        Arc::new(AdEventStore::new(clock)),
        Arc::new(InMemoryArmStore::new()),
    );

    let (result, published) = serve_and_collect(&orchestrator).await;
    assert_failed_to_serve(result, &published);
}

#[tokio::test]
async fn test_arm_state_failure_is_an_error() {
    let clock = Arc::new(ManualClock::new(start()));
    let orchestrator = orchestrator_with(
        Arc::new(InMemoryCreativeAdRepository::new(vec![creative_ad("A", "sports")])),
        Arc::new(AdEventStore::new(clock)),
        Arc::new(UnavailableArms),
    );

    let (result, published) = serve_and_collect(&orchestrator).await;
    assert_failed_to_serve(result, &published);
}

#[tokio::test]
async fn test_history_write_failure_is_an_error() {
    let clock = Arc::new(ManualClock::new(start()));
    let store = Arc::new(AdEventStore::new(clock));
    let orchestrator = orchestrator_with(
        Arc::new(InMemoryCreativeAdRepository::new(vec![creative_ad("A", "sports")])),
        Arc::new(ReadOnlyEvents(store.clone())),
        Arc::new(InMemoryArmStore::new()),
    );

    let (result, published) = serve_and_collect(&orchestrator).await;
    assert_failed_to_serve(result, &published);
    assert!(!published
        .iter()
        .any(|n| matches!(n, ServingNotification::ServedAd { .. })));
    assert_eq!(orchestrator.lifecycle().placement_count().await, 0);
    assert!(store.is_empty().await);
}
