use async_trait::async_trait;
use adgate_shared::{AdEvent, AdType, ArmState, ConfirmationType, CreativeAd};
use chrono::{DateTime, Duration, Utc};

use crate::history::AdEventSnapshot;
use crate::CoreResult;

/// Append-only ad event history
#[async_trait]
pub trait AdEventRepository: Send + Sync {
    /// Append a fully described event
    async fn record(&self, event: &AdEvent) -> CoreResult<()>;

    /// Append a bare entry for `id` keyed by `(ad_type, confirmation_type)`
    async fn record_for_id(
        &self,
        id: &str,
        ad_type: AdType,
        confirmation_type: ConfirmationType,
        created_at: DateTime<Utc>,
    ) -> CoreResult<()>;

    /// Timestamps for `(ad_type, confirmation_type)` in insertion order
    async fn get(
        &self,
        ad_type: AdType,
        confirmation_type: ConfirmationType,
    ) -> CoreResult<Vec<DateTime<Utc>>>;

    /// Consistent view of the whole history
    async fn snapshot(&self) -> CoreResult<AdEventSnapshot>;

    /// Remove entries strictly older than `now - max_age`, returning how many were removed
    async fn purge_older_than(&self, max_age: Duration) -> CoreResult<usize>;
}

/// Catalog of creative ads, populated by ingestion outside this core
#[async_trait]
pub trait CreativeAdRepository: Send + Sync {
    async fn get_for_type(&self, ad_type: AdType) -> CoreResult<Vec<CreativeAd>>;

    /// Creatives of `ad_type` whose segment matches one of `segments`
    /// exactly or as a hierarchical parent
    async fn get_for_segments(
        &self,
        ad_type: AdType,
        segments: &[String],
    ) -> CoreResult<Vec<CreativeAd>>;

    async fn get_by_creative_instance_id(
        &self,
        creative_instance_id: &str,
    ) -> CoreResult<Option<CreativeAd>>;
}

/// Storage for epsilon-greedy bandit state
#[async_trait]
pub trait ArmStateRepository: Send + Sync {
    async fn load(&self) -> CoreResult<Option<ArmState>>;

    async fn save(&self, state: &ArmState) -> CoreResult<()>;

    async fn load_eligible_segments(&self) -> CoreResult<Vec<String>>;

    async fn save_eligible_segments(&self, segments: &[String]) -> CoreResult<()>;
}
