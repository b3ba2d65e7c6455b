use async_trait::async_trait;
use adgate_core::repository::CreativeAdRepository;
use adgate_core::{CoreError, CoreResult};
use adgate_shared::{segment_matches, AdType, CreativeAd};
use tokio::sync::RwLock;
use tracing::info;

/// Creative ads held in memory, as handed over by catalog ingestion
#[derive(Default)]
pub struct InMemoryCreativeAdRepository {
    creative_ads: RwLock<Vec<CreativeAd>>,
}

impl InMemoryCreativeAdRepository {
    pub fn new(creative_ads: Vec<CreativeAd>) -> Self {
        Self {
            creative_ads: RwLock::new(creative_ads),
        }
    }

    /// Parse a JSON array of creative ads
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let creative_ads: Vec<CreativeAd> = serde_json::from_str(json)
            .map_err(|e| CoreError::InvalidArgument(format!("Malformed catalog: {}", e)))?;
        info!("Loaded {} creative ads", creative_ads.len());
        Ok(Self::new(creative_ads))
    }

    /// Swap in a freshly ingested catalog
    pub async fn replace_all(&self, creative_ads: Vec<CreativeAd>) {
        *self.creative_ads.write().await = creative_ads;
    }
}

#[async_trait]
impl CreativeAdRepository for InMemoryCreativeAdRepository {
    async fn get_for_type(&self, ad_type: AdType) -> CoreResult<Vec<CreativeAd>> {
        let creative_ads = self.creative_ads.read().await;
        Ok(creative_ads
            .iter()
            .filter(|c| c.ad_type == ad_type)
            .cloned()
            .collect())
    }

    async fn get_for_segments(
        &self,
        ad_type: AdType,
        segments: &[String],
    ) -> CoreResult<Vec<CreativeAd>> {
        let creative_ads = self.creative_ads.read().await;
        Ok(creative_ads
            .iter()
            .filter(|c| c.ad_type == ad_type)
            .filter(|c| segments.iter().any(|s| segment_matches(&c.segment, s)))
            .cloned()
            .collect())
    }

    async fn get_by_creative_instance_id(
        &self,
        creative_instance_id: &str,
    ) -> CoreResult<Option<CreativeAd>> {
        let creative_ads = self.creative_ads.read().await;
        Ok(creative_ads
            .iter()
            .find(|c| c.creative_instance_id == creative_instance_id)
            .cloned())
    }
}
