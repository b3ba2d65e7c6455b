use async_trait::async_trait;
use adgate_shared::{Ad, ConfirmationType, UserModel};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::CoreResult;

/// Resolves the user's geographic subdivision, e.g. `US-CA`
#[async_trait]
pub trait SubdivisionTargeting: Send + Sync {
    async fn code(&self) -> Option<String>;
}

/// Sites whose visitors must not see a creative set
pub trait AntiTargetingResource: Send + Sync {
    fn sites_for_creative_set(&self, creative_set_id: &str) -> Vec<String>;
}

#[async_trait]
pub trait BrowsingHistory: Send + Sync {
    async fn recent_sites(&self) -> CoreResult<Vec<String>>;
}

#[async_trait]
pub trait ConversionStore: Send + Sync {
    async fn converted_creative_set_ids(&self) -> CoreResult<HashSet<String>>;
}

pub trait SplitTestAssignment: Send + Sync {
    fn group(&self) -> Option<String>;
}

/// The user's explicit reactions to ads
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdPreferenceSnapshot {
    pub disliked_advertisers: HashSet<String>,
    pub disliked_segments: HashSet<String>,
    pub marked_inappropriate_creative_sets: HashSet<String>,
}

#[async_trait]
pub trait AdPreferences: Send + Sync {
    async fn snapshot(&self) -> CoreResult<AdPreferenceSnapshot>;
}

#[async_trait]
pub trait UserModelBuilder: Send + Sync {
    async fn build(&self) -> CoreResult<UserModel>;
}

/// Downstream conversion tracking for ads that opted in
#[async_trait]
pub trait ConversionQueue: Send + Sync {
    async fn add(&self, ad: &Ad, confirmation_type: ConfirmationType) -> CoreResult<()>;
}
