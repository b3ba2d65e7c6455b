use async_trait::async_trait;
use adgate_core::targeting::{
    AdPreferenceSnapshot, AdPreferences, AntiTargetingResource, BrowsingHistory, ConversionQueue,
    ConversionStore, SplitTestAssignment, SubdivisionTargeting, UserModelBuilder,
};
use adgate_core::{CoreError, CoreResult};
use adgate_shared::{Ad, ConfirmationType, UserModel};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Fixed targeting resources, for tests and the simulator.
///
/// Implements every targeting collaborator from values supplied up front.
#[derive(Default)]
pub struct StaticResources {
    pub subdivision_code: Option<String>,
    pub anti_targeting: HashMap<String, Vec<String>>,
    pub browsing_history: Vec<String>,
    pub converted_creative_sets: HashSet<String>,
    pub split_test_group: Option<String>,
    pub preferences: AdPreferenceSnapshot,
    user_model: RwLock<UserModel>,
    queued_conversions: RwLock<Vec<(String, ConfirmationType)>>,
}

impl StaticResources {
    pub fn new(user_model: UserModel) -> Self {
        Self {
            user_model: RwLock::new(user_model),
            ..Default::default()
        }
    }

    pub fn set_user_model(&self, user_model: UserModel) {
        *self.user_model.write().unwrap_or_else(|e| e.into_inner()) = user_model;
    }

    /// Creative instance ids handed to the conversion queue, in order
    pub fn queued_conversions(&self) -> Vec<(String, ConfirmationType)> {
        self.queued_conversions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl SubdivisionTargeting for StaticResources {
    async fn code(&self) -> Option<String> {
        self.subdivision_code.clone()
    }
}

impl AntiTargetingResource for StaticResources {
    fn sites_for_creative_set(&self, creative_set_id: &str) -> Vec<String> {
        self.anti_targeting
            .get(creative_set_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl BrowsingHistory for StaticResources {
    async fn recent_sites(&self) -> CoreResult<Vec<String>> {
        Ok(self.browsing_history.clone())
    }
}

#[async_trait]
impl ConversionStore for StaticResources {
    async fn converted_creative_set_ids(&self) -> CoreResult<HashSet<String>> {
        Ok(self.converted_creative_sets.clone())
    }
}

impl SplitTestAssignment for StaticResources {
    fn group(&self) -> Option<String> {
        self.split_test_group.clone()
    }
}

#[async_trait]
impl AdPreferences for StaticResources {
    async fn snapshot(&self) -> CoreResult<AdPreferenceSnapshot> {
        Ok(self.preferences.clone())
    }
}

#[async_trait]
impl UserModelBuilder for StaticResources {
    async fn build(&self) -> CoreResult<UserModel> {
        self.user_model
            .read()
            .map(|user_model| user_model.clone())
            .map_err(|_| CoreError::Internal("User model lock poisoned".to_string()))
    }
}

#[async_trait]
impl ConversionQueue for StaticResources {
    async fn add(&self, ad: &Ad, confirmation_type: ConfirmationType) -> CoreResult<()> {
        self.queued_conversions
            .write()
            .map_err(|_| CoreError::Internal("Conversion queue lock poisoned".to_string()))?
            .push((ad.creative_instance_id.clone(), confirmation_type));
        Ok(())
    }
}
