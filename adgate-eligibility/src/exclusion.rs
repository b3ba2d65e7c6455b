use adgate_core::targeting::{AdPreferenceSnapshot, AntiTargetingResource};
use adgate_core::AdEventSnapshot;
use adgate_shared::CreativeAd;
use adgate_store::app_config::ExclusionConfig;
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::rules::default_rules;

/// Everything an exclusion pass may look at, gathered once before evaluation
/// so that rules stay pure functions of the candidate and this context.
#[derive(Clone)]
pub struct EligibilityContext {
    pub now: DateTime<Utc>,
    pub local_offset: FixedOffset,
    pub history: AdEventSnapshot,
    pub subdivision_code: Option<String>,
    pub browsing_history: HashSet<String>,
    pub converted_creative_sets: HashSet<String>,
    pub split_test_group: Option<String>,
    pub preferences: AdPreferenceSnapshot,
    pub anti_targeting: Arc<dyn AntiTargetingResource>,
}

/// A single independent reason to drop a candidate
pub trait ExclusionRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Key under which this rule's verdict is shared within one pass.
    /// Set-level rules share a verdict across creatives of the same set.
    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.creative_set_id.clone()
    }

    /// `Err(reason)` excludes the candidate
    fn check(&self, creative_ad: &CreativeAd, context: &EligibilityContext) -> Result<(), String>;
}

/// Ordered list of exclusion rules; a candidate is excluded if any rule says so
pub struct ExclusionRuleEngine {
    rules: Vec<Box<dyn ExclusionRule>>,
    context: EligibilityContext,
    cache: HashMap<(&'static str, String), Option<String>>,
}

impl ExclusionRuleEngine {
    pub fn new(context: EligibilityContext, config: &ExclusionConfig) -> Self {
        Self::with_rules(context, default_rules(config))
    }

    pub fn with_rules(context: EligibilityContext, rules: Vec<Box<dyn ExclusionRule>>) -> Self {
        Self {
            rules,
            context,
            cache: HashMap::new(),
        }
    }

    pub fn context(&self) -> &EligibilityContext {
        &self.context
    }

    pub fn should_exclude(&mut self, creative_ad: &CreativeAd) -> bool {
        self.exclusion_reason(creative_ad).is_some()
    }

    /// `rule_name: reason` for the first rule that excludes the candidate
    pub fn exclusion_reason(&mut self, creative_ad: &CreativeAd) -> Option<String> {
        for rule in &self.rules {
            let key = (rule.name(), rule.cache_key(creative_ad));

            let verdict = match self.cache.get(&key) {
                Some(verdict) => verdict.clone(),
                None => {
                    let verdict = rule.check(creative_ad, &self.context).err();
                    self.cache.insert(key, verdict.clone());
                    verdict
                }
            };

            if let Some(reason) = verdict {
                return Some(format!("{}: {}", rule.name(), reason));
            }
        }
        None
    }

    /// Keep only candidates no rule excludes, preserving order
    pub fn apply(&mut self, creative_ads: Vec<CreativeAd>) -> Vec<CreativeAd> {
        let total = creative_ads.len();
        let eligible: Vec<CreativeAd> = creative_ads
            .into_iter()
            .filter(|creative_ad| match self.exclusion_reason(creative_ad) {
                Some(reason) => {
                    debug!(
                        creative_instance_id = %creative_ad.creative_instance_id,
                        %reason,
                        "Excluded creative ad"
                    );
                    false
                }
                None => true,
            })
            .collect();

        debug!(total, eligible = eligible.len(), "Applied exclusion rules");
        eligible
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use adgate_shared::{AdEvent, AdType, FrequencyCaps};
    use chrono::{Offset, TimeZone};

    pub struct NoAntiTargeting;

    impl AntiTargetingResource for NoAntiTargeting {
        fn sites_for_creative_set(&self, _creative_set_id: &str) -> Vec<String> {
            Vec::new()
        }
    }

    pub fn now() -> DateTime<Utc> {
        // A Wednesday
        Utc.with_ymd_and_hms(2024, 7, 10, 12, 0, 0).unwrap()
    }

    pub fn context(events: Vec<AdEvent>) -> EligibilityContext {
        EligibilityContext {
            now: now(),
            local_offset: Utc.fix(),
            history: AdEventSnapshot::from_events(events),
            subdivision_code: None,
            browsing_history: HashSet::new(),
            converted_creative_sets: HashSet::new(),
            split_test_group: None,
            preferences: AdPreferenceSnapshot::default(),
            anti_targeting: Arc::new(NoAntiTargeting),
        }
    }

    pub fn creative_ad(creative_instance_id: &str, segment: &str) -> CreativeAd {
        CreativeAd {
            creative_instance_id: creative_instance_id.to_string(),
            creative_set_id: format!("cs-{}", creative_instance_id),
            campaign_id: format!("c-{}", creative_instance_id),
            advertiser_id: format!("a-{}", creative_instance_id),
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
            title: String::new(),
            body: String::new(),
            dimensions: None,
        }
    }
}
