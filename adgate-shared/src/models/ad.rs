use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ad_event::AdType;

/// Frequency caps carried by a creative. A cap of 0 means uncapped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrequencyCaps {
    #[serde(default)]
    pub per_hour: u32,
    #[serde(default)]
    pub per_day: u32,
    #[serde(default)]
    pub per_week: u32,
    #[serde(default)]
    pub per_month: u32,
    #[serde(default)]
    pub total_max: u32,
}

/// Local time window in which a creative may be shown
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Daypart {
    /// Digits of allowed weekdays, 0 = Sunday ... 6 = Saturday
    pub days_of_week: String,
    pub start_minute: u32,
    pub end_minute: u32,
}

impl Daypart {
    pub fn contains(&self, day_from_sunday: u32, minute_of_day: u32) -> bool {
        let day_matches = std::char::from_digit(day_from_sunday, 10)
            .map(|c| self.days_of_week.contains(c))
            .unwrap_or(false);

        day_matches && self.start_minute <= minute_of_day && minute_of_day <= self.end_minute
    }
}

/// A creative ad candidate as ingested from the catalog. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreativeAd {
    pub creative_instance_id: String,
    pub creative_set_id: String,
    pub campaign_id: String,
    pub advertiser_id: String,
    pub ad_type: AdType,
    pub segment: String,
    pub pass_through_rate: f64,
    /// Lower is preferred; 0 sorts last
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub caps: FrequencyCaps,
    #[serde(default)]
    pub dayparts: Vec<Daypart>,
    /// Country (`US`) or subdivision (`US-CA`) codes
    #[serde(default)]
    pub geo_targets: Vec<String>,
    #[serde(default)]
    pub split_test_group: Option<String>,
    #[serde(default)]
    pub conversion: bool,
    pub target_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub dimensions: Option<String>,
}

/// The ad handed back to the caller for display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ad {
    pub placement_id: String,
    pub ad_type: AdType,
    pub creative_instance_id: String,
    pub creative_set_id: String,
    pub campaign_id: String,
    pub advertiser_id: String,
    pub segment: String,
    pub title: String,
    pub body: String,
    pub target_url: String,
}

impl Ad {
    pub fn from_creative(placement_id: String, creative_ad: &CreativeAd) -> Self {
        Self {
            placement_id,
            ad_type: creative_ad.ad_type,
            creative_instance_id: creative_ad.creative_instance_id.clone(),
            creative_set_id: creative_ad.creative_set_id.clone(),
            campaign_id: creative_ad.campaign_id.clone(),
            advertiser_id: creative_ad.advertiser_id.clone(),
            segment: creative_ad.segment.clone(),
            title: creative_ad.title.clone(),
            body: creative_ad.body.clone(),
            target_url: creative_ad.target_url.clone(),
        }
    }
}

/// Binds a placement to the creative snapshot it was served with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServedAd {
    pub ad: Ad,
    pub conversion: bool,
    pub served_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub viewed: bool,
}

impl ServedAd {
    pub fn new(ad: Ad, conversion: bool, served_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            ad,
            conversion,
            served_at,
            expires_at: served_at + ttl,
            viewed: false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Describes one ad request opportunity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlacementContext {
    pub ad_type: AdType,
    pub tab_id: Option<i32>,
    pub dimensions: Option<String>,
}

impl PlacementContext {
    pub fn new(ad_type: AdType) -> Self {
        Self {
            ad_type,
            tab_id: None,
            dimensions: None,
        }
    }

    pub fn with_tab(mut self, tab_id: i32) -> Self {
        self.tab_id = Some(tab_id);
        self
    }

    pub fn with_dimensions(mut self, dimensions: impl Into<String>) -> Self {
        self.dimensions = Some(dimensions.into());
        self
    }

    /// Identity of the opportunity, used to dedup serving within a session
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.ad_type,
            self.tab_id.map(|id| id.to_string()).unwrap_or_default(),
            self.dimensions.as_deref().unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daypart_contains() {
        let daypart = Daypart {
            days_of_week: "12345".to_string(),
            start_minute: 9 * 60,
            end_minute: 17 * 60,
        };

        assert!(daypart.contains(1, 9 * 60));
        assert!(daypart.contains(5, 17 * 60));
        assert!(!daypart.contains(0, 12 * 60));
        assert!(!daypart.contains(3, 8 * 60 + 59));
    }

    #[test]
    fn test_placement_key() {
        let key = PlacementContext::new(AdType::InlineContentAd)
            .with_tab(7)
            .with_dimensions("900x750")
            .key();
        assert_eq!(key, "inline_content_ad:7:900x750");

        assert_eq!(PlacementContext::new(AdType::NewTabPageAd).key(), "new_tab_page_ad::");
    }

    #[test]
    fn test_creative_ad_defaults_from_json() {
        let creative_ad: CreativeAd = serde_json::from_value(serde_json::json!({
            "creative_instance_id": "ci-1",
            "creative_set_id": "cs-1",
            "campaign_id": "c-1",
            "advertiser_id": "a-1",
            "ad_type": "notification_ad",
            "segment": "technology-ai",
            "pass_through_rate": 1.0,
            "target_url": "https://example.com"
        }))
        .unwrap();

        assert_eq!(creative_ad.caps, FrequencyCaps::default());
        assert!(creative_ad.dayparts.is_empty());
        assert_eq!(creative_ad.priority, 0);
    }
}
