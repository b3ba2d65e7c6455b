use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::ad::Ad;

/// Kinds of ads the decision core can serve
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AdType {
    NotificationAd,
    NewTabPageAd,
    PromotedContentAd,
    InlineContentAd,
    SearchResultAd,
}

impl AdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdType::NotificationAd => "notification_ad",
            AdType::NewTabPageAd => "new_tab_page_ad",
            AdType::PromotedContentAd => "promoted_content_ad",
            AdType::InlineContentAd => "inline_content_ad",
            AdType::SearchResultAd => "search_result_ad",
        }
    }

    /// Whether this ad type can fire the given lifecycle event.
    /// Only notification ads have a dismiss button or a display timeout.
    pub fn supports(&self, event_type: AdEventType) -> bool {
        match event_type {
            AdEventType::Served | AdEventType::Viewed | AdEventType::Clicked => true,
            AdEventType::Dismissed | AdEventType::TimedOut => *self == AdType::NotificationAd,
        }
    }
}

impl fmt::Display for AdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notification_ad" => Ok(AdType::NotificationAd),
            "new_tab_page_ad" => Ok(AdType::NewTabPageAd),
            "promoted_content_ad" => Ok(AdType::PromotedContentAd),
            "inline_content_ad" => Ok(AdType::InlineContentAd),
            "search_result_ad" => Ok(AdType::SearchResultAd),
            other => Err(ParseEnumError::new("ad type", other)),
        }
    }
}

/// The kind of lifecycle event recorded in ad event history
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationType {
    Served,
    Viewed,
    Clicked,
    Dismissed,
    TimedOut,
    Landed,
    Conversion,
    MarkedAsInappropriate,
}

impl ConfirmationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationType::Served => "served",
            ConfirmationType::Viewed => "viewed",
            ConfirmationType::Clicked => "clicked",
            ConfirmationType::Dismissed => "dismissed",
            ConfirmationType::TimedOut => "timed_out",
            ConfirmationType::Landed => "landed",
            ConfirmationType::Conversion => "conversion",
            ConfirmationType::MarkedAsInappropriate => "marked_as_inappropriate",
        }
    }
}

impl fmt::Display for ConfirmationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that can be fired for a served placement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AdEventType {
    Served,
    Viewed,
    Clicked,
    Dismissed,
    TimedOut,
}

impl AdEventType {
    pub fn as_str(&self) -> &'static str {
        self.confirmation_type().as_str()
    }

    pub fn confirmation_type(&self) -> ConfirmationType {
        match self {
            AdEventType::Served => ConfirmationType::Served,
            AdEventType::Viewed => ConfirmationType::Viewed,
            AdEventType::Clicked => ConfirmationType::Clicked,
            AdEventType::Dismissed => ConfirmationType::Dismissed,
            AdEventType::TimedOut => ConfirmationType::TimedOut,
        }
    }

    /// Terminal events end the placement lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AdEventType::Clicked | AdEventType::Dismissed | AdEventType::TimedOut
        )
    }
}

impl fmt::Display for AdEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdEventType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "served" => Ok(AdEventType::Served),
            "viewed" => Ok(AdEventType::Viewed),
            "clicked" => Ok(AdEventType::Clicked),
            "dismissed" => Ok(AdEventType::Dismissed),
            "timed_out" => Ok(AdEventType::TimedOut),
            other => Err(ParseEnumError::new("ad event type", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unrecognized {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// One append-only row of ad event history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdEvent {
    pub placement_id: String,
    pub creative_instance_id: String,
    pub creative_set_id: String,
    pub campaign_id: String,
    pub advertiser_id: String,
    pub segment: String,
    pub ad_type: AdType,
    pub confirmation_type: ConfirmationType,
    pub created_at: DateTime<Utc>,
}

impl AdEvent {
    /// Build an event for a served ad
    pub fn new(ad: &Ad, confirmation_type: ConfirmationType, created_at: DateTime<Utc>) -> Self {
        Self {
            placement_id: ad.placement_id.clone(),
            creative_instance_id: ad.creative_instance_id.clone(),
            creative_set_id: ad.creative_set_id.clone(),
            campaign_id: ad.campaign_id.clone(),
            advertiser_id: ad.advertiser_id.clone(),
            segment: ad.segment.clone(),
            ad_type: ad.ad_type,
            confirmation_type,
            created_at,
        }
    }

    /// Build a bare event that only knows the id it was recorded for
    pub fn for_id(
        id: &str,
        ad_type: AdType,
        confirmation_type: ConfirmationType,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            placement_id: String::new(),
            creative_instance_id: id.to_string(),
            creative_set_id: String::new(),
            campaign_id: String::new(),
            advertiser_id: String::new(),
            segment: String::new(),
            ad_type,
            confirmation_type,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_parsing() {
        assert_eq!("timed_out".parse::<AdEventType>().unwrap(), AdEventType::TimedOut);
        assert_eq!("clicked".parse::<AdEventType>().unwrap(), AdEventType::Clicked);

        let err = "upvoted".parse::<AdEventType>().unwrap_err();
        assert_eq!(err.value, "upvoted");
    }

    #[test]
    fn test_supported_events_per_ad_type() {
        assert!(AdType::NotificationAd.supports(AdEventType::Dismissed));
        assert!(AdType::NotificationAd.supports(AdEventType::TimedOut));
        assert!(!AdType::NewTabPageAd.supports(AdEventType::Dismissed));
        assert!(!AdType::SearchResultAd.supports(AdEventType::TimedOut));
        assert!(AdType::InlineContentAd.supports(AdEventType::Clicked));
    }

    #[test]
    fn test_terminal_events() {
        assert!(!AdEventType::Served.is_terminal());
        assert!(!AdEventType::Viewed.is_terminal());
        assert!(AdEventType::Clicked.is_terminal());
        assert!(AdEventType::Dismissed.is_terminal());
        assert!(AdEventType::TimedOut.is_terminal());
    }
}
