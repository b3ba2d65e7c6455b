use crate::models::ad::Ad;
use crate::models::ad_event::{AdEventType, AdType};

/// Lifecycle notifications published after an ad event is fired
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdNotification {
    Served { ad: Ad },
    Viewed { ad: Ad },
    Clicked { ad: Ad },
    Dismissed { ad: Ad },
    TimedOut { ad: Ad },
    FailedToFire {
        placement_id: String,
        creative_instance_id: Option<String>,
        event_type: AdEventType,
        reason: String,
    },
}

impl AdNotification {
    pub fn fired(event_type: AdEventType, ad: Ad) -> Self {
        match event_type {
            AdEventType::Served => AdNotification::Served { ad },
            AdEventType::Viewed => AdNotification::Viewed { ad },
            AdEventType::Clicked => AdNotification::Clicked { ad },
            AdEventType::Dismissed => AdNotification::Dismissed { ad },
            AdEventType::TimedOut => AdNotification::TimedOut { ad },
        }
    }

    /// The ad the notification refers to, if the event was fired
    pub fn ad(&self) -> Option<&Ad> {
        match self {
            AdNotification::Served { ad }
            | AdNotification::Viewed { ad }
            | AdNotification::Clicked { ad }
            | AdNotification::Dismissed { ad }
            | AdNotification::TimedOut { ad } => Some(ad),
            AdNotification::FailedToFire { .. } => None,
        }
    }
}

/// Notifications published by the serving pipeline
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServingNotification {
    OpportunityAroseToServeAd {
        ad_type: AdType,
        segments: Vec<String>,
    },
    ServedAd { ad: Ad },
    NoEligibleAds { ad_type: AdType, reason: String },
    NotAllowed { ad_type: AdType, reason: String },
    FailedToServeAd { ad_type: AdType, reason: String },
}
