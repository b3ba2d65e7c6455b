use adgate_shared::{segment_matches, AdType, ConfirmationType, CreativeAd, FrequencyCaps};
use adgate_store::app_config::ExclusionConfig;
use chrono::{Datelike, Duration, Timelike};

use crate::exclusion::{EligibilityContext, ExclusionRule};

/// Rules in evaluation order
pub fn default_rules(config: &ExclusionConfig) -> Vec<Box<dyn ExclusionRule>> {
    let mut rules: Vec<Box<dyn ExclusionRule>> = vec![
        Box::new(SplitTestRule),
        Box::new(SubdivisionTargetingRule),
        Box::new(AntiTargetingRule),
        Box::new(DislikeRule),
        Box::new(DislikeSegmentRule),
        Box::new(MarkedAsInappropriateRule),
    ];

    if config.exclude_if_converted {
        rules.push(Box::new(ConversionRule));
    }

    rules.push(Box::new(TransferredRule {
        window: config.transferred_window(),
    }));
    rules.push(Box::new(DismissedRule {
        window: config.dismissed_window(),
    }));
    rules.push(Box::new(DaypartRule));

    if let Some(window) = config.seen_advertiser_window() {
        rules.push(Box::new(SeenAdvertiserRule { window }));
    }

    rules.extend(FrequencyCapRule::all().into_iter().map(|rule| Box::new(rule) as Box<dyn ExclusionRule>));
    rules
}

pub struct SplitTestRule;

impl ExclusionRule for SplitTestRule {
    fn name(&self) -> &'static str {
        "split_test"
    }

    fn check(&self, creative_ad: &CreativeAd, context: &EligibilityContext) -> Result<(), String> {
        let Some(group) = &creative_ad.split_test_group else {
            return Ok(());
        };

        match &context.split_test_group {
            Some(assigned) if assigned == group => Ok(()),
            Some(assigned) => Err(format!("split test group {} does not match {}", group, assigned)),
            None => Err(format!("user is not in split test group {}", group)),
        }
    }
}

/// Creatives that name subdivisions (`US-CA`) are only shown inside one of them
pub struct SubdivisionTargetingRule;

impl ExclusionRule for SubdivisionTargetingRule {
    fn name(&self) -> &'static str {
        "subdivision_targeting"
    }

    fn check(&self, creative_ad: &CreativeAd, context: &EligibilityContext) -> Result<(), String> {
        let subdivisions: Vec<&String> = creative_ad
            .geo_targets
            .iter()
            .filter(|code| code.contains('-'))
            .collect();
        if subdivisions.is_empty() {
            return Ok(());
        }

        match &context.subdivision_code {
            None => Err("subdivision is unknown".to_string()),
            Some(code) if subdivisions.iter().any(|s| s.eq_ignore_ascii_case(code)) => Ok(()),
            Some(code) => Err(format!("subdivision {} is not targeted", code)),
        }
    }
}

pub struct AntiTargetingRule;

impl ExclusionRule for AntiTargetingRule {
    fn name(&self) -> &'static str {
        "anti_targeting"
    }

    fn check(&self, creative_ad: &CreativeAd, context: &EligibilityContext) -> Result<(), String> {
        let sites = context
            .anti_targeting
            .sites_for_creative_set(&creative_ad.creative_set_id);

        match sites.iter().find(|site| context.browsing_history.contains(*site)) {
            Some(site) => Err(format!("user visited anti-targeted site {}", site)),
            None => Ok(()),
        }
    }
}

pub struct DislikeRule;

impl ExclusionRule for DislikeRule {
    fn name(&self) -> &'static str {
        "dislike"
    }

    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.advertiser_id.clone()
    }

    fn check(&self, creative_ad: &CreativeAd, context: &EligibilityContext) -> Result<(), String> {
        if context
            .preferences
            .disliked_advertisers
            .contains(&creative_ad.advertiser_id)
        {
            return Err(format!("advertiser {} is disliked", creative_ad.advertiser_id));
        }
        Ok(())
    }
}

pub struct DislikeSegmentRule;

impl ExclusionRule for DislikeSegmentRule {
    fn name(&self) -> &'static str {
        "dislike_segment"
    }

    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.segment.clone()
    }

    fn check(&self, creative_ad: &CreativeAd, context: &EligibilityContext) -> Result<(), String> {
        match context
            .preferences
            .disliked_segments
            .iter()
            .find(|disliked| segment_matches(disliked, &creative_ad.segment))
        {
            Some(disliked) => Err(format!("segment {} is disliked", disliked)),
            None => Ok(()),
        }
    }
}

pub struct MarkedAsInappropriateRule;

impl ExclusionRule for MarkedAsInappropriateRule {
    fn name(&self) -> &'static str {
        "marked_as_inappropriate"
    }

    fn check(&self, creative_ad: &CreativeAd, context: &EligibilityContext) -> Result<(), String> {
        if context
            .preferences
            .marked_inappropriate_creative_sets
            .contains(&creative_ad.creative_set_id)
        {
            return Err("creative set was marked as inappropriate".to_string());
        }
        Ok(())
    }
}

pub struct ConversionRule;

impl ExclusionRule for ConversionRule {
    fn name(&self) -> &'static str {
        "conversion"
    }

    fn check(&self, creative_ad: &CreativeAd, context: &EligibilityContext) -> Result<(), String> {
        if context
            .converted_creative_sets
            .contains(&creative_ad.creative_set_id)
        {
            return Err("creative set already converted".to_string());
        }
        Ok(())
    }
}

/// The user already landed on this campaign's site recently
pub struct TransferredRule {
    pub window: Duration,
}

impl ExclusionRule for TransferredRule {
    fn name(&self) -> &'static str {
        "transferred"
    }

    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.campaign_id.clone()
    }

    fn check(&self, creative_ad: &CreativeAd, context: &EligibilityContext) -> Result<(), String> {
        let landed = context.history.count_within(context.now, Some(self.window), |e| {
            e.confirmation_type == ConfirmationType::Landed && e.campaign_id == creative_ad.campaign_id
        });

        if landed > 0 {
            return Err(format!("campaign {} was transferred", creative_ad.campaign_id));
        }
        Ok(())
    }
}

/// Notification ad campaigns dismissed recently stay hidden until clicked again
pub struct DismissedRule {
    pub window: Duration,
}

impl ExclusionRule for DismissedRule {
    fn name(&self) -> &'static str {
        "dismissed"
    }

    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.campaign_id.clone()
    }

    fn check(&self, creative_ad: &CreativeAd, context: &EligibilityContext) -> Result<(), String> {
        if creative_ad.ad_type != AdType::NotificationAd {
            return Ok(());
        }

        let same_campaign = |e: &adgate_shared::AdEvent| {
            e.ad_type == AdType::NotificationAd && e.campaign_id == creative_ad.campaign_id
        };

        let Some(dismissed) = context.history.latest(context.now, |e| {
            same_campaign(e) && e.confirmation_type == ConfirmationType::Dismissed
        }) else {
            return Ok(());
        };

        if dismissed.created_at <= context.now - self.window {
            return Ok(());
        }

        let clicked_since = context.history.latest(context.now, |e| {
            same_campaign(e)
                && e.confirmation_type == ConfirmationType::Clicked
                && e.created_at > dismissed.created_at
        });

        match clicked_since {
            Some(_) => Ok(()),
            None => Err(format!("campaign {} was dismissed", creative_ad.campaign_id)),
        }
    }
}

pub struct DaypartRule;

impl ExclusionRule for DaypartRule {
    fn name(&self) -> &'static str {
        "daypart"
    }

    fn check(&self, creative_ad: &CreativeAd, context: &EligibilityContext) -> Result<(), String> {
        if creative_ad.dayparts.is_empty() {
            return Ok(());
        }

        let local = context.now.with_timezone(&context.local_offset);
        let day = local.weekday().num_days_from_sunday();
        let minute = local.hour() * 60 + local.minute();

        if creative_ad.dayparts.iter().any(|d| d.contains(day, minute)) {
            Ok(())
        } else {
            Err(format!("outside of dayparts (day {}, minute {})", day, minute))
        }
    }
}

/// Another creative from the same advertiser was served recently
pub struct SeenAdvertiserRule {
    pub window: Duration,
}

impl ExclusionRule for SeenAdvertiserRule {
    fn name(&self) -> &'static str {
        "seen_advertiser"
    }

    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.creative_instance_id.clone()
    }

    fn check(&self, creative_ad: &CreativeAd, context: &EligibilityContext) -> Result<(), String> {
        let seen = context.history.count_within(context.now, Some(self.window), |e| {
            e.confirmation_type == ConfirmationType::Served
                && e.advertiser_id == creative_ad.advertiser_id
                && e.creative_instance_id != creative_ad.creative_instance_id
        });

        if seen > 0 {
            return Err(format!("advertiser {} was seen recently", creative_ad.advertiser_id));
        }
        Ok(())
    }
}

/// Served-count cap for one creative instance over a window
pub struct FrequencyCapRule {
    name: &'static str,
    window: Option<Duration>,
    cap: fn(&FrequencyCaps) -> u32,
}

impl FrequencyCapRule {
    pub fn per_hour() -> Self {
        Self { name: "per_hour", window: Some(Duration::hours(1)), cap: |c| c.per_hour }
    }

    pub fn per_day() -> Self {
        Self { name: "per_day", window: Some(Duration::days(1)), cap: |c| c.per_day }
    }

    pub fn per_week() -> Self {
        Self { name: "per_week", window: Some(Duration::days(7)), cap: |c| c.per_week }
    }

    pub fn per_month() -> Self {
        Self { name: "per_month", window: Some(Duration::days(28)), cap: |c| c.per_month }
    }

    pub fn total_max() -> Self {
        Self { name: "total_max", window: None, cap: |c| c.total_max }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Self::per_hour(),
            Self::per_day(),
            Self::per_week(),
            Self::per_month(),
            Self::total_max(),
        ]
    }
}

impl ExclusionRule for FrequencyCapRule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.creative_instance_id.clone()
    }

    fn check(&self, creative_ad: &CreativeAd, context: &EligibilityContext) -> Result<(), String> {
        let cap = (self.cap)(&creative_ad.caps);
        if cap == 0 {
            return Ok(());
        }

        let served = context.history.count_for_creative_instance(
            &creative_ad.creative_instance_id,
            ConfirmationType::Served,
            context.now,
            self.window,
        );

        if served as u64 >= cap as u64 {
            return Err(format!("served {} times, cap is {}", served, cap));
        }
        Ok(())
    }
}
