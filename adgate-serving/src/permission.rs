use adgate_core::AdEventSnapshot;
use adgate_shared::{AdType, ConfirmationType, PlacementContext};
use adgate_store::app_config::ServingConfig;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// Policy gate run before any candidate is considered
#[derive(Debug, Clone)]
pub struct ServingPermission {
    config: ServingConfig,
}

impl ServingPermission {
    pub fn new(config: ServingConfig) -> Self {
        Self { config }
    }

    /// `Err(reason)` when an ad may not be served for this context now.
    ///
    /// `served_contexts` holds the keys of tab-bound contexts already served
    /// this session; contexts without a tab are not deduplicated.
    pub fn check(
        &self,
        context: &PlacementContext,
        history: &AdEventSnapshot,
        now: DateTime<Utc>,
        served_contexts: &HashSet<String>,
    ) -> Result<(), String> {
        if context.tab_id.is_some() && served_contexts.contains(&context.key()) {
            return Err(format!("already served for {}", context.key()));
        }

        self.check_cap(context.ad_type, history, now, Duration::hours(1), self.config.ads_per_hour, "hour")?;
        self.check_cap(context.ad_type, history, now, Duration::days(1), self.config.ads_per_day, "day")?;
        self.check_minimum_wait(context.ad_type, history, now)
    }

    fn check_cap(
        &self,
        ad_type: AdType,
        history: &AdEventSnapshot,
        now: DateTime<Utc>,
        window: Duration,
        cap: u32,
        period: &str,
    ) -> Result<(), String> {
        if cap == 0 {
            return Ok(());
        }

        let served = history.count_for_ad_type(ad_type, ConfirmationType::Served, now, Some(window));
        if served as u64 >= cap as u64 {
            return Err(format!("reached {} {} ads per {}", cap, ad_type, period));
        }
        Ok(())
    }

    fn check_minimum_wait(
        &self,
        ad_type: AdType,
        history: &AdEventSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        let minimum_wait = self.config.minimum_wait_time();
        if minimum_wait <= Duration::zero() {
            return Ok(());
        }

        let last_served = history.latest(now, |e| {
            e.ad_type == ad_type && e.confirmation_type == ConfirmationType::Served
        });

        match last_served {
            Some(event) if now - event.created_at < minimum_wait => Err(format!(
                "last {} served less than {}s ago",
                ad_type, self.config.minimum_wait_time_secs
            )),
            _ => Ok(()),
        }
    }
}
