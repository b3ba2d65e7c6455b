use chrono::Duration;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serving: ServingConfig,
    #[serde(default)]
    pub exclusion: ExclusionConfig,
    #[serde(default)]
    pub bandit: BanditConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServingConfig {
    /// 0 disables the cap
    #[serde(default = "default_ads_per_hour")]
    pub ads_per_hour: u32,
    /// 0 disables the cap
    #[serde(default = "default_ads_per_day")]
    pub ads_per_day: u32,
    #[serde(default)]
    pub minimum_wait_time_secs: u64,
    #[serde(default = "default_served_ad_ttl")]
    pub served_ad_ttl_secs: u64,
    /// Fixed seed for reproducible pacing and bandit draws
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

fn default_ads_per_hour() -> u32 { 10 }
fn default_ads_per_day() -> u32 { 100 }
fn default_served_ad_ttl() -> u64 { 3600 }

impl ServingConfig {
    pub fn minimum_wait_time(&self) -> Duration {
        Duration::seconds(self.minimum_wait_time_secs as i64)
    }

    pub fn served_ad_ttl(&self) -> Duration {
        Duration::seconds(self.served_ad_ttl_secs as i64)
    }
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            ads_per_hour: default_ads_per_hour(),
            ads_per_day: default_ads_per_day(),
            minimum_wait_time_secs: 0,
            served_ad_ttl_secs: default_served_ad_ttl(),
            rng_seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExclusionConfig {
    /// 0 disables the seen-advertiser rule
    #[serde(default)]
    pub seen_advertiser_window_secs: u64,
    #[serde(default = "default_two_days")]
    pub transferred_window_secs: u64,
    #[serde(default = "default_two_days")]
    pub dismissed_window_secs: u64,
    #[serde(default = "default_true")]
    pub exclude_if_converted: bool,
}

fn default_two_days() -> u64 { 2 * 24 * 60 * 60 }
fn default_true() -> bool { true }

impl ExclusionConfig {
    pub fn seen_advertiser_window(&self) -> Option<Duration> {
        (self.seen_advertiser_window_secs > 0)
            .then(|| Duration::seconds(self.seen_advertiser_window_secs as i64))
    }

    pub fn transferred_window(&self) -> Duration {
        Duration::seconds(self.transferred_window_secs as i64)
    }

    pub fn dismissed_window(&self) -> Duration {
        Duration::seconds(self.dismissed_window_secs as i64)
    }
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self {
            seen_advertiser_window_secs: 0,
            transferred_window_secs: default_two_days(),
            dismissed_window_secs: default_two_days(),
            exclude_if_converted: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BanditConfig {
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Arms created when no bandit state has been persisted yet
    #[serde(default = "default_segments")]
    pub segments: Vec<String>,
}

fn default_epsilon() -> f64 { 0.25 }

fn default_segments() -> Vec<String> {
    [
        "architecture",
        "arts & entertainment",
        "automotive",
        "business",
        "careers",
        "cell phones",
        "education",
        "family & parenting",
        "fashion",
        "folklore",
        "food & drink",
        "health & fitness",
        "history",
        "hobbies & interests",
        "home",
        "law",
        "military",
        "personal finance",
        "pets",
        "real estate",
        "science",
        "sports",
        "technology & computing",
        "travel",
        "weather",
        "crypto",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
            segments: default_segments(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_purge_after_days")]
    pub purge_after_days: u32,
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

fn default_purge_after_days() -> u32 { 90 }
fn default_purge_interval() -> u64 { 24 * 60 * 60 }

impl HistoryConfig {
    pub fn purge_after(&self) -> Duration {
        Duration::days(self.purge_after_days as i64)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            purge_after_days: default_purge_after_days(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_key_prefix() -> String { "adgate".to_string() }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Defaults are compiled in, so even the base file is optional
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `ADGATE_BANDIT__EPSILON=0.1` sets `bandit.epsilon`
            .add_source(config::Environment::with_prefix("ADGATE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
