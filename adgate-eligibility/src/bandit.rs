use adgate_core::repository::ArmStateRepository;
use adgate_core::CoreResult;
use adgate_shared::{parent_segment, AdNotification, Arm, ArmState};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Number of segments the bandit targets at once
pub const SEGMENT_LIMIT: usize = 3;

/// Epsilon-greedy selection of segment arms
#[derive(Debug, Clone, Copy)]
pub struct EpsilonGreedyBandit {
    epsilon: f64,
}

impl EpsilonGreedyBandit {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Up to three distinct segments to target. Returns empty when there are
    /// too few arms to choose from.
    pub fn get_segments<R: Rng>(&self, arms: &BTreeMap<String, Arm>, rng: &mut R) -> Vec<String> {
        if arms.len() < SEGMENT_LIMIT {
            debug!(arms = arms.len(), "Not enough arms for bandit targeting");
            return Vec::new();
        }

        let segments = if rng.gen::<f64>() < self.epsilon {
            explore(arms, rng)
        } else {
            exploit(arms, rng)
        };

        debug!(?segments, "Bandit chose segments");
        segments
    }
}

fn explore<R: Rng>(arms: &BTreeMap<String, Arm>, rng: &mut R) -> Vec<String> {
    let mut segments: Vec<String> = arms.keys().cloned().collect();
    segments.shuffle(rng);
    segments.truncate(SEGMENT_LIMIT);
    segments
}

fn exploit<R: Rng>(arms: &BTreeMap<String, Arm>, rng: &mut R) -> Vec<String> {
    // Buckets of equal value, best first
    let mut buckets: Vec<(f64, Vec<String>)> = Vec::new();
    for (segment, arm) in arms {
        match buckets.iter_mut().find(|(value, _)| *value == arm.value) {
            Some((_, bucket)) => bucket.push(segment.clone()),
            None => buckets.push((arm.value, vec![segment.clone()])),
        }
    }
    buckets.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut segments = Vec::with_capacity(SEGMENT_LIMIT);
    for (_, mut bucket) in buckets {
        let remaining = SEGMENT_LIMIT - segments.len();
        if remaining == 0 {
            break;
        }
        bucket.shuffle(rng);
        bucket.truncate(remaining);
        segments.extend(bucket);
    }
    segments
}

/// A reward observed for one segment arm
#[derive(Debug, Clone, PartialEq)]
pub struct BanditFeedback {
    pub segment: String,
    pub reward: f64,
}

impl BanditFeedback {
    /// Clicks reward the ad's top-level segment; dismissals and timeouts penalize it
    pub fn from_notification(notification: &AdNotification) -> Option<Self> {
        let (ad, reward) = match notification {
            AdNotification::Clicked { ad } => (ad, 1.0),
            AdNotification::Dismissed { ad } | AdNotification::TimedOut { ad } => (ad, 0.0),
            _ => return None,
        };

        if ad.segment.is_empty() {
            return None;
        }

        Some(Self {
            segment: parent_segment(&ad.segment).to_string(),
            reward,
        })
    }
}

/// Applies rewards to persisted arm state
pub struct BanditProcessor {
    arms: Arc<dyn ArmStateRepository>,
    initial_segments: Vec<String>,
    // Serializes load-modify-save
    update_lock: Mutex<()>,
}

impl BanditProcessor {
    pub fn new(arms: Arc<dyn ArmStateRepository>, initial_segments: Vec<String>) -> Self {
        Self {
            arms,
            initial_segments,
            update_lock: Mutex::new(()),
        }
    }

    /// Persisted arms, or fresh optimistic arms when nothing is stored yet
    pub async fn load_arms(&self) -> CoreResult<ArmState> {
        match self.arms.load().await? {
            Some(state) => Ok(state),
            None => Ok(ArmState::with_segments(self.initial_segments.iter().cloned())),
        }
    }

    /// Arms restricted to the persisted eligible segments
    pub async fn eligible_arms(&self) -> CoreResult<BTreeMap<String, Arm>> {
        let state = self.load_arms().await?;
        let eligible_segments = self.arms.load_eligible_segments().await?;
        Ok(state.eligible_arms(&eligible_segments))
    }

    pub async fn process(&self, feedback: BanditFeedback) -> CoreResult<()> {
        let _guard = self.update_lock.lock().await;
        let mut state = self.load_arms().await?;

        let arm = state
            .arms
            .entry(feedback.segment.clone())
            .or_insert_with(|| Arm::new(feedback.segment.clone()));
        arm.pulls += 1;
        arm.value += (feedback.reward - arm.value) / arm.pulls as f64;

        info!(
            segment = %feedback.segment,
            reward = feedback.reward,
            pulls = arm.pulls,
            value = arm.value,
            "Updated bandit arm"
        );

        self.arms.save(&state).await
    }

    /// Returns whether the notification carried a reward
    pub async fn on_notification(&self, notification: &AdNotification) -> CoreResult<bool> {
        match BanditFeedback::from_notification(notification) {
            Some(feedback) => {
                self.process(feedback).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
