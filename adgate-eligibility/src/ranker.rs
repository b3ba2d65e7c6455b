use adgate_shared::{segment_matches, CreativeAd};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// How the winning creative was chosen
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionStrategy {
    /// Restricted to the segments the bandit picked
    Bandit(Vec<String>),
    /// Bandit declined or none of its segments had a candidate
    Priority,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub creative_ad: CreativeAd,
    pub strategy: SelectionStrategy,
}

/// Picks the winning creative from the paced candidates
#[derive(Debug, Default, Clone, Copy)]
pub struct AdRanker;

impl AdRanker {
    pub fn new() -> Self {
        Self
    }

    pub fn select<R: Rng>(
        &self,
        creative_ads: Vec<CreativeAd>,
        bandit_segments: &[String],
        rng: &mut R,
    ) -> Option<Selection> {
        if creative_ads.is_empty() {
            return None;
        }

        if !bandit_segments.is_empty() {
            let targeted: Vec<CreativeAd> = creative_ads
                .iter()
                .filter(|c| bandit_segments.iter().any(|s| segment_matches(s, &c.segment)))
                .cloned()
                .collect();

            if let Some(creative_ad) = choose_by_priority(targeted, rng) {
                return Some(Selection {
                    creative_ad,
                    strategy: SelectionStrategy::Bandit(bandit_segments.to_vec()),
                });
            }
            debug!(?bandit_segments, "No candidate in bandit segments, using priority");
        }

        choose_by_priority(creative_ads, rng).map(|creative_ad| Selection {
            creative_ad,
            strategy: SelectionStrategy::Priority,
        })
    }
}

/// Lower priority wins; 0 means unset and sorts last
fn priority_rank(priority: u32) -> u32 {
    if priority == 0 {
        u32::MAX
    } else {
        priority
    }
}

fn choose_by_priority<R: Rng>(creative_ads: Vec<CreativeAd>, rng: &mut R) -> Option<CreativeAd> {
    let best = creative_ads.iter().map(|c| priority_rank(c.priority)).min()?;
    let top: Vec<CreativeAd> = creative_ads
        .into_iter()
        .filter(|c| priority_rank(c.priority) == best)
        .collect();
    top.choose(rng).cloned()
}
