pub mod bandit;
pub mod exclusion;
pub mod pacing;
pub mod ranker;
pub mod rules;
pub mod segments;

pub use bandit::{BanditFeedback, BanditProcessor, EpsilonGreedyBandit};
pub use exclusion::{EligibilityContext, ExclusionRule, ExclusionRuleEngine};
pub use pacing::PacingSampler;
pub use ranker::{AdRanker, Selection, SelectionStrategy};
pub use segments::{SegmentMatch, SegmentMatcher};
