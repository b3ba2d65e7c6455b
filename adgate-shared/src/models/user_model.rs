use serde::{Deserialize, Serialize};

/// Targeting categories, in priority order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SegmentCategory {
    Intent,
    LatentInterest,
    Interest,
}

/// Whether a creative's segment targets a user segment: either the same
/// segment or a hierarchical parent of it (`technology` covers `technology-ai`).
pub fn segment_matches(ad_segment: &str, user_segment: &str) -> bool {
    if ad_segment.is_empty() {
        return false;
    }
    match user_segment.strip_prefix(ad_segment) {
        Some(rest) => rest.is_empty() || rest.starts_with('-'),
        None => false,
    }
}

/// Top level of a hierarchical segment (`technology-ai` -> `technology`)
pub fn parent_segment(segment: &str) -> &str {
    segment.split('-').next().unwrap_or(segment)
}

/// Prioritized segments describing the user
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserModel {
    #[serde(default)]
    pub intent_segments: Vec<String>,
    #[serde(default)]
    pub latent_interest_segments: Vec<String>,
    #[serde(default)]
    pub interest_segments: Vec<String>,
}

impl UserModel {
    pub fn is_empty(&self) -> bool {
        self.intent_segments.is_empty()
            && self.latent_interest_segments.is_empty()
            && self.interest_segments.is_empty()
    }

    /// Categories in the order they should be matched
    pub fn categories(&self) -> [(SegmentCategory, &[String]); 3] {
        [
            (SegmentCategory::Intent, self.intent_segments.as_slice()),
            (SegmentCategory::LatentInterest, self.latent_interest_segments.as_slice()),
            (SegmentCategory::Interest, self.interest_segments.as_slice()),
        ]
    }

    /// All segments, highest priority first, without duplicates
    pub fn segments(&self) -> Vec<String> {
        let mut segments: Vec<String> = Vec::new();
        for (_, category) in self.categories() {
            for segment in category {
                if !segments.contains(segment) {
                    segments.push(segment.clone());
                }
            }
        }
        segments
    }
}
