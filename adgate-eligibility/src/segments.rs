use adgate_shared::{segment_matches, CreativeAd, SegmentCategory, UserModel};
use tracing::debug;

/// Result of matching a user model against candidates
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentMatch {
    /// Category that produced the match; `None` for the untargeted pool
    pub category: Option<SegmentCategory>,
    pub creative_ads: Vec<CreativeAd>,
}

impl SegmentMatch {
    pub fn is_empty(&self) -> bool {
        self.creative_ads.is_empty()
    }
}

/// Matches candidates against the user model, one category at a time in
/// priority order. The first category with any match wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct SegmentMatcher;

impl SegmentMatcher {
    pub fn new() -> Self {
        Self
    }

    pub fn match_segments(&self, user_model: &UserModel, creative_ads: Vec<CreativeAd>) -> SegmentMatch {
        if user_model.is_empty() {
            debug!(candidates = creative_ads.len(), "Empty user model, serving untargeted");
            return SegmentMatch {
                category: None,
                creative_ads,
            };
        }

        for (category, segments) in user_model.categories() {
            if segments.is_empty() {
                continue;
            }

            let matched: Vec<CreativeAd> = creative_ads
                .iter()
                .filter(|creative_ad| {
                    segments
                        .iter()
                        .any(|segment| segment_matches(&creative_ad.segment, segment))
                })
                .cloned()
                .collect();

            if !matched.is_empty() {
                debug!(?category, matched = matched.len(), "Matched segments");
                return SegmentMatch {
                    category: Some(category),
                    creative_ads: matched,
                };
            }
        }

        debug!("No candidate matches the user model");
        SegmentMatch {
            category: None,
            creative_ads: Vec::new(),
        }
    }
}
