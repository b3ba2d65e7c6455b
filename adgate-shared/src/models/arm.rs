use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A bandit-tracked segment and its running reward estimate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Arm {
    pub segment: String,
    pub pulls: u64,
    pub value: f64,
}

impl Arm {
    /// Fresh arms start optimistic so every segment gets explored
    pub fn new(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            pulls: 0,
            value: 1.0,
        }
    }
}

/// Persisted bandit state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArmState {
    pub version: u32,
    pub arms: BTreeMap<String, Arm>,
}

impl ArmState {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn with_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let arms = segments
            .into_iter()
            .map(|segment| {
                let arm = Arm::new(segment);
                (arm.segment.clone(), arm)
            })
            .collect();

        Self {
            version: Self::CURRENT_VERSION,
            arms,
        }
    }

    /// Arms restricted to the given segments. An empty filter keeps every arm.
    pub fn eligible_arms(&self, eligible_segments: &[String]) -> BTreeMap<String, Arm> {
        if eligible_segments.is_empty() {
            return self.arms.clone();
        }

        self.arms
            .iter()
            .filter(|(segment, _)| eligible_segments.contains(segment))
            .map(|(segment, arm)| (segment.clone(), arm.clone()))
            .collect()
    }
}

impl Default for ArmState {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            arms: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eligible_arms_filter() {
        let state = ArmState::with_segments(["sports", "technology", "travel"]);

        assert_eq!(state.eligible_arms(&[]).len(), 3);

        let eligible = state.eligible_arms(&["travel".to_string(), "food".to_string()]);
        assert_eq!(eligible.len(), 1);
        assert!(eligible.contains_key("travel"));
    }

    #[test]
    fn test_arm_state_serde_shape() {
        let state = ArmState::with_segments(["sports"]);
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["version"], 1);
        assert_eq!(json["arms"]["sports"]["pulls"], 0);
        assert_eq!(json["arms"]["sports"]["value"], 1.0);
    }
}
