use adgate_shared::CreativeAd;
use rand::Rng;
use tracing::debug;

/// Probabilistic admission on each creative's pass-through rate.
///
/// Holds no state; results are reproducible only through the injected rng.
#[derive(Debug, Default, Clone, Copy)]
pub struct PacingSampler;

impl PacingSampler {
    pub fn new() -> Self {
        Self
    }

    /// Admit a candidate iff a uniform draw in `[0, 1)` is below its rate
    pub fn admit<R: Rng>(&self, creative_ads: Vec<CreativeAd>, rng: &mut R) -> Vec<CreativeAd> {
        let total = creative_ads.len();
        let admitted: Vec<CreativeAd> = creative_ads
            .into_iter()
            .filter(|creative_ad| {
                let draw: f64 = rng.gen();
                let admit = draw < creative_ad.pass_through_rate;
                if !admit {
                    debug!(
                        creative_instance_id = %creative_ad.creative_instance_id,
                        pass_through_rate = creative_ad.pass_through_rate,
                        "Paced out creative ad"
                    );
                }
                admit
            })
            .collect();

        debug!(total, admitted = admitted.len(), "Applied pacing");
        admitted
    }
}
