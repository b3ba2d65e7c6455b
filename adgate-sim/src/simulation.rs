use adgate_core::ManualClock;
use adgate_serving::{ServeOutcome, ServingOrchestrator};
use adgate_shared::{AdEventType, AdType, PlacementContext};
use chrono::Duration;
use rand::Rng;
use tracing::{debug, info};

/// Tally of a simulation run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    pub served: usize,
    pub no_eligible: usize,
    pub not_allowed: usize,
    pub clicked: usize,
    pub dismissed: usize,
}

/// Serve `rounds` notification ads `step` apart. Every served ad is viewed,
/// then clicked with probability `click_rate` or dismissed otherwise.
pub async fn run_rounds<R: Rng>(
    orchestrator: &ServingOrchestrator,
    clock: &ManualClock,
    rounds: usize,
    step: Duration,
    click_rate: f64,
    rng: &mut R,
) -> anyhow::Result<SimulationReport> {
    let lifecycle = orchestrator.lifecycle();
    let context = PlacementContext::new(AdType::NotificationAd);
    let mut report = SimulationReport::default();

    for round in 0..rounds {
        match orchestrator.maybe_serve_ad(&context).await? {
            ServeOutcome::Served(ad) => {
                report.served += 1;
                lifecycle
                    .fire_event(&ad.placement_id, None, AdEventType::Viewed)
                    .await?;

                let reaction = if rng.gen_bool(click_rate.clamp(0.0, 1.0)) {
                    report.clicked += 1;
                    AdEventType::Clicked
                } else {
                    report.dismissed += 1;
                    AdEventType::Dismissed
                };
                lifecycle.fire_event(&ad.placement_id, None, reaction).await?;

                debug!(round, segment = %ad.segment, %reaction, "Round finished");
            }
            ServeOutcome::NoEligibleAds(reason) => {
                report.no_eligible += 1;
                debug!(round, %reason, "No eligible ads");
            }
            ServeOutcome::NotAllowed(reason) => {
                report.not_allowed += 1;
                debug!(round, %reason, "Not allowed");
            }
        }

        clock.advance(step);
        lifecycle.purge_expired_placements().await;
    }

    info!(?report, "Simulation finished");
    Ok(report)
}
