use adgate_core::repository::ArmStateRepository;
use adgate_core::ManualClock;
use adgate_serving::{spawn_bandit_feedback, NotificationHub, ServingOrchestrator, ServingResources};
use adgate_shared::UserModel;
use adgate_sim::run_rounds;
use adgate_store::app_config::Config;
use adgate_store::{
    spawn_purge_worker, AdEventStore, InMemoryArmStore, InMemoryCreativeAdRepository, RedisArmStore,
    StaticResources,
};
use anyhow::Context;
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_ROUNDS: usize = 20;
const CLICK_RATE: f64 = 0.3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adgate_sim=debug,adgate_serving=info,adgate_eligibility=info,adgate_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let catalog_path = args
        .next()
        .context("usage: adgate-sim <catalog.json> [rounds]")?;
    let rounds = match args.next() {
        Some(rounds) => rounds.parse().context("rounds must be a number")?,
        None => DEFAULT_ROUNDS,
    };

    let config = Config::load().context("Failed to load config")?;
    tracing::info!(catalog = %catalog_path, rounds, "Starting adgate simulation");

    let catalog_json = tokio::fs::read_to_string(&catalog_path)
        .await
        .with_context(|| format!("Failed to read {}", catalog_path))?;
    let catalog = Arc::new(InMemoryCreativeAdRepository::from_json(&catalog_json)?);

    let arms: Arc<dyn ArmStateRepository> = match &config.redis {
        Some(redis) => {
            tracing::info!(url = %redis.url, "Persisting bandit arms in Redis");
            Arc::new(RedisArmStore::new(&redis.url, &redis.key_prefix)?)
        }
        None => Arc::new(InMemoryArmStore::new()),
    };

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let store = Arc::new(AdEventStore::new(clock.clone()));
    let purge = spawn_purge_worker(store.clone(), config.history.clone());

    let resources = Arc::new(StaticResources::new(UserModel::default()));
    let orchestrator = ServingOrchestrator::new(
        &config,
        store.clone(),
        ServingResources::from_shared(catalog, resources),
        arms.clone(),
        clock.clone(),
        NotificationHub::default(),
    );
    let feedback = spawn_bandit_feedback(orchestrator.bandit_processor(), orchestrator.notifications());

    let mut rng = match config.serving.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let report = run_rounds(
        &orchestrator,
        &clock,
        rounds,
        Duration::minutes(10),
        CLICK_RATE,
        &mut rng,
    )
    .await?;

    // Closing the hub lets the feedback worker drain and exit
    drop(orchestrator);
    feedback.await?;
    purge.abort();

    tracing::info!(
        served = report.served,
        clicked = report.clicked,
        dismissed = report.dismissed,
        no_eligible = report.no_eligible,
        not_allowed = report.not_allowed,
        events = store.len().await,
        "Simulation summary"
    );

    if let Some(state) = arms.load().await? {
        let mut ranked: Vec<_> = state.arms.values().filter(|arm| arm.pulls > 0).collect();
        ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
        for arm in ranked {
            tracing::info!(segment = %arm.segment, pulls = arm.pulls, value = arm.value, "Bandit arm");
        }
    }

    Ok(())
}
