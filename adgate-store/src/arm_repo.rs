use async_trait::async_trait;
use adgate_core::repository::ArmStateRepository;
use adgate_core::CoreResult;
use adgate_shared::ArmState;
use tokio::sync::Mutex;

/// Bandit state kept for the lifetime of the process
#[derive(Default)]
pub struct InMemoryArmStore {
    state: Mutex<Option<ArmState>>,
    eligible_segments: Mutex<Vec<String>>,
}

impl InMemoryArmStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: ArmState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            eligible_segments: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ArmStateRepository for InMemoryArmStore {
    async fn load(&self) -> CoreResult<Option<ArmState>> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: &ArmState) -> CoreResult<()> {
        *self.state.lock().await = Some(state.clone());
        Ok(())
    }

    async fn load_eligible_segments(&self) -> CoreResult<Vec<String>> {
        Ok(self.eligible_segments.lock().await.clone())
    }

    async fn save_eligible_segments(&self, segments: &[String]) -> CoreResult<()> {
        *self.eligible_segments.lock().await = segments.to_vec();
        Ok(())
    }
}
