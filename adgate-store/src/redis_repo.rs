use async_trait::async_trait;
use adgate_core::repository::ArmStateRepository;
use adgate_core::{CoreError, CoreResult};
use adgate_shared::ArmState;
use redis::AsyncCommands;
use serde::Deserialize;
use tracing::{error, info};

/// Bandit state persisted in Redis: the arm map and the companion
/// eligible-segments list live under two keys as JSON.
#[derive(Clone)]
pub struct RedisArmStore {
    client: redis::Client,
    arms_key: String,
    eligible_segments_key: String,
}

impl RedisArmStore {
    pub fn new(connection_string: &str, key_prefix: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self {
            client,
            arms_key: format!("{}:bandit:arms", key_prefix),
            eligible_segments_key: format!("{}:bandit:eligible_segments", key_prefix),
        })
    }

    async fn connection(&self) -> CoreResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(persistence_error)
    }
}

fn persistence_error(e: redis::RedisError) -> CoreError {
    error!("Redis error: {}", e);
    CoreError::Persistence(e.to_string())
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

/// Decode persisted arms, refusing state written by an unknown schema version
pub(crate) fn decode_arm_state(json: &str) -> CoreResult<ArmState> {
    let header: VersionHeader = serde_json::from_str(json)
        .map_err(|e| CoreError::Persistence(format!("Malformed bandit state: {}", e)))?;

    if header.version != ArmState::CURRENT_VERSION {
        return Err(CoreError::Persistence(format!(
            "Unsupported bandit state version {}",
            header.version
        )));
    }

    serde_json::from_str(json)
        .map_err(|e| CoreError::Persistence(format!("Malformed bandit state: {}", e)))
}

#[async_trait]
impl ArmStateRepository for RedisArmStore {
    async fn load(&self) -> CoreResult<Option<ArmState>> {
        let mut conn = self.connection().await?;
        let json: Option<String> = conn.get(&self.arms_key).await.map_err(persistence_error)?;
        json.map(|json| decode_arm_state(&json)).transpose()
    }

    async fn save(&self, state: &ArmState) -> CoreResult<()> {
        let json = serde_json::to_string(state).map_err(|e| CoreError::Internal(e.to_string()))?;
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(&self.arms_key, json)
            .await
            .map_err(persistence_error)?;
        info!("Saved {} bandit arms", state.arms.len());
        Ok(())
    }

    async fn load_eligible_segments(&self) -> CoreResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let json: Option<String> = conn
            .get(&self.eligible_segments_key)
            .await
            .map_err(persistence_error)?;

        match json {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| CoreError::Persistence(format!("Malformed eligible segments: {}", e))),
            None => Ok(Vec::new()),
        }
    }

    async fn save_eligible_segments(&self, segments: &[String]) -> CoreResult<()> {
        let json = serde_json::to_string(segments).map_err(|e| CoreError::Internal(e.to_string()))?;
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(&self.eligible_segments_key, json)
            .await
            .map_err(persistence_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_current_version() {
        let json = serde_json::to_string(&ArmState::with_segments(["sports"])).unwrap();
        let state = decode_arm_state(&json).unwrap();
        assert!(state.arms.contains_key("sports"));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let json = r#"{"version": 7, "arms": {}}"#;
        assert!(matches!(decode_arm_state(json), Err(CoreError::Persistence(_))));
    }

    #[test]
    fn test_decode_rejects_legacy_string_payload() {
        assert!(decode_arm_state(r#""sports:1.0,travel:0.5""#).is_err());
    }

    #[test]
    fn test_keys_are_prefixed() {
        // Opening a client does not connect
        let store = RedisArmStore::new("redis://127.0.0.1:6379", "test").unwrap();
        assert_eq!(store.arms_key, "test:bandit:arms");
        assert_eq!(store.eligible_segments_key, "test:bandit:eligible_segments");
    }
}
