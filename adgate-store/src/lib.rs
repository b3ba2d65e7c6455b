pub mod ad_event_store;
pub mod app_config;
pub mod arm_repo;
pub mod catalog_repo;
pub mod purge;
pub mod redis_repo;
pub mod resources;

pub use ad_event_store::AdEventStore;
pub use arm_repo::InMemoryArmStore;
pub use catalog_repo::InMemoryCreativeAdRepository;
pub use purge::spawn_purge_worker;
pub use redis_repo::RedisArmStore;
pub use resources::StaticResources;
