pub mod event_factory;
pub mod feedback;
pub mod lifecycle;
pub mod notifications;
pub mod orchestrator;
pub mod permission;

pub use event_factory::{event_firer, AdEventFirer, FireContext};
pub use feedback::spawn_bandit_feedback;
pub use lifecycle::{AdEventError, AdEventLifecycleHandler};
pub use notifications::NotificationHub;
pub use orchestrator::{ServeOutcome, ServingError, ServingOrchestrator, ServingResources};
pub use permission::ServingPermission;
