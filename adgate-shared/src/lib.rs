pub mod models;

pub use models::ad::{Ad, CreativeAd, Daypart, FrequencyCaps, PlacementContext, ServedAd};
pub use models::ad_event::{AdEvent, AdEventType, AdType, ConfirmationType, ParseEnumError};
pub use models::arm::{Arm, ArmState};
pub use models::events::{AdNotification, ServingNotification};
pub use models::user_model::{parent_segment, segment_matches, SegmentCategory, UserModel};
