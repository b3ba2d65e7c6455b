pub mod ad;
pub mod ad_event;
pub mod arm;
pub mod events;
pub mod user_model;
