//! Domain model shared by the SkillSwap server and client.

pub mod id;
pub mod integrity;
pub mod lifecycle;
pub mod model;
pub mod protocol;

pub use id::{new_id, validate_id, validate_user_id, InvalidId};
pub use integrity::{metadata_hash, verify_metadata_hash};
pub use lifecycle::{LifecycleError, Payout};
pub use model::*;
