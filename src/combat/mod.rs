//! Combat observation
//!
//! - [`events`]: notifications published by participants and the observer registry
//! - [`log`]: the combat log fed from those notifications

pub mod events;
pub mod log;

pub use events::{Notification, ObserverId, Observers};
pub use log::{CombatLog, CombatLogEventType};
