//! Small helpers shared across the workspace.

pub mod formatting;
pub mod helpers;

pub use formatting::{short_code, truncate_id};
pub use helpers::current_timestamp;
