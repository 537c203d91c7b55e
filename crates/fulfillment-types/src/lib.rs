//! Shared types for the order fulfillment system.
//!
//! This crate holds the canonical order model, the staff actor identity, the
//! records consulted by side effects, the event bus payloads and the
//! configuration-validation helpers used by every backend crate.

/// Staff identity used for audit stamping.
pub mod actor;
/// Business profiles and customer contacts.
pub mod directory;
/// Event bus payloads.
pub mod events;
/// Customer notification requests.
pub mod notification;
/// Canonical order model.
pub mod order;
/// Partial-refund results.
pub mod refund;
/// Backend registry trait.
pub mod registry;
/// Storage namespaces.
pub mod storage;
/// Formatting and time helpers.
pub mod utils;
/// Backend configuration validation.
pub mod validation;
/// Live view time windows.
pub mod window;

pub use actor::*;
pub use directory::*;
pub use events::*;
pub use notification::*;
pub use order::*;
pub use refund::*;
pub use registry::*;
pub use storage::*;
pub use utils::{current_timestamp, short_code, truncate_id};
pub use validation::*;
pub use window::*;
