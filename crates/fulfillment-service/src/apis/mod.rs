//! Request handling for the fulfillment API.

pub mod actor;
pub mod board;
pub mod error;
pub mod orders;

pub use actor::ActingUser;
pub use error::{ApiError, ErrorResponse};
