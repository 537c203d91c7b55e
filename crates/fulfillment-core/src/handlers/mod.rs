//! Post-commit handlers.
//!
//! Work that follows a committed transition lives here, outside the state
//! machine, so its failures can never roll a transition back.

pub mod effects;

pub use effects::SideEffectOrchestrator;
