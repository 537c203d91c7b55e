//! State management for orders.
//!
//! [`store`] keeps canonical orders in storage and publishes their changes;
//! [`order`] holds the transition table, its guards and the recommended next
//! action policy.

pub mod order;
pub mod store;

pub use order::{
	recommended_action, CommittedTransition, NextAction, OrderStateMachine, TransitionError,
	TransitionRequest,
};
pub use store::{OrderStore, StoreError};
