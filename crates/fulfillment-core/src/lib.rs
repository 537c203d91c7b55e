//! Core fulfillment engine for the order fulfillment service.
//!
//! This crate coordinates the life of an order from ingestion to completion:
//! stored documents are normalized into the canonical shape, kitchen staff
//! confirm items on a checklist, the state machine validates and commits
//! status changes, committed transitions fire notifications and refunds in the
//! background, and live views fold the resulting events into per-window boards.

pub mod builder;
pub mod checklist;
pub mod engine;
pub mod handlers;
pub mod live_view;
pub mod normalizer;
pub mod state;

pub use builder::{BuilderError, FulfillmentBuilder, FulfillmentFactories};
pub use checklist::{ChecklistError, FulfillmentChecklist};
pub use engine::event_bus::EventBus;
pub use engine::{EngineError, FulfillmentEngine, OrderView, TransitionOutcome};
pub use handlers::SideEffectOrchestrator;
pub use live_view::{Board, BoardStats, DisplayBucket, LiveView, LiveViewAggregator, OrderCard};
pub use normalizer::normalize;
pub use state::{
	recommended_action, CommittedTransition, NextAction, OrderStateMachine, OrderStore,
	StoreError, TransitionError, TransitionRequest,
};
