//! Core of the order management service.
//!
//! Contains the order lifecycle manager with its state machine, the event bus
//! and the engine that processes payment confirmations in the background, plus
//! the builder that assembles everything from configuration.

pub mod builder;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod locks;
pub mod manager;
pub mod state;

pub use builder::{BuilderError, OrderEngineBuilder, OrderFactories};
pub use engine::{event_bus::EventBus, EngineError, OrderEngine};
pub use error::{Entity, OrderError};
pub use manager::OrderManager;
