//! Common types module for the order management system.
//!
//! This module defines the core data types shared by the store, the lifecycle
//! manager, the configuration layer and the HTTP service.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Event types for inter-service communication.
pub mod events;
/// Order, item and status types.
pub mod order;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Storage types for managing persistent data.
pub mod storage;
/// Configuration validation types for pluggable implementations.
pub mod validation;

pub use api::*;
pub use events::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use storage::*;
pub use validation::*;
