//! State management for orders.
//!
//! This module provides the state machine implementation for managing order
//! lifecycle transitions and persistence.

pub mod order;

pub use order::{OrderStateMachine, OrderUpdate};
