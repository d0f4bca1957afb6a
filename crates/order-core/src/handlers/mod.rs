//! Event handlers for processing service events.

pub mod payment;

pub use payment::PaymentHandler;
