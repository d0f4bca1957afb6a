//! Builders for assembling configurations in tests and local development.

pub mod config;

pub use config::ConfigBuilder;
