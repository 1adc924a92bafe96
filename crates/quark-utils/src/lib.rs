//! Shared utilities for quark
//!
//! This crate provides common functionality used across the quark workspace:
//! tracing subscriber setup and typed environment lookups for configuration.

pub mod config;
pub mod logging;

pub use config::{ConfigError, lookup_parse};
pub use logging::{init_tracing, init_tracing_with};
