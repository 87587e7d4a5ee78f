//! dnsproxy - a caching DNS forwarding proxy with wildcard host overrides.
//!
//! This crate provides the core functionality for the proxy,
//! exposed as a library for testing and integration purposes.

pub mod config;
pub mod dns;
pub mod error;
pub mod logging;
