//! Analyzer backend access.
//!
//! This module provides the HTTP client used to call the static,
//! dependency and AI analyzers.

pub mod client;

pub use client::BackendClient;
