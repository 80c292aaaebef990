//! Analysis orchestration.
//!
//! Fan-out to the analyzers, normalization of their answers and the
//! composite score.

pub mod aggregator;
pub mod dispatcher;
pub mod normalizer;

pub use aggregator::{default_penalty, ScoreModel};
pub use dispatcher::Dispatcher;
