//! Integration test infrastructure for the L2 population engine
//!
//! Provides:
//! - Topology fixtures (agents, ports, a ready-made fabric)
//! - A notifier that records instead of delivering
//! - An agent-side FDB model that applies notifications like a tunnel agent
//! - Invariant checks over those models

pub mod fixtures;
mod verification;

pub use fixtures::*;
pub use verification::*;
