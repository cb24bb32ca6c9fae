//! The population driver.
//!
//! [`DiffEngine`] turns one port event and one topology snapshot into the
//! notifications peers need. [`L2PopDriver`] exposes it to a plugin
//! framework through [`LifecycleSink`].

mod context;
mod engine;
mod sink;

pub use context::{PortChange, PortContext};
pub use engine::{DiffEngine, PendingDeletion, DEFAULT_AGENT_BOOT_TIME};
pub use sink::{L2PopDriver, LifecycleSink};
