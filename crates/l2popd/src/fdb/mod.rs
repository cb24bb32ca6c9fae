//! Forwarding database model and aggregation.
//!
//! An agent's FDB for one network maps each remote tunnel endpoint to the
//! (MAC, IP) pairs reachable through it, plus the flooding sentinel when
//! broadcast and unknown-destination traffic must be tunneled there.

mod aggregator;
mod types;

pub use aggregator::{FdbAggregator, PortInfo, Unresolved};
pub use types::{EndpointFdb, FdbEntry, FLOODING_IP};
