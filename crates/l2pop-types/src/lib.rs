//! Common types for overlay FDB population.
//!
//! This crate provides the value types shared by the L2 population engine,
//! its test tooling and anything that feeds it topology:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`NetworkType`] and [`Segment`]: the encapsulation bound to a network
//! - [`Port`] and [`PortStatus`]: a virtual port and its operational state
//! - [`Agent`]: a host's forwarding agent as last reported by heartbeat

mod agent;
mod mac;
mod network;
mod port;

pub use agent::{Agent, AGENT_TYPE_LINUXBRIDGE, AGENT_TYPE_OVS};
pub use mac::MacAddress;
pub use network::{NetworkType, Segment};
pub use port::{Port, PortStatus};

/// Identifier of an overlay network.
pub type NetworkId = String;

/// Identifier of a host (and of the agent running on it).
pub type HostId = String;

/// Identifier of a port.
pub type PortId = String;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid port status: {0}")]
    InvalidPortStatus(String),

    #[error("invalid network type: {0}")]
    InvalidNetworkType(String),
}
