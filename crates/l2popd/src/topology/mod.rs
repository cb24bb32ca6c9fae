//! Topology access for the population engine.
//!
//! [`TopologyReader`] is the read-only capability the diff engine depends
//! on. One reader value is one consistent snapshot: every count and every
//! port list read through it during a handler call observes the same state.
//! [`TopologyStore`] is the writable side the service applies lifecycle
//! events to before handing a fresh snapshot to the engine.

mod memory;

pub use memory::{MemoryTopology, TopologyState};

use l2pop_types::{Agent, Port, Segment};
use std::sync::Arc;

/// Read-only, snapshot-consistent view of agents, networks and ports.
pub trait TopologyReader {
    /// Looks up the L2 agent running on `host`.
    ///
    /// Agents of unsupported types are invisible.
    fn agent_by_host(&self, host: &str) -> Option<Agent>;

    /// Number of active ports bound to `host` on `network_id`.
    fn active_port_count(&self, network_id: &str, host: &str) -> usize;

    /// Active ports on `network_id` with their hosting agent, optionally
    /// leaving out the ports of one host.
    fn active_ports_on_network(
        &self,
        network_id: &str,
        exclude_host: Option<&str>,
    ) -> Vec<(Port, Agent)>;

    /// Number of active ports on `network_id` across all hosts.
    fn network_active_port_count(&self, network_id: &str) -> usize {
        self.active_ports_on_network(network_id, None).len()
    }

    /// Segment bound to the port, or `None` if the port is unbound or its
    /// network has no segment.
    fn bound_segment(&self, port: &Port) -> Option<Segment>;
}

impl<T: TopologyReader + ?Sized> TopologyReader for Arc<T> {
    fn agent_by_host(&self, host: &str) -> Option<Agent> {
        (**self).agent_by_host(host)
    }

    fn active_port_count(&self, network_id: &str, host: &str) -> usize {
        (**self).active_port_count(network_id, host)
    }

    fn active_ports_on_network(
        &self,
        network_id: &str,
        exclude_host: Option<&str>,
    ) -> Vec<(Port, Agent)> {
        (**self).active_ports_on_network(network_id, exclude_host)
    }

    fn network_active_port_count(&self, network_id: &str) -> usize {
        (**self).network_active_port_count(network_id)
    }

    fn bound_segment(&self, port: &Port) -> Option<Segment> {
        (**self).bound_segment(port)
    }
}

/// Writable topology backing the service.
///
/// Mutations are expected to be serialized per network by the caller (see
/// [`crate::locks::NetworkLocks`]); the store itself only guarantees that a
/// snapshot never observes a half-applied mutation.
pub trait TopologyStore: Send + Sync {
    type Snapshot: TopologyReader + Send + Sync + 'static;

    fn snapshot(&self) -> Self::Snapshot;

    /// Creates or refreshes an agent from its heartbeat.
    fn report_agent(&self, agent: Agent);

    fn register_network(&self, network_id: &str, segment: Segment);

    /// Inserts or replaces a port, returning the previous record.
    fn upsert_port(&self, port: Port) -> Option<Port>;

    /// Removes a port, returning the removed record.
    fn remove_port(&self, port_id: &str) -> Option<Port>;

    fn port(&self, port_id: &str) -> Option<Port>;
}
