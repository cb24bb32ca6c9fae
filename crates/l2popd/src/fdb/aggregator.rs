//! Builds FDB contributions from topology reads.

use super::types::{EndpointFdb, FdbEntry};
use crate::topology::TopologyReader;
use l2pop_types::{Agent, HostId, NetworkType, Port, PortId, Segment};
use std::net::IpAddr;
use tracing::debug;

/// Why a port carries no tunnel reachability information.
///
/// None of these are failures: the port simply does not take part in
/// tunnel-based reachability, so no notification is generated for it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Unresolved {
    #[error("port {0} is not bound to a host")]
    Unbound(PortId),

    #[error("no L2 agent found on host {0}")]
    UnknownAgent(HostId),

    #[error("unable to retrieve the tunneling IP of the agent on host {0}")]
    NoTunnelingIp(HostId),

    #[error("port {0} is not bound to any segment")]
    NoSegment(PortId),

    #[error("agent on host {host} does not support {network_type} tunnels")]
    UnsupportedTunnelType {
        host: HostId,
        network_type: NetworkType,
    },
}

/// Everything needed to describe one port to its peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub agent: Agent,
    pub endpoint: IpAddr,
    pub segment: Segment,
    pub entries: Vec<FdbEntry>,
}

impl PortInfo {
    pub fn host(&self) -> &str {
        &self.agent.host
    }

    /// The one-endpoint delta other agents apply for this port, with the
    /// flooding sentinel first when requested.
    pub fn contribution(&self, include_flooding: bool) -> EndpointFdb {
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        if include_flooding {
            entries.push(FdbEntry::Flooding);
        }
        entries.extend_from_slice(&self.entries);
        EndpointFdb::from([(self.endpoint, entries)])
    }
}

/// Stateless builder of FDB tables and per-port deltas.
#[derive(Debug, Clone, Copy, Default)]
pub struct FdbAggregator;

impl FdbAggregator {
    pub fn new() -> Self {
        Self
    }

    /// One (MAC, IP) entry per fixed IP of the port.
    pub fn port_entries(port: &Port) -> Vec<FdbEntry> {
        port.fixed_ips
            .iter()
            .map(|ip| FdbEntry::unicast(port.mac, *ip))
            .collect()
    }

    /// Resolves the agent, tunnel endpoint and segment of a port.
    ///
    /// `segment` is the segment the caller has bound to the port; when the
    /// caller has none, the topology's binding is used.
    pub fn resolve(
        &self,
        topology: &dyn TopologyReader,
        port: &Port,
        segment: Option<&Segment>,
    ) -> Result<PortInfo, Unresolved> {
        let host = port
            .host()
            .ok_or_else(|| Unresolved::Unbound(port.id.clone()))?;
        let agent = topology
            .agent_by_host(host)
            .ok_or_else(|| Unresolved::UnknownAgent(host.to_string()))?;
        let endpoint = agent
            .endpoint()
            .ok_or_else(|| Unresolved::NoTunnelingIp(host.to_string()))?;
        let segment = match segment {
            Some(segment) => segment.clone(),
            None => topology
                .bound_segment(port)
                .ok_or_else(|| Unresolved::NoSegment(port.id.clone()))?,
        };
        if !agent.supports(&segment.network_type) {
            return Err(Unresolved::UnsupportedTunnelType {
                host: host.to_string(),
                network_type: segment.network_type,
            });
        }

        Ok(PortInfo {
            agent,
            endpoint,
            segment,
            entries: Self::port_entries(port),
        })
    }

    /// The complete FDB an agent needs when it joins `network_id`.
    ///
    /// Every other agent with at least one active port on the network is
    /// listed under its endpoint, flooding sentinel first, followed by the
    /// entries of all its active ports. Agents without a tunneling IP are
    /// skipped.
    pub fn full_table_for(
        &self,
        topology: &dyn TopologyReader,
        network_id: &str,
        requesting_host: &str,
    ) -> EndpointFdb {
        let mut table = EndpointFdb::new();

        for (port, agent) in topology.active_ports_on_network(network_id, Some(requesting_host)) {
            let Some(endpoint) = agent.endpoint() else {
                debug!(
                    host = %agent.host,
                    network_id,
                    "Unable to retrieve the agent tunneling IP, skipping"
                );
                continue;
            };

            table
                .entry(endpoint)
                .or_insert_with(|| vec![FdbEntry::Flooding])
                .extend(Self::port_entries(&port));
        }

        table
    }

    /// The delta other agents must apply for a single port, or `None` if
    /// the port cannot be resolved.
    pub fn others_entries_for_port(
        &self,
        topology: &dyn TopologyReader,
        port: &Port,
        include_flooding: bool,
    ) -> Option<EndpointFdb> {
        self.resolve(topology, port, None)
            .ok()
            .map(|info| info.contribution(include_flooding))
    }
}
