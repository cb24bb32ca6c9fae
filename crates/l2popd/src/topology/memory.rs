//! In-memory topology store.

use super::{TopologyReader, TopologyStore};
use l2pop_types::{Agent, HostId, NetworkId, Port, PortId, Segment};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Immutable topology state; snapshots share it through an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct TopologyState {
    agents: HashMap<HostId, Agent>,
    networks: HashMap<NetworkId, Segment>,
    ports: BTreeMap<PortId, Port>,
    /// `None` accepts every agent type.
    agent_types: Option<BTreeSet<String>>,
}

impl TopologyState {
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    pub fn networks(&self) -> impl Iterator<Item = (&NetworkId, &Segment)> {
        self.networks.iter()
    }

    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    pub fn port(&self, port_id: &str) -> Option<&Port> {
        self.ports.get(port_id)
    }

    fn visible_agent(&self, host: &str) -> Option<&Agent> {
        let agent = self.agents.get(host)?;
        match &self.agent_types {
            Some(types) if !types.contains(&agent.agent_type) => None,
            _ => Some(agent),
        }
    }

    /// Returns the hosting agent if the port counts as active.
    fn active_agent(&self, port: &Port) -> Option<&Agent> {
        if !port.is_active() {
            return None;
        }
        let agent = self.visible_agent(port.host()?)?;
        let segment = self.networks.get(&port.network_id)?;
        agent.supports(&segment.network_type).then_some(agent)
    }
}

impl TopologyReader for TopologyState {
    fn agent_by_host(&self, host: &str) -> Option<Agent> {
        self.visible_agent(host).cloned()
    }

    fn active_port_count(&self, network_id: &str, host: &str) -> usize {
        self.ports
            .values()
            .filter(|p| p.network_id == network_id && p.host() == Some(host))
            .filter(|p| self.active_agent(p).is_some())
            .count()
    }

    fn active_ports_on_network(
        &self,
        network_id: &str,
        exclude_host: Option<&str>,
    ) -> Vec<(Port, Agent)> {
        self.ports
            .values()
            .filter(|p| p.network_id == network_id)
            .filter(|p| exclude_host.is_none() || p.host() != exclude_host)
            .filter_map(|p| self.active_agent(p).map(|a| (p.clone(), a.clone())))
            .collect()
    }

    fn network_active_port_count(&self, network_id: &str) -> usize {
        self.ports
            .values()
            .filter(|p| p.network_id == network_id)
            .filter(|p| self.active_agent(p).is_some())
            .count()
    }

    fn bound_segment(&self, port: &Port) -> Option<Segment> {
        port.host()?;
        self.networks.get(&port.network_id).cloned()
    }
}

/// Copy-on-write topology store.
///
/// Writers clone the state only when a snapshot is still alive, so
/// snapshots stay valid while later events are applied.
#[derive(Debug, Default)]
pub struct MemoryTopology {
    state: RwLock<Arc<TopologyState>>,
}

impl MemoryTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that only exposes agents of the given types.
    pub fn with_agent_types<I, S>(agent_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = TopologyState {
            agent_types: Some(agent_types.into_iter().map(Into::into).collect()),
            ..TopologyState::default()
        };
        Self {
            state: RwLock::new(Arc::new(state)),
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut TopologyState) -> R) -> R {
        let mut guard = self.state.write();
        f(Arc::make_mut(&mut guard))
    }
}

impl TopologyStore for MemoryTopology {
    type Snapshot = Arc<TopologyState>;

    fn snapshot(&self) -> Arc<TopologyState> {
        self.state.read().clone()
    }

    fn report_agent(&self, agent: Agent) {
        debug!(host = %agent.host, agent_type = %agent.agent_type, "Agent reported");
        self.mutate(|s| {
            s.agents.insert(agent.host.clone(), agent);
        });
    }

    fn register_network(&self, network_id: &str, segment: Segment) {
        debug!(network_id, %segment, "Network registered");
        self.mutate(|s| {
            s.networks.insert(network_id.to_string(), segment);
        });
    }

    fn upsert_port(&self, port: Port) -> Option<Port> {
        self.mutate(|s| s.ports.insert(port.id.clone(), port))
    }

    fn remove_port(&self, port_id: &str) -> Option<Port> {
        self.mutate(|s| s.ports.remove(port_id))
    }

    fn port(&self, port_id: &str) -> Option<Port> {
        self.state.read().ports.get(port_id).cloned()
    }
}
