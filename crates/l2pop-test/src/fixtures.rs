//! Test fixtures for population scenarios
//!
//! Host `n` runs an Open vSwitch agent with tunnel endpoint `20.0.0.n`.
//! Port fixtures take an address index `n`: MAC `fa:16:3e:00:00:n`,
//! fixed IP `10.0.0.n`.

use crate::verification::{
    check_flooding_invariant, check_unicast_targets, AgentFdbModel, RecordingNotifier,
    VerifyResult,
};
use chrono::{TimeDelta, Utc};
use l2pop_types::{Agent, HostId, MacAddress, NetworkType, Port, PortStatus, Segment, AGENT_TYPE_OVS};
use l2popd::{
    DiffEngine, L2PopDriver, L2PopService, MemoryTopology, Notification, Result, TopologyStore,
};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

/// Network every fabric is created with.
pub const NETWORK: &str = "net1";

pub fn segment() -> Segment {
    Segment::vxlan(1001)
}

pub fn host(n: u8) -> HostId {
    format!("host{}", n)
}

pub fn endpoint(n: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(20, 0, 0, n))
}

pub fn mac(n: u8) -> MacAddress {
    MacAddress::new([0xfa, 0x16, 0x3e, 0, 0, n])
}

pub fn fixed_ip(n: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, n))
}

/// An agent that has been running for an hour.
pub fn agent(n: u8) -> Agent {
    agent_with_uptime(n, TimeDelta::hours(1))
}

/// An agent that restarted ten seconds ago.
pub fn booting_agent(n: u8) -> Agent {
    agent_with_uptime(n, TimeDelta::seconds(10))
}

fn agent_with_uptime(n: u8, uptime: TimeDelta) -> Agent {
    let now = Utc::now();
    Agent::new(host(n), AGENT_TYPE_OVS)
        .with_tunneling_ip(endpoint(n))
        .with_tunnel_type(NetworkType::Vxlan)
        .with_tunnel_type(NetworkType::Gre)
        .with_times(now - uptime, now)
}

/// An ACTIVE port on [`NETWORK`] bound to host `host_n`.
pub fn active_port(id: &str, host_n: u8, addr_n: u8) -> Port {
    Port::new(id, NETWORK, mac(addr_n))
        .with_ips([fixed_ip(addr_n)])
        .bound_to(host(host_n))
        .with_status(PortStatus::Active)
}

pub fn down(port: &Port) -> Port {
    port.clone().with_status(PortStatus::Down)
}

/// A complete population setup: topology store, service, recording
/// notifier and one agent model per host.
///
/// Every event handled through the fabric is delivered to the agent models
/// right away, against the topology as it stands after the event.
pub struct Fabric {
    pub store: Arc<MemoryTopology>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: Arc<L2PopService<MemoryTopology>>,
    pub agents: BTreeMap<HostId, AgentFdbModel>,
}

impl Fabric {
    /// Creates [`NETWORK`] and one long-running agent per host index.
    pub fn new(hosts: &[u8]) -> Self {
        Self::with_agents(hosts.iter().map(|n| agent(*n)), DiffEngine::default())
    }

    pub fn with_agents(agents: impl IntoIterator<Item = Agent>, engine: DiffEngine) -> Self {
        let store = Arc::new(MemoryTopology::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let driver = L2PopDriver::new(engine, notifier.clone());
        let service = Arc::new(L2PopService::new(store.clone(), Arc::new(driver)));

        store.register_network(NETWORK, segment());
        let mut models = BTreeMap::new();
        for agent in agents {
            if let Some(model) = AgentFdbModel::from_agent(&agent) {
                models.insert(agent.host.clone(), model);
            }
            store.report_agent(agent);
        }

        Self {
            store,
            notifier,
            service,
            agents: models,
        }
    }

    /// Commits a port update and delivers what it produced.
    pub async fn update(&mut self, port: Port) -> Result<Vec<Notification>> {
        self.service.update_port(port).await?;
        Ok(self.deliver())
    }

    /// Deletes a port and delivers what it produced.
    pub async fn delete(&mut self, port_id: &str) -> Result<Vec<Notification>> {
        self.service.delete_port(port_id).await?;
        Ok(self.deliver())
    }

    /// Applies everything recorded so far to the agent models.
    pub fn deliver(&mut self) -> Vec<Notification> {
        let notifications = self.notifier.take();
        let snapshot = self.store.snapshot();
        for model in self.agents.values_mut() {
            for notification in &notifications {
                model.apply(&snapshot, notification);
            }
            model.sync_local_ports(&snapshot);
        }
        notifications
    }

    pub fn port(&self, port_id: &str) -> Option<Port> {
        self.store.port(port_id)
    }

    pub fn model(&self, host_n: u8) -> Option<&AgentFdbModel> {
        self.agents.get(&host(host_n))
    }

    /// Runs the flooding invariant for every agent on [`NETWORK`].
    pub fn check(&self) -> VerifyResult<()> {
        let snapshot = self.store.snapshot();
        self.agents
            .values()
            .try_for_each(|model| check_flooding_invariant(&snapshot, model, NETWORK))
    }

    /// Checks unicast targets of `notifications` against the current state.
    pub fn check_unicasts(&self, notifications: &[Notification]) -> VerifyResult<()> {
        check_unicast_targets(&self.store.snapshot(), notifications)
    }
}
