//! Verification helpers for testing the population engine
//!
//! Provides a recording notifier, an agent-side FDB model and the checks
//! that tie the models back to the topology.

use l2pop_types::{Agent, HostId, NetworkId};
use l2popd::{
    Delivery, EndpointFdb, FdbAggregator, FdbDelta, FdbEntry, Notification, Notifier,
    TopologyReader,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use thiserror::Error;
use tracing::trace;

/// Verification error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("{host} has no active port on {network_id} but holds FDB entries for it")]
    UnexpectedEntries { host: HostId, network_id: NetworkId },

    #[error("{host} lacks the flooding entry for {endpoint} on {network_id}")]
    MissingFlooding {
        host: HostId,
        network_id: NetworkId,
        endpoint: IpAddr,
    },

    #[error("FDB of {host} on {network_id} differs: expected {expected}, got {actual}")]
    TableMismatch {
        host: HostId,
        network_id: NetworkId,
        expected: String,
        actual: String,
    },

    #[error("unicast for {network_id} sent to {host}, which has no active port on it")]
    UnicastToIdleHost { host: HostId, network_id: NetworkId },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// One agent's FDB for one network: endpoint to entry set.
pub type FdbTable = BTreeMap<IpAddr, BTreeSet<FdbEntry>>;

/// Notifier that keeps every notification in emission order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl Notifier for RecordingNotifier {
    fn send_to_host(&self, host: &str, mut notification: Notification) {
        notification.delivery = Delivery::Unicast(host.to_string());
        self.sent.lock().push(notification);
    }

    fn broadcast(&self, mut notification: Notification) {
        notification.delivery = Delivery::Broadcast;
        self.sent.lock().push(notification);
    }
}

/// The FDB a tunnel agent builds from the notifications it receives.
///
/// Mirrors agent behavior: notifications for networks the agent has no
/// active port on are ignored, entries for its own endpoint are ignored,
/// and a network is forgotten once its last local port goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentFdbModel {
    host: HostId,
    endpoint: IpAddr,
    tables: BTreeMap<NetworkId, FdbTable>,
}

impl AgentFdbModel {
    pub fn new(host: impl Into<HostId>, endpoint: IpAddr) -> Self {
        Self {
            host: host.into(),
            endpoint,
            tables: BTreeMap::new(),
        }
    }

    /// Returns `None` for an agent without a tunneling IP.
    pub fn from_agent(agent: &Agent) -> Option<Self> {
        agent
            .endpoint()
            .map(|endpoint| Self::new(agent.host.clone(), endpoint))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn endpoint(&self) -> IpAddr {
        self.endpoint
    }

    pub fn table(&self, network_id: &str) -> Option<&FdbTable> {
        self.tables.get(network_id)
    }

    /// Entries held for `endpoint` on `network_id`.
    pub fn entries(&self, network_id: &str, endpoint: IpAddr) -> BTreeSet<FdbEntry> {
        self.table(network_id)
            .and_then(|t| t.get(&endpoint))
            .cloned()
            .unwrap_or_default()
    }

    pub fn floods_to(&self, network_id: &str, endpoint: IpAddr) -> bool {
        self.entries(network_id, endpoint)
            .contains(&FdbEntry::Flooding)
    }

    /// Unicast IPs held for `endpoint` on `network_id`.
    pub fn ips(&self, network_id: &str, endpoint: IpAddr) -> BTreeSet<IpAddr> {
        self.entries(network_id, endpoint)
            .into_iter()
            .filter_map(|entry| match entry {
                FdbEntry::Unicast { ip, .. } => Some(ip),
                FdbEntry::Flooding => None,
            })
            .collect()
    }

    /// Applies a notification if it is addressed to this agent.
    ///
    /// `topology` is the state at delivery time; it decides whether the
    /// agent still has a local port on the network.
    pub fn apply(&mut self, topology: &dyn TopologyReader, notification: &Notification) {
        if let Delivery::Unicast(target) = &notification.delivery {
            if *target != self.host {
                return;
            }
        }

        let network_id = &notification.network_id;
        if topology.active_port_count(network_id, &self.host) == 0 {
            trace!(host = %self.host, %network_id, "No local port, ignoring");
            self.tables.remove(network_id);
            return;
        }

        let own = self.endpoint;
        let table = self.tables.entry(network_id.clone()).or_default();
        match &notification.delta {
            FdbDelta::Add { ports, .. } => add_entries(table, ports, own),
            FdbDelta::Remove { ports, .. } => remove_entries(table, ports, own),
            FdbDelta::ChangeIp {
                endpoint,
                before,
                after,
            } => {
                if *endpoint != own {
                    let entries = table.entry(*endpoint).or_default();
                    for entry in before {
                        entries.remove(entry);
                    }
                    entries.extend(after.iter().copied());
                }
            }
            FdbDelta::ChangeHost { before, after } => {
                remove_entries(table, before, own);
                add_entries(table, after, own);
            }
        }
        table.retain(|_, entries| !entries.is_empty());
    }

    /// Forgets every network the agent no longer has a local port on.
    pub fn sync_local_ports(&mut self, topology: &dyn TopologyReader) {
        let host = self.host.clone();
        self.tables
            .retain(|network_id, _| topology.active_port_count(network_id, &host) > 0);
    }
}

fn add_entries(table: &mut FdbTable, ports: &EndpointFdb, own: IpAddr) {
    for (endpoint, entries) in ports.iter().filter(|(ep, _)| **ep != own) {
        table
            .entry(*endpoint)
            .or_default()
            .extend(entries.iter().copied());
    }
}

fn remove_entries(table: &mut FdbTable, ports: &EndpointFdb, own: IpAddr) {
    for (endpoint, entries) in ports.iter().filter(|(ep, _)| **ep != own) {
        if let Some(held) = table.get_mut(endpoint) {
            for entry in entries {
                held.remove(entry);
            }
        }
    }
}

/// Converts an endpoint-to-list FDB into set form.
pub fn to_table(fdb: &EndpointFdb) -> FdbTable {
    fdb.iter()
        .map(|(endpoint, entries)| (*endpoint, entries.iter().copied().collect()))
        .collect()
}

/// Checks that `model` holds exactly what the topology says it should for
/// `network_id`.
///
/// An agent with active ports on the network must hold every other
/// hosting agent's endpoint, each with the flooding entry and the entries
/// of all that agent's active ports, and nothing else. An agent without
/// active ports must hold nothing for the network.
pub fn check_flooding_invariant(
    topology: &dyn TopologyReader,
    model: &AgentFdbModel,
    network_id: &str,
) -> VerifyResult<()> {
    let actual = model.table(network_id).cloned().unwrap_or_default();

    if topology.active_port_count(network_id, model.host()) == 0 {
        if !actual.is_empty() {
            return Err(VerificationError::UnexpectedEntries {
                host: model.host().to_string(),
                network_id: network_id.to_string(),
            });
        }
        return Ok(());
    }

    if let Some((endpoint, _)) = actual
        .iter()
        .find(|(_, entries)| !entries.contains(&FdbEntry::Flooding))
    {
        return Err(VerificationError::MissingFlooding {
            host: model.host().to_string(),
            network_id: network_id.to_string(),
            endpoint: *endpoint,
        });
    }

    let mut expected = to_table(&FdbAggregator::new().full_table_for(
        topology,
        network_id,
        model.host(),
    ));
    expected.remove(&model.endpoint());

    if expected != actual {
        return Err(VerificationError::TableMismatch {
            host: model.host().to_string(),
            network_id: network_id.to_string(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        });
    }
    Ok(())
}

/// Checks that every unicast targets a host with an active port on the
/// notification's network.
pub fn check_unicast_targets(
    topology: &dyn TopologyReader,
    notifications: &[Notification],
) -> VerifyResult<()> {
    for notification in notifications {
        if let Some(host) = notification.target_host() {
            if topology.active_port_count(&notification.network_id, host) == 0 {
                return Err(VerificationError::UnicastToIdleHost {
                    host: host.to_string(),
                    network_id: notification.network_id.clone(),
                });
            }
        }
    }
    Ok(())
}
