//! Event-to-delta computation.
//!
//! Every handler reads port counts and FDB contributions from one topology
//! snapshot and returns the notifications to deliver, broadcast first. The
//! engine keeps no state between calls.

use super::context::{PortChange, PortContext};
use crate::fdb::{EndpointFdb, FdbAggregator, FdbEntry, PortInfo, Unresolved};
use crate::notification::{Delivery, Notification};
use crate::topology::TopologyReader;
use l2pop_types::{Port, Segment};
use std::time::Duration;
use tracing::{debug, warn};

/// Default uptime below which an agent is assumed to have lost its FDB.
pub const DEFAULT_AGENT_BOOT_TIME: Duration = Duration::from_secs(180);

/// Notifications captured before a port is removed, delivered once the
/// removal has been committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use = "a pending deletion delivers nothing until it is committed"]
pub struct PendingDeletion {
    pub port_id: String,
    notifications: Vec<Notification>,
}

impl PendingDeletion {
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn into_notifications(self) -> Vec<Notification> {
        self.notifications
    }
}

#[derive(Debug, Clone)]
pub struct DiffEngine {
    aggregator: FdbAggregator,
    agent_boot_time: Duration,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new(DEFAULT_AGENT_BOOT_TIME)
    }
}

impl DiffEngine {
    pub fn new(agent_boot_time: Duration) -> Self {
        Self {
            aggregator: FdbAggregator::new(),
            agent_boot_time,
        }
    }

    pub fn agent_boot_time(&self) -> Duration {
        self.agent_boot_time
    }

    pub fn aggregator(&self) -> &FdbAggregator {
        &self.aggregator
    }

    /// Handles a committed port update.
    ///
    /// `topology` must already reflect the update.
    pub fn port_updated(
        &self,
        topology: &dyn TopologyReader,
        ctx: &PortContext,
    ) -> Vec<Notification> {
        let change = ctx.classify();
        debug!(
            port_id = %ctx.current.id,
            network_id = %ctx.network_id(),
            %change,
            "Classified port update"
        );

        match (change, ctx.original.as_ref()) {
            (PortChange::AddressChange, Some(original)) => {
                self.fixed_ips_changed(topology, original, &ctx.current)
            }
            (PortChange::HostMigration, Some(original)) => self.host_changed(
                topology,
                original,
                ctx.original_bound_segment.as_ref(),
                &ctx.current,
                ctx.bound_segment.as_ref(),
            ),
            (PortChange::Activation, _) => {
                self.port_up(topology, &ctx.current, ctx.bound_segment.as_ref())
            }
            (PortChange::Deactivation, Some(original)) => {
                self.port_down(topology, original, ctx.original_bound_segment.as_ref())
            }
            _ => Vec::new(),
        }
    }

    /// A port became ACTIVE.
    pub fn port_up(
        &self,
        topology: &dyn TopologyReader,
        port: &Port,
        segment: Option<&Segment>,
    ) -> Vec<Notification> {
        let Some(info) = self.resolve(topology, port, segment) else {
            return Vec::new();
        };
        let network_id = port.network_id.as_str();
        let on_agent = topology.active_port_count(network_id, info.host());
        let on_net = topology.network_active_port_count(network_id);

        if on_agent == 0 || on_net <= on_agent {
            debug!(
                port_id = %port.id,
                network_id,
                on_agent,
                on_net,
                "No other agent hosts the network"
            );
            return Vec::new();
        }

        let first_on_agent = on_agent == 1;
        let mut notifications = vec![Notification::add(
            network_id,
            info.segment.clone(),
            info.contribution(first_on_agent),
            Delivery::Broadcast,
        )];

        let uptime = info.agent.uptime();
        if first_on_agent || uptime < self.agent_boot_time {
            let table = self
                .aggregator
                .full_table_for(topology, network_id, info.host());
            if !table.is_empty() {
                debug!(
                    host = info.host(),
                    network_id,
                    endpoints = table.len(),
                    uptime_secs = uptime.as_secs(),
                    "Sending full FDB table"
                );
                notifications.push(Notification::add(
                    network_id,
                    info.segment,
                    table,
                    Delivery::Unicast(info.agent.host.clone()),
                ));
            }
        }

        notifications
    }

    /// A port stopped being ACTIVE. `port` is the state before the
    /// transition; `topology` already reflects it.
    pub fn port_down(
        &self,
        topology: &dyn TopologyReader,
        port: &Port,
        segment: Option<&Segment>,
    ) -> Vec<Notification> {
        let Some(info) = self.resolve(topology, port, segment) else {
            return Vec::new();
        };
        let network_id = port.network_id.as_str();
        let on_agent = topology.active_port_count(network_id, info.host());
        let on_net = topology.network_active_port_count(network_id);

        self.removal(port, info, on_agent, on_net)
            .into_iter()
            .collect()
    }

    /// The fixed IPs of an ACTIVE port changed in place.
    pub fn fixed_ips_changed(
        &self,
        topology: &dyn TopologyReader,
        original: &Port,
        current: &Port,
    ) -> Vec<Notification> {
        let before_ips = original.ip_set();
        let after_ips = current.ip_set();

        let removed: Vec<FdbEntry> = before_ips
            .difference(&after_ips)
            .map(|ip| FdbEntry::unicast(original.mac, *ip))
            .collect();
        let added: Vec<FdbEntry> = after_ips
            .difference(&before_ips)
            .map(|ip| FdbEntry::unicast(current.mac, *ip))
            .collect();
        if removed.is_empty() && added.is_empty() {
            return Vec::new();
        }

        // Peers know the port under its original endpoint.
        let Some(info) = self.resolve(topology, original, None) else {
            return Vec::new();
        };

        debug!(
            port_id = %current.id,
            endpoint = %info.endpoint,
            removed = removed.len(),
            added = added.len(),
            "Fixed IPs changed"
        );
        vec![Notification::change_ip(
            &current.network_id,
            info.endpoint,
            removed,
            added,
        )]
    }

    /// An ACTIVE port moved from one host to another.
    pub fn host_changed(
        &self,
        topology: &dyn TopologyReader,
        original: &Port,
        original_segment: Option<&Segment>,
        current: &Port,
        segment: Option<&Segment>,
    ) -> Vec<Notification> {
        let Some(old) = self.resolve(topology, original, original_segment) else {
            return Vec::new();
        };
        let Some(new) = self.resolve(topology, current, segment) else {
            return Vec::new();
        };

        let network_id = current.network_id.as_str();
        let old_count = topology.active_port_count(network_id, old.host());
        let new_count = topology.active_port_count(network_id, new.host());
        let on_net = topology.network_active_port_count(network_id);
        let joining = new_count == 1;

        // Peers still holding the old entries: any port besides the
        // migrated one outside the old host.
        let before = if on_net.saturating_sub(old_count) > 1 {
            old.contribution(old_count == 0)
        } else {
            EndpointFdb::new()
        };
        // Peers that must learn the new location.
        let after = if on_net > new_count {
            new.contribution(joining)
        } else {
            EndpointFdb::new()
        };

        let mut notifications = Vec::new();
        if !before.is_empty() || !after.is_empty() {
            notifications.push(Notification::change_host(network_id, before, after));
        } else {
            debug!(port_id = %current.id, network_id, "No peer hosts the network");
        }

        if joining {
            let table = self
                .aggregator
                .full_table_for(topology, network_id, new.host());
            if !table.is_empty() {
                notifications.push(Notification::add(
                    network_id,
                    new.segment,
                    table,
                    Delivery::Unicast(new.agent.host.clone()),
                ));
            }
        }

        notifications
    }

    /// Captures the removal delta of a port about to be deleted.
    ///
    /// `topology` must be read before the record is removed: the port still
    /// counts as active in it.
    pub fn prepare_deletion(
        &self,
        topology: &dyn TopologyReader,
        ctx: &PortContext,
    ) -> PendingDeletion {
        let port = &ctx.current;
        let mut pending = PendingDeletion {
            port_id: port.id.clone(),
            notifications: Vec::new(),
        };
        if !port.is_active() {
            return pending;
        }
        let Some(info) = self.resolve(topology, port, ctx.bound_segment.as_ref()) else {
            return pending;
        };

        let network_id = port.network_id.as_str();
        let on_agent = topology
            .active_port_count(network_id, info.host())
            .saturating_sub(1);
        let on_net = topology
            .network_active_port_count(network_id)
            .saturating_sub(1);

        pending.notifications.extend(self.removal(port, info, on_agent, on_net));
        pending
    }

    /// Removal broadcast given the counts as they stand without the port.
    fn removal(
        &self,
        port: &Port,
        info: PortInfo,
        on_agent: usize,
        on_net: usize,
    ) -> Option<Notification> {
        if on_net <= on_agent {
            debug!(
                port_id = %port.id,
                network_id = %port.network_id,
                on_agent,
                on_net,
                "No other agent hosts the network"
            );
            return None;
        }

        Some(Notification::remove(
            &port.network_id,
            info.segment.clone(),
            info.contribution(on_agent == 0),
        ))
    }

    fn resolve(
        &self,
        topology: &dyn TopologyReader,
        port: &Port,
        segment: Option<&Segment>,
    ) -> Option<PortInfo> {
        match self.aggregator.resolve(topology, port, segment) {
            Ok(info) => Some(info),
            Err(reason) => {
                log_unresolved(port, &reason);
                None
            }
        }
    }
}

fn log_unresolved(port: &Port, reason: &Unresolved) {
    warn!(
        port_id = %port.id,
        network_id = %port.network_id,
        %reason,
        "Skipping FDB notification"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{FdbDelta, NotificationKind};
    use crate::topology::{MemoryTopology, TopologyStore};
    use chrono::{TimeDelta, Utc};
    use l2pop_types::{Agent, MacAddress, NetworkType, PortStatus, AGENT_TYPE_OVS};
    use pretty_assertions::assert_eq;
    use std::net::IpAddr;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([0xfa, 0x16, 0x3e, 0, 0, last])
    }

    /// An agent that has been up well past the boot window.
    fn agent(host: &str, addr: &str) -> Agent {
        let now = Utc::now();
        Agent::new(host, AGENT_TYPE_OVS)
            .with_tunneling_ip(ip(addr))
            .with_tunnel_type(NetworkType::Vxlan)
            .with_times(now - TimeDelta::seconds(3600), now)
    }

    fn port(id: &str, host: &str, last: u8, addr: &str) -> Port {
        Port::new(id, "net1", mac(last))
            .with_ips([ip(addr)])
            .bound_to(host)
            .with_status(PortStatus::Active)
    }

    fn store() -> MemoryTopology {
        let store = MemoryTopology::new();
        store.register_network("net1", Segment::vxlan(1));
        store.report_agent(agent("host1", "20.0.0.1"));
        store.report_agent(agent("host2", "20.0.0.2"));
        store.report_agent(agent("host3", "20.0.0.3"));
        store
    }

    fn flood_then(entries: &[FdbEntry]) -> Vec<FdbEntry> {
        let mut v = vec![FdbEntry::Flooding];
        v.extend_from_slice(entries);
        v
    }

    #[test]
    fn test_port_up_alone_on_network() {
        let store = store();
        let p1 = port("p1", "host1", 1, "10.0.0.2");
        store.upsert_port(p1.clone());

        let engine = DiffEngine::default();
        assert!(engine.port_up(&store.snapshot(), &p1, None).is_empty());
    }

    #[test]
    fn test_port_up_first_on_agent() {
        let store = store();
        let p1 = port("p1", "host1", 1, "10.0.0.2");
        let p2 = port("p2", "host2", 2, "10.0.0.3");
        store.upsert_port(p1.clone());
        store.upsert_port(p2.clone());

        let engine = DiffEngine::default();
        let out = engine.port_up(&store.snapshot(), &p2, None);

        assert_eq!(out.len(), 2);
        assert!(out[0].is_broadcast());
        assert_eq!(
            out[0].delta,
            FdbDelta::Add {
                segment: Segment::vxlan(1),
                ports: EndpointFdb::from([(
                    ip("20.0.0.2"),
                    flood_then(&[FdbEntry::unicast(mac(2), ip("10.0.0.3"))])
                )]),
            }
        );
        assert_eq!(out[1].target_host(), Some("host2"));
        assert_eq!(
            out[1].delta,
            FdbDelta::Add {
                segment: Segment::vxlan(1),
                ports: EndpointFdb::from([(
                    ip("20.0.0.1"),
                    flood_then(&[FdbEntry::unicast(mac(1), ip("10.0.0.2"))])
                )]),
            }
        );
    }

    #[test]
    fn test_port_up_second_on_agent() {
        let store = store();
        store.upsert_port(port("p1", "host1", 1, "10.0.0.2"));
        store.upsert_port(port("p2", "host2", 2, "10.0.0.3"));
        let p3 = port("p3", "host1", 3, "10.0.0.4");
        store.upsert_port(p3.clone());

        let out = DiffEngine::default().port_up(&store.snapshot(), &p3, None);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind(), NotificationKind::Add);
        assert!(!out[0].carries_flooding());
    }

    #[test]
    fn test_port_up_recently_booted_agent_gets_full_table() {
        let store = store();
        let now = Utc::now();
        store.report_agent(agent("host1", "20.0.0.1").with_times(now - TimeDelta::seconds(10), now));
        store.upsert_port(port("p1", "host1", 1, "10.0.0.2"));
        store.upsert_port(port("p2", "host2", 2, "10.0.0.3"));
        let p3 = port("p3", "host1", 3, "10.0.0.4");
        store.upsert_port(p3.clone());

        let out = DiffEngine::default().port_up(&store.snapshot(), &p3, None);

        assert_eq!(out.len(), 2);
        assert!(!out[0].carries_flooding());
        assert_eq!(out[1].target_host(), Some("host1"));
    }

    #[test]
    fn test_port_up_unknown_agent_is_skipped() {
        let store = store();
        store.upsert_port(port("p1", "host1", 1, "10.0.0.2"));
        let p2 = port("p2", "nowhere", 2, "10.0.0.3");
        store.upsert_port(p2.clone());

        assert!(DiffEngine::default()
            .port_up(&store.snapshot(), &p2, None)
            .is_empty());
    }

    #[test]
    fn test_port_down_last_on_agent() {
        let store = store();
        store.upsert_port(port("p1", "host1", 1, "10.0.0.2"));
        let p2 = port("p2", "host2", 2, "10.0.0.3");
        store.upsert_port(p2.clone().with_status(PortStatus::Down));

        let out = DiffEngine::default().port_down(&store.snapshot(), &p2, None);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind(), NotificationKind::Remove);
        assert_eq!(
            out[0].delta,
            FdbDelta::Remove {
                segment: Segment::vxlan(1),
                ports: EndpointFdb::from([(
                    ip("20.0.0.2"),
                    flood_then(&[FdbEntry::unicast(mac(2), ip("10.0.0.3"))])
                )]),
            }
        );
    }

    #[test]
    fn test_port_down_no_peers() {
        let store = store();
        let p1 = port("p1", "host1", 1, "10.0.0.2");
        store.upsert_port(p1.clone().with_status(PortStatus::Down));

        assert!(DiffEngine::default()
            .port_down(&store.snapshot(), &p1, None)
            .is_empty());
    }

    #[test]
    fn test_fixed_ips_changed() {
        let store = store();
        let before = Port::new("p1", "net1", mac(1))
            .with_ips([ip("10.0.0.2"), ip("10.0.0.10")])
            .bound_to("host1")
            .with_status(PortStatus::Active);
        let after = before.clone().with_ips([ip("10.0.0.2"), ip("10.0.0.16")]);
        store.upsert_port(after.clone());

        let out = DiffEngine::default().fixed_ips_changed(&store.snapshot(), &before, &after);

        assert_eq!(
            out,
            vec![Notification::change_ip(
                "net1",
                ip("20.0.0.1"),
                vec![FdbEntry::unicast(mac(1), ip("10.0.0.10"))],
                vec![FdbEntry::unicast(mac(1), ip("10.0.0.16"))],
            )]
        );
        assert!(DiffEngine::default()
            .fixed_ips_changed(&store.snapshot(), &after, &after)
            .is_empty());
    }

    #[test]
    fn test_host_changed_to_new_agent() {
        let store = store();
        store.upsert_port(port("p9", "host3", 9, "10.0.0.9"));
        let before = port("p1", "host1", 1, "10.0.0.2");
        let after = before.clone().bound_to("host2");
        store.upsert_port(after.clone());

        let out = DiffEngine::default().host_changed(&store.snapshot(), &before, None, &after, None);

        let entry = FdbEntry::unicast(mac(1), ip("10.0.0.2"));
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0],
            Notification::change_host(
                "net1",
                EndpointFdb::from([(ip("20.0.0.1"), flood_then(&[entry]))]),
                EndpointFdb::from([(ip("20.0.0.2"), flood_then(&[entry]))]),
            )
        );
        assert_eq!(out[1].target_host(), Some("host2"));
        assert_eq!(out[1].endpoints().into_iter().collect::<Vec<_>>(), vec![ip("20.0.0.3")]);
    }

    #[test]
    fn test_host_changed_without_peers() {
        let store = store();
        let before = port("p1", "host1", 1, "10.0.0.2");
        let after = before.clone().bound_to("host2");
        store.upsert_port(after.clone());

        let out = DiffEngine::default().host_changed(&store.snapshot(), &before, None, &after, None);
        assert!(out.is_empty());
    }

    #[test]
    fn test_host_changed_onto_peer() {
        let store = store();
        store.upsert_port(port("p2", "host2", 2, "10.0.0.3"));
        let before = port("p1", "host1", 1, "10.0.0.2");
        let after = before.clone().bound_to("host2");
        store.upsert_port(after.clone());

        let out = DiffEngine::default().host_changed(&store.snapshot(), &before, None, &after, None);

        let entry = FdbEntry::unicast(mac(1), ip("10.0.0.2"));
        assert_eq!(
            out,
            vec![Notification::change_host(
                "net1",
                EndpointFdb::from([(ip("20.0.0.1"), flood_then(&[entry]))]),
                EndpointFdb::new(),
            )]
        );
    }

    #[test]
    fn test_prepare_deletion_reads_pre_removal_counts() {
        let store = store();
        store.upsert_port(port("p1", "host1", 1, "10.0.0.2"));
        let p2 = port("p2", "host2", 2, "10.0.0.3");
        store.upsert_port(p2.clone());

        let engine = DiffEngine::default();
        let pending = engine.prepare_deletion(&store.snapshot(), &PortContext::new(p2));
        store.remove_port("p2");

        assert_eq!(pending.port_id, "p2");
        let notifications = pending.into_notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind(), NotificationKind::Remove);
        assert!(notifications[0].carries_flooding());
    }

    #[test]
    fn test_prepare_deletion_inactive_port() {
        let store = store();
        store.upsert_port(port("p1", "host1", 1, "10.0.0.2"));
        let p2 = port("p2", "host2", 2, "10.0.0.3").with_status(PortStatus::Down);
        store.upsert_port(p2.clone());

        let pending = DiffEngine::default().prepare_deletion(&store.snapshot(), &PortContext::new(p2));
        assert!(pending.is_empty());
    }

}
