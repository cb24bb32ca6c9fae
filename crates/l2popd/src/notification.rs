//! Notification model emitted by the diff engine.
//!
//! A [`Notification`] carries one network's FDB delta together with its
//! delivery mode. Delivery is out-of-band: the payload rendered by
//! [`Notification::fdb_entries`] never names its target host.

use crate::fdb::{EndpointFdb, FdbEntry};
use l2pop_types::{HostId, NetworkId, Segment};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

/// How a notification reaches agents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// Cast to the agent of exactly one host.
    Unicast(HostId),
    /// Fanout to every agent subscribed to the population topic.
    Broadcast,
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Unicast(host) => write!(f, "unicast:{}", host),
            Delivery::Broadcast => f.write_str("broadcast"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Add,
    Remove,
    Update,
}

impl NotificationKind {
    /// Agent RPC method handling this kind of notification.
    pub const fn method(&self) -> &'static str {
        match self {
            NotificationKind::Add => "add_fdb_entries",
            NotificationKind::Remove => "remove_fdb_entries",
            NotificationKind::Update => "update_fdb_entries",
        }
    }
}

/// The FDB change carried by a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FdbDelta {
    Add {
        segment: Segment,
        ports: EndpointFdb,
    },
    Remove {
        segment: Segment,
        ports: EndpointFdb,
    },
    /// In-place address change on one endpoint. An empty side is omitted
    /// from the payload.
    ChangeIp {
        endpoint: IpAddr,
        before: Vec<FdbEntry>,
        after: Vec<FdbEntry>,
    },
    /// A port moved between endpoints.
    ChangeHost {
        before: EndpointFdb,
        after: EndpointFdb,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub network_id: NetworkId,
    pub delivery: Delivery,
    pub delta: FdbDelta,
}

impl Notification {
    pub fn add(network_id: &str, segment: Segment, ports: EndpointFdb, delivery: Delivery) -> Self {
        Self {
            network_id: network_id.to_string(),
            delivery,
            delta: FdbDelta::Add { segment, ports },
        }
    }

    /// Removals are only ever broadcast.
    pub fn remove(network_id: &str, segment: Segment, ports: EndpointFdb) -> Self {
        Self {
            network_id: network_id.to_string(),
            delivery: Delivery::Broadcast,
            delta: FdbDelta::Remove { segment, ports },
        }
    }

    pub fn change_ip(
        network_id: &str,
        endpoint: IpAddr,
        before: Vec<FdbEntry>,
        after: Vec<FdbEntry>,
    ) -> Self {
        Self {
            network_id: network_id.to_string(),
            delivery: Delivery::Broadcast,
            delta: FdbDelta::ChangeIp {
                endpoint,
                before,
                after,
            },
        }
    }

    pub fn change_host(network_id: &str, before: EndpointFdb, after: EndpointFdb) -> Self {
        Self {
            network_id: network_id.to_string(),
            delivery: Delivery::Broadcast,
            delta: FdbDelta::ChangeHost { before, after },
        }
    }

    pub fn kind(&self) -> NotificationKind {
        match self.delta {
            FdbDelta::Add { .. } => NotificationKind::Add,
            FdbDelta::Remove { .. } => NotificationKind::Remove,
            FdbDelta::ChangeIp { .. } | FdbDelta::ChangeHost { .. } => NotificationKind::Update,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.delivery == Delivery::Broadcast
    }

    /// Target host of a unicast notification.
    pub fn target_host(&self) -> Option<&str> {
        match &self.delivery {
            Delivery::Unicast(host) => Some(host),
            Delivery::Broadcast => None,
        }
    }

    /// Every tunnel endpoint the delta mentions.
    pub fn endpoints(&self) -> BTreeSet<IpAddr> {
        match &self.delta {
            FdbDelta::Add { ports, .. } | FdbDelta::Remove { ports, .. } => {
                ports.keys().copied().collect()
            }
            FdbDelta::ChangeIp { endpoint, .. } => BTreeSet::from([*endpoint]),
            FdbDelta::ChangeHost { before, after } => {
                before.keys().chain(after.keys()).copied().collect()
            }
        }
    }

    /// Returns true if any endpoint list in the delta carries the flooding
    /// sentinel.
    pub fn carries_flooding(&self) -> bool {
        let any = |fdb: &EndpointFdb| fdb.values().flatten().any(FdbEntry::is_flooding);
        match &self.delta {
            FdbDelta::Add { ports, .. } | FdbDelta::Remove { ports, .. } => any(ports),
            FdbDelta::ChangeIp { .. } => false,
            FdbDelta::ChangeHost { before, after } => any(before) || any(after),
        }
    }

    /// Renders the `fdb_entries` argument agents receive.
    pub fn fdb_entries(&self) -> Value {
        let mut network = Map::new();
        match &self.delta {
            FdbDelta::Add { segment, ports } | FdbDelta::Remove { segment, ports } => {
                network.insert(
                    self.network_id.clone(),
                    json!({
                        "segment_id": segment.segmentation_id,
                        "network_type": segment.network_type.as_str(),
                        "ports": endpoint_map(ports),
                    }),
                );
                Value::Object(network)
            }
            FdbDelta::ChangeIp {
                endpoint,
                before,
                after,
            } => {
                let mut sides = Map::new();
                if !before.is_empty() {
                    sides.insert("before".to_string(), entry_list(before));
                }
                if !after.is_empty() {
                    sides.insert("after".to_string(), entry_list(after));
                }
                let mut endpoints = Map::new();
                endpoints.insert(endpoint.to_string(), Value::Object(sides));
                network.insert(self.network_id.clone(), Value::Object(endpoints));
                json!({ "chg_ip": network })
            }
            FdbDelta::ChangeHost { before, after } => {
                network.insert(
                    self.network_id.clone(),
                    json!({
                        "ports": {
                            "before": endpoint_map(before),
                            "after": endpoint_map(after),
                        }
                    }),
                );
                json!({ "chg_host": network })
            }
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} net={}",
            self.delivery,
            self.kind().method(),
            self.network_id
        )
    }
}

fn entry_list(entries: &[FdbEntry]) -> Value {
    Value::Array(
        entries
            .iter()
            .map(|entry| {
                let (mac, ip) = (*entry).into();
                json!([mac.to_string(), ip.to_string()])
            })
            .collect(),
    )
}

fn endpoint_map(fdb: &EndpointFdb) -> Value {
    Value::Object(
        fdb.iter()
            .map(|(endpoint, entries)| (endpoint.to_string(), entry_list(entries)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use l2pop_types::MacAddress;
    use pretty_assertions::assert_eq;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn mac() -> MacAddress {
        MacAddress::new([0xfa, 0x16, 0x3e, 0, 0, 1])
    }

    #[test]
    fn test_add_payload_shape() {
        let ports = EndpointFdb::from([(
            ip("20.0.0.1"),
            vec![FdbEntry::Flooding, FdbEntry::unicast(mac(), ip("10.0.0.2"))],
        )]);
        let n = Notification::add("net1", Segment::vxlan(1), ports, Delivery::Broadcast);

        assert_eq!(n.kind(), NotificationKind::Add);
        assert!(n.carries_flooding());
        assert_eq!(
            n.fdb_entries(),
            json!({
                "net1": {
                    "segment_id": 1,
                    "network_type": "vxlan",
                    "ports": {
                        "20.0.0.1": [
                            ["00:00:00:00:00:00", "0.0.0.0"],
                            ["fa:16:3e:00:00:01", "10.0.0.2"]
                        ]
                    }
                }
            })
        );
    }

    #[test]
    fn test_change_ip_omits_empty_side() {
        let n = Notification::change_ip(
            "net1",
            ip("20.0.0.1"),
            vec![],
            vec![FdbEntry::unicast(mac(), ip("10.0.0.16"))],
        );

        assert_eq!(n.kind(), NotificationKind::Update);
        assert_eq!(
            n.fdb_entries(),
            json!({
                "chg_ip": {
                    "net1": {
                        "20.0.0.1": { "after": [["fa:16:3e:00:00:01", "10.0.0.16"]] }
                    }
                }
            })
        );
    }

    #[test]
    fn test_change_host_payload_shape() {
        let entry = FdbEntry::unicast(mac(), ip("10.0.0.2"));
        let n = Notification::change_host(
            "net1",
            EndpointFdb::from([(ip("20.0.0.1"), vec![entry])]),
            EndpointFdb::from([(ip("20.0.0.2"), vec![FdbEntry::Flooding, entry])]),
        );

        assert_eq!(
            n.endpoints(),
            BTreeSet::from([ip("20.0.0.1"), ip("20.0.0.2")])
        );
        assert_eq!(
            n.fdb_entries(),
            json!({
                "chg_host": {
                    "net1": {
                        "ports": {
                            "before": { "20.0.0.1": [["fa:16:3e:00:00:01", "10.0.0.2"]] },
                            "after": {
                                "20.0.0.2": [
                                    ["00:00:00:00:00:00", "0.0.0.0"],
                                    ["fa:16:3e:00:00:01", "10.0.0.2"]
                                ]
                            }
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn test_delivery() {
        let n = Notification::add(
            "net1",
            Segment::vxlan(1),
            EndpointFdb::new(),
            Delivery::Unicast("host2".to_string()),
        );
        assert!(!n.is_broadcast());
        assert_eq!(n.target_host(), Some("host2"));
        assert_eq!(n.to_string(), "unicast:host2 add_fdb_entries net=net1");
        assert!(Notification::remove("net1", Segment::vxlan(1), EndpointFdb::new()).is_broadcast());
    }
}
