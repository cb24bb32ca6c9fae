//! Virtual port records as seen by the population engine.

use crate::{HostId, MacAddress, NetworkId, ParseError, PortId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Operational status of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortStatus {
    Active,
    Down,
    Build,
    Error,
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortStatus::Active => "ACTIVE",
            PortStatus::Down => "DOWN",
            PortStatus::Build => "BUILD",
            PortStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

impl FromStr for PortStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(PortStatus::Active),
            "DOWN" => Ok(PortStatus::Down),
            "BUILD" => Ok(PortStatus::Build),
            "ERROR" => Ok(PortStatus::Error),
            _ => Err(ParseError::InvalidPortStatus(s.to_string())),
        }
    }
}

/// A virtual port on an overlay network.
///
/// A port contributes to remote FDB tables only while it is bound to a host,
/// ACTIVE, and that host's agent supports the network's tunnel type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub network_id: NetworkId,
    pub mac: MacAddress,
    #[serde(default)]
    pub fixed_ips: Vec<IpAddr>,
    /// Binding host; `None` while the port is unbound.
    #[serde(default)]
    pub host: Option<HostId>,
    pub status: PortStatus,
}

impl Port {
    /// Creates an unbound DOWN port without addresses.
    pub fn new(id: impl Into<PortId>, network_id: impl Into<NetworkId>, mac: MacAddress) -> Self {
        Self {
            id: id.into(),
            network_id: network_id.into(),
            mac,
            fixed_ips: Vec::new(),
            host: None,
            status: PortStatus::Down,
        }
    }

    pub fn with_ips(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.fixed_ips = ips.into_iter().collect();
        self
    }

    pub fn bound_to(mut self, host: impl Into<HostId>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_status(mut self, status: PortStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == PortStatus::Active
    }

    /// Returns the binding host, treating an empty host string as unbound.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref().filter(|h| !h.is_empty())
    }

    pub fn ip_set(&self) -> BTreeSet<IpAddr> {
        self.fixed_ips.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mac() -> MacAddress {
        MacAddress::new([0xfa, 0x16, 0x3e, 0, 0, 1])
    }

    #[test]
    fn test_port_builder() {
        let ip: IpAddr = "10.0.0.2".parse().unwrap();
        let port = Port::new("p1", "net1", mac())
            .with_ips([ip])
            .bound_to("host1")
            .with_status(PortStatus::Active);

        assert!(port.is_active());
        assert_eq!(port.host(), Some("host1"));
        assert_eq!(port.fixed_ips, vec![ip]);
    }

    #[test]
    fn test_empty_host_is_unbound() {
        let port = Port::new("p1", "net1", mac()).bound_to("");
        assert_eq!(port.host(), None);
        assert_eq!(Port::new("p2", "net1", mac()).host(), None);
    }

    #[test]
    fn test_port_status_serde() {
        assert_eq!(
            serde_json::to_string(&PortStatus::Active).unwrap(),
            "\"ACTIVE\""
        );
        assert_eq!("down".parse::<PortStatus>().unwrap(), PortStatus::Down);
        assert!("gone".parse::<PortStatus>().is_err());
    }

    #[test]
    fn test_port_deserialize_defaults() {
        let port: Port = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "network_id": "net1",
            "mac": "fa:16:3e:00:00:01",
            "status": "BUILD"
        }))
        .unwrap();
        assert!(port.fixed_ips.is_empty());
        assert_eq!(port.host, None);
        assert_eq!(port.status, PortStatus::Build);
    }
}
