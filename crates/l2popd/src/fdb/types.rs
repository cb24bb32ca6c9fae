//! FDB entry types.

use l2pop_types::MacAddress;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// IP half of the flooding sentinel pair.
pub const FLOODING_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// One entry of a remote endpoint's FDB contribution.
///
/// On the wire every entry is a `[mac, ip]` pair. The flooding sentinel is
/// the pair `["00:00:00:00:00:00", "0.0.0.0"]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "(MacAddress, IpAddr)", into = "(MacAddress, IpAddr)")]
pub enum FdbEntry {
    /// Broadcast/unknown-destination traffic must be tunneled to the endpoint.
    Flooding,
    /// A single reachable address behind the endpoint.
    Unicast { mac: MacAddress, ip: IpAddr },
}

impl FdbEntry {
    pub fn unicast(mac: MacAddress, ip: IpAddr) -> Self {
        FdbEntry::Unicast { mac, ip }
    }

    pub fn is_flooding(&self) -> bool {
        matches!(self, FdbEntry::Flooding)
    }
}

impl From<(MacAddress, IpAddr)> for FdbEntry {
    fn from((mac, ip): (MacAddress, IpAddr)) -> Self {
        if mac.is_zero() && ip == FLOODING_IP {
            FdbEntry::Flooding
        } else {
            FdbEntry::Unicast { mac, ip }
        }
    }
}

impl From<FdbEntry> for (MacAddress, IpAddr) {
    fn from(entry: FdbEntry) -> Self {
        match entry {
            FdbEntry::Flooding => (MacAddress::ZERO, FLOODING_IP),
            FdbEntry::Unicast { mac, ip } => (mac, ip),
        }
    }
}

impl fmt::Display for FdbEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FdbEntry::Flooding => f.write_str("flooding"),
            FdbEntry::Unicast { mac, ip } => write!(f, "{}/{}", mac, ip),
        }
    }
}

/// Per-network FDB contribution, keyed by remote tunnel endpoint address.
pub type EndpointFdb = BTreeMap<IpAddr, Vec<FdbEntry>>;
