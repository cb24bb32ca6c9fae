//! Network encapsulation descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Encapsulation type of a network segment.
///
/// Unknown type names are preserved in [`NetworkType::Other`] so that a
/// segment created by a newer type driver still round-trips.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NetworkType {
    Vxlan,
    Gre,
    Vlan,
    Flat,
    Local,
    Other(String),
}

impl NetworkType {
    /// Returns true for encapsulations that reach peers through a tunnel
    /// endpoint, and can therefore be populated with remote FDB entries.
    pub fn is_tunnel(&self) -> bool {
        matches!(self, NetworkType::Vxlan | NetworkType::Gre)
    }

    pub fn as_str(&self) -> &str {
        match self {
            NetworkType::Vxlan => "vxlan",
            NetworkType::Gre => "gre",
            NetworkType::Vlan => "vlan",
            NetworkType::Flat => "flat",
            NetworkType::Local => "local",
            NetworkType::Other(name) => name,
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = crate::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(crate::ParseError::InvalidNetworkType(s.to_string()));
        }
        Ok(NetworkType::from(s.to_string()))
    }
}

impl From<String> for NetworkType {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "vxlan" => NetworkType::Vxlan,
            "gre" => NetworkType::Gre,
            "vlan" => NetworkType::Vlan,
            "flat" => NetworkType::Flat,
            "local" => NetworkType::Local,
            _ => NetworkType::Other(s),
        }
    }
}

impl From<NetworkType> for String {
    fn from(t: NetworkType) -> String {
        t.as_str().to_string()
    }
}

/// The encapsulation bound to one network: type plus segmentation ID
/// (VNI for VXLAN, key for GRE).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub network_type: NetworkType,
    pub segmentation_id: u32,
}

impl Segment {
    pub fn new(network_type: NetworkType, segmentation_id: u32) -> Self {
        Self {
            network_type,
            segmentation_id,
        }
    }

    pub fn vxlan(vni: u32) -> Self {
        Self::new(NetworkType::Vxlan, vni)
    }

    pub fn gre(key: u32) -> Self {
        Self::new(NetworkType::Gre, key)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.network_type, self.segmentation_id)
    }
}
