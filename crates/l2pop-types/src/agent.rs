//! Forwarding agent records, refreshed by agent heartbeats.

use crate::{HostId, NetworkType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;

/// Agent type reported by the Open vSwitch L2 agent.
pub const AGENT_TYPE_OVS: &str = "Open vSwitch agent";

/// Agent type reported by the Linux bridge L2 agent.
pub const AGENT_TYPE_LINUXBRIDGE: &str = "Linux bridge agent";

/// A host's L2 forwarding agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub host: HostId,
    pub agent_type: String,
    /// Local tunnel endpoint address.
    #[serde(default)]
    pub tunneling_ip: Option<IpAddr>,
    #[serde(default)]
    pub tunnel_types: BTreeSet<NetworkType>,
    pub started_at: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
}

impl Agent {
    /// Creates an agent that started and last reported now.
    pub fn new(host: impl Into<HostId>, agent_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            host: host.into(),
            agent_type: agent_type.into(),
            tunneling_ip: None,
            tunnel_types: BTreeSet::new(),
            started_at: now,
            heartbeat_at: now,
        }
    }

    pub fn with_tunneling_ip(mut self, ip: IpAddr) -> Self {
        self.tunneling_ip = Some(ip);
        self
    }

    pub fn with_tunnel_type(mut self, network_type: NetworkType) -> Self {
        self.tunnel_types.insert(network_type);
        self
    }

    pub fn with_times(mut self, started_at: DateTime<Utc>, heartbeat_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self.heartbeat_at = heartbeat_at;
        self
    }

    /// Tunnel endpoint address of this agent, if configured.
    pub fn endpoint(&self) -> Option<IpAddr> {
        self.tunneling_ip
    }

    pub fn supports(&self, network_type: &NetworkType) -> bool {
        self.tunnel_types.contains(network_type)
    }

    /// Time between the agent's start and its latest heartbeat.
    ///
    /// A freshly restarted agent has a small uptime and may have lost its
    /// FDB state.
    pub fn uptime(&self) -> Duration {
        (self.heartbeat_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_uptime() {
        let started = Utc::now() - TimeDelta::seconds(300);
        let agent = Agent::new("host1", AGENT_TYPE_OVS).with_times(started, Utc::now());
        assert!(agent.uptime() >= Duration::from_secs(299));
    }

    #[test]
    fn test_uptime_clamps_clock_skew() {
        let now = Utc::now();
        let agent = Agent::new("host1", AGENT_TYPE_OVS)
            .with_times(now, now - TimeDelta::seconds(10));
        assert_eq!(agent.uptime(), Duration::ZERO);
    }

    #[test]
    fn test_supports_tunnel_type() {
        let agent = Agent::new("host1", AGENT_TYPE_OVS)
            .with_tunneling_ip("20.0.0.1".parse().unwrap())
            .with_tunnel_type(NetworkType::Vxlan);

        assert!(agent.supports(&NetworkType::Vxlan));
        assert!(!agent.supports(&NetworkType::Gre));
        assert_eq!(agent.endpoint(), Some("20.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_agent_deserialize() {
        let agent: Agent = serde_json::from_value(serde_json::json!({
            "host": "host1",
            "agent_type": "Open vSwitch agent",
            "tunneling_ip": "20.0.0.1",
            "tunnel_types": ["vxlan"],
            "started_at": "2026-01-01T00:00:00Z",
            "heartbeat_at": "2026-01-01T00:05:00Z"
        }))
        .unwrap();

        assert!(agent.supports(&NetworkType::Vxlan));
        assert_eq!(agent.uptime(), Duration::from_secs(300));
    }
}
