//! Port event context and change classification.

use l2pop_types::{Port, Segment};
use std::fmt;

/// The before/after view of one port event, as handed over by the plugin
/// framework after the change is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortContext {
    pub current: Port,
    /// State before the change; `None` for a newly created port.
    pub original: Option<Port>,
    /// Segment the current binding resolved to, if the framework knows it.
    pub bound_segment: Option<Segment>,
    /// Segment of the original binding.
    pub original_bound_segment: Option<Segment>,
}

impl PortContext {
    pub fn new(current: Port) -> Self {
        Self {
            current,
            original: None,
            bound_segment: None,
            original_bound_segment: None,
        }
    }

    pub fn with_original(mut self, original: Port) -> Self {
        self.original = Some(original);
        self
    }

    pub fn with_segments(mut self, current: Option<Segment>, original: Option<Segment>) -> Self {
        self.bound_segment = current;
        self.original_bound_segment = original;
        self
    }

    pub fn network_id(&self) -> &str {
        &self.current.network_id
    }

    pub fn classify(&self) -> PortChange {
        PortChange::classify(self.original.as_ref(), &self.current)
    }
}

/// What a port update changed, as far as peers' FDBs are concerned.
///
/// Exactly one kind applies to an event. Address and host changes only
/// count on a port that was ACTIVE before and after; anything else that
/// touches the status is an activation or deactivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortChange {
    AddressChange,
    HostMigration,
    Activation,
    Deactivation,
    Unchanged,
}

impl PortChange {
    pub fn classify(original: Option<&Port>, current: &Port) -> Self {
        let Some(original) = original else {
            return if current.is_active() {
                PortChange::Activation
            } else {
                PortChange::Unchanged
            };
        };

        let active_throughout = original.is_active() && current.is_active();
        if active_throughout
            && original
                .ip_set()
                .symmetric_difference(&current.ip_set())
                .next()
                .is_some()
        {
            return PortChange::AddressChange;
        }
        if active_throughout && original.host() != current.host() {
            return PortChange::HostMigration;
        }
        if original.status != current.status {
            if current.is_active() {
                return PortChange::Activation;
            }
            if original.is_active() {
                return PortChange::Deactivation;
            }
        }
        PortChange::Unchanged
    }
}

impl fmt::Display for PortChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortChange::AddressChange => "address-change",
            PortChange::HostMigration => "host-migration",
            PortChange::Activation => "activation",
            PortChange::Deactivation => "deactivation",
            PortChange::Unchanged => "unchanged",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use l2pop_types::{MacAddress, PortStatus};
    use std::net::IpAddr;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn port(host: &str, status: PortStatus, ips: &[&str]) -> Port {
        Port::new("p1", "net1", MacAddress::new([0xfa, 0x16, 0x3e, 0, 0, 1]))
            .with_ips(ips.iter().map(|s| ip(s)))
            .bound_to(host)
            .with_status(status)
    }

    #[test]
    fn test_classify_new_port() {
        let up = port("host1", PortStatus::Active, &["10.0.0.2"]);
        let build = port("host1", PortStatus::Build, &["10.0.0.2"]);
        assert_eq!(PortChange::classify(None, &up), PortChange::Activation);
        assert_eq!(PortChange::classify(None, &build), PortChange::Unchanged);
    }

    #[test]
    fn test_classify_status_transitions() {
        let active = port("host1", PortStatus::Active, &["10.0.0.2"]);
        let down = port("host1", PortStatus::Down, &["10.0.0.2"]);
        let error = port("host1", PortStatus::Error, &["10.0.0.2"]);
        let build = port("host1", PortStatus::Build, &["10.0.0.2"]);

        assert_eq!(PortChange::classify(Some(&down), &active), PortChange::Activation);
        assert_eq!(PortChange::classify(Some(&active), &down), PortChange::Deactivation);
        assert_eq!(PortChange::classify(Some(&active), &error), PortChange::Deactivation);
        assert_eq!(PortChange::classify(Some(&build), &down), PortChange::Unchanged);
        assert_eq!(PortChange::classify(Some(&active), &active), PortChange::Unchanged);
    }

    #[test]
    fn test_classify_address_change_wins() {
        let before = port("host1", PortStatus::Active, &["10.0.0.2", "10.0.0.10"]);
        let after = port("host2", PortStatus::Active, &["10.0.0.2", "10.0.0.16"]);
        assert_eq!(
            PortChange::classify(Some(&before), &after),
            PortChange::AddressChange
        );
    }

    #[test]
    fn test_classify_ip_reorder_is_not_a_change() {
        let before = port("host1", PortStatus::Active, &["10.0.0.2", "10.0.0.10"]);
        let after = port("host1", PortStatus::Active, &["10.0.0.10", "10.0.0.2"]);
        assert_eq!(PortChange::classify(Some(&before), &after), PortChange::Unchanged);
    }

    #[test]
    fn test_classify_host_migration() {
        let before = port("host1", PortStatus::Active, &["10.0.0.2"]);
        let after = port("host2", PortStatus::Active, &["10.0.0.2"]);
        assert_eq!(
            PortChange::classify(Some(&before), &after),
            PortChange::HostMigration
        );
    }

    #[test]
    fn test_classify_combined_change_falls_through_to_status() {
        let before = port("host1", PortStatus::Down, &["10.0.0.2"]);
        let after = port("host2", PortStatus::Active, &["10.0.0.3"]);
        assert_eq!(PortChange::classify(Some(&before), &after), PortChange::Activation);

        let ctx = PortContext::new(after.clone()).with_original(before);
        assert_eq!(ctx.classify(), PortChange::Activation);
        assert_eq!(ctx.network_id(), "net1");
    }
}
