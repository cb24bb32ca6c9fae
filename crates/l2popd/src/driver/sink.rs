//! The lifecycle interface a plugin framework drives.

use super::context::PortContext;
use super::engine::{DiffEngine, PendingDeletion};
use crate::dispatcher::Notifier;
use crate::topology::TopologyReader;
use std::sync::Arc;
use tracing::{debug, info};

/// Port lifecycle callbacks.
///
/// Update and delete-postcommit run after the change is durable. Delete
/// precommit runs while the port record is still readable; its result must
/// be handed back to [`LifecycleSink::delete_port_postcommit`] once the
/// removal has been committed.
pub trait LifecycleSink: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the number of notifications emitted.
    fn update_port_postcommit(&self, topology: &dyn TopologyReader, ctx: &PortContext) -> usize;

    fn delete_port_precommit(
        &self,
        topology: &dyn TopologyReader,
        ctx: &PortContext,
    ) -> PendingDeletion;

    /// Returns the number of notifications emitted.
    fn delete_port_postcommit(&self, pending: PendingDeletion) -> usize;
}

/// Population driver: the diff engine wired to a notifier.
pub struct L2PopDriver {
    engine: DiffEngine,
    notifier: Arc<dyn Notifier>,
}

impl L2PopDriver {
    pub fn new(engine: DiffEngine, notifier: Arc<dyn Notifier>) -> Self {
        info!(
            agent_boot_time_secs = engine.agent_boot_time().as_secs(),
            "Population driver initialized"
        );
        Self { engine, notifier }
    }

    pub fn engine(&self) -> &DiffEngine {
        &self.engine
    }

    /// Delivers a deletion captured by [`DiffEngine::prepare_deletion`].
    pub fn commit_deletion(&self, pending: PendingDeletion) -> usize {
        debug!(port_id = %pending.port_id, "Committing port deletion");
        let notifications = pending.into_notifications();
        let count = notifications.len();
        notifications
            .into_iter()
            .for_each(|n| self.notifier.dispatch(n));
        count
    }
}

impl LifecycleSink for L2PopDriver {
    fn name(&self) -> &str {
        "l2population"
    }

    fn update_port_postcommit(&self, topology: &dyn TopologyReader, ctx: &PortContext) -> usize {
        let notifications = self.engine.port_updated(topology, ctx);
        let count = notifications.len();
        for notification in notifications {
            debug!(port_id = %ctx.current.id, %notification, "Emitting");
            self.notifier.dispatch(notification);
        }
        count
    }

    fn delete_port_precommit(
        &self,
        topology: &dyn TopologyReader,
        ctx: &PortContext,
    ) -> PendingDeletion {
        self.engine.prepare_deletion(topology, ctx)
    }

    fn delete_port_postcommit(&self, pending: PendingDeletion) -> usize {
        self.commit_deletion(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{Delivery, Notification};
    use crate::topology::{MemoryTopology, TopologyStore};
    use l2pop_types::{Agent, MacAddress, NetworkType, Port, PortStatus, Segment, AGENT_TYPE_OVS};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<Notification>>);

    impl Notifier for Collect {
        fn send_to_host(&self, host: &str, mut notification: Notification) {
            notification.delivery = Delivery::Unicast(host.to_string());
            self.0.lock().push(notification);
        }

        fn broadcast(&self, notification: Notification) {
            self.0.lock().push(notification);
        }
    }

    fn setup() -> (MemoryTopology, Arc<Collect>, L2PopDriver) {
        let store = MemoryTopology::new();
        store.register_network("net1", Segment::vxlan(1));
        for (host, addr) in [("host1", "20.0.0.1"), ("host2", "20.0.0.2")] {
            store.report_agent(
                Agent::new(host, AGENT_TYPE_OVS)
                    .with_tunneling_ip(addr.parse().unwrap())
                    .with_tunnel_type(NetworkType::Vxlan),
            );
        }
        let collect = Arc::new(Collect::default());
        let driver = L2PopDriver::new(DiffEngine::default(), collect.clone());
        (store, collect, driver)
    }

    fn port(id: &str, host: &str, last: u8) -> Port {
        Port::new(id, "net1", MacAddress::new([0xfa, 0x16, 0x3e, 0, 0, last]))
            .with_ips([format!("10.0.0.{}", last).parse().unwrap()])
            .bound_to(host)
            .with_status(PortStatus::Active)
    }

    #[test]
    fn test_update_dispatches_in_order() {
        let (store, collect, driver) = setup();
        store.upsert_port(port("p1", "host1", 1));
        let p2 = port("p2", "host2", 2);
        store.upsert_port(p2.clone());

        let ctx = PortContext::new(p2.clone())
            .with_original(p2.with_status(PortStatus::Down));
        let emitted = driver.update_port_postcommit(&store.snapshot(), &ctx);

        assert_eq!(emitted, 2);
        let sent = collect.0.lock();
        assert!(sent[0].is_broadcast());
        assert_eq!(sent[1].target_host(), Some("host2"));
    }

    #[test]
    fn test_deletion_delivers_only_on_commit() {
        let (store, collect, driver) = setup();
        store.upsert_port(port("p1", "host1", 1));
        let p2 = port("p2", "host2", 2);
        store.upsert_port(p2.clone());

        let pending = driver.delete_port_precommit(&store.snapshot(), &PortContext::new(p2));
        assert!(collect.0.lock().is_empty());

        store.remove_port("p2");
        assert_eq!(driver.delete_port_postcommit(pending), 1);
        assert_eq!(collect.0.lock().len(), 1);
        assert_eq!(driver.name(), "l2population");
    }
}
