//! Event intake: applies lifecycle events to the topology store and drives
//! the lifecycle sink, one network at a time.

use crate::driver::{LifecycleSink, PortContext};
use crate::error::{L2PopError, Result};
use crate::locks::NetworkLocks;
use crate::topology::{TopologyReader, TopologyStore};
use l2pop_types::{Agent, NetworkId, Port, PortId, Segment};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// A lifecycle event as read from the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Agent heartbeat.
    AgentReport { agent: Agent },
    NetworkCreate {
        network_id: NetworkId,
        segment: Segment,
    },
    /// Port created or updated; carries the full new port record.
    PortUpdate { port: Port },
    PortDelete { port_id: PortId },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::AgentReport { .. } => "agent_report",
            LifecycleEvent::NetworkCreate { .. } => "network_create",
            LifecycleEvent::PortUpdate { .. } => "port_update",
            LifecycleEvent::PortDelete { .. } => "port_delete",
        }
    }

    pub fn from_json(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

pub struct L2PopService<S> {
    store: Arc<S>,
    sink: Arc<dyn LifecycleSink>,
    locks: NetworkLocks,
}

impl<S: TopologyStore> L2PopService<S> {
    pub fn new(store: Arc<S>, sink: Arc<dyn LifecycleSink>) -> Self {
        info!(sink = sink.name(), "Lifecycle service initialized");
        Self {
            store,
            sink,
            locks: NetworkLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Applies one event, returning the number of notifications emitted.
    #[instrument(skip_all, fields(event = event.name()))]
    pub async fn handle(&self, event: LifecycleEvent) -> Result<usize> {
        match event {
            LifecycleEvent::AgentReport { agent } => {
                self.report_agent(agent);
                Ok(0)
            }
            LifecycleEvent::NetworkCreate {
                network_id,
                segment,
            } => {
                self.create_network(&network_id, segment).await;
                Ok(0)
            }
            LifecycleEvent::PortUpdate { port } => self.update_port(port).await,
            LifecycleEvent::PortDelete { port_id } => self.delete_port(&port_id).await,
        }
    }

    pub fn report_agent(&self, agent: Agent) {
        self.store.report_agent(agent);
    }

    pub async fn create_network(&self, network_id: &str, segment: Segment) {
        let _guard = self.locks.acquire(network_id).await;
        self.store.register_network(network_id, segment);
    }

    /// Commits a port update, then runs the sink against the new state.
    #[instrument(skip_all, fields(port_id = %port.id, network_id = %port.network_id))]
    pub async fn update_port(&self, port: Port) -> Result<usize> {
        let _guard = self.locks.acquire(&port.network_id).await;

        let original = self.store.upsert_port(port.clone());
        let snapshot = self.store.snapshot();
        let ctx = PortContext {
            bound_segment: snapshot.bound_segment(&port),
            original_bound_segment: original.as_ref().and_then(|o| snapshot.bound_segment(o)),
            current: port,
            original,
        };

        let emitted = self.sink.update_port_postcommit(&snapshot, &ctx);
        debug!(emitted, "Port update handled");
        Ok(emitted)
    }

    /// Captures the removal delta, removes the port, then delivers.
    #[instrument(skip_all, fields(port_id = %port_id))]
    pub async fn delete_port(&self, port_id: &str) -> Result<usize> {
        let network_id = self
            .store
            .port(port_id)
            .map(|p| p.network_id)
            .ok_or_else(|| L2PopError::UnknownPort(port_id.to_string()))?;
        let _guard = self.locks.acquire(&network_id).await;

        let snapshot = self.store.snapshot();
        let port = self
            .store
            .port(port_id)
            .ok_or_else(|| L2PopError::UnknownPort(port_id.to_string()))?;
        let ctx = PortContext {
            bound_segment: snapshot.bound_segment(&port),
            ..PortContext::new(port)
        };
        let pending = self.sink.delete_port_precommit(&snapshot, &ctx);
        drop(snapshot);

        if self.store.remove_port(port_id).is_none() {
            return Err(L2PopError::UnknownPort(port_id.to_string()));
        }

        let emitted = self.sink.delete_port_postcommit(pending);
        debug!(emitted, "Port deletion handled");
        Ok(emitted)
    }
}
