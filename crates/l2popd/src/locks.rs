//! Per-network serialization of lifecycle events.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// One async mutex per network.
///
/// Holding the guard for a network means no other event on that network
/// can read port counts until the guard is dropped. Networks never block
/// each other.
#[derive(Debug, Default)]
pub struct NetworkLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl NetworkLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, network_id: &str) -> OwnedMutexGuard<()> {
        // The map shard lock must be released before awaiting.
        let lock = self
            .locks
            .entry(network_id.to_string())
            .or_default()
            .value()
            .clone();
        trace!(network_id, "Acquiring network lock");
        lock.lock_owned().await
    }

    /// Number of networks that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_network_is_exclusive() {
        let locks = NetworkLocks::new();
        let guard = locks.acquire("net1").await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.acquire("net1")).await;
        assert!(blocked.is_err());

        drop(guard);
        let reacquired =
            tokio::time::timeout(Duration::from_millis(50), locks.acquire("net1")).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn test_distinct_networks_do_not_block() {
        let locks = NetworkLocks::new();
        let _net1 = locks.acquire("net1").await;
        let net2 = tokio::time::timeout(Duration::from_millis(50), locks.acquire("net2")).await;
        assert!(net2.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
