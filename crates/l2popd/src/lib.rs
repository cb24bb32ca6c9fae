//! L2 population for tunnel overlays.
//!
//! Keeps the forwarding databases of tunnel agents in sync: every port
//! lifecycle event is turned into the smallest set of FDB deltas peers
//! need, each tagged for unicast to one host or broadcast to all.
//!
//! # Architecture
//!
//! ```text
//! LifecycleEvent ──▶ L2PopService ──▶ TopologyStore (mutate, snapshot)
//!                         │
//!                         ▼
//!                  LifecycleSink (L2PopDriver)
//!                         │
//!                         ▼
//!                     DiffEngine ◀── FdbAggregator ◀── TopologyReader
//!                         │
//!                         ▼
//!                     Notifier ──▶ Dispatcher ──▶ Transport
//! ```

pub mod config_file;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod fdb;
pub mod locks;
pub mod notification;
pub mod service;
pub mod topology;

pub use config_file::L2PopConfig;
pub use dispatcher::{
    ChannelNotifier, DispatchCounts, DispatchStats, Dispatcher, LogTransport, Notifier,
    RpcMessage, Transport,
};
pub use driver::{DiffEngine, L2PopDriver, LifecycleSink, PendingDeletion, PortChange, PortContext};
pub use error::{L2PopError, Result};
pub use fdb::{EndpointFdb, FdbAggregator, FdbEntry, PortInfo, Unresolved};
pub use locks::NetworkLocks;
pub use notification::{Delivery, FdbDelta, Notification, NotificationKind};
pub use service::{L2PopService, LifecycleEvent};
pub use topology::{MemoryTopology, TopologyReader, TopologyState, TopologyStore};
