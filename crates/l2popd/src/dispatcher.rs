//! Notification delivery.
//!
//! The diff engine hands notifications to a [`Notifier`] and never waits on
//! delivery. [`ChannelNotifier`] queues them for a [`Dispatcher`] task, which
//! renders each one into an [`RpcMessage`] and casts it through a
//! [`Transport`]. Failed deliveries are logged and counted, never retried.

use crate::error::Result;
use crate::notification::{Delivery, Notification};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Default prefix of the agent notification topics.
pub const DEFAULT_TOPIC_PREFIX: &str = "q-agent-notifier";

const L2POPULATION_UPDATE: &str = "l2population-update";

/// Topic every tunnel agent subscribes to.
pub fn fanout_topic(prefix: &str) -> String {
    format!("{}-{}", prefix, L2POPULATION_UPDATE)
}

/// Topic only the agent on `host` consumes.
pub fn host_topic(prefix: &str, host: &str) -> String {
    format!("{}.{}", fanout_topic(prefix), host)
}

/// Sink for the notifications the engine emits. Both primitives are
/// fire-and-forget.
pub trait Notifier: Send + Sync {
    fn send_to_host(&self, host: &str, notification: Notification);

    fn broadcast(&self, notification: Notification);

    /// Routes a notification by its delivery mode.
    fn dispatch(&self, notification: Notification) {
        match notification.delivery.clone() {
            Delivery::Unicast(host) => self.send_to_host(&host, notification),
            Delivery::Broadcast => self.broadcast(notification),
        }
    }
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn send_to_host(&self, host: &str, notification: Notification) {
        (**self).send_to_host(host, notification)
    }

    fn broadcast(&self, notification: Notification) {
        (**self).broadcast(notification)
    }
}

/// Queues notifications on an unbounded channel drained by a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn enqueue(&self, notification: Notification) {
        if let Err(err) = self.tx.send(notification) {
            warn!(notification = %err.0, "Dispatcher channel closed, dropping notification");
        }
    }
}

impl Notifier for ChannelNotifier {
    fn send_to_host(&self, host: &str, mut notification: Notification) {
        notification.delivery = Delivery::Unicast(host.to_string());
        self.enqueue(notification);
    }

    fn broadcast(&self, mut notification: Notification) {
        notification.delivery = Delivery::Broadcast;
        self.enqueue(notification);
    }
}

/// A rendered agent RPC cast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcMessage {
    pub topic: String,
    pub method: &'static str,
    pub args: Value,
}

impl RpcMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messaging transport towards the agents.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers to the single agent on `host`.
    async fn cast(&self, host: &str, message: &RpcMessage) -> Result<()>;

    /// Delivers to every subscribed agent.
    async fn fanout_cast(&self, message: &RpcMessage) -> Result<()>;
}

/// Transport that writes every message to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn cast(&self, host: &str, message: &RpcMessage) -> Result<()> {
        info!(
            host,
            topic = %message.topic,
            method = message.method,
            message = %message.to_json()?,
            "cast"
        );
        Ok(())
    }

    async fn fanout_cast(&self, message: &RpcMessage) -> Result<()> {
        info!(
            topic = %message.topic,
            method = message.method,
            message = %message.to_json()?,
            "fanout_cast"
        );
        Ok(())
    }
}

/// Delivery counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    unicast: AtomicU64,
    fanout: AtomicU64,
    failed: AtomicU64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchCounts {
        DispatchCounts {
            unicast: self.unicast.load(Ordering::Relaxed),
            fanout: self.fanout.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchCounts {
    pub unicast: u64,
    pub fanout: u64,
    pub failed: u64,
}

/// Drains queued notifications into a transport.
pub struct Dispatcher<T> {
    transport: T,
    topic_prefix: String,
    stats: Arc<DispatchStats>,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T, topic_prefix: impl Into<String>) -> Self {
        Self {
            transport,
            topic_prefix: topic_prefix.into(),
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    pub fn render(&self, notification: &Notification) -> RpcMessage {
        let topic = match &notification.delivery {
            Delivery::Unicast(host) => host_topic(&self.topic_prefix, host),
            Delivery::Broadcast => fanout_topic(&self.topic_prefix),
        };
        RpcMessage {
            topic,
            method: notification.kind().method(),
            args: json!({ "fdb_entries": notification.fdb_entries() }),
        }
    }

    pub async fn deliver(&self, notification: &Notification) {
        let message = self.render(notification);
        let (outcome, counter) = match &notification.delivery {
            Delivery::Unicast(host) => (
                self.transport.cast(host, &message).await,
                &self.stats.unicast,
            ),
            Delivery::Broadcast => (
                self.transport.fanout_cast(&message).await,
                &self.stats.fanout,
            ),
        };

        match outcome {
            Ok(()) => {
                counter.fetch_add(1, Ordering::Relaxed);
                debug!(%notification, "Delivered");
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(%notification, error = %e, "Failed to deliver notification");
            }
        }
    }

    /// Delivers until every sender has been dropped.
    pub async fn run(self, mut rx: UnboundedReceiver<Notification>) -> DispatchCounts {
        info!(topic = %fanout_topic(&self.topic_prefix), "Dispatcher started");
        while let Some(notification) = rx.recv().await {
            self.deliver(&notification).await;
        }
        let counts = self.stats.snapshot();
        info!(
            unicast = counts.unicast,
            fanout = counts.fanout,
            failed = counts.failed,
            "Dispatcher stopped"
        );
        counts
    }
}
