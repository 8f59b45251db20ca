//! In-process broker with MQTT topic filter semantics.
//!
//! Used for running the simulator and console in one process and for tests
//! that need a broker without network access. Delivery is at-most-once: a
//! subscriber whose inbound buffer is full misses the message.

use crate::error::Result;
use crate::message::{InboundMessage, QoS};
use crate::topic::TopicFilter;
use crate::transport::{INBOUND_CAPACITY, InboundReceiver, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Broker counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerStatistics {
    pub messages_published: u64,
    pub messages_delivered: u64,
    pub messages_dropped: u64,
    pub connected_clients: usize,
    pub active_filters: usize,
    pub uptime_seconds: u64,
}

/// Filter registrations keyed by subscriber.
#[derive(Debug, Default)]
struct FilterTable {
    filters: HashMap<TopicFilter, HashSet<Uuid>>,
}

impl FilterTable {
    fn subscribe(&mut self, filter: &str, subscriber: Uuid) {
        self.filters
            .entry(TopicFilter::new(filter))
            .or_default()
            .insert(subscriber);
    }

    fn unsubscribe(&mut self, filter: &str, subscriber: Uuid) {
        let key = TopicFilter::new(filter);
        if let Some(subscribers) = self.filters.get_mut(&key) {
            subscribers.remove(&subscriber);
            if subscribers.is_empty() {
                self.filters.remove(&key);
            }
        }
    }

    fn remove_subscriber(&mut self, subscriber: Uuid) {
        self.filters.retain(|_, subscribers| {
            subscribers.remove(&subscriber);
            !subscribers.is_empty()
        });
    }

    /// Subscribers with at least one matching filter, each listed once.
    fn find_subscribers(&self, topic: &str) -> HashSet<Uuid> {
        self.filters
            .iter()
            .filter(|(filter, _)| filter.matches(topic))
            .flat_map(|(_, subscribers)| subscribers.iter().copied())
            .collect()
    }
}

struct BrokerInner {
    filters: RwLock<FilterTable>,
    clients: RwLock<HashMap<Uuid, mpsc::Sender<InboundMessage>>>,
    stats: Mutex<BrokerStatistics>,
    start_time: Instant,
}

/// Shared handle to an in-process broker.
#[derive(Clone)]
pub struct LoopbackBroker {
    inner: Arc<BrokerInner>,
}

impl Default for LoopbackBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                filters: RwLock::new(FilterTable::default()),
                clients: RwLock::new(HashMap::new()),
                stats: Mutex::new(BrokerStatistics::default()),
                start_time: Instant::now(),
            }),
        }
    }

    /// Open a new session against this broker.
    pub async fn connect(&self) -> (LoopbackTransport, InboundReceiver) {
        let client_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        self.inner.clients.write().await.insert(client_id, tx);
        info!(%client_id, "Loopback client connected");

        (
            LoopbackTransport {
                client_id,
                broker: self.clone(),
            },
            rx,
        )
    }

    async fn route(&self, topic: &str, payload: Bytes) {
        let subscribers = self.inner.filters.read().await.find_subscribers(topic);
        let mut delivered = 0u64;
        let mut dropped = 0u64;

        {
            let clients = self.inner.clients.read().await;
            for subscriber in subscribers {
                let Some(sender) = clients.get(&subscriber) else {
                    continue;
                };
                match sender.try_send(InboundMessage::new(topic, payload.clone())) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(%subscriber, topic, "Subscriber buffer full, dropping message");
                        dropped += 1;
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!(%subscriber, "Subscriber receiver closed");
                        dropped += 1;
                    }
                }
            }
        }

        let mut stats = self.inner.stats.lock().await;
        stats.messages_published += 1;
        stats.messages_delivered += delivered;
        stats.messages_dropped += dropped;
    }

    async fn disconnect_client(&self, client_id: Uuid) {
        self.inner.filters.write().await.remove_subscriber(client_id);
        if self.inner.clients.write().await.remove(&client_id).is_some() {
            info!(%client_id, "Loopback client disconnected");
        }
    }

    pub async fn statistics(&self) -> BrokerStatistics {
        let mut stats = self.inner.stats.lock().await.clone();
        stats.connected_clients = self.inner.clients.read().await.len();
        stats.active_filters = self.inner.filters.read().await.filters.len();
        stats.uptime_seconds = self.inner.start_time.elapsed().as_secs();
        stats
    }
}

/// A session on a [`LoopbackBroker`].
pub struct LoopbackTransport {
    client_id: Uuid,
    broker: LoopbackBroker,
}

impl LoopbackTransport {
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn subscribe(&self, topic: &str, _qos: QoS) -> Result<()> {
        self.broker
            .inner
            .filters
            .write()
            .await
            .subscribe(topic, self.client_id);
        debug!(client_id = %self.client_id, topic, "Subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.broker
            .inner
            .filters
            .write()
            .await
            .unsubscribe(topic, self.client_id);
        debug!(client_id = %self.client_id, topic, "Unsubscribed");
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes, _qos: QoS) -> Result<()> {
        self.broker.route(topic, payload).await;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.broker.disconnect_client(self.client_id).await;
        Ok(())
    }
}
