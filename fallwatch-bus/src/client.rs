//! Message Bus Client: session management, subscriptions, publishing and
//! inbound dispatch.
//!
//! A [`BusClient`] owns the subscription set and is held by whichever task
//! keeps it in sync with the patient set. Publishing goes through
//! [`Publisher`], a cheap clonable handle, so many device loops can share a
//! session.

use crate::error::Result;
use crate::message::QoS;
use crate::topic::TopicCodec;
use crate::transport::{InboundReceiver, MqttTransport, Transport};
use bytes::Bytes;
use fallwatch_lib::config::BrokerConfig;
use fallwatch_lib::models::{PatientId, Sample};
use fallwatch_lib::shutdown::ShutdownSignal;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Client counters, shared between the client and its publishers.
#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    publish_failures: AtomicU64,
}

/// Snapshot of client statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub messages_published: u64,
    pub publish_failures: u64,
    pub active_subscriptions: usize,
}

/// Result of reconciling subscriptions against a patient set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChange {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SubscriptionChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Session wrapper over a [`Transport`].
pub struct BusClient {
    transport: Arc<dyn Transport>,
    codec: TopicCodec,
    qos: QoS,
    subscriptions: BTreeSet<String>,
    counters: Arc<Counters>,
}

impl BusClient {
    pub fn new(transport: Arc<dyn Transport>, codec: TopicCodec) -> Self {
        Self {
            transport,
            codec,
            qos: QoS::default(),
            subscriptions: BTreeSet::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Connect to the MQTT broker described by `config`.
    ///
    /// `role` is folded into the client id so sessions are recognisable in
    /// broker logs. Fails with [`crate::BusError::Connection`] once the
    /// configured attempts are exhausted.
    pub async fn connect_mqtt(
        config: &BrokerConfig,
        role: &str,
        codec: TopicCodec,
        shutdown: ShutdownSignal,
    ) -> Result<(Self, InboundReceiver)> {
        let client_id = client_id(&config.client_id_prefix, role);
        let (transport, inbound) = MqttTransport::connect(config, &client_id, shutdown).await?;
        Ok((Self::new(Arc::new(transport), codec), inbound))
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn codec(&self) -> &TopicCodec {
        &self.codec
    }

    /// A publishing handle sharing this session.
    pub fn publisher(&self) -> Publisher {
        Publisher {
            transport: Arc::clone(&self.transport),
            codec: self.codec.clone(),
            qos: self.qos,
            counters: Arc::clone(&self.counters),
        }
    }

    /// Subscribe to a raw topic filter.
    pub async fn subscribe(&mut self, filter: &str) -> Result<()> {
        if self.subscriptions.contains(filter) {
            return Ok(());
        }
        self.transport.subscribe(filter, self.qos).await?;
        self.subscriptions.insert(filter.to_owned());
        Ok(())
    }

    /// Make the subscription set exactly one topic per (patient, measurement)
    /// pair for `patients`.
    ///
    /// Ids that cannot be carried in a topic are skipped with a warning.
    pub async fn sync_subscriptions(&mut self, patients: &[PatientId]) -> Result<SubscriptionChange> {
        let mut desired = BTreeSet::new();
        for id in patients {
            if TopicCodec::is_valid_id(id) {
                desired.extend(self.codec.subscription_topics(id));
            } else {
                warn!(patient_id = %id, "Skipping patient id that cannot be encoded in a topic");
            }
        }

        let mut change = SubscriptionChange::default();

        let stale: Vec<String> = self.subscriptions.difference(&desired).cloned().collect();
        for topic in stale {
            self.transport.unsubscribe(&topic).await?;
            self.subscriptions.remove(&topic);
            change.removed.push(topic);
        }

        let fresh: Vec<String> = desired.difference(&self.subscriptions).cloned().collect();
        for topic in fresh {
            self.transport.subscribe(&topic, self.qos).await?;
            self.subscriptions.insert(topic.clone());
            change.added.push(topic);
        }

        if !change.is_empty() {
            info!(
                added = change.added.len(),
                removed = change.removed.len(),
                total = self.subscriptions.len(),
                "Subscription set updated"
            );
        }
        Ok(change)
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.iter().map(String::as_str)
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            messages_published: self.counters.published.load(Ordering::Relaxed),
            publish_failures: self.counters.publish_failures.load(Ordering::Relaxed),
            active_subscriptions: self.subscriptions.len(),
        }
    }

    pub async fn disconnect(self) -> Result<()> {
        info!(subscriptions = self.subscriptions.len(), "Disconnecting bus client");
        self.transport.disconnect().await
    }
}

/// Clonable publishing half of a [`BusClient`].
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn Transport>,
    codec: TopicCodec,
    qos: QoS,
    counters: Arc<Counters>,
}

impl Publisher {
    pub fn codec(&self) -> &TopicCodec {
        &self.codec
    }

    /// Fire-and-forget publish of a raw payload.
    pub async fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> Result<()> {
        match self.transport.publish(topic, payload.into(), self.qos).await {
            Ok(()) => {
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                debug!(topic, "Published");
                Ok(())
            }
            Err(e) => {
                self.counters.publish_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Publish a sample on the topic for `patient`.
    pub async fn publish_sample(&self, patient: &PatientId, sample: &Sample) -> Result<()> {
        let topic = self.codec.encode(patient, sample.measurement());
        self.publish(&topic, sample.encode()).await
    }
}

/// Receives every inbound message in arrival order.
///
/// Called on the dispatch task; implementations must not block.
pub trait MessageHandler: Send {
    fn on_message(&mut self, topic: &str, payload: &[u8]);
}

/// Feed inbound messages to `handler` until shutdown or the transport closes.
/// Returns the handler so callers can inspect its final state.
pub async fn run_dispatch<H: MessageHandler>(
    mut inbound: InboundReceiver,
    mut handler: H,
    mut shutdown: ShutdownSignal,
) -> H {
    loop {
        tokio::select! {
            biased;
            () = shutdown.wait() => {
                info!("Dispatch loop shutting down");
                break;
            }
            message = inbound.recv() => match message {
                Some(message) => handler.on_message(&message.topic, &message.payload),
                None => {
                    info!("Inbound stream closed");
                    break;
                }
            }
        }
    }
    handler
}

fn client_id(prefix: &str, role: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{role}-{}", &suffix[..8])
}
