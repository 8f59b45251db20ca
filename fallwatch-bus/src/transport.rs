//! Transport layer between the bus client and a pub/sub broker.
//!
//! [`Transport`] is the seam the rest of the system programs against. Two
//! implementations exist: [`MqttTransport`] talks to a real MQTT broker via
//! rumqttc, and [`crate::broker::LoopbackTransport`] routes in-process.

use crate::error::{BusError, Result};
use crate::message::{InboundMessage, QoS};
use async_trait::async_trait;
use bytes::Bytes;
use fallwatch_lib::config::BrokerConfig;
use fallwatch_lib::shutdown::ShutdownSignal;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Receiving half of a transport session.
pub type InboundReceiver = mpsc::Receiver<InboundMessage>;

/// Inbound messages buffered between the network task and dispatch.
pub const INBOUND_CAPACITY: usize = 1024;

/// Upper bound for the reconnect backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Operations the bus client needs from a broker session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Register interest in a topic filter.
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<()>;

    /// Drop interest in a topic filter.
    async fn unsubscribe(&self, topic: &str) -> Result<()>;

    /// Queue a message for delivery. Does not wait for acknowledgement.
    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<()>;

    /// Close the session.
    async fn disconnect(&self) -> Result<()>;
}

/// MQTT session backed by rumqttc.
pub struct MqttTransport {
    client: AsyncClient,
    /// Filters to restore when the broker forgets our session
    subscriptions: Arc<RwLock<BTreeSet<String>>>,
    /// Network task; taken by `disconnect`
    event_loop: Mutex<Option<JoinHandle<()>>>,
    /// Bound for flushing the DISCONNECT packet
    flush_timeout: Duration,
}

impl MqttTransport {
    /// Connect to the configured broker.
    ///
    /// Each attempt is bounded by `connect_timeout_ms`; failed attempts are
    /// retried with exponential backoff up to `connect_attempts` times.
    /// Exhausting the attempts yields [`BusError::Connection`].
    pub async fn connect(
        config: &BrokerConfig,
        client_id: &str,
        shutdown: ShutdownSignal,
    ) -> Result<(Self, InboundReceiver)> {
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive());
        options.set_clean_session(true);

        let mut backoff = config.retry_backoff();
        for attempt in 1..=config.connect_attempts {
            info!(
                host = %config.host,
                port = config.port,
                attempt,
                "Connecting to MQTT broker"
            );

            let (client, mut eventloop) = AsyncClient::new(options.clone(), config.request_capacity);
            let outcome =
                tokio::time::timeout(config.connect_timeout(), wait_for_connack(&mut eventloop))
                    .await
                    .unwrap_or_else(|_elapsed| {
                        Err(BusError::timeout(format!(
                            "no CONNACK within {}ms",
                            config.connect_timeout_ms
                        )))
                    });

            match outcome {
                Ok(()) => {
                    info!(client_id, "Connection acknowledged by broker");
                    let subscriptions = Arc::new(RwLock::new(BTreeSet::new()));
                    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

                    let event_loop = tokio::spawn(run_event_loop(
                        eventloop,
                        client.clone(),
                        Arc::clone(&subscriptions),
                        inbound_tx,
                        shutdown,
                        config.retry_backoff(),
                    ));

                    return Ok((
                        Self {
                            client,
                            subscriptions,
                            event_loop: Mutex::new(Some(event_loop)),
                            flush_timeout: config.connect_timeout(),
                        },
                        inbound_rx,
                    ));
                }
                Err(e) => {
                    warn!(attempt, error = %e, "MQTT connect attempt failed");
                }
            }

            if attempt < config.connect_attempts {
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
            }
        }

        Err(BusError::connection(format!(
            "unable to reach broker {}:{} after {} attempts",
            config.host, config.port, config.connect_attempts
        )))
    }
}

fn next_backoff(current: Duration) -> Duration {
    current.saturating_mul(2).min(MAX_BACKOFF)
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(BusError::connection(format!("broker refused: {:?}", ack.code)))
                };
            }
            Ok(_) => {}
            Err(e) => return Err(BusError::connection(e.to_string())),
        }
    }
}

/// Drive the rumqttc event loop, forwarding publishes to the inbound
/// channel.
///
/// The loop runs until the session's DISCONNECT has been written, so a
/// disconnect issued after shutdown still reaches the broker. Shutdown only
/// stops reconnect attempts. Connection errors are otherwise logged and
/// retried; rumqttc reconnects on the next poll.
async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    subscriptions: Arc<RwLock<BTreeSet<String>>>,
    inbound: mpsc::Sender<InboundMessage>,
    mut shutdown: ShutdownSignal,
    retry_delay: Duration,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage::new(publish.topic, publish.payload);
                if inbound.send(message).await.is_err() {
                    debug!("Inbound receiver dropped; discarding message");
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(session_present = ack.session_present, "Reconnected to broker");
                if !ack.session_present {
                    let topics = subscriptions.read().await;
                    for topic in topics.iter() {
                        if let Err(e) = client.try_subscribe(topic.as_str(), rumqttc::QoS::AtMostOnce) {
                            error!(topic = %topic, error = %e, "Failed to restore subscription");
                        }
                    }
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("Disconnected from broker");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if shutdown.is_triggered() {
                    info!(error = %e, "MQTT connection closed during shutdown");
                    break;
                }
                warn!(error = %e, "MQTT connection error; retrying");
                tokio::select! {
                    () = shutdown.wait() => break,
                    () = tokio::time::sleep(retry_delay) => {}
                }
            }
        }
    }
    info!("MQTT event loop stopped");
}

#[async_trait]
impl Transport for MqttTransport {
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<()> {
        self.client
            .subscribe(topic, qos.into())
            .await
            .map_err(|e| BusError::subscription(e.to_string()))?;
        self.subscriptions.write().await.insert(topic.to_owned());
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.client
            .unsubscribe(topic)
            .await
            .map_err(|e| BusError::subscription(e.to_string()))?;
        self.subscriptions.write().await.remove(topic);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<()> {
        self.client
            .publish_bytes(topic, qos.into(), false, payload)
            .await
            .map_err(|e| BusError::publish(e.to_string()))
    }

    /// Send DISCONNECT and wait, bounded by the connect timeout, for the
    /// network task to flush it.
    async fn disconnect(&self) -> Result<()> {
        let Some(event_loop) = self.event_loop.lock().await.take() else {
            return Ok(());
        };
        if event_loop.is_finished() {
            return Err(BusError::connection("event loop already stopped"));
        }

        self.client
            .disconnect()
            .await
            .map_err(|e| BusError::connection(e.to_string()))?;

        match tokio::time::timeout(self.flush_timeout, event_loop).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BusError::connection(format!("event loop failed: {e}"))),
            Err(_elapsed) => Err(BusError::timeout(format!(
                "DISCONNECT not flushed within {}ms",
                self.flush_timeout.as_millis()
            ))),
        }
    }
}
