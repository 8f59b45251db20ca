//! # FallWatch Bus
//!
//! Pub/sub plumbing between simulated wearables and the operator console.
//!
//! ## Features
//!
//! - **Topic codec**: `<PREFIX>P?<patient id>/<measurement>` encode/decode
//! - **MQTT transport**: rumqttc session with bounded connect timeouts and
//!   exponential backoff
//! - **Loopback broker**: in-process routing with MQTT filter semantics
//! - **At-most-once delivery**: publishes are fire-and-forget
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use fallwatch_bus::{BusClient, LoopbackBroker, MessageHandler, TopicCodec, run_dispatch};
//! use fallwatch_lib::models::{PatientId, Sample};
//! use fallwatch_lib::shutdown;
//! use std::sync::Arc;
//!
//! struct Print;
//!
//! impl MessageHandler for Print {
//!     fn on_message(&mut self, topic: &str, payload: &[u8]) {
//!         tracing::info!(topic, len = payload.len(), "received");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = LoopbackBroker::new();
//!     let codec = TopicCodec::new("BS2203FD");
//!
//!     let (transport, inbound) = broker.connect().await;
//!     let mut console = BusClient::new(Arc::new(transport), codec.clone());
//!     console.sync_subscriptions(&[PatientId::new("1")]).await?;
//!
//!     let (transport, _) = broker.connect().await;
//!     let device = BusClient::new(Arc::new(transport), codec);
//!     device
//!         .publisher()
//!         .publish_sample(&PatientId::new("1"), &Sample::Heartrate(70))
//!         .await?;
//!
//!     let (_trigger, signal) = shutdown::channel();
//!     run_dispatch(inbound, Print, signal).await;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

pub mod broker;
pub mod client;
pub mod error;
pub mod message;
pub mod topic;
pub mod transport;

pub use broker::{BrokerStatistics, LoopbackBroker, LoopbackTransport};
pub use client::{
    BusClient, ClientStats, MessageHandler, Publisher, SubscriptionChange, run_dispatch,
};
pub use error::{BusError, Result};
pub use message::{InboundMessage, QoS};
pub use topic::{IdDecoding, TopicCodec, TopicError, TopicFilter};
pub use transport::{InboundReceiver, MqttTransport, Transport};
