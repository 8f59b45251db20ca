//! Message types carried by the bus.

use bytes::Bytes;
use std::time::SystemTime;

/// Delivery guarantee requested for a publish or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    /// Fire and forget
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

/// A message received from the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Topic the message was published to
    pub topic: String,
    /// Raw payload bytes
    pub payload: Bytes,
    /// Local receive timestamp
    pub received_at: SystemTime,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: SystemTime::now(),
        }
    }
}
