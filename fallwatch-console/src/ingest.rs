//! Routes inbound telemetry to the classifier, the alert channel and the
//! persistence queue.

use crate::alerts::AlertSender;
use crate::persistence::PersistenceQueue;
use chrono::Utc;
use fallwatch_bus::{MessageHandler, TopicCodec};
use fallwatch_lib::FallDetector;
use fallwatch_lib::models::{Sample, UpdateIntent};
use tracing::{debug, info, warn};

/// Ingestion counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub received: u64,
    pub undecodable: u64,
    pub invalid_payloads: u64,
    pub falls: u64,
    pub intents: u64,
}

/// Dispatch target for the console's bus session.
///
/// Only decoding, classification and non-blocking hand-offs happen here.
pub struct IngestRouter {
    codec: TopicCodec,
    persistence: PersistenceQueue,
    alerts: AlertSender,
    stats: IngestStats,
}

impl IngestRouter {
    pub fn new(codec: TopicCodec, persistence: PersistenceQueue, alerts: AlertSender) -> Self {
        Self {
            codec,
            persistence,
            alerts,
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }
}

impl MessageHandler for IngestRouter {
    fn on_message(&mut self, topic: &str, payload: &[u8]) {
        self.stats.received += 1;

        let (patient_id, measurement) = match self.codec.decode(topic) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.stats.undecodable += 1;
                warn!(topic, error = %e, "Dropping message with undecodable topic");
                return;
            }
        };

        let sample = match Sample::parse(measurement, payload) {
            Ok(sample) => sample,
            Err(e) => {
                // An unparseable acceleration is simply not a fall.
                self.stats.invalid_payloads += 1;
                debug!(topic, error = %e, "Dropping message with invalid payload");
                return;
            }
        };

        if let Sample::Acceleration(axes) = &sample {
            if FallDetector::analyse(axes) {
                self.stats.falls += 1;
                info!(patient_id = %patient_id, "Fall detected");
                self.alerts.raise(patient_id, Utc::now());
            }
            return;
        }

        let Some(field) = measurement.persisted_field() else {
            return;
        };
        let intent = UpdateIntent::new(patient_id, field, sample.encode());
        if self.persistence.enqueue(intent).is_ok() {
            self.stats.intents += 1;
        }
    }
}
