//! Alert Channel and the in-memory alert buffer.

use chrono::{DateTime, Utc};
use fallwatch_lib::models::{AlertEvent, AlertId, PatientId, PatientRecord};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::warn;

/// A fall detected by ingestion, waiting to be materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAlert {
    pub patient_id: PatientId,
    pub detected_at: DateTime<Utc>,
}

/// Create the one-directional alert channel.
///
/// Unbounded so a burst of falls is never dropped; the sync loop drains one
/// per tick.
pub fn alert_channel() -> (AlertSender, AlertReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (AlertSender { tx }, AlertReceiver { rx })
}

/// Ingestion side. Never blocks.
#[derive(Debug, Clone)]
pub struct AlertSender {
    tx: mpsc::UnboundedSender<PendingAlert>,
}

impl AlertSender {
    /// Report a fall. Returns false if the sync loop has stopped.
    pub fn raise(&self, patient_id: PatientId, detected_at: DateTime<Utc>) -> bool {
        let sent = self
            .tx
            .send(PendingAlert {
                patient_id,
                detected_at,
            })
            .is_ok();
        if !sent {
            warn!("Alert channel closed, fall event lost");
        }
        sent
    }
}

/// Sync loop side.
#[derive(Debug)]
pub struct AlertReceiver {
    rx: mpsc::UnboundedReceiver<PendingAlert>,
}

impl AlertReceiver {
    /// Take the oldest pending alert, if any.
    pub fn try_next(&mut self) -> Option<PendingAlert> {
        match self.rx.try_recv() {
            Ok(alert) => Some(alert),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

/// An alert together with the latest patient snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEntry {
    pub event: AlertEvent,
    /// `None` when the patient is not in the datastore
    pub patient: Option<PatientRecord>,
}

/// Raised alerts in arrival order.
///
/// Append-only apart from explicit dismissal. Ids are assigned
/// monotonically and never reused.
#[derive(Debug, Default)]
pub struct AlertBuffer {
    entries: Vec<AlertEntry>,
    next_id: u64,
}

impl AlertBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new alert and return its id.
    pub fn push(
        &mut self,
        patient_id: PatientId,
        raised_at: DateTime<Utc>,
        patient: Option<PatientRecord>,
    ) -> AlertId {
        self.next_id += 1;
        let id = AlertId::new(self.next_id);
        self.entries.push(AlertEntry {
            event: AlertEvent::new(id, patient_id, raised_at),
            patient,
        });
        id
    }

    /// Dismiss one alert, preserving the order of the rest.
    pub fn remove(&mut self, id: AlertId) -> Option<AlertEntry> {
        let index = self.position(id)?;
        Some(self.entries.remove(index))
    }

    /// Dismiss everything. Returns how many alerts were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub fn get(&self, id: AlertId) -> Option<&AlertEntry> {
        self.entries.iter().find(|entry| entry.event.id() == id)
    }

    /// Current list index of an alert.
    pub fn position(&self, id: AlertId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.event.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlertEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every entry's patient snapshot with a fresh read.
    pub fn refresh_patients<F>(&mut self, mut fetch: F)
    where
        F: FnMut(&PatientId) -> Option<PatientRecord>,
    {
        for entry in &mut self.entries {
            entry.patient = fetch(entry.event.patient_id());
        }
    }
}
