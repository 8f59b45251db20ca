//! Fall alert events.

use crate::models::patient::PatientId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strongly-typed, monotonically assigned alert identifier.
///
/// Identities are stable for the lifetime of the alert; presentation layers
/// key their selection on this rather than on a list position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlertId(u64);

impl AlertId {
    /// Create a new alert ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw alert ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A raised fall alert. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    id: AlertId,
    patient_id: PatientId,
    raised_at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(id: AlertId, patient_id: PatientId, raised_at: DateTime<Utc>) -> Self {
        Self {
            id,
            patient_id,
            raised_at,
        }
    }

    pub fn id(&self) -> AlertId {
        self.id
    }

    pub fn patient_id(&self) -> &PatientId {
        &self.patient_id
    }

    pub fn raised_at(&self) -> DateTime<Utc> {
        self.raised_at
    }
}
