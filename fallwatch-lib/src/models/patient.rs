//! Patient identity, records and incremental state updates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque patient identifier as carried on the bus.
///
/// Identifiers travel as text inside topic strings. The datastore keys
/// patients numerically, so [`PatientId::as_key`] is the only place the two
/// representations meet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatientId(String);

impl PatientId {
    /// Create a patient identifier from its textual form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the textual form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric datastore key, if the identifier is numeric.
    pub fn as_key(&self) -> Option<u64> {
        self.0.trim().parse().ok()
    }
}

impl From<u64> for PatientId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for PatientId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Latest known telemetry-derived view of a patient. No history is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientState {
    /// Last reported heart rate in beats per minute
    pub heartrate: Option<u32>,
    /// Last reported latitude, decimal degrees as published
    pub latitude: Option<String>,
    /// Last reported longitude, decimal degrees as published
    pub longitude: Option<String>,
}

impl PatientState {
    /// Both coordinates, when the device has reported a full position.
    pub fn coordinates(&self) -> Option<(&str, &str)> {
        match (self.latitude.as_deref(), self.longitude.as_deref()) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Emergency contact attached to a patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub firstname: String,
    pub lastname: String,
    pub relationship: String,
    pub phonenumber: String,
}

impl fmt::Display for EmergencyContact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] - {} {} - {}",
            self.relationship, self.firstname, self.lastname, self.phonenumber
        )
    }
}

/// Full patient record as joined from the datastore tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: u64,
    pub firstname: String,
    pub lastname: String,
    pub address: String,
    pub postcode: String,
    pub allergies: Vec<String>,
    pub emergency_contacts: Vec<EmergencyContact>,
    /// Mutable telemetry-derived fields
    #[serde(flatten)]
    pub state: PatientState,
}

impl PatientRecord {
    /// Display name, "Firstname Lastname".
    pub fn full_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
    }

    /// Bus identifier for this record.
    pub fn patient_id(&self) -> PatientId {
        PatientId::from(self.id)
    }
}

/// Fields required to register a new patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPatient {
    pub firstname: String,
    pub lastname: String,
    pub address: String,
    pub postcode: String,
}

/// Patient fields that telemetry may mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatientField {
    Heartrate,
    Latitude,
    Longitude,
}

impl PatientField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heartrate => "heartrate",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
        }
    }
}

impl fmt::Display for PatientField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pending state mutation destined for the datastore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateIntent {
    pub patient_id: PatientId,
    pub field: PatientField,
    pub value: String,
}

impl UpdateIntent {
    pub fn new(patient_id: PatientId, field: PatientField, value: impl Into<String>) -> Self {
        Self {
            patient_id,
            field,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_id_key() {
        assert_eq!(PatientId::new("12").as_key(), Some(12));
        assert_eq!(PatientId::new(" 3 ").as_key(), Some(3));
        assert_eq!(PatientId::new("abc").as_key(), None);
        assert_eq!(PatientId::new("").as_key(), None);
    }

    #[test]
    fn test_emergency_contact_display() {
        let contact = EmergencyContact {
            firstname: "Ada".to_owned(),
            lastname: "Riley".to_owned(),
            relationship: "Daughter".to_owned(),
            phonenumber: "07700 900123".to_owned(),
        };
        assert_eq!(contact.to_string(), "[Daughter] - Ada Riley - 07700 900123");
    }

    #[test]
    fn test_coordinates_require_both_axes() {
        let mut state = PatientState {
            latitude: Some("51.5".to_owned()),
            ..PatientState::default()
        };
        assert!(state.coordinates().is_none());

        state.longitude = Some("-0.12".to_owned());
        assert_eq!(state.coordinates(), Some(("51.5", "-0.12")));
    }
}
