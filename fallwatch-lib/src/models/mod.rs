//! Core data models for FallWatch telemetry and alerting.
//!
//! This module provides the data structures shared by the operator console,
//! the device simulator and the administration CLI: patient identity and
//! records, measurement kinds and samples, and fall alert events.

pub mod alert;
pub mod patient;
pub mod sample;

// Re-export the main types for convenience
pub use alert::{AlertEvent, AlertId};
pub use patient::{
    EmergencyContact, NewPatient, PatientField, PatientId, PatientRecord, PatientState,
    UpdateIntent,
};
pub use sample::{Measurement, Sample, SampleError};
