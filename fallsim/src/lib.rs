//! FallWatch device simulator.
//!
//! Simulates wearables that publish acceleration, heart-rate and location
//! telemetry, with operator controls to enable devices, set their position
//! and inject falls.

#![forbid(unsafe_code)]

pub mod control;
pub mod device;
pub mod simulator;

pub use control::{ControlCommand, ControlError, DeviceAction};
pub use device::{
    Device, DeviceControls, DeviceStatus, DeviceTiming, FALL_OVERRIDE_SAMPLE, SampleSource,
};
pub use simulator::Simulator;
