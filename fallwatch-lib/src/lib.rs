#![forbid(unsafe_code)]

//! fallwatch-lib: Shared library for `FallWatch` common functionality.
//!
//! This library provides core functionality shared across all `FallWatch` components:
//! - Configuration management with hierarchical overrides
//! - Core data models for patients, telemetry samples and fall alerts
//! - Fall classification over acceleration samples
//! - Patient datastore backed by redb
//! - Logging bootstrap, process-wide shutdown signalling and operator input

pub mod config;
pub mod detection;
pub mod input;
pub mod logging;
pub mod models;
pub mod shutdown;
pub mod storage;

pub use detection::{FALL_THRESHOLD, FallDetector};
