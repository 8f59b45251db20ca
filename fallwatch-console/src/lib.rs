//! FallWatch operator console.
//!
//! Ingests telemetry from the bus, classifies falls, persists the latest
//! patient state through a single writer and keeps an alert list for the
//! operator.
//!
//! ```text
//! bus ─▶ IngestRouter ─┬─▶ FallDetector ─▶ alert channel ─▶ SyncLoop ─▶ ConsoleView
//!                      └─▶ PersistenceQueue ─▶ PersistenceWriter ─▶ redb
//! ```

#![forbid(unsafe_code)]

pub mod alerts;
pub mod console;
pub mod ingest;
pub mod operator;
pub mod persistence;
pub mod subscriptions;
pub mod sync;
pub mod view;

pub use alerts::{AlertBuffer, AlertEntry, AlertReceiver, AlertSender, PendingAlert, alert_channel};
pub use console::{Console, ConsoleSummary, console_codec};
pub use ingest::{IngestRouter, IngestStats};
pub use operator::{OperatorCommand, OperatorError};
pub use persistence::{
    PersistenceError, PersistenceQueue, PersistenceStats, PersistenceWriter, persistence_queue,
};
pub use subscriptions::{known_patients, run_subscription_refresh};
pub use sync::{SyncLoop, TickReport};
pub use view::{AlertDetail, AlertRow, ConsoleView, LocationView};
