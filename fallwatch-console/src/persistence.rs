//! Persistence Queue: serializes patient-state mutations to one writer.
//!
//! Producers hold a [`PersistenceQueue`] and enqueue [`UpdateIntent`]s
//! without blocking. A single [`PersistenceWriter`] owns the datastore write
//! path and applies intents strictly in enqueue order. When the bounded
//! queue is full the newest intent is dropped and counted.

use fallwatch_lib::models::UpdateIntent;
use fallwatch_lib::shutdown::ShutdownSignal;
use fallwatch_lib::storage::DatabaseManager;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Enqueue failures. The intent is lost in both cases.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PersistenceError {
    #[error("persistence queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("persistence writer has stopped")]
    Closed,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    applied: AtomicU64,
    failed: AtomicU64,
}

/// Queue statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistenceStats {
    /// Intents accepted by the queue
    pub enqueued: u64,
    /// Intents rejected because the queue was full or closed
    pub dropped: u64,
    /// Intents written to the datastore
    pub applied: u64,
    /// Intents the datastore rejected
    pub failed: u64,
}

impl Counters {
    fn snapshot(&self) -> PersistenceStats {
        PersistenceStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Create a queue with the given bound and its single writer.
pub fn persistence_queue(
    db: Arc<DatabaseManager>,
    capacity: usize,
) -> (PersistenceQueue, PersistenceWriter) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let counters = Arc::new(Counters::default());
    (
        PersistenceQueue {
            tx,
            capacity: capacity.max(1),
            counters: Arc::clone(&counters),
        },
        PersistenceWriter { db, rx, counters },
    )
}

/// Producer handle. Clone freely.
#[derive(Debug, Clone)]
pub struct PersistenceQueue {
    tx: mpsc::Sender<UpdateIntent>,
    capacity: usize,
    counters: Arc<Counters>,
}

impl PersistenceQueue {
    /// Enqueue an intent without waiting.
    pub fn enqueue(&self, intent: UpdateIntent) -> Result<(), PersistenceError> {
        match self.tx.try_send(intent) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(intent)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    patient_id = %intent.patient_id,
                    field = %intent.field,
                    capacity = self.capacity,
                    "Persistence queue full, dropping intent"
                );
                Err(PersistenceError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(intent)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    patient_id = %intent.patient_id,
                    field = %intent.field,
                    "Persistence writer stopped, dropping intent"
                );
                Err(PersistenceError::Closed)
            }
        }
    }

    /// Intents currently waiting for the writer.
    pub fn depth(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn stats(&self) -> PersistenceStats {
        self.counters.snapshot()
    }
}

/// The only writer of telemetry-derived patient fields.
pub struct PersistenceWriter {
    db: Arc<DatabaseManager>,
    rx: mpsc::Receiver<UpdateIntent>,
    counters: Arc<Counters>,
}

impl PersistenceWriter {
    /// Apply intents until shutdown, then drain what is already queued.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> PersistenceStats {
        info!("Persistence writer started");
        loop {
            tokio::select! {
                biased;
                () = shutdown.wait() => break,
                intent = self.rx.recv() => match intent {
                    Some(intent) => self.apply(intent).await,
                    None => break,
                }
            }
        }

        self.rx.close();
        let mut drained = 0u64;
        while let Some(intent) = self.rx.recv().await {
            self.apply(intent).await;
            drained += 1;
        }

        let stats = self.counters.snapshot();
        info!(
            drained,
            applied = stats.applied,
            failed = stats.failed,
            dropped = stats.dropped,
            "Persistence writer stopped"
        );
        stats
    }

    /// Apply one intent. Failures are logged and counted, never propagated.
    async fn apply(&self, intent: UpdateIntent) {
        let db = Arc::clone(&self.db);
        let UpdateIntent {
            patient_id,
            field,
            value,
        } = intent;
        let id = patient_id.clone();

        let outcome =
            tokio::task::spawn_blocking(move || db.apply_field_update(&id, field, &value)).await;

        match outcome {
            Ok(Ok(())) => {
                self.counters.applied.fetch_add(1, Ordering::Relaxed);
                debug!(patient_id = %patient_id, field = %field, "Applied field update");
            }
            Ok(Err(e)) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(patient_id = %patient_id, field = %field, error = %e, "Skipping failed field update");
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(patient_id = %patient_id, field = %field, error = %e, "Field update task failed");
            }
        }
    }
}
