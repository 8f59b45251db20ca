//! Process-wide shutdown signalling.
//!
//! A single [`ShutdownTrigger`] fans out to any number of [`ShutdownSignal`]
//! clones. Every long-running worker selects on [`ShutdownSignal::wait`] at
//! each of its suspension points, so one trigger stops the whole pipeline.

use tokio::sync::watch;

/// Create a connected trigger/signal pair.
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

/// Initiates shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Signal every worker to stop. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// A new signal observing this trigger.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observes shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested. Also resolves if the
    /// trigger has been dropped, since nobody can stop the worker anymore.
    pub async fn wait(&mut self) {
        // wait_for only errors when the sender is gone
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}
