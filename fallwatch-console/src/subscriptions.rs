//! Keeps the bus subscription set in step with the patients in the datastore.

use fallwatch_bus::BusClient;
use fallwatch_lib::models::PatientId;
use fallwatch_lib::shutdown::ShutdownSignal;
use fallwatch_lib::storage::{DatabaseManager, StorageError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Every patient id currently in the datastore.
pub fn known_patients(db: &DatabaseManager) -> Result<Vec<PatientId>, StorageError> {
    Ok(db
        .get_patient_ids()?
        .into_iter()
        .map(PatientId::from)
        .collect())
}

/// Re-read the patient set every `interval` and re-issue subscriptions when
/// it changes. The first refresh happens immediately. Returns the client on
/// shutdown so the caller can disconnect it.
pub async fn run_subscription_refresh(
    mut client: BusClient,
    db: Arc<DatabaseManager>,
    interval: Duration,
    mut shutdown: ShutdownSignal,
) -> BusClient {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = shutdown.wait() => break,
            _ = ticker.tick() => {
                let patients = match known_patients(&db) {
                    Ok(patients) => patients,
                    Err(e) => {
                        warn!(error = %e, "Failed to read patient set, keeping current subscriptions");
                        continue;
                    }
                };
                if let Err(e) = client.sync_subscriptions(&patients).await {
                    warn!(error = %e, "Failed to update subscriptions, will retry");
                }
            }
        }
    }

    info!("Subscription refresh stopped");
    client
}
