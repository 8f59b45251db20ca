//! Synchronization Loop: reconciles the alert buffer against the datastore
//! and publishes the console view.
//!
//! The loop is the sole owner of the [`AlertBuffer`]. Operator commands and
//! fall events reach it over channels; the resulting [`ConsoleView`] leaves
//! through a watch channel.

use crate::alerts::{AlertBuffer, AlertReceiver};
use crate::operator::{OperatorCommand, OperatorError};
use crate::view::{AlertDetail, AlertRow, ConsoleView};
use fallwatch_lib::models::{AlertId, PatientId, PatientRecord};
use fallwatch_lib::shutdown::ShutdownSignal;
use fallwatch_lib::storage::DatabaseManager;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// What happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub commands: usize,
    pub raised: Option<AlertId>,
    pub alerts: usize,
}

pub struct SyncLoop {
    db: Arc<DatabaseManager>,
    alerts: AlertReceiver,
    commands: mpsc::UnboundedReceiver<OperatorCommand>,
    buffer: AlertBuffer,
    selected: Option<AlertId>,
    notice: Option<String>,
    view: watch::Sender<ConsoleView>,
}

impl SyncLoop {
    pub fn new(
        db: Arc<DatabaseManager>,
        alerts: AlertReceiver,
        commands: mpsc::UnboundedReceiver<OperatorCommand>,
    ) -> (Self, watch::Receiver<ConsoleView>) {
        let (view, view_rx) = watch::channel(ConsoleView::default());
        (
            Self {
                db,
                alerts,
                commands,
                buffer: AlertBuffer::new(),
                selected: None,
                notice: None,
                view,
            },
            view_rx,
        )
    }

    pub fn buffer(&self) -> &AlertBuffer {
        &self.buffer
    }

    pub fn selected(&self) -> Option<AlertId> {
        self.selected
    }

    /// Tick on `interval` until shutdown.
    pub async fn run(mut self, interval: Duration, mut shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = interval.as_millis(), "Synchronization loop started");

        loop {
            tokio::select! {
                biased;
                () = shutdown.wait() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        info!(
            open_alerts = self.buffer.len(),
            undrained = self.alerts.pending(),
            "Synchronization loop stopped"
        );
    }

    /// One reconciliation pass.
    ///
    /// Pending operator commands are applied first, then: refresh the
    /// selected alert's detail, drain at most one fall event, rebuild the
    /// list projection, and re-read every alert's patient. Datastore reads
    /// run on the blocking pool.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        while let Ok(command) = self.commands.try_recv() {
            report.commands += 1;
            if let Err(e) = self.apply(command) {
                self.notice = Some(e.to_string());
            }
        }

        let detail = self.selected_detail();

        if let Some(pending) = self.alerts.try_next() {
            let patient = read_patients(Arc::clone(&self.db), [pending.patient_id.clone()])
                .await
                .and_then(|mut records| records.remove(&pending.patient_id))
                .flatten();
            if patient.is_none() {
                warn!(patient_id = %pending.patient_id, "Fall reported for unknown patient");
            }
            let id = self
                .buffer
                .push(pending.patient_id.clone(), pending.detected_at, patient);
            info!(alert_id = %id, patient_id = %pending.patient_id, "Fall alert raised");
            report.raised = Some(id);
        }

        let alerts = self.buffer.iter().map(AlertRow::from_entry).collect();

        let ids: HashSet<PatientId> = self
            .buffer
            .iter()
            .map(|entry| entry.event.patient_id().clone())
            .collect();
        if let Some(records) = read_patients(Arc::clone(&self.db), ids).await {
            self.buffer
                .refresh_patients(|id| records.get(id).cloned().flatten());
        }

        report.alerts = self.buffer.len();
        self.publish(ConsoleView {
            alerts,
            selected: detail,
            notice: self.notice.clone(),
        });
        report
    }

    fn selected_detail(&mut self) -> Option<AlertDetail> {
        let id = self.selected?;
        match self.buffer.get(id) {
            Some(entry) => Some(AlertDetail::from_entry(entry)),
            None => {
                debug!(alert_id = %id, "Selected alert is gone, clearing detail view");
                self.selected = None;
                None
            }
        }
    }

    fn apply(&mut self, command: OperatorCommand) -> Result<(), OperatorError> {
        self.notice = None;
        match command {
            OperatorCommand::Select(id) => {
                if self.buffer.get(id).is_none() {
                    self.selected = None;
                    return Err(OperatorError::UnknownAlert(id));
                }
                self.selected = Some(id);
            }
            OperatorCommand::Deselect => self.selected = None,
            OperatorCommand::Dismiss(target) => {
                let id = target.or(self.selected).ok_or(OperatorError::NoSelection)?;
                let entry = self
                    .buffer
                    .remove(id)
                    .ok_or(OperatorError::UnknownAlert(id))?;
                if self.selected == Some(id) {
                    self.selected = None;
                }
                info!(alert_id = %id, patient_id = %entry.event.patient_id(), "Alert dismissed");
            }
            OperatorCommand::Clear => {
                let removed = self.buffer.clear();
                self.selected = None;
                info!(removed, "All alerts dismissed");
            }
            OperatorCommand::List | OperatorCommand::Quit => {}
        }
        Ok(())
    }

    fn publish(&self, view: ConsoleView) {
        self.view.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}

/// Read each distinct patient once, on the blocking pool. `None` when the
/// read task itself failed, in which case callers keep current snapshots.
async fn read_patients(
    db: Arc<DatabaseManager>,
    ids: impl IntoIterator<Item = PatientId> + Send + 'static,
) -> Option<HashMap<PatientId, Option<PatientRecord>>> {
    let read = tokio::task::spawn_blocking(move || {
        ids.into_iter()
            .map(|id| {
                let record = fetch_patient(&db, &id);
                (id, record)
            })
            .collect::<HashMap<_, _>>()
    });
    match read.await {
        Ok(records) => Some(records),
        Err(e) => {
            warn!(error = %e, "Patient read task failed");
            None
        }
    }
}

fn fetch_patient(db: &DatabaseManager, id: &PatientId) -> Option<PatientRecord> {
    match db.get_patient_by_id(id) {
        Ok(record) => record,
        Err(e) => {
            warn!(patient_id = %id, error = %e, "Failed to read patient");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::alerts::{AlertSender, alert_channel};
    use chrono::Utc;
    use fallwatch_lib::models::{NewPatient, PatientField};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        db: Arc<DatabaseManager>,
        alerts: AlertSender,
        commands: mpsc::UnboundedSender<OperatorCommand>,
        sync: SyncLoop,
        view: watch::Receiver<ConsoleView>,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().expect("temp dir");
        let db = Arc::new(DatabaseManager::new(dir.path().join("p.redb")).expect("database"));
        for (first, last) in [("Ada", "Lovelace"), ("Alan", "Turing"), ("Grace", "Hopper")] {
            db.insert_patient(&NewPatient {
                firstname: first.to_owned(),
                lastname: last.to_owned(),
                address: "1 High Street".to_owned(),
                postcode: "AB1 2CD".to_owned(),
            })
            .expect("insert");
        }
        let (alerts, alerts_rx) = alert_channel();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (sync, view) = SyncLoop::new(Arc::clone(&db), alerts_rx, commands_rx);
        Harness {
            _dir: dir,
            db,
            alerts,
            commands,
            sync,
            view,
        }
    }

    #[tokio::test]
    async fn test_one_alert_per_tick() {
        let mut h = harness();
        h.alerts.raise(PatientId::new("3"), Utc::now());
        h.alerts.raise(PatientId::new("1"), Utc::now());

        let first = h.sync.tick().await;
        assert!(first.raised.is_some());
        assert_eq!(first.alerts, 1);

        let second = h.sync.tick().await;
        assert!(second.raised.is_some());
        assert_eq!(second.alerts, 2);

        assert_eq!(h.sync.tick().await.raised, None);

        let labels: Vec<String> = h.view.borrow().alerts.iter().map(|r| r.label.clone()).collect();
        assert_eq!(labels.len(), 2);
        assert!(labels[0].ends_with("Grace Hopper"));
        assert!(labels[1].ends_with("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_repeated_falls_are_not_deduplicated() {
        let mut h = harness();
        for _ in 0..3 {
            h.alerts.raise(PatientId::new("2"), Utc::now());
        }
        for _ in 0..3 {
            h.sync.tick().await;
        }
        assert_eq!(h.sync.buffer().len(), 3);
    }

    #[tokio::test]
    async fn test_dismiss_removes_exactly_one_without_reordering() {
        let mut h = harness();
        for id in ["1", "2", "3"] {
            h.alerts.raise(PatientId::new(id), Utc::now());
            h.sync.tick().await;
        }
        let middle = h.sync.buffer().iter().nth(1).map(|e| e.event.id()).expect("middle");

        h.commands
            .send(OperatorCommand::Dismiss(Some(middle)))
            .expect("send");
        h.sync.tick().await;

        let patients: Vec<String> = h
            .sync
            .buffer()
            .iter()
            .map(|e| e.event.patient_id().to_string())
            .collect();
        assert_eq!(patients, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn test_selection_follows_identity_not_index() {
        let mut h = harness();
        for id in ["1", "2"] {
            h.alerts.raise(PatientId::new(id), Utc::now());
            h.sync.tick().await;
        }
        let ids: Vec<AlertId> = h.sync.buffer().iter().map(|e| e.event.id()).collect();

        h.commands.send(OperatorCommand::Select(ids[1])).expect("send");
        h.sync.tick().await;
        assert_eq!(
            h.view.borrow().selected.as_ref().map(|d| d.name.clone()),
            Some("Alan Turing".to_owned())
        );

        // Removing an earlier alert shifts positions but not the selection.
        h.commands
            .send(OperatorCommand::Dismiss(Some(ids[0])))
            .expect("send");
        h.sync.tick().await;
        assert_eq!(h.sync.selected(), Some(ids[1]));
        assert_eq!(
            h.view.borrow().selected.as_ref().map(|d| d.alert_id),
            Some(ids[1])
        );
    }

    #[tokio::test]
    async fn test_dismissing_selected_clears_detail() {
        let mut h = harness();
        h.alerts.raise(PatientId::new("1"), Utc::now());
        h.sync.tick().await;
        let id = h.sync.buffer().iter().next().map(|e| e.event.id()).expect("alert");

        h.commands.send(OperatorCommand::Select(id)).expect("send");
        h.commands.send(OperatorCommand::Dismiss(None)).expect("send");
        h.sync.tick().await;

        assert!(h.sync.buffer().is_empty());
        assert_eq!(h.sync.selected(), None);
        assert!(h.view.borrow().selected.is_none());
    }

    #[tokio::test]
    async fn test_dismiss_without_selection_reports_notice() {
        let mut h = harness();
        h.commands.send(OperatorCommand::Dismiss(None)).expect("send");
        h.sync.tick().await;
        assert_eq!(h.view.borrow().notice.as_deref(), Some("No alert selected"));

        h.commands
            .send(OperatorCommand::Select(AlertId::new(42)))
            .expect("send");
        h.sync.tick().await;
        assert_eq!(
            h.view.borrow().notice.as_deref(),
            Some("Alert #42 does not exist")
        );
    }

    #[tokio::test]
    async fn test_clear_dismisses_everything() {
        let mut h = harness();
        for id in ["1", "2"] {
            h.alerts.raise(PatientId::new(id), Utc::now());
            h.sync.tick().await;
        }
        h.commands.send(OperatorCommand::Clear).expect("send");
        h.sync.tick().await;
        assert!(h.sync.buffer().is_empty());
        assert!(h.view.borrow().alerts.is_empty());
    }

    #[tokio::test]
    async fn test_patient_snapshots_stay_current() {
        let mut h = harness();
        h.alerts.raise(PatientId::new("2"), Utc::now());
        h.sync.tick().await;
        let id = h.sync.buffer().iter().next().map(|e| e.event.id()).expect("alert");
        h.commands.send(OperatorCommand::Select(id)).expect("send");
        h.sync.tick().await;
        assert_eq!(
            h.view.borrow().selected.as_ref().map(|d| d.heartrate.clone()),
            Some("- BPM".to_owned())
        );

        h.db
            .apply_field_update(&PatientId::new("2"), PatientField::Heartrate, "88")
            .expect("update");
        // The first tick re-reads the patient, the second shows it.
        h.sync.tick().await;
        h.sync.tick().await;
        assert_eq!(
            h.view.borrow().selected.as_ref().map(|d| d.heartrate.clone()),
            Some("88 BPM".to_owned())
        );
    }

    #[tokio::test]
    async fn test_unknown_patient_still_alerts() {
        let mut h = harness();
        h.alerts.raise(PatientId::new("9"), Utc::now());
        h.sync.tick().await;
        let view = h.view.borrow();
        assert_eq!(view.alerts.len(), 1);
        assert!(view.alerts[0].label.ends_with("Unknown patient 9"));
    }

    #[tokio::test]
    async fn test_large_alert_list_refreshes_every_snapshot() {
        let mut h = harness();
        for n in 0..200 {
            h.alerts.raise(PatientId::new(["1", "2", "3", "7"][n % 4]), Utc::now());
        }
        for _ in 0..200 {
            h.sync.tick().await;
        }
        assert_eq!(h.sync.buffer().len(), 200);

        h.db
            .apply_field_update(&PatientId::new("3"), PatientField::Heartrate, "91")
            .expect("update");
        h.sync.tick().await;

        for entry in h.sync.buffer().iter() {
            match entry.event.patient_id().as_str() {
                "3" => assert_eq!(
                    entry.patient.as_ref().and_then(|p| p.state.heartrate),
                    Some(91)
                ),
                "7" => assert!(entry.patient.is_none()),
                _ => assert!(entry.patient.is_some()),
            }
        }
    }
}
