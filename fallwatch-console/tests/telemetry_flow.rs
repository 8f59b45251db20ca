//! Simulated devices through the loopback broker into a running console.

#![allow(clippy::expect_used)]

use fallsim::Simulator;
use fallwatch_bus::{BusClient, LoopbackBroker, TopicCodec};
use fallwatch_console::{Console, ConsoleView, OperatorCommand};
use fallwatch_lib::config::{ConsoleConfig, SimulatorConfig};
use fallwatch_lib::models::{EmergencyContact, NewPatient};
use fallwatch_lib::shutdown;
use fallwatch_lib::storage::DatabaseManager;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

const PREFIX: &str = "BS2203FD";
const DEADLINE: Duration = Duration::from_secs(10);

fn seed(dir: &TempDir) -> Arc<DatabaseManager> {
    let db = DatabaseManager::new(dir.path().join("clients.redb")).expect("database");
    for (first, last) in [("Daisy", "Riley"), ("Eve", "Watkins"), ("Cara", "Jones")] {
        db.insert_patient(&NewPatient {
            firstname: first.to_owned(),
            lastname: last.to_owned(),
            address: "6 Jedburgh Road".to_owned(),
            postcode: "EH46 7AD".to_owned(),
        })
        .expect("insert");
    }
    db.add_allergy(3, "Penicillin").expect("allergy");
    db.add_emergency_contact(
        3,
        &EmergencyContact {
            firstname: "Tom".to_owned(),
            lastname: "Jones".to_owned(),
            relationship: "Son".to_owned(),
            phonenumber: "07700 900456".to_owned(),
        },
    )
    .expect("contact");
    Arc::new(db)
}

async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + DEADLINE;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}

fn has_alert_for(view: &watch::Receiver<ConsoleView>, name: &str) -> bool {
    view.borrow().alerts.iter().any(|row| row.label.ends_with(name))
}

#[tokio::test]
async fn test_device_telemetry_reaches_store_and_alerts() {
    let dir = TempDir::new().expect("temp dir");
    let db = seed(&dir);
    let broker = LoopbackBroker::new();
    let codec = TopicCodec::new(PREFIX);
    let (trigger, signal) = shutdown::channel();

    let (transport, inbound) = broker.connect().await;
    let client = BusClient::new(Arc::new(transport), codec.clone());
    let console_config = ConsoleConfig {
        sync_interval_ms: 20,
        persistence_queue_capacity: 256,
        patient_refresh_interval_ms: 100,
        full_id_decode: false,
    };
    let console = Console::start(client, inbound, Arc::clone(&db), &console_config, &signal);

    // One subscription per (patient, measurement).
    let stats_broker = broker.clone();
    let mut subscribed = false;
    for _ in 0..400 {
        if stats_broker.statistics().await.active_filters == 12 {
            subscribed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(subscribed, "console never subscribed to every patient");

    let (transport, _) = broker.connect().await;
    let sim = BusClient::new(Arc::new(transport), codec);
    let simulator = Simulator::start(
        &sim.publisher(),
        &SimulatorConfig {
            devices: 3,
            acceleration_interval_ms: 50,
            heartrate_interval_ms: 50,
            location_interval_ms: 50,
            disabled_poll_interval_ms: 10,
            heartrate_min: 50,
            heartrate_max: 80,
        },
        &signal,
    );

    let device = simulator.device(2).expect("device 2");
    device.set_latitude(Some("51.5".to_owned()));
    device.set_longitude(Some("-0.12".to_owned()));
    device.enable();

    let device = simulator.device(3).expect("device 3");
    device.trigger_fall();
    device.enable();

    let stored = eventually(|| {
        db.get_patient(2)
            .expect("read")
            .is_some_and(|record| {
                record.state.coordinates() == Some(("51.5", "-0.12"))
                    && record.state.heartrate.is_some()
            })
    })
    .await;
    assert!(stored, "device 2 telemetry never persisted");

    let view = console.view();
    assert!(
        eventually(|| has_alert_for(&view, "Cara Jones")).await,
        "fall on device 3 never raised an alert"
    );

    let alert_id = view.borrow().alerts[0].id;
    assert!(console.send(OperatorCommand::Select(alert_id)));
    assert!(
        eventually(|| view
            .borrow()
            .selected
            .as_ref()
            .is_some_and(|detail| detail.name == "Cara Jones"
                && detail.allergies == vec!["Penicillin".to_owned()]))
        .await
    );

    assert!(console.send(OperatorCommand::Dismiss(None)));
    assert!(eventually(|| view.borrow().alerts.is_empty()).await);

    trigger.trigger();
    simulator.join().await;
    let summary = console.join().await;
    sim.disconnect().await.expect("disconnect");

    assert_eq!(summary.ingest.falls, 1);
    assert!(summary.persistence.applied > 0);
    assert_eq!(summary.persistence.dropped, 0);
}
