//! A fleet of simulated devices sharing one bus session.

use crate::control::{ControlError, DeviceAction};
use crate::device::{Device, DeviceControls, DeviceStatus, DeviceTiming};
use fallwatch_bus::{Publisher, TopicCodec};
use fallwatch_lib::config::SimulatorConfig;
use fallwatch_lib::models::PatientId;
use fallwatch_lib::shutdown::ShutdownSignal;
use tokio::task::JoinSet;
use tracing::{info, warn};

pub struct Simulator {
    devices: Vec<DeviceControls>,
    tasks: JoinSet<()>,
}

impl Simulator {
    /// Start `config.devices` devices numbered from 1. Device `n` publishes
    /// for patient `n` until told otherwise.
    pub fn start(publisher: &Publisher, config: &SimulatorConfig, shutdown: &ShutdownSignal) -> Self {
        let timing = DeviceTiming::from(config);
        let mut tasks = JoinSet::new();
        let devices = (1..=config.devices)
            .map(|number| {
                Device::spawn(
                    number,
                    PatientId::from(u64::from(number)),
                    publisher.clone(),
                    timing,
                    shutdown,
                    &mut tasks,
                )
            })
            .collect::<Vec<_>>();

        info!(devices = devices.len(), "Simulator started");
        Self { devices, tasks }
    }

    /// Controls for device `number` (1-based).
    pub fn device(&self, number: u32) -> Option<&DeviceControls> {
        self.devices.iter().find(|device| device.number() == number)
    }

    pub fn devices(&self) -> &[DeviceControls] {
        &self.devices
    }

    /// Apply an operator action to device `number`.
    pub fn apply(&self, number: u32, action: DeviceAction) -> Result<(), ControlError> {
        let device = self
            .device(number)
            .ok_or(ControlError::UnknownDevice(number))?;
        match action {
            DeviceAction::Enable => device.enable(),
            DeviceAction::Disable => device.disable(),
            DeviceAction::Toggle => {
                device.toggle();
            }
            DeviceAction::Fall => device.trigger_fall(),
            DeviceAction::Latitude(value) => device.set_latitude(value),
            DeviceAction::Longitude(value) => device.set_longitude(value),
            DeviceAction::Patient(id) => {
                if !TopicCodec::is_valid_id(&id) {
                    return Err(ControlError::InvalidPatientId(id.to_string()));
                }
                device.set_patient_id(id);
            }
        }
        Ok(())
    }

    pub fn status(&self) -> Vec<DeviceStatus> {
        self.devices.iter().map(DeviceControls::status).collect()
    }

    /// Wait for every device loop to stop. Trigger shutdown first.
    pub async fn join(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Device loop failed");
            }
        }
        info!("Simulator stopped");
    }
}
