//! Simulated wearable devices.
//!
//! Each device runs three independent loops (acceleration, heart rate and
//! location) gated by a shared enabled flag. Operator controls reach the
//! loops through [`DeviceControls`]; loops only read shared state at their
//! suspension points.

use fallwatch_bus::Publisher;
use fallwatch_lib::config::SimulatorConfig;
use fallwatch_lib::models::{PatientId, Sample};
use fallwatch_lib::shutdown::ShutdownSignal;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Sample published once in place of synthetic data after a manual fall.
pub const FALL_OVERRIDE_SAMPLE: [f64; 3] = [10.0, 10.0, 10.0];

/// Loop periods and value ranges for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTiming {
    pub acceleration: Duration,
    pub heartrate: Duration,
    pub location: Duration,
    pub disabled_poll: Duration,
    pub heartrate_min: u32,
    pub heartrate_max: u32,
}

impl From<&SimulatorConfig> for DeviceTiming {
    fn from(config: &SimulatorConfig) -> Self {
        Self {
            acceleration: config.acceleration_interval(),
            heartrate: config.heartrate_interval(),
            location: config.location_interval(),
            disabled_poll: config.disabled_poll_interval(),
            heartrate_min: config.heartrate_min,
            heartrate_max: config.heartrate_max,
        }
    }
}

/// Synthetic telemetry generator.
#[derive(Debug)]
pub struct SampleSource {
    rng: StdRng,
    heartrate_min: u32,
    heartrate_max: u32,
}

impl SampleSource {
    pub fn new(rng: StdRng, heartrate_min: u32, heartrate_max: u32) -> Self {
        Self {
            rng,
            heartrate_min: heartrate_min.min(heartrate_max),
            heartrate_max,
        }
    }

    /// Three axes, each an integer in [0, 3] plus a fraction in [0, 1).
    /// The magnitude stays below 7, well clear of the fall threshold.
    pub fn acceleration(&mut self) -> [f64; 3] {
        std::array::from_fn(|_| {
            f64::from(self.rng.random_range(0..=3_u8)) + self.rng.random::<f64>()
        })
    }

    /// Uniform in the configured inclusive range.
    pub fn heartrate(&mut self) -> u32 {
        self.rng.random_range(self.heartrate_min..=self.heartrate_max)
    }
}

/// State shared between a device's loops and its controls.
#[derive(Debug)]
struct DeviceState {
    number: u32,
    patient_id: watch::Sender<PatientId>,
    enabled: watch::Sender<bool>,
    fall_pending: AtomicBool,
    latitude: watch::Sender<Option<String>>,
    longitude: watch::Sender<Option<String>>,
    last_heartrate: watch::Sender<Option<u32>>,
    last_acceleration: watch::Sender<Option<[f64; 3]>>,
}

/// Point-in-time view of a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub device: u32,
    pub patient_id: PatientId,
    pub enabled: bool,
    pub fall_pending: bool,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub heartrate_display: String,
    pub last_acceleration: Option<[f64; 3]>,
}

/// Operator handle for one device. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DeviceControls {
    state: Arc<DeviceState>,
}

impl DeviceControls {
    pub fn number(&self) -> u32 {
        self.state.number
    }

    pub fn patient_id(&self) -> PatientId {
        self.state.patient_id.borrow().clone()
    }

    /// Publish as a different patient from the next sample on.
    pub fn set_patient_id(&self, patient_id: PatientId) {
        info!(device = self.state.number, patient_id = %patient_id, "Device patient changed");
        self.state.patient_id.send_replace(patient_id);
    }

    pub fn is_enabled(&self) -> bool {
        *self.state.enabled.borrow()
    }

    pub fn enable(&self) {
        self.set_enabled(true);
    }

    pub fn disable(&self) {
        self.set_enabled(false);
    }

    /// Flip the enabled flag and return the new value.
    pub fn toggle(&self) -> bool {
        let enabled = !self.is_enabled();
        self.set_enabled(enabled);
        enabled
    }

    fn set_enabled(&self, enabled: bool) {
        if self.state.enabled.send_replace(enabled) != enabled {
            info!(device = self.state.number, enabled, "Device toggled");
        }
    }

    /// Arm the manual fall override. The next acceleration publish while
    /// enabled carries [`FALL_OVERRIDE_SAMPLE`]; arming twice before it is
    /// consumed still yields a single override.
    pub fn trigger_fall(&self) {
        self.state.fall_pending.store(true, Ordering::SeqCst);
        info!(device = self.state.number, "Manual fall armed");
    }

    pub fn fall_pending(&self) -> bool {
        self.state.fall_pending.load(Ordering::SeqCst)
    }

    /// Set or clear the latitude the location loop reports.
    pub fn set_latitude(&self, latitude: Option<String>) {
        self.state.latitude.send_replace(normalize_coordinate(latitude));
    }

    /// Set or clear the longitude the location loop reports.
    pub fn set_longitude(&self, longitude: Option<String>) {
        self.state.longitude.send_replace(normalize_coordinate(longitude));
    }

    /// `"Reported Heartrate: <n> BPM"`, or `- BPM` before the first report.
    pub fn heartrate_display(&self) -> String {
        match *self.state.last_heartrate.borrow() {
            Some(bpm) => format!("Reported Heartrate: {bpm} BPM"),
            None => "Reported Heartrate: - BPM".to_owned(),
        }
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            device: self.state.number,
            patient_id: self.patient_id(),
            enabled: self.is_enabled(),
            fall_pending: self.fall_pending(),
            latitude: self.state.latitude.borrow().clone(),
            longitude: self.state.longitude.borrow().clone(),
            heartrate_display: self.heartrate_display(),
            last_acceleration: *self.state.last_acceleration.borrow(),
        }
    }
}

fn normalize_coordinate(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// A simulated device and the loops driving it.
pub struct Device;

impl Device {
    /// Spawn the device's loops onto `tasks`. Devices start disabled.
    pub fn spawn(
        number: u32,
        patient_id: PatientId,
        publisher: Publisher,
        timing: DeviceTiming,
        shutdown: &ShutdownSignal,
        tasks: &mut JoinSet<()>,
    ) -> DeviceControls {
        Self::spawn_with_rng(
            number,
            patient_id,
            publisher,
            timing,
            shutdown,
            tasks,
            StdRng::from_os_rng,
        )
    }

    /// As [`Device::spawn`] with caller-provided randomness.
    pub fn spawn_with_rng(
        number: u32,
        patient_id: PatientId,
        publisher: Publisher,
        timing: DeviceTiming,
        shutdown: &ShutdownSignal,
        tasks: &mut JoinSet<()>,
        mut rng: impl FnMut() -> StdRng,
    ) -> DeviceControls {
        let state = Arc::new(DeviceState {
            number,
            patient_id: watch::Sender::new(patient_id),
            enabled: watch::Sender::new(false),
            fall_pending: AtomicBool::new(false),
            latitude: watch::Sender::new(None),
            longitude: watch::Sender::new(None),
            last_heartrate: watch::Sender::new(None),
            last_acceleration: watch::Sender::new(None),
        });

        let ctx = || LoopContext {
            state: Arc::clone(&state),
            publisher: publisher.clone(),
            timing,
            shutdown: shutdown.clone(),
        };

        tasks.spawn(acceleration_loop(
            ctx(),
            SampleSource::new(rng(), timing.heartrate_min, timing.heartrate_max),
        ));
        tasks.spawn(heartrate_loop(
            ctx(),
            SampleSource::new(rng(), timing.heartrate_min, timing.heartrate_max),
        ));
        tasks.spawn(location_loop(ctx()));

        debug!(device = number, "Device loops started");
        DeviceControls { state }
    }
}

struct LoopContext {
    state: Arc<DeviceState>,
    publisher: Publisher,
    timing: DeviceTiming,
    shutdown: ShutdownSignal,
}

impl LoopContext {
    /// Wait until the device is enabled, re-checking every poll interval.
    /// Returns false on shutdown.
    async fn wait_enabled(&mut self) -> bool {
        while !*self.state.enabled.borrow() {
            tokio::select! {
                () = self.shutdown.wait() => return false,
                () = tokio::time::sleep(self.timing.disabled_poll) => {}
            }
        }
        !self.shutdown.is_triggered()
    }

    /// Sleep for one period. Returns false on shutdown.
    async fn pause(&mut self, period: Duration) -> bool {
        tokio::select! {
            () = self.shutdown.wait() => false,
            () = tokio::time::sleep(period) => true,
        }
    }

    async fn publish(&self, sample: &Sample) {
        let patient_id = self.state.patient_id.borrow().clone();
        if let Err(e) = self.publisher.publish_sample(&patient_id, sample).await {
            warn!(
                device = self.state.number,
                measurement = %sample.measurement(),
                error = %e,
                "Publish failed"
            );
        }
    }
}

async fn acceleration_loop(mut ctx: LoopContext, mut source: SampleSource) {
    while ctx.wait_enabled().await {
        let axes = if ctx.state.fall_pending.swap(false, Ordering::SeqCst) {
            info!(device = ctx.state.number, "Publishing manual fall");
            FALL_OVERRIDE_SAMPLE
        } else {
            let axes = source.acceleration();
            ctx.state.last_acceleration.send_replace(Some(axes));
            axes
        };
        ctx.publish(&Sample::Acceleration(axes.to_vec())).await;

        let period = ctx.timing.acceleration;
        if !ctx.pause(period).await {
            break;
        }
    }
}

async fn heartrate_loop(mut ctx: LoopContext, mut source: SampleSource) {
    while ctx.wait_enabled().await {
        let bpm = source.heartrate();
        ctx.state.last_heartrate.send_replace(Some(bpm));
        ctx.publish(&Sample::Heartrate(bpm)).await;

        let period = ctx.timing.heartrate;
        if !ctx.pause(period).await {
            break;
        }
    }
}

async fn location_loop(mut ctx: LoopContext) {
    while ctx.wait_enabled().await {
        let latitude = ctx.state.latitude.borrow().clone();
        let longitude = ctx.state.longitude.borrow().clone();
        if let Some(latitude) = latitude {
            ctx.publish(&Sample::Latitude(latitude)).await;
        }
        if let Some(longitude) = longitude {
            ctx.publish(&Sample::Longitude(longitude)).await;
        }

        let period = ctx.timing.location;
        if !ctx.pause(period).await {
            break;
        }
    }
}
