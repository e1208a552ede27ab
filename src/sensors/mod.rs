pub mod akm;
pub mod base;
pub mod gyro;
pub mod light;
pub mod proximity;

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncRead;

use crate::errors::{SensorError, SensorResult};
use crate::messages::SensorEvent;
use crate::wait::WaitDescriptor;

pub use akm::AkmSensor;
pub use gyro::GyroSensor;
pub use light::LightSensor;
pub use proximity::ProximitySensor;

/// Integer identifying one logical sensor to the platform
pub type SensorHandle = i32;

// Batch flags
pub const BATCH_DRY_RUN: i32 = 0x1;
pub const BATCH_WAKE_UPON_FIFO_FULL: i32 = 0x2;

/// Logical sensors exposed by this module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    Acceleration,
    MagneticField,
    Orientation,
    Light,
    Proximity,
    Gyroscope,
    SignificantMotion,
}

impl Sensor {
    pub const ALL: [Sensor; 7] = [
        Sensor::Acceleration,
        Sensor::MagneticField,
        Sensor::Orientation,
        Sensor::Light,
        Sensor::Proximity,
        Sensor::Gyroscope,
        Sensor::SignificantMotion,
    ];

    pub fn handle(self) -> SensorHandle {
        match self {
            Sensor::Acceleration => 0,
            Sensor::MagneticField => 1,
            Sensor::Orientation => 2,
            Sensor::Light => 3,
            Sensor::Proximity => 4,
            Sensor::Gyroscope => 5,
            Sensor::SignificantMotion => 6,
        }
    }

    pub fn from_handle(handle: SensorHandle) -> SensorResult<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.handle() == handle)
            .ok_or(SensorError::InvalidHandle { handle })
    }

    /// Adapter that serves this sensor
    pub fn slot(self) -> DriverSlot {
        match self {
            Sensor::Acceleration | Sensor::MagneticField | Sensor::Orientation | Sensor::SignificantMotion => {
                DriverSlot::Akm
            }
            Sensor::Proximity => DriverSlot::Proximity,
            Sensor::Light => DriverSlot::Light,
            Sensor::Gyroscope => DriverSlot::Gyro,
        }
    }

    /// Name used in configuration files
    pub fn name(self) -> &'static str {
        match self {
            Sensor::Acceleration => "acceleration",
            Sensor::MagneticField => "magnetic_field",
            Sensor::Orientation => "orientation",
            Sensor::Light => "light",
            Sensor::Proximity => "proximity",
            Sensor::Gyroscope => "gyroscope",
            Sensor::SignificantMotion => "significant_motion",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Bit of this sensor in an adapter's enabled mask
    pub fn mask(self) -> u32 {
        1 << self.handle()
    }
}

/// Fixed position of each physical adapter inside the poll context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverSlot {
    Light = 0,
    Proximity = 1,
    Akm = 2,
    Gyro = 3,
}

impl DriverSlot {
    pub const COUNT: usize = 4;

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Route a platform handle to the adapter that owns it.
pub fn handle_to_driver(handle: SensorHandle) -> SensorResult<DriverSlot> {
    Sensor::from_handle(handle).map(Sensor::slot)
}

/// Capability contract shared by the four physical adapters
#[async_trait]
pub trait SensorDriver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Readiness source, the same for the adapter's whole lifetime
    fn descriptor(&self) -> WaitDescriptor;

    async fn enable(&self, handle: SensorHandle, enabled: bool) -> SensorResult<()>;
    async fn set_delay(&self, handle: SensorHandle, delay_ns: i64) -> SensorResult<()>;
    async fn batch(
        &self,
        handle: SensorHandle,
        flags: i32,
        sampling_period_ns: i64,
        max_report_latency_ns: i64,
    ) -> SensorResult<()>;
    async fn flush(&self, handle: SensorHandle) -> SensorResult<()>;

    /// Decoded events left over from a read that ran out of room
    fn has_pending_events(&self) -> bool;

    /// Copy up to `out.len()` events into `out` without blocking.
    fn read_events(&self, out: &mut [SensorEvent]) -> usize;
}

/// Raw event stream and control directory of one physical input device
pub struct InputSource {
    pub events: Box<dyn AsyncRead + Send + Unpin>,
    pub control: PathBuf,
}

impl InputSource {
    pub fn new(events: impl AsyncRead + Send + Unpin + 'static, control: impl Into<PathBuf>) -> Self {
        Self {
            events: Box::new(events),
            control: control.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_is_total_over_known_handles() {
        let akm = [0, 1, 2, 6];
        for handle in akm {
            assert_eq!(handle_to_driver(handle).unwrap(), DriverSlot::Akm);
        }
        assert_eq!(handle_to_driver(3).unwrap(), DriverSlot::Light);
        assert_eq!(handle_to_driver(4).unwrap(), DriverSlot::Proximity);
        assert_eq!(handle_to_driver(5).unwrap(), DriverSlot::Gyro);
    }

    #[test]
    fn test_routing_rejects_unknown_handles() {
        for handle in [-1, 7, 42, i32::MIN, i32::MAX] {
            let err = handle_to_driver(handle).unwrap_err();
            assert!(matches!(err, SensorError::InvalidHandle { handle: h } if h == handle));
            assert_eq!(err.errno(), -crate::errors::EINVAL);
        }
    }

    #[test]
    fn test_distinct_slots() {
        let mut slots: Vec<usize> = [DriverSlot::Light, DriverSlot::Proximity, DriverSlot::Akm, DriverSlot::Gyro]
            .iter()
            .map(|s| s.index())
            .collect();
        slots.dedup();
        assert_eq!(slots, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_names_round_trip() {
        for sensor in Sensor::ALL {
            assert_eq!(Sensor::from_name(sensor.name()), Some(sensor));
            assert_eq!(Sensor::from_handle(sensor.handle()).unwrap(), sensor);
        }
        assert_eq!(Sensor::from_name("barometer"), None);
    }
}
