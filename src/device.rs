//! Vendor-neutral sensors device table bound to a [`PollContext`].

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::HalConfig;
use crate::errors::{OpenResult, SensorError, SensorResult};
use crate::messages::SensorEvent;
use crate::poll::PollContext;
use crate::registry::{sensors_list, SensorInfo};
use crate::sensors::SensorHandle;

/// Device table revision negotiated at open time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceApiVersion {
    V1_3,
    V1_4,
}

impl DeviceApiVersion {
    /// `HARDWARE_DEVICE_API_VERSION` encoding: major in the high byte
    pub fn code(self) -> u32 {
        match self {
            DeviceApiVersion::V1_3 => (1 << 8) | 3,
            DeviceApiVersion::V1_4 => (1 << 8) | 4,
        }
    }
}

/// Operations the platform sensor service calls on an open device
#[async_trait]
pub trait SensorsPollDevice: Send + Sync {
    fn api_version(&self) -> DeviceApiVersion;

    async fn activate(&self, handle: SensorHandle, enabled: bool) -> SensorResult<()>;
    async fn set_delay(&self, handle: SensorHandle, delay_ns: i64) -> SensorResult<()>;

    /// Block until events are available and copy up to `data.len()` of them.
    async fn poll(&self, data: &mut [SensorEvent]) -> SensorResult<usize>;

    async fn batch(
        &self,
        handle: SensorHandle,
        flags: i32,
        sampling_period_ns: i64,
        max_report_latency_ns: i64,
    ) -> SensorResult<()>;
    async fn flush(&self, handle: SensorHandle) -> SensorResult<()>;
    async fn inject_sensor_data(&self, event: &SensorEvent) -> SensorResult<()>;

    fn close(self: Box<Self>);
}

struct PollDevice {
    version: DeviceApiVersion,
    context: PollContext,
}

#[async_trait]
impl SensorsPollDevice for PollDevice {
    fn api_version(&self) -> DeviceApiVersion {
        self.version
    }

    async fn activate(&self, handle: SensorHandle, enabled: bool) -> SensorResult<()> {
        self.context.activate(handle, enabled).await
    }

    async fn set_delay(&self, handle: SensorHandle, delay_ns: i64) -> SensorResult<()> {
        self.context.set_delay(handle, delay_ns).await
    }

    async fn poll(&self, data: &mut [SensorEvent]) -> SensorResult<usize> {
        self.context.poll_events(data).await
    }

    async fn batch(&self, handle: SensorHandle, flags: i32, sampling_period_ns: i64, max_report_latency_ns: i64) -> SensorResult<()> {
        self.context
            .batch(handle, flags, sampling_period_ns, max_report_latency_ns)
            .await
    }

    async fn flush(&self, handle: SensorHandle) -> SensorResult<()> {
        self.context.flush(handle).await
    }

    async fn inject_sensor_data(&self, event: &SensorEvent) -> SensorResult<()> {
        match self.version {
            DeviceApiVersion::V1_3 => Err(SensorError::Unsupported { op: "inject_sensor_data" }),
            DeviceApiVersion::V1_4 => {
                debug!("[device] ignoring injected event for handle {}", event.sensor);
                Ok(())
            }
        }
    }

    fn close(self: Box<Self>) {
        info!("[device] closing sensors device");
        self.context.close();
    }
}

/// Module entry point: descriptor table plus the device factory
pub struct SensorsModule;

impl SensorsModule {
    pub const NAME: &'static str = "Samsung Sensor module";
    pub const AUTHOR: &'static str = "Samsung Electronic Company";

    /// Every sensor this module exposes, in handle order
    pub fn sensors_list() -> &'static [SensorInfo] {
        sensors_list()
    }

    /// Only the normal mode exists; any request is accepted.
    pub fn set_operation_mode(mode: u32) -> SensorResult<()> {
        debug!("[device] set_operation_mode({}) ignored", mode);
        Ok(())
    }

    pub async fn open(config: &HalConfig, version: DeviceApiVersion) -> OpenResult<Box<dyn SensorsPollDevice>> {
        let context = PollContext::open(config).await?;
        Ok(Self::bind(context, version))
    }

    /// Expose an already-built context through the device table.
    pub fn bind(context: PollContext, version: DeviceApiVersion) -> Box<dyn SensorsPollDevice> {
        info!("[device] {} opened with API {:?} ({:#06x})", Self::NAME, version, version.code());
        Box::new(PollDevice { version, context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ENOSYS;
    use crate::messages::SensorType;
    use crate::poll::DriverSources;
    use crate::sensors::InputSource;

    fn idle_context() -> (PollContext, Vec<tempfile::TempDir>, Vec<tokio::io::DuplexStream>) {
        let mut dirs = Vec::new();
        let mut devices = Vec::new();
        let mut source = || {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("enable"), "0\n").unwrap();
            std::fs::write(dir.path().join("poll_delay"), "0\n").unwrap();
            let (device, stream) = tokio::io::duplex(1024);
            let source = InputSource::new(stream, dir.path());
            dirs.push(dir);
            devices.push(device);
            source
        };
        let sources = DriverSources {
            light: source(),
            proximity: source(),
            akm: source(),
            gyro: source(),
        };
        (PollContext::from_sources(sources, &HalConfig::default()), dirs, devices)
    }

    #[test]
    fn test_version_codes() {
        assert_eq!(DeviceApiVersion::V1_3.code(), 0x0103);
        assert_eq!(DeviceApiVersion::V1_4.code(), 0x0104);
        assert!(DeviceApiVersion::V1_4 > DeviceApiVersion::V1_3);
    }

    #[test]
    fn test_module_lists_all_sensors() {
        let list = SensorsModule::sensors_list();
        assert_eq!(list.len(), 7);
        assert!(list.iter().enumerate().all(|(i, s)| s.handle == i as i32));
        assert!(SensorsModule::set_operation_mode(0).is_ok());
    }

    #[tokio::test]
    async fn test_injection_depends_on_version() {
        let event = SensorEvent::scalar(3, SensorType::Light, 0, 1.0);

        let (context, _dirs, _devices) = idle_context();
        let device = SensorsModule::bind(context, DeviceApiVersion::V1_3);
        let err = device.inject_sensor_data(&event).await.unwrap_err();
        assert_eq!(err.errno(), -ENOSYS);
        device.close();

        let (context, _dirs, _devices) = idle_context();
        let device = SensorsModule::bind(context, DeviceApiVersion::V1_4);
        assert_eq!(device.api_version(), DeviceApiVersion::V1_4);
        assert!(device.inject_sensor_data(&event).await.is_ok());
        device.close();
    }

    #[tokio::test]
    async fn test_device_forwards_to_context() {
        let (context, dirs, _devices) = idle_context();
        let device = SensorsModule::bind(context, DeviceApiVersion::V1_3);

        device.activate(3, true).await.unwrap();
        let enable = std::fs::read_to_string(dirs[0].path().join("enable")).unwrap();
        assert_eq!(enable.trim(), "1");

        device.set_delay(5, 20_000_000).await.unwrap();
        let delay = std::fs::read_to_string(dirs[3].path().join("poll_delay")).unwrap();
        assert_eq!(delay.trim(), "20000000");

        assert!(device.activate(9, true).await.is_err());
        device.close();
    }

    #[tokio::test]
    async fn test_open_reports_missing_devices() {
        let sysfs = tempfile::tempdir().unwrap();
        let mut config = HalConfig::default();
        config.input.sysfs_root = sysfs.path().to_path_buf();
        let err = SensorsModule::open(&config, DeviceApiVersion::V1_3).await.err().unwrap();
        assert!(matches!(err, crate::errors::OpenError::DeviceNotFound { .. }));
    }
}
