use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::errors::{ConfigError, ConfigResult};
use crate::sensors::{DriverSlot, Sensor};

/// Longest gyroscope settle delay accepted from a config file
const MAX_GYRO_SETTLE_MS: u64 = 5_000;

/// Root of `hal.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HalConfig {
    pub input: InputConfig,
    pub poll: PollConfig,
    pub drivers: DriversConfig,
    pub service: ServiceConfig,
}

/// `[input]`: where input devices are discovered
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub sysfs_root: PathBuf,
    pub dev_root: PathBuf,
    /// Frames buffered per device before the reader starts dropping
    pub queue_depth: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys/class/input"),
            dev_root: PathBuf::from("/dev/input"),
            queue_depth: 256,
        }
    }
}

/// `[poll]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub gyro_disable_settle_ms: u64,
    pub wake_pipe_capacity: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            gyro_disable_settle_ms: 200,
            wake_pipe_capacity: 64,
        }
    }
}

impl PollConfig {
    pub fn gyro_disable_settle(&self) -> Duration {
        Duration::from_millis(self.gyro_disable_settle_ms)
    }
}

/// `[drivers.<name>]`: one physical input device
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    /// Value of the device's sysfs `name` attribute
    pub input_name: String,
    /// Event node, skips discovery when set together with `control`
    pub device: Option<PathBuf>,
    /// sysfs directory holding `enable` and `poll_delay`
    pub control: Option<PathBuf>,
}

impl DriverConfig {
    fn named(input_name: &str) -> Self {
        Self {
            input_name: input_name.to_string(),
            device: None,
            control: None,
        }
    }
}

/// `[drivers]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriversConfig {
    pub light: DriverConfig,
    pub proximity: DriverConfig,
    pub akm: DriverConfig,
    pub gyro: DriverConfig,
}

impl Default for DriversConfig {
    fn default() -> Self {
        Self {
            light: DriverConfig::named("light_sensor"),
            proximity: DriverConfig::named("proximity_sensor"),
            akm: DriverConfig::named("compass_sensor"),
            gyro: DriverConfig::named("gyro_sensor"),
        }
    }
}

impl DriversConfig {
    pub fn get(&self, slot: DriverSlot) -> &DriverConfig {
        match slot {
            DriverSlot::Light => &self.light,
            DriverSlot::Proximity => &self.proximity,
            DriverSlot::Akm => &self.akm,
            DriverSlot::Gyro => &self.gyro,
        }
    }
}

/// `[service]`: behaviour of the `sensors-hal` binary
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Sensor names to activate at startup
    pub activate: Vec<String>,
    pub delay_ms: u64,
    /// Events requested per poll call
    pub event_buffer: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            activate: Vec::new(),
            delay_ms: 200,
            event_buffer: 16,
        }
    }
}

impl ServiceConfig {
    /// Sensors listed in `activate`, in file order
    pub fn sensors(&self) -> Vec<Sensor> {
        self.activate.iter().filter_map(|name| Sensor::from_name(name)).collect()
    }
}

impl HalConfig {
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let parsed: HalConfig = toml::from_str(content)?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.input.queue_depth == 0 {
            return Err(invalid("input.queue_depth", "must be greater than zero"));
        }
        if self.poll.wake_pipe_capacity == 0 {
            return Err(invalid("poll.wake_pipe_capacity", "must be greater than zero"));
        }
        if self.poll.gyro_disable_settle_ms > MAX_GYRO_SETTLE_MS {
            return Err(invalid(
                "poll.gyro_disable_settle_ms",
                &format!("{} exceeds {}ms", self.poll.gyro_disable_settle_ms, MAX_GYRO_SETTLE_MS),
            ));
        }
        if self.service.event_buffer == 0 {
            return Err(invalid("service.event_buffer", "must be greater than zero"));
        }
        if let Some(name) = self.service.activate.iter().find(|n| Sensor::from_name(n).is_none()) {
            return Err(invalid("service.activate", &format!("unknown sensor '{}'", name)));
        }
        for slot in [DriverSlot::Light, DriverSlot::Proximity, DriverSlot::Akm, DriverSlot::Gyro] {
            let driver = self.drivers.get(slot);
            if driver.input_name.is_empty() {
                return Err(invalid(&format!("drivers.{:?}.input_name", slot).to_lowercase(), "must not be empty"));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Loads and validates `hal.toml`
pub fn load_hal_config(path: &str) -> ConfigResult<HalConfig> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::LoadError {
        path: path.to_string(),
        source,
    })?;
    let config = HalConfig::from_toml(&content)?;
    debug!("[config] loaded {}", path);
    Ok(config)
}
