use std::path::PathBuf;
use thiserror::Error;

use crate::sensors::SensorHandle;
use crate::wait::{PipeError, WaitError};

// errno values returned through the device table (Linux numbering)
pub const EIO: i32 = 5;
pub const EAGAIN: i32 = 11;
pub const EINVAL: i32 = 22;
pub const EPIPE: i32 = 32;
pub const ENOSYS: i32 = 38;

/// Errors reported by the poll context and the driver adapters
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Invalid sensor handle {handle}")]
    InvalidHandle { handle: SensorHandle },

    #[error("Sensor '{sensor}' (handle {handle}) is not enabled")]
    NotEnabled { sensor: &'static str, handle: SensorHandle },

    #[error("Invalid argument for '{sensor}': {reason}")]
    InvalidArgument { sensor: &'static str, reason: String },

    #[error("Operation '{op}' is not supported by this device")]
    Unsupported { op: &'static str },

    #[error("Control write to '{}' failed: {source}", path.display())]
    Control {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Sensor '{sensor}' event queue rejected a frame: {source}")]
    Queue {
        sensor: &'static str,
        #[source]
        source: PipeError,
    },

    #[error("Multiplexed wait failed: {0}")]
    Wait(#[from] WaitError),
}

impl SensorError {
    /// Negative errno equivalent, as a C sensors device would return it.
    pub fn errno(&self) -> i32 {
        let code = match self {
            SensorError::InvalidHandle { .. }
            | SensorError::NotEnabled { .. }
            | SensorError::InvalidArgument { .. } => EINVAL,
            SensorError::Unsupported { .. } => ENOSYS,
            SensorError::Control { source, .. } => source.raw_os_error().unwrap_or(EIO),
            SensorError::Queue { source, .. } => match source {
                PipeError::WouldBlock => EAGAIN,
                PipeError::Closed => EPIPE,
            },
            SensorError::Wait(e) => e.errno(),
        };
        -code
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from '{path}': {source}")]
    LoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration format: {0}")]
    FormatError(#[from] toml::de::Error),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Errors raised while opening the sensors device
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("No input device named '{name}' under '{}'", root.display())]
    DeviceNotFound { name: String, root: PathBuf },

    #[error("Failed to open input device '{}': {source}", path.display())]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to scan '{}' for input devices: {source}", root.display())]
    Discovery {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Result type aliases for convenience
pub type SensorResult<T> = Result<T, SensorError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type OpenResult<T> = Result<T, OpenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(SensorError::InvalidHandle { handle: 42 }.errno(), -EINVAL);
        assert_eq!(
            SensorError::NotEnabled { sensor: "proximity", handle: 4 }.errno(),
            -EINVAL
        );
        assert_eq!(SensorError::Unsupported { op: "inject_sensor_data" }.errno(), -ENOSYS);
        assert_eq!(
            SensorError::Queue { sensor: "gyro", source: PipeError::WouldBlock }.errno(),
            -EAGAIN
        );
    }

    #[test]
    fn test_control_errno_uses_os_code() {
        let err = SensorError::Control {
            path: PathBuf::from("/sys/class/input/input3/enable"),
            source: std::io::Error::from_raw_os_error(2),
        };
        assert_eq!(err.errno(), -2);

        let err = SensorError::Control {
            path: PathBuf::from("/sys/class/input/input3/enable"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "short write"),
        };
        assert_eq!(err.errno(), -EIO);
        assert!(err.to_string().contains("input3/enable"));
    }
}
