use serde::{Deserialize, Serialize};

use crate::sensors::SensorHandle;

/// `meta_data.what` value of a flush-complete marker
pub const META_DATA_FLUSH_COMPLETE: i32 = 1;

// Accuracy reported in vector payloads
pub const SENSOR_STATUS_UNRELIABLE: i8 = 0;
pub const SENSOR_STATUS_ACCURACY_HIGH: i8 = 3;

/// Sensor type codes, numbered as the platform expects them
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum SensorType {
    MetaData = 0,
    Accelerometer = 1,
    MagneticField = 2,
    Orientation = 3,
    Gyroscope = 4,
    Light = 5,
    Proximity = 8,
    SignificantMotion = 17,
}

/// Payload of a [`SensorEvent`]
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum EventPayload {
    Empty,
    /// Three-axis sample (m/s², µT, degrees or rad/s depending on the type)
    Vector { values: [f32; 3], status: i8 },
    /// Single value (lux, cm, or 1.0 for a trigger)
    Scalar { value: f32 },
    /// Out-of-band notification about `sensor`
    MetaData { what: i32, sensor: SensorHandle },
}

/// Fixed-size event record handed to the platform
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct SensorEvent {
    /// Handle of the producing sensor (0 for meta events)
    pub sensor: SensorHandle,
    pub sensor_type: SensorType,
    /// Event time in nanoseconds
    pub timestamp_ns: i64,
    pub payload: EventPayload,
}

impl Default for SensorEvent {
    fn default() -> Self {
        Self {
            sensor: 0,
            sensor_type: SensorType::MetaData,
            timestamp_ns: 0,
            payload: EventPayload::Empty,
        }
    }
}

impl SensorEvent {
    pub fn vector(sensor: SensorHandle, sensor_type: SensorType, timestamp_ns: i64, values: [f32; 3], status: i8) -> Self {
        Self {
            sensor,
            sensor_type,
            timestamp_ns,
            payload: EventPayload::Vector { values, status },
        }
    }

    pub fn scalar(sensor: SensorHandle, sensor_type: SensorType, timestamp_ns: i64, value: f32) -> Self {
        Self {
            sensor,
            sensor_type,
            timestamp_ns,
            payload: EventPayload::Scalar { value },
        }
    }

    pub fn flush_complete(handle: SensorHandle) -> Self {
        Self {
            sensor: 0,
            sensor_type: SensorType::MetaData,
            timestamp_ns: 0,
            payload: EventPayload::MetaData {
                what: META_DATA_FLUSH_COMPLETE,
                sensor: handle,
            },
        }
    }

    /// Handle of the flushed sensor if this is a flush-complete marker
    pub fn flushed_sensor(&self) -> Option<SensorHandle> {
        match self.payload {
            EventPayload::MetaData { what: META_DATA_FLUSH_COMPLETE, sensor } => Some(sensor),
            _ => None,
        }
    }

    /// Serialize to JSON for logging
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
