use serde::Serialize;
use std::f32::consts::PI;

use crate::messages::SensorType;
use crate::sensors::{Sensor, SensorHandle};

// Reporting mode flags
pub const SENSOR_FLAG_WAKE_UP: u32 = 0x1;
pub const SENSOR_FLAG_CONTINUOUS_MODE: u32 = 0x0;
pub const SENSOR_FLAG_ON_CHANGE_MODE: u32 = 0x2;
pub const SENSOR_FLAG_ONE_SHOT_MODE: u32 = 0x4;
pub const SENSOR_FLAG_REPORTING_MODE_MASK: u32 = 0xE;

pub const GRAVITY_EARTH: f32 = 9.80665;

// K3DH reports milli-g
pub const CONVERT_A: f32 = GRAVITY_EARTH / 1000.0;
pub const RANGE_A: f32 = 2.0 * GRAVITY_EARTH;
pub const RESOLUTION_A: f32 = CONVERT_A;

// AK8975 magnetic field in 1/16 µT, orientation in 1/64 degree
pub const CONVERT_M: f32 = 1.0 / 16.0;
pub const CONVERT_O: f32 = 1.0 / 64.0;

// K3G: 70 mdps per LSB at 2000 dps full scale
pub const RANGE_GYRO: f32 = 2000.0 * PI / 180.0;
pub const CONVERT_GYRO: f32 = 0.070 * PI / 180.0;

// GP2A proximity reports a near/far index
pub const PROXIMITY_THRESHOLD_GP2A: f32 = 5.0;

/// Static description of one sensor, as listed to the platform
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SensorInfo {
    pub name: &'static str,
    pub vendor: &'static str,
    pub version: i32,
    pub handle: SensorHandle,
    pub sensor_type: SensorType,
    pub max_range: f32,
    pub resolution: f32,
    /// mA
    pub power: f32,
    /// µs; 0 for on-change and one-shot sensors
    pub min_delay_us: i32,
    pub fifo_reserved_event_count: u32,
    pub fifo_max_event_count: u32,
    pub string_type: &'static str,
    pub required_permission: &'static str,
    pub max_delay_us: i64,
    pub flags: u32,
}

impl SensorInfo {
    pub fn is_wake_up(&self) -> bool {
        self.flags & SENSOR_FLAG_WAKE_UP != 0
    }

    pub fn reporting_mode(&self) -> u32 {
        self.flags & SENSOR_FLAG_REPORTING_MODE_MASK
    }

    pub fn is_one_shot(&self) -> bool {
        self.reporting_mode() == SENSOR_FLAG_ONE_SHOT_MODE
    }
}

pub static SENSOR_LIST: [SensorInfo; 7] = [
    SensorInfo {
        name: "K3DH Acceleration Sensor",
        vendor: "STMicroelectronics",
        version: 1,
        handle: 0,
        sensor_type: SensorType::Accelerometer,
        max_range: RANGE_A,
        resolution: RESOLUTION_A,
        power: 0.25,
        min_delay_us: 15000,
        fifo_reserved_event_count: 0,
        fifo_max_event_count: 0,
        string_type: "android.sensor.accelerometer",
        required_permission: "",
        max_delay_us: 0,
        flags: SENSOR_FLAG_CONTINUOUS_MODE,
    },
    SensorInfo {
        name: "AK8975 Magnetic field Sensor",
        vendor: "Asahi Kasei Microdevices",
        version: 1,
        handle: 1,
        sensor_type: SensorType::MagneticField,
        max_range: 2000.0,
        resolution: CONVERT_M,
        power: 6.0,
        min_delay_us: 30000,
        fifo_reserved_event_count: 0,
        fifo_max_event_count: 0,
        string_type: "android.sensor.magnetic_field",
        required_permission: "",
        max_delay_us: 0,
        flags: SENSOR_FLAG_CONTINUOUS_MODE,
    },
    SensorInfo {
        name: "AK8975 Orientation Sensor",
        vendor: "Asahi Kasei Microdevices",
        version: 1,
        handle: 2,
        sensor_type: SensorType::Orientation,
        max_range: 360.0,
        resolution: CONVERT_O,
        power: 7.8,
        min_delay_us: 30000,
        fifo_reserved_event_count: 0,
        fifo_max_event_count: 0,
        string_type: "android.sensor.orientation",
        required_permission: "",
        max_delay_us: 0,
        flags: SENSOR_FLAG_CONTINUOUS_MODE,
    },
    SensorInfo {
        name: "GP2A Light Sensor",
        vendor: "Sharp",
        version: 1,
        handle: 3,
        sensor_type: SensorType::Light,
        max_range: 3000.0,
        resolution: 1.0,
        power: 0.75,
        min_delay_us: 0,
        fifo_reserved_event_count: 0,
        fifo_max_event_count: 0,
        string_type: "android.sensor.light",
        required_permission: "",
        max_delay_us: 0,
        flags: SENSOR_FLAG_ON_CHANGE_MODE,
    },
    SensorInfo {
        name: "GP2A Proximity Sensor",
        vendor: "Sharp",
        version: 1,
        handle: 4,
        sensor_type: SensorType::Proximity,
        max_range: 5.0,
        resolution: 5.0,
        power: 0.75,
        min_delay_us: 0,
        fifo_reserved_event_count: 0,
        fifo_max_event_count: 0,
        string_type: "android.sensor.proximity",
        required_permission: "",
        max_delay_us: 0,
        flags: SENSOR_FLAG_WAKE_UP | SENSOR_FLAG_ON_CHANGE_MODE,
    },
    SensorInfo {
        name: "K3G Gyroscope Sensor",
        vendor: "STMicroelectronics",
        version: 1,
        handle: 5,
        sensor_type: SensorType::Gyroscope,
        max_range: RANGE_GYRO,
        resolution: CONVERT_GYRO,
        power: 6.1,
        min_delay_us: 15000,
        fifo_reserved_event_count: 0,
        fifo_max_event_count: 0,
        string_type: "android.sensor.gyroscope",
        required_permission: "",
        max_delay_us: 0,
        flags: SENSOR_FLAG_CONTINUOUS_MODE,
    },
    SensorInfo {
        name: "Movement Detection Sensor",
        vendor: "STMicroelectronics",
        version: 1,
        handle: 6,
        sensor_type: SensorType::SignificantMotion,
        max_range: 1.0,
        resolution: 1.0,
        power: 0.01,
        min_delay_us: 0,
        fifo_reserved_event_count: 0,
        fifo_max_event_count: 0,
        string_type: "android.sensor.significant_motion",
        required_permission: "",
        max_delay_us: 0,
        flags: SENSOR_FLAG_ONE_SHOT_MODE | SENSOR_FLAG_WAKE_UP,
    },
];

/// Full descriptor table in its stable listing order
pub fn sensors_list() -> &'static [SensorInfo] {
    &SENSOR_LIST
}

pub fn sensor_info(sensor: Sensor) -> &'static SensorInfo {
    &SENSOR_LIST[sensor.handle() as usize]
}
