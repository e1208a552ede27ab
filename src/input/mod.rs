//! Linux input subsystem plumbing shared by the driver adapters.

pub mod node;
pub mod reader;
pub mod sysfs;

pub use node::EventNode;
pub use reader::InputReader;
pub use sysfs::{find_input_device, InputDevicePaths, SysfsControl};

use crate::sensors::SensorHandle;

// Event types
pub const EV_SYN: u16 = 0x00;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;

// Synchronization codes
pub const SYN_REPORT: u16 = 0x00;
pub const SYN_DROPPED: u16 = 0x03;

// Relative axes
pub const REL_RX: u16 = 0x03;
pub const REL_RY: u16 = 0x04;
pub const REL_RZ: u16 = 0x05;

// Absolute axes
pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;
pub const ABS_Z: u16 = 0x02;
pub const ABS_RX: u16 = 0x03;
pub const ABS_RY: u16 = 0x04;
pub const ABS_RZ: u16 = 0x05;
pub const ABS_WHEEL: u16 = 0x08;
pub const ABS_BRAKE: u16 = 0x0a;
pub const ABS_HAT0X: u16 = 0x10;
pub const ABS_HAT0Y: u16 = 0x11;
pub const ABS_DISTANCE: u16 = 0x19;
pub const ABS_MISC: u16 = 0x28;

/// Size of `struct input_event` on 64-bit Linux
pub const INPUT_EVENT_SIZE: usize = 24;

/// One record read from `/dev/input/eventN`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputEvent {
    pub tv_sec: i64,
    pub tv_usec: i64,
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    pub fn new(kind: u16, code: u16, value: i32) -> Self {
        Self { kind, code, value, ..Default::default() }
    }

    pub fn at(mut self, timestamp_ns: i64) -> Self {
        self.tv_sec = timestamp_ns / 1_000_000_000;
        self.tv_usec = (timestamp_ns % 1_000_000_000) / 1_000;
        self
    }

    pub fn syn_report() -> Self {
        Self::new(EV_SYN, SYN_REPORT, 0)
    }

    pub fn is_syn_report(&self) -> bool {
        self.kind == EV_SYN && self.code == SYN_REPORT
    }

    pub fn timestamp_ns(&self) -> i64 {
        self.tv_sec
            .saturating_mul(1_000_000_000)
            .saturating_add(self.tv_usec.saturating_mul(1_000))
    }

    pub fn from_bytes(buf: &[u8; INPUT_EVENT_SIZE]) -> Self {
        Self {
            tv_sec: i64::from_ne_bytes([buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7]]),
            tv_usec: i64::from_ne_bytes([buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15]]),
            kind: u16::from_ne_bytes([buf[16], buf[17]]),
            code: u16::from_ne_bytes([buf[18], buf[19]]),
            value: i32::from_ne_bytes([buf[20], buf[21], buf[22], buf[23]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; INPUT_EVENT_SIZE] {
        let mut buf = [0u8; INPUT_EVENT_SIZE];
        buf[0..8].copy_from_slice(&self.tv_sec.to_ne_bytes());
        buf[8..16].copy_from_slice(&self.tv_usec.to_ne_bytes());
        buf[16..18].copy_from_slice(&self.kind.to_ne_bytes());
        buf[18..20].copy_from_slice(&self.code.to_ne_bytes());
        buf[20..24].copy_from_slice(&self.value.to_ne_bytes());
        buf
    }
}

/// Item carried by a driver's frame pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Input(InputEvent),
    /// Flush requested for this handle; delivered after everything queued before it
    FlushComplete(SensorHandle),
}
