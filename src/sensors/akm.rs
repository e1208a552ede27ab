use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

use super::base::{owned_sensor, SensorBase};
use super::{InputSource, Sensor, SensorDriver, SensorHandle};
use crate::errors::{SensorError, SensorResult};
use crate::input::{
    ABS_BRAKE, ABS_HAT0X, ABS_HAT0Y, ABS_MISC, ABS_RX, ABS_RY, ABS_RZ, ABS_WHEEL, ABS_X, ABS_Y, ABS_Z, EV_ABS,
    EV_SYN, SYN_DROPPED,
};
use crate::messages::{SensorEvent, SensorType, SENSOR_STATUS_ACCURACY_HIGH, SENSOR_STATUS_UNRELIABLE};
use crate::registry::{CONVERT_A, CONVERT_M, CONVERT_O};
use crate::wait::{Poller, WaitDescriptor};

const OWNED: [Sensor; 4] = [
    Sensor::Acceleration,
    Sensor::MagneticField,
    Sensor::Orientation,
    Sensor::SignificantMotion,
];

struct AkmFrame {
    accel: [f32; 3],
    magnetic: [f32; 3],
    orientation: [f32; 3],
    status: i8,
    /// Sensors touched since the last SYN_REPORT
    dirty: u32,
}

impl Default for AkmFrame {
    fn default() -> Self {
        Self {
            accel: [0.0; 3],
            magnetic: [0.0; 3],
            orientation: [0.0; 3],
            status: SENSOR_STATUS_UNRELIABLE,
            dirty: 0,
        }
    }
}

/// Combined K3DH accelerometer + AK8975 compass device.
///
/// Serves acceleration, magnetic field, orientation and significant motion
/// from a single input node. The `enable` attribute takes the mask of
/// enabled handles. Significant motion is one-shot: the device disarms it
/// after it fires and the adapter drops it from the mask to match.
pub struct AkmSensor {
    base: SensorBase,
    frame: Mutex<AkmFrame>,
    delays: Mutex<[Option<i64>; 4]>,
}

impl AkmSensor {
    pub fn new(poller: &Poller, source: InputSource, queue_depth: usize) -> Self {
        Self {
            base: SensorBase::new("akm", poller, source, queue_depth),
            frame: Mutex::new(AkmFrame::default()),
            delays: Mutex::new([None; 4]),
        }
    }

    fn frame(&self) -> MutexGuard<'_, AkmFrame> {
        self.frame.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Smallest delay requested by `requester` or any enabled sensor
    fn effective_delay(&self, requester: Sensor, delay_ns: i64) -> i64 {
        let mut delays = self.delays.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = OWNED.iter().position(|s| *s == requester) {
            delays[pos] = Some(delay_ns);
        }
        let enabled = self.base.enabled_mask();
        OWNED
            .iter()
            .zip(delays.iter())
            .filter(|(sensor, _)| **sensor == requester || enabled & sensor.mask() != 0)
            .filter_map(|(_, delay)| *delay)
            .min()
            .unwrap_or(delay_ns)
    }
}

fn emit(frame: &AkmFrame, sensor: Sensor, timestamp_ns: i64) -> SensorEvent {
    let handle = sensor.handle();
    match sensor {
        Sensor::Acceleration => SensorEvent::vector(
            handle,
            SensorType::Accelerometer,
            timestamp_ns,
            frame.accel,
            SENSOR_STATUS_ACCURACY_HIGH,
        ),
        Sensor::MagneticField => {
            SensorEvent::vector(handle, SensorType::MagneticField, timestamp_ns, frame.magnetic, frame.status)
        }
        Sensor::Orientation => {
            SensorEvent::vector(handle, SensorType::Orientation, timestamp_ns, frame.orientation, frame.status)
        }
        _ => SensorEvent::scalar(handle, SensorType::SignificantMotion, timestamp_ns, 1.0),
    }
}

#[async_trait]
impl SensorDriver for AkmSensor {
    fn name(&self) -> &'static str {
        self.base.name()
    }

    fn descriptor(&self) -> WaitDescriptor {
        self.base.descriptor()
    }

    async fn enable(&self, handle: SensorHandle, enabled: bool) -> SensorResult<()> {
        let sensor = owned_sensor(handle, &OWNED)?;
        self.base.set_enabled(sensor, enabled, i64::from).await?;
        Ok(())
    }

    async fn set_delay(&self, handle: SensorHandle, delay_ns: i64) -> SensorResult<()> {
        let sensor = owned_sensor(handle, &OWNED)?;
        let delay_ns = self.base.clamp_delay(sensor, delay_ns)?;
        if sensor == Sensor::SignificantMotion {
            return Ok(());
        }
        let effective = self.effective_delay(sensor, delay_ns);
        debug!("[akm] {} delay {}ns, device delay {}ns", sensor.name(), delay_ns, effective);
        self.base.write_delay(effective).await
    }

    async fn batch(&self, handle: SensorHandle, flags: i32, sampling_period_ns: i64, max_report_latency_ns: i64) -> SensorResult<()> {
        owned_sensor(handle, &OWNED)?;
        match self.base.batch_period(flags, sampling_period_ns, max_report_latency_ns)? {
            Some(period) => self.set_delay(handle, period).await,
            None => Ok(()),
        }
    }

    async fn flush(&self, handle: SensorHandle) -> SensorResult<()> {
        let sensor = owned_sensor(handle, &OWNED)?;
        if sensor == Sensor::SignificantMotion {
            return Err(SensorError::InvalidArgument {
                sensor: self.base.name(),
                reason: "one-shot sensors cannot be flushed".to_string(),
            });
        }
        self.base.queue_flush(sensor)
    }

    fn has_pending_events(&self) -> bool {
        self.base.has_pending_events()
    }

    fn read_events(&self, out: &mut [SensorEvent]) -> usize {
        let mut enabled = self.base.enabled_mask();
        let mut frame = self.frame();
        self.base.read_events(out, |input, pending| {
            let value = input.value as f32;
            match (input.kind, input.code) {
                (EV_ABS, ABS_X) => frame.accel[0] = value * CONVERT_A,
                (EV_ABS, ABS_Y) => frame.accel[1] = value * CONVERT_A,
                (EV_ABS, ABS_Z) => frame.accel[2] = value * CONVERT_A,
                (EV_ABS, ABS_HAT0X) => frame.magnetic[0] = value * CONVERT_M,
                (EV_ABS, ABS_HAT0Y) => frame.magnetic[1] = value * CONVERT_M,
                (EV_ABS, ABS_BRAKE) => frame.magnetic[2] = value * CONVERT_M,
                (EV_ABS, ABS_RX) => frame.orientation[0] = value * CONVERT_O,
                (EV_ABS, ABS_RY) => frame.orientation[1] = value * CONVERT_O,
                (EV_ABS, ABS_RZ) => frame.orientation[2] = value * CONVERT_O,
                (EV_ABS, ABS_WHEEL) => frame.status = input.value.clamp(0, 3) as i8,
                (EV_ABS, ABS_MISC) if input.value != 0 => {}
                (EV_SYN, SYN_DROPPED) => {
                    debug!("[akm] kernel dropped events, discarding partial frame");
                    frame.dirty = 0;
                    return;
                }
                _ if input.is_syn_report() => {
                    let timestamp_ns = input.timestamp_ns();
                    for sensor in OWNED {
                        if frame.dirty & enabled & sensor.mask() == 0 {
                            continue;
                        }
                        pending.push_back(emit(&frame, sensor, timestamp_ns));
                        if sensor == Sensor::SignificantMotion {
                            enabled &= !sensor.mask();
                            self.base.clear_enabled(sensor);
                        }
                    }
                    frame.dirty = 0;
                    return;
                }
                _ => {
                    trace!("[akm] ignoring event type={} code={}", input.kind, input.code);
                    return;
                }
            }
            frame.dirty |= touched(input.code).mask();
        })
    }
}

/// Logical sensor an absolute axis belongs to
fn touched(code: u16) -> Sensor {
    match code {
        ABS_X | ABS_Y | ABS_Z => Sensor::Acceleration,
        ABS_HAT0X | ABS_HAT0Y | ABS_BRAKE => Sensor::MagneticField,
        ABS_MISC => Sensor::SignificantMotion,
        _ => Sensor::Orientation,
    }
}
