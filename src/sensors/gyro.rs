use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

use super::base::{owned_sensor, SensorBase};
use super::{InputSource, Sensor, SensorDriver, SensorHandle};
use crate::errors::SensorResult;
use crate::input::{EV_REL, EV_SYN, REL_RX, REL_RY, REL_RZ, SYN_DROPPED};
use crate::messages::{SensorEvent, SensorType, SENSOR_STATUS_ACCURACY_HIGH};
use crate::registry::CONVERT_GYRO;
use crate::wait::{Poller, WaitDescriptor};

const OWNED: [Sensor; 1] = [Sensor::Gyroscope];

#[derive(Default)]
struct GyroFrame {
    rate: [f32; 3],
    dirty: bool,
}

/// K3G three-axis gyroscope (rad/s)
pub struct GyroSensor {
    base: SensorBase,
    frame: Mutex<GyroFrame>,
}

impl GyroSensor {
    pub fn new(poller: &Poller, source: InputSource, queue_depth: usize) -> Self {
        Self {
            base: SensorBase::new("gyro", poller, source, queue_depth),
            frame: Mutex::new(GyroFrame::default()),
        }
    }

    fn frame(&self) -> MutexGuard<'_, GyroFrame> {
        self.frame.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SensorDriver for GyroSensor {
    fn name(&self) -> &'static str {
        self.base.name()
    }

    fn descriptor(&self) -> WaitDescriptor {
        self.base.descriptor()
    }

    async fn enable(&self, handle: SensorHandle, enabled: bool) -> SensorResult<()> {
        let sensor = owned_sensor(handle, &OWNED)?;
        self.base.set_enabled(sensor, enabled, |mask| i64::from(mask != 0)).await?;
        Ok(())
    }

    async fn set_delay(&self, handle: SensorHandle, delay_ns: i64) -> SensorResult<()> {
        let sensor = owned_sensor(handle, &OWNED)?;
        let delay_ns = self.base.clamp_delay(sensor, delay_ns)?;
        self.base.write_delay(delay_ns).await
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
        self.base.queue_flush(sensor)
    }

    fn has_pending_events(&self) -> bool {
        self.base.has_pending_events()
    }

    fn read_events(&self, out: &mut [SensorEvent]) -> usize {
        let enabled = self.base.is_enabled(Sensor::Gyroscope);
        let mut frame = self.frame();
        self.base.read_events(out, |input, pending| match (input.kind, input.code) {
            (EV_REL, REL_RX) => {
                frame.rate[0] = input.value as f32 * CONVERT_GYRO;
                frame.dirty = true;
            }
            (EV_REL, REL_RY) => {
                frame.rate[1] = input.value as f32 * CONVERT_GYRO;
                frame.dirty = true;
            }
            (EV_REL, REL_RZ) => {
                frame.rate[2] = input.value as f32 * CONVERT_GYRO;
                frame.dirty = true;
            }
            (EV_SYN, SYN_DROPPED) => {
                debug!("[gyro] kernel dropped events, discarding partial frame");
                *frame = GyroFrame::default();
            }
            _ if input.is_syn_report() => {
                if enabled && frame.dirty {
                    pending.push_back(SensorEvent::vector(
                        Sensor::Gyroscope.handle(),
                        SensorType::Gyroscope,
                        input.timestamp_ns(),
                        frame.rate,
                        SENSOR_STATUS_ACCURACY_HIGH,
                    ));
                }
                frame.dirty = false;
            }
            _ => trace!("[gyro] ignoring event type={} code={}", input.kind, input.code),
        })
    }
}
