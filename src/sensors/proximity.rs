use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

use super::base::{owned_sensor, SensorBase};
use super::{InputSource, Sensor, SensorDriver, SensorHandle};
use crate::errors::SensorResult;
use crate::input::{ABS_DISTANCE, EV_ABS};
use crate::messages::{SensorEvent, SensorType};
use crate::registry::PROXIMITY_THRESHOLD_GP2A;
use crate::wait::{Poller, WaitDescriptor};

const OWNED: [Sensor; 1] = [Sensor::Proximity];

/// GP2A proximity sensor (near/far index, reported in cm)
pub struct ProximitySensor {
    base: SensorBase,
    distance: Mutex<Option<f32>>,
}

impl ProximitySensor {
    pub fn new(poller: &Poller, source: InputSource, queue_depth: usize) -> Self {
        Self {
            base: SensorBase::new("proximity", poller, source, queue_depth),
            distance: Mutex::new(None),
        }
    }

    fn distance(&self) -> MutexGuard<'_, Option<f32>> {
        self.distance.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn index_to_value(index: i32) -> f32 {
    index as f32 * PROXIMITY_THRESHOLD_GP2A
}

#[async_trait]
impl SensorDriver for ProximitySensor {
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

    /// On-change sensor: the driver reports on interrupt, there is no rate to set.
    async fn set_delay(&self, handle: SensorHandle, delay_ns: i64) -> SensorResult<()> {
        let sensor = owned_sensor(handle, &OWNED)?;
        self.base.clamp_delay(sensor, delay_ns)?;
        Ok(())
    }

    async fn batch(&self, handle: SensorHandle, flags: i32, sampling_period_ns: i64, max_report_latency_ns: i64) -> SensorResult<()> {
        owned_sensor(handle, &OWNED)?;
        self.base.batch_period(flags, sampling_period_ns, max_report_latency_ns)?;
        Ok(())
    }

    async fn flush(&self, handle: SensorHandle) -> SensorResult<()> {
        let sensor = owned_sensor(handle, &OWNED)?;
        self.base.queue_flush(sensor)
    }

    fn has_pending_events(&self) -> bool {
        self.base.has_pending_events()
    }

    fn read_events(&self, out: &mut [SensorEvent]) -> usize {
        let enabled = self.base.is_enabled(Sensor::Proximity);
        let mut distance = self.distance();
        self.base.read_events(out, |input, pending| {
            if input.kind == EV_ABS && input.code == ABS_DISTANCE {
                *distance = Some(index_to_value(input.value));
            } else if input.is_syn_report() {
                if let (true, Some(cm)) = (enabled, distance.take()) {
                    pending.push_back(SensorEvent::scalar(
                        Sensor::Proximity.handle(),
                        SensorType::Proximity,
                        input.timestamp_ns(),
                        cm,
                    ));
                }
            } else {
                trace!("[proximity] ignoring event type={} code={}", input.kind, input.code);
            }
        })
    }
}
