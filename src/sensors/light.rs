use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

use super::base::{owned_sensor, SensorBase};
use super::{InputSource, Sensor, SensorDriver, SensorHandle};
use crate::errors::SensorResult;
use crate::input::{ABS_MISC, EV_ABS};
use crate::messages::{SensorEvent, SensorType};
use crate::wait::{Poller, WaitDescriptor};

const OWNED: [Sensor; 1] = [Sensor::Light];

#[derive(Default)]
struct LightState {
    lux: Option<f32>,
    last_reported: Option<f32>,
}

/// GP2A ambient light sensor. On-change: a report is emitted only when the
/// level differs from the previous report.
pub struct LightSensor {
    base: SensorBase,
    state: Mutex<LightState>,
}

impl LightSensor {
    pub fn new(poller: &Poller, source: InputSource, queue_depth: usize) -> Self {
        Self {
            base: SensorBase::new("light", poller, source, queue_depth),
            state: Mutex::new(LightState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, LightState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SensorDriver for LightSensor {
    fn name(&self) -> &'static str {
        self.base.name()
    }

    fn descriptor(&self) -> WaitDescriptor {
        self.base.descriptor()
    }

    async fn enable(&self, handle: SensorHandle, enabled: bool) -> SensorResult<()> {
        let sensor = owned_sensor(handle, &OWNED)?;
        let changed = self.base.set_enabled(sensor, enabled, |mask| i64::from(mask != 0)).await?;
        if changed && enabled {
            // first sample after enabling is always reported
            self.state().last_reported = None;
        }
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
        let enabled = self.base.is_enabled(Sensor::Light);
        let mut state = self.state();
        self.base.read_events(out, |input, pending| {
            if input.kind == EV_ABS && input.code == ABS_MISC {
                state.lux = Some(input.value as f32);
            } else if input.is_syn_report() {
                let Some(lux) = state.lux else { return };
                if enabled && state.last_reported != Some(lux) {
                    pending.push_back(SensorEvent::scalar(
                        Sensor::Light.handle(),
                        SensorType::Light,
                        input.timestamp_ns(),
                        lux,
                    ));
                    state.last_reported = Some(lux);
                }
            } else {
                trace!("[light] ignoring event type={} code={}", input.kind, input.code);
            }
        })
    }
}
