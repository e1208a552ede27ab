use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

use super::{InputSource, Sensor, SensorHandle, BATCH_DRY_RUN, BATCH_WAKE_UPON_FIFO_FULL};
use crate::errors::{SensorError, SensorResult};
use crate::input::sysfs::{ENABLE_ATTR, POLL_DELAY_ATTR};
use crate::input::{Frame, InputEvent, InputReader, SysfsControl};
use crate::messages::SensorEvent;
use crate::registry::sensor_info;
use crate::wait::{pipe, PipeReader, PipeWriter, Poller, WaitDescriptor};

/// Plumbing common to every input-device backed adapter: the frame pipe fed
/// by the reader task, the undelivered event queue, the sysfs control
/// directory and the enabled-handle mask.
pub struct SensorBase {
    name: &'static str,
    frames: PipeReader<Frame>,
    injector: PipeWriter<Frame>,
    pending: Mutex<VecDeque<SensorEvent>>,
    control: SysfsControl,
    control_lock: tokio::sync::Mutex<()>,
    enabled: AtomicU32,
    _reader: InputReader,
}

impl SensorBase {
    pub fn new(name: &'static str, poller: &Poller, source: InputSource, queue_depth: usize) -> Self {
        let (tx, frames) = pipe(poller, queue_depth.max(1));
        let reader = InputReader::spawn(name, source.events, tx.clone());
        Self {
            name,
            frames,
            injector: tx,
            pending: Mutex::new(VecDeque::new()),
            control: SysfsControl::new(source.control),
            control_lock: tokio::sync::Mutex::new(()),
            enabled: AtomicU32::new(0),
            _reader: reader,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn descriptor(&self) -> WaitDescriptor {
        self.frames.descriptor()
    }

    pub fn enabled_mask(&self) -> u32 {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn is_enabled(&self, sensor: Sensor) -> bool {
        self.enabled_mask() & sensor.mask() != 0
    }

    /// Drop `sensor` from the enabled mask without touching the hardware.
    pub fn clear_enabled(&self, sensor: Sensor) {
        self.enabled.fetch_and(!sensor.mask(), Ordering::AcqRel);
    }

    /// Update the enabled mask and write `encode(new_mask)` to the `enable`
    /// attribute. No write happens when the mask does not change.
    pub async fn set_enabled(&self, sensor: Sensor, enabled: bool, encode: impl Fn(u32) -> i64) -> SensorResult<bool> {
        let _guard = self.control_lock.lock().await;
        let old = self.enabled_mask();
        let new = if enabled { old | sensor.mask() } else { old & !sensor.mask() };
        if new == old {
            trace!("[{}] {} already {}", self.name, sensor.name(), if enabled { "on" } else { "off" });
            return Ok(false);
        }

        self.control.write_int(ENABLE_ATTR, encode(new)).await?;
        // only this sensor's bit: the decode path may have cleared a one-shot bit meanwhile
        let mask = if enabled {
            self.enabled.fetch_or(sensor.mask(), Ordering::AcqRel) | sensor.mask()
        } else {
            self.enabled.fetch_and(!sensor.mask(), Ordering::AcqRel) & !sensor.mask()
        };
        debug!("[{}] {} {} (mask {:#04x})", self.name, sensor.name(), if enabled { "enabled" } else { "disabled" }, mask);
        Ok(true)
    }

    /// Validate a requested delay and clamp it to the sensor's minimum.
    pub fn clamp_delay(&self, sensor: Sensor, delay_ns: i64) -> SensorResult<i64> {
        if delay_ns < 0 {
            return Err(SensorError::InvalidArgument {
                sensor: self.name,
                reason: format!("negative delay {}ns", delay_ns),
            });
        }
        let min_ns = i64::from(sensor_info(sensor).min_delay_us) * 1_000;
        Ok(delay_ns.max(min_ns))
    }

    pub async fn write_delay(&self, delay_ns: i64) -> SensorResult<()> {
        let _guard = self.control_lock.lock().await;
        self.control.write_int(POLL_DELAY_ATTR, delay_ns).await
    }

    /// Check batch parameters. Returns the sampling period to apply, or
    /// `None` for a dry run. There is no hardware FIFO so the report latency
    /// is accepted and ignored.
    pub fn batch_period(&self, flags: i32, sampling_period_ns: i64, max_report_latency_ns: i64) -> SensorResult<Option<i64>> {
        if flags & !(BATCH_DRY_RUN | BATCH_WAKE_UPON_FIFO_FULL) != 0 {
            return Err(SensorError::InvalidArgument {
                sensor: self.name,
                reason: format!("unknown batch flags {:#x}", flags),
            });
        }
        if sampling_period_ns < 0 || max_report_latency_ns < 0 {
            return Err(SensorError::InvalidArgument {
                sensor: self.name,
                reason: format!("negative batch timing ({}ns, {}ns)", sampling_period_ns, max_report_latency_ns),
            });
        }
        if flags & BATCH_DRY_RUN != 0 {
            return Ok(None);
        }
        Ok(Some(sampling_period_ns))
    }

    /// Queue a flush-complete marker behind the frames already received.
    pub fn queue_flush(&self, sensor: Sensor) -> SensorResult<()> {
        if !self.is_enabled(sensor) {
            return Err(SensorError::NotEnabled {
                sensor: self.name,
                handle: sensor.handle(),
            });
        }
        self.injector
            .send(Frame::FlushComplete(sensor.handle()))
            .map_err(|source| SensorError::Queue { sensor: self.name, source })
    }

    pub fn has_pending_events(&self) -> bool {
        !self.pending().is_empty()
    }

    /// Deliver queued events first, then decode frames until `out` is full or
    /// the frame pipe is empty. `decode` appends finished events to the queue.
    pub fn read_events(&self, out: &mut [SensorEvent], mut decode: impl FnMut(&InputEvent, &mut VecDeque<SensorEvent>)) -> usize {
        let mut pending = self.pending();
        let mut count = 0;
        while count < out.len() {
            if let Some(event) = pending.pop_front() {
                out[count] = event;
                count += 1;
                continue;
            }
            match self.frames.try_recv() {
                Some(Frame::Input(input)) => decode(&input, &mut *pending),
                Some(Frame::FlushComplete(handle)) => pending.push_back(SensorEvent::flush_complete(handle)),
                None => break,
            }
        }
        count
    }

    /// Frames received from the device but not decoded yet
    pub fn queued_frames(&self) -> usize {
        self.frames.len()
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<SensorEvent>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle owned by this adapter, or an invalid-handle error
pub(crate) fn owned_sensor(handle: SensorHandle, owned: &[Sensor]) -> SensorResult<Sensor> {
    let sensor = Sensor::from_handle(handle)?;
    if owned.contains(&sensor) {
        Ok(sensor)
    } else {
        Err(SensorError::InvalidHandle { handle })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};
    use tokio::io::{AsyncWriteExt, DuplexStream};

    use super::SensorBase;
    use crate::input::InputEvent;
    use crate::sensors::InputSource;

    /// In-memory input device plus a temporary sysfs directory
    pub struct FakeDevice {
        pub events: DuplexStream,
        pub sysfs: tempfile::TempDir,
    }

    impl FakeDevice {
        pub fn new() -> (Self, InputSource) {
            let sysfs = tempfile::tempdir().unwrap();
            std::fs::write(sysfs.path().join("enable"), "0\n").unwrap();
            std::fs::write(sysfs.path().join("poll_delay"), "0\n").unwrap();
            let (events, source) = tokio::io::duplex(4096);
            let control: PathBuf = sysfs.path().to_path_buf();
            (Self { events, sysfs }, InputSource::new(source, control))
        }

        pub fn attr(&self, name: &str) -> String {
            std::fs::read_to_string(self.dir().join(name)).unwrap().trim().to_string()
        }

        pub fn dir(&self) -> &Path {
            self.sysfs.path()
        }

        pub async fn send(&mut self, events: &[InputEvent]) {
            for ev in events {
                self.events.write_all(&ev.to_bytes()).await.unwrap();
            }
            self.events.flush().await.unwrap();
        }
    }

    /// Let the reader task move `frames` written records into the pipe.
    pub async fn settle(base: &SensorBase, frames: usize) {
        for _ in 0..10_000 {
            if base.queued_frames() >= frames {
                return;
            }
            tokio::task::yield_now().await;
        }
    }
}
