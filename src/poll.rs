//! Poll context: the four physical adapters behind one blocking event stream.

use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace};

use crate::config::{HalConfig, PollConfig};
use crate::errors::{OpenError, OpenResult, SensorResult};
use crate::input::{find_input_device, EventNode, InputDevicePaths};
use crate::messages::SensorEvent;
use crate::sensors::{
    handle_to_driver, AkmSensor, DriverSlot, GyroSensor, InputSource, LightSensor, ProximitySensor, SensorDriver,
    SensorHandle,
};
use crate::wait::{Interest, PollFd, Poller, Timeout, WakeChannel};

/// Position of the wake descriptor in the wait set, after every adapter
const WAKE_SLOT: usize = DriverSlot::COUNT;

const SLOTS: [DriverSlot; DriverSlot::COUNT] = [DriverSlot::Light, DriverSlot::Proximity, DriverSlot::Akm, DriverSlot::Gyro];

/// Tunables of the poll context
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Pause before the gyroscope adapter is told to disable
    pub gyro_disable_settle: Duration,
    pub wake_pipe_capacity: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PollConfig::default())
    }
}

impl From<&PollConfig> for PollSettings {
    fn from(config: &PollConfig) -> Self {
        Self {
            gyro_disable_settle: config.gyro_disable_settle(),
            wake_pipe_capacity: config.wake_pipe_capacity,
        }
    }
}

/// Already-opened input streams, one per adapter
pub struct DriverSources {
    pub light: InputSource,
    pub proximity: InputSource,
    pub akm: InputSource,
    pub gyro: InputSource,
}

pub struct PollContext {
    poller: Poller,
    drivers: [Box<dyn SensorDriver>; DriverSlot::COUNT],
    wake: WakeChannel,
    /// Readiness of the last wait. Only `poll_events` locks it, which also
    /// keeps a second poller out.
    fds: Mutex<[PollFd; WAKE_SLOT + 1]>,
    settings: PollSettings,
}

impl PollContext {
    /// Assemble a context from adapters indexed by [`DriverSlot`]. Every
    /// adapter descriptor must come from `poller`.
    pub fn with_drivers(poller: Poller, drivers: [Box<dyn SensorDriver>; DriverSlot::COUNT], settings: PollSettings) -> Self {
        let wake = WakeChannel::new(&poller, settings.wake_pipe_capacity);
        let fds = std::array::from_fn(|i| {
            if i < WAKE_SLOT {
                PollFd::readable(drivers[i].descriptor())
            } else {
                PollFd::readable(wake.descriptor())
            }
        });
        Self {
            poller,
            drivers,
            wake,
            fds: Mutex::new(fds),
            settings,
        }
    }

    /// Build the four adapters on top of streams the caller already opened.
    pub fn from_sources(sources: DriverSources, config: &HalConfig) -> Self {
        let poller = Poller::new();
        let depth = config.input.queue_depth;
        let drivers: [Box<dyn SensorDriver>; DriverSlot::COUNT] = [
            Box::new(LightSensor::new(&poller, sources.light, depth)),
            Box::new(ProximitySensor::new(&poller, sources.proximity, depth)),
            Box::new(AkmSensor::new(&poller, sources.akm, depth)),
            Box::new(GyroSensor::new(&poller, sources.gyro, depth)),
        ];
        Self::with_drivers(poller, drivers, PollSettings::from(&config.poll))
    }

    /// Locate and open every input device named in `config`.
    pub async fn open(config: &HalConfig) -> OpenResult<Self> {
        config.validate()?;
        let light = open_source(config, DriverSlot::Light).await?;
        let proximity = open_source(config, DriverSlot::Proximity).await?;
        let akm = open_source(config, DriverSlot::Akm).await?;
        let gyro = open_source(config, DriverSlot::Gyro).await?;
        let context = Self::from_sources(DriverSources { light, proximity, akm, gyro }, config);
        info!("[poll] context ready with {} drivers", DriverSlot::COUNT);
        Ok(context)
    }

    pub fn driver(&self, slot: DriverSlot) -> &dyn SensorDriver {
        self.drivers[slot.index()].as_ref()
    }

    pub async fn activate(&self, handle: SensorHandle, enabled: bool) -> SensorResult<()> {
        let slot = handle_to_driver(handle)?;
        if slot == DriverSlot::Gyro && !enabled {
            // the gyro driver misbehaves when disabled right after its last sample
            debug!("[poll] waiting {:?} before disabling gyro", self.settings.gyro_disable_settle);
            tokio::time::sleep(self.settings.gyro_disable_settle).await;
        }

        let result = self.driver(slot).enable(handle, enabled).await;
        if enabled && result.is_ok() {
            self.wake.signal();
        }
        result
    }

    pub async fn set_delay(&self, handle: SensorHandle, delay_ns: i64) -> SensorResult<()> {
        let slot = handle_to_driver(handle)?;
        self.driver(slot).set_delay(handle, delay_ns).await
    }

    pub async fn batch(&self, handle: SensorHandle, flags: i32, sampling_period_ns: i64, max_report_latency_ns: i64) -> SensorResult<()> {
        let slot = handle_to_driver(handle)?;
        self.driver(slot)
            .batch(handle, flags, sampling_period_ns, max_report_latency_ns)
            .await
    }

    pub async fn flush(&self, handle: SensorHandle) -> SensorResult<()> {
        let slot = handle_to_driver(handle)?;
        self.driver(slot).flush(handle).await
    }

    /// Fill `data` with up to `data.len()` events, blocking until at least
    /// one is available.
    ///
    /// Each round drains every adapter that was ready or still holds decoded
    /// events, then waits on the whole set. The wait only blocks when nothing
    /// has been gathered yet. A wake signal ends the wait without producing
    /// events, so a newly enabled sensor joins the next round.
    pub async fn poll_events(&self, data: &mut [SensorEvent]) -> SensorResult<usize> {
        let mut fds = self.fds.lock().await;
        let mut count = data.len();
        let mut nb_events = 0;

        loop {
            for (i, driver) in self.drivers.iter().enumerate() {
                if count == 0 {
                    break;
                }
                if fds[i].revents.is_readable() || driver.has_pending_events() {
                    let nb = driver.read_events(&mut data[nb_events..]).min(count);
                    debug_assert!(nb <= count);
                    if nb < count {
                        // no more immediately available
                        fds[i].revents = Interest::NONE;
                    }
                    count -= nb;
                    nb_events += nb;
                }
            }

            if count == 0 {
                break;
            }

            let timeout = if nb_events > 0 { Timeout::Immediate } else { Timeout::Infinite };
            let ready = match self.poller.poll(&mut fds[..], timeout).await {
                Ok(ready) => ready,
                Err(e) => {
                    error!("[poll] wait failed: {}", e);
                    return Err(e.into());
                }
            };

            if fds[WAKE_SLOT].revents.is_readable() {
                let drained = self.wake.consume();
                trace!("[poll] consumed {} wake message(s)", drained);
                fds[WAKE_SLOT].revents = Interest::NONE;
            }

            if ready == 0 {
                break;
            }
        }

        Ok(nb_events)
    }

    /// Release every adapter and the wake channel.
    pub fn close(self) {
        info!("[poll] closing context");
        drop(self);
    }
}

async fn open_source(config: &HalConfig, slot: DriverSlot) -> OpenResult<InputSource> {
    let driver = config.drivers.get(slot);
    let paths = match (&driver.device, &driver.control) {
        (Some(device), Some(control)) => InputDevicePaths {
            device: device.clone(),
            control: control.clone(),
        },
        (device, control) => {
            let found = find_input_device(&config.input.sysfs_root, &config.input.dev_root, &driver.input_name).await?;
            InputDevicePaths {
                device: device.clone().unwrap_or(found.device),
                control: control.clone().unwrap_or(found.control),
            }
        }
    };

    let node = EventNode::open(&paths.device).map_err(|source| OpenError::DeviceOpen {
        path: paths.device.clone(),
        source,
    })?;
    info!(
        "[poll] {:?} driver reading {} (control {})",
        slot,
        paths.device.display(),
        paths.control.display()
    );
    Ok(InputSource::new(node, paths.control))
}

impl std::fmt::Debug for PollContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollContext")
            .field("drivers", &SLOTS.map(|slot| self.driver(slot).name()))
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SensorError;
    use crate::messages::SensorType;
    use crate::wait::{pipe, PipeReader, PipeWriter, WaitError};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex as StdMutex};
    use tokio::time::Instant;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Enable(SensorHandle, bool),
        Delay(SensorHandle, i64),
        Batch(SensorHandle),
        Flush(SensorHandle),
    }

    type CallLog = Arc<StdMutex<Vec<(Call, Instant)>>>;

    struct MockDriver {
        name: &'static str,
        rx: PipeReader<SensorEvent>,
        calls: CallLog,
    }

    struct MockHandle {
        tx: PipeWriter<SensorEvent>,
        calls: CallLog,
    }

    impl MockHandle {
        fn push(&self, sensor: SensorHandle, n: usize) {
            for i in 0..n {
                self.tx
                    .send(SensorEvent::scalar(sensor, SensorType::Light, i as i64, i as f32))
                    .unwrap();
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
        }
    }

    fn mock(poller: &Poller, name: &'static str) -> (Box<dyn SensorDriver>, MockHandle) {
        let (tx, rx) = pipe(poller, 64);
        let calls = CallLog::default();
        let driver = MockDriver { name, rx, calls: calls.clone() };
        (Box::new(driver), MockHandle { tx, calls })
    }

    impl MockDriver {
        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push((call, Instant::now()));
        }
    }

    #[async_trait]
    impl SensorDriver for MockDriver {
        fn name(&self) -> &'static str {
            self.name
        }

        fn descriptor(&self) -> crate::wait::WaitDescriptor {
            self.rx.descriptor()
        }

        async fn enable(&self, handle: SensorHandle, enabled: bool) -> SensorResult<()> {
            self.record(Call::Enable(handle, enabled));
            Ok(())
        }

        async fn set_delay(&self, handle: SensorHandle, delay_ns: i64) -> SensorResult<()> {
            self.record(Call::Delay(handle, delay_ns));
            Ok(())
        }

        async fn batch(&self, handle: SensorHandle, _flags: i32, _period: i64, _latency: i64) -> SensorResult<()> {
            self.record(Call::Batch(handle));
            Ok(())
        }

        async fn flush(&self, handle: SensorHandle) -> SensorResult<()> {
            self.record(Call::Flush(handle));
            Ok(())
        }

        fn has_pending_events(&self) -> bool {
            false
        }

        fn read_events(&self, out: &mut [SensorEvent]) -> usize {
            let mut n = 0;
            while n < out.len() {
                match self.rx.try_recv() {
                    Some(event) => {
                        out[n] = event;
                        n += 1;
                    }
                    None => break,
                }
            }
            n
        }
    }

    fn context(settle: Duration) -> (PollContext, [MockHandle; 4]) {
        let poller = Poller::new();
        let (light, light_h) = mock(&poller, "light");
        let (prox, prox_h) = mock(&poller, "proximity");
        let (akm, akm_h) = mock(&poller, "akm");
        let (gyro, gyro_h) = mock(&poller, "gyro");
        let settings = PollSettings {
            gyro_disable_settle: settle,
            wake_pipe_capacity: 4,
        };
        let ctx = PollContext::with_drivers(poller, [light, prox, akm, gyro], settings);
        (ctx, [light_h, prox_h, akm_h, gyro_h])
    }

    #[tokio::test]
    async fn test_poll_never_exceeds_capacity() {
        let (ctx, handles) = context(Duration::ZERO);
        handles[DriverSlot::Light.index()].push(3, 5);
        handles[DriverSlot::Akm.index()].push(0, 5);

        let mut buf = [SensorEvent::default(); 3];
        assert_eq!(ctx.poll_events(&mut buf).await.unwrap(), 3);
        assert!(buf.iter().all(|e| e.sensor == 3));

        assert_eq!(ctx.poll_events(&mut buf).await.unwrap(), 3);
        assert_eq!([buf[0].sensor, buf[1].sensor, buf[2].sensor], [3, 3, 0]);

        let mut big = [SensorEvent::default(); 10];
        assert_eq!(ctx.poll_events(&mut big).await.unwrap(), 4);
        assert!(big[..4].iter().all(|e| e.sensor == 0));
    }

    #[tokio::test]
    async fn test_drains_in_slot_order() {
        let (ctx, handles) = context(Duration::ZERO);
        handles[DriverSlot::Gyro.index()].push(5, 1);
        handles[DriverSlot::Proximity.index()].push(4, 1);
        handles[DriverSlot::Light.index()].push(3, 1);

        let mut buf = [SensorEvent::default(); 8];
        let n = ctx.poll_events(&mut buf).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!([buf[0].sensor, buf[1].sensor, buf[2].sensor], [3, 4, 5]);
    }

    #[tokio::test]
    async fn test_routing_errors_touch_nothing() {
        let (ctx, handles) = context(Duration::ZERO);
        for handle in [-1, 7, 99] {
            assert!(matches!(ctx.activate(handle, true).await, Err(SensorError::InvalidHandle { .. })));
            assert!(ctx.set_delay(handle, 1).await.is_err());
            assert!(ctx.batch(handle, 0, 1, 0).await.is_err());
            assert!(ctx.flush(handle).await.is_err());
        }
        assert!(handles.iter().all(|h| h.calls().is_empty()));
        assert!(!ctx.wake.descriptor().is_readable());
    }

    #[tokio::test]
    async fn test_control_calls_reach_owning_driver() {
        let (ctx, handles) = context(Duration::ZERO);
        ctx.set_delay(1, 30_000_000).await.unwrap();
        ctx.batch(5, 0, 10, 0).await.unwrap();
        ctx.flush(4).await.unwrap();
        ctx.activate(6, true).await.unwrap();

        assert_eq!(handles[DriverSlot::Akm.index()].calls(), vec![Call::Delay(1, 30_000_000), Call::Enable(6, true)]);
        assert_eq!(handles[DriverSlot::Gyro.index()].calls(), vec![Call::Batch(5)]);
        assert_eq!(handles[DriverSlot::Proximity.index()].calls(), vec![Call::Flush(4)]);
        assert!(handles[DriverSlot::Light.index()].calls().is_empty());
    }

    #[tokio::test]
    async fn test_only_enable_signals_wake() {
        let (ctx, _handles) = context(Duration::ZERO);
        ctx.activate(3, true).await.unwrap();
        assert!(ctx.wake.descriptor().is_readable());
        ctx.wake.consume();

        ctx.activate(3, false).await.unwrap();
        assert!(!ctx.wake.descriptor().is_readable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gyro_disable_waits_settle_delay() {
        let (ctx, handles) = context(Duration::from_millis(200));
        let gyro = &handles[DriverSlot::Gyro.index()];

        let start = Instant::now();
        ctx.activate(5, true).await.unwrap();
        ctx.activate(5, false).await.unwrap();
        let times = gyro.call_times();
        assert_eq!(times[0] - start, Duration::ZERO);
        assert!(times[1] - start >= Duration::from_millis(200));

        let light = &handles[DriverSlot::Light.index()];
        let before = Instant::now();
        ctx.activate(3, false).await.unwrap();
        ctx.activate(0, false).await.unwrap();
        assert_eq!(light.call_times()[0] - before, Duration::ZERO);
        assert_eq!(handles[DriverSlot::Akm.index()].call_times()[0] - before, Duration::ZERO);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_activate_wakes_blocked_poll() {
        let (ctx, handles) = context(Duration::from_millis(5));
        let ctx = Arc::new(ctx);

        let poll_ctx = ctx.clone();
        let poll = tokio::spawn(async move {
            let mut buf = [SensorEvent::default(); 8];
            let n = poll_ctx.poll_events(&mut buf).await.unwrap();
            (n, buf)
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.activate(5, true).await.unwrap();
        ctx.activate(5, false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        // the wake alone produces nothing, so the call keeps waiting
        assert!(!poll.is_finished());

        handles[DriverSlot::Light.index()].push(3, 2);
        let (n, buf) = tokio::time::timeout(Duration::from_secs(5), poll).await.unwrap().unwrap();
        assert_eq!(n, 2);
        assert!(buf[..n].iter().all(|e| e.sensor == 3));
        assert!(!ctx.wake.descriptor().is_readable());
    }

    #[tokio::test]
    async fn test_wait_failure_is_returned_and_context_survives() {
        let poller = Poller::new();
        let stranger = Poller::new();
        let (light, light_h) = mock(&poller, "light");
        let (prox, _) = mock(&poller, "proximity");
        let (akm, _) = mock(&poller, "akm");
        let (gyro, _) = mock(&stranger, "gyro");
        let ctx = PollContext::with_drivers(poller, [light, prox, akm, gyro], PollSettings::default());

        let mut buf = [SensorEvent::default(); 4];
        let err = ctx.poll_events(&mut buf).await.unwrap_err();
        assert!(matches!(err, SensorError::Wait(WaitError::ForeignDescriptor { slot: 3 })));
        assert_eq!(err.errno(), -crate::errors::EINVAL);

        ctx.activate(3, true).await.unwrap();
        assert_eq!(light_h.calls(), vec![Call::Enable(3, true)]);

        assert!(ctx.poll_events(&mut buf).await.is_err());
    }
}
