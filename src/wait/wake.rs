use tracing::{error, trace, warn};

use super::{pipe, PipeError, PipeReader, PipeWriter, Poller, WaitDescriptor};

pub const WAKE_MESSAGE: u8 = b'W';

/// Self-signal used to interrupt a blocked multiplexed wait
pub struct WakeChannel {
    tx: PipeWriter<u8>,
    rx: PipeReader<u8>,
}

impl WakeChannel {
    pub fn new(poller: &Poller, capacity: usize) -> Self {
        let (tx, rx) = pipe(poller, capacity.max(1));
        Self { tx, rx }
    }

    pub fn descriptor(&self) -> WaitDescriptor {
        self.rx.descriptor()
    }

    /// Best effort: a full pipe already holds a byte that keeps the wait set ready.
    pub fn signal(&self) {
        match self.tx.send(WAKE_MESSAGE) {
            Ok(()) => trace!("[wake] wake message sent"),
            Err(PipeError::WouldBlock) => trace!("[wake] wake pipe full, signal coalesced"),
            Err(e) => error!("[wake] error sending wake message ({})", e),
        }
    }

    /// Discard every pending byte. Returns how many were drained.
    pub fn consume(&self) -> usize {
        let bytes = self.rx.drain();
        for &msg in bytes.iter().filter(|&&b| b != WAKE_MESSAGE) {
            warn!("[wake] unknown message on wake queue (0x{:02x})", msg);
        }
        bytes.len()
    }
}
