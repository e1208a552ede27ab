//! Readiness multiplexing for the poll context.
//!
//! A [`Poller`] hands out level-triggered [`WaitDescriptor`]s through
//! [`pipe`]. Every descriptor bound to a poller shares the poller's
//! [`Notify`], so one waiting task can sleep on all of them at once.
//! `Notify` keeps a permit when nobody is waiting, which means a producer that
//! signals between the readiness scan and the await is never lost.

mod pipe;
mod wake;

pub use pipe::{pipe, PipeError, PipeReader, PipeWriter};
pub use wake::{WakeChannel, WAKE_MESSAGE};

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::trace;

/// Failure of a multiplexed wait
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    #[error("descriptor in slot {slot} is not registered with this poller")]
    ForeignDescriptor { slot: usize },
}

impl WaitError {
    pub fn errno(&self) -> i32 {
        match self {
            WaitError::ForeignDescriptor { .. } => crate::errors::EINVAL,
        }
    }
}

/// Interest / readiness mask of a [`PollFd`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest(u8);

impl Interest {
    pub const NONE: Interest = Interest(0);
    pub const READABLE: Interest = Interest(0b1);

    pub fn is_readable(self) -> bool {
        self.0 & Self::READABLE.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// How long [`Poller::poll`] may block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Scan once and return
    Immediate,
    /// Block until at least one descriptor is ready
    Infinite,
}

/// Level query implemented by whatever backs a descriptor
pub(crate) trait Readable: Send + Sync {
    fn is_readable(&self) -> bool;
}

/// Handle to a readiness source, cheap to clone
#[derive(Clone)]
pub struct WaitDescriptor {
    level: Arc<dyn Readable>,
    notify: Arc<Notify>,
}

impl WaitDescriptor {
    pub fn is_readable(&self) -> bool {
        self.level.is_readable()
    }

    fn belongs_to(&self, poller: &Poller) -> bool {
        Arc::ptr_eq(&self.notify, &poller.notify)
    }
}

impl std::fmt::Debug for WaitDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitDescriptor")
            .field("readable", &self.is_readable())
            .finish()
    }
}

/// One entry of a wait set: descriptor, requested interest, returned readiness
#[derive(Debug, Clone)]
pub struct PollFd {
    pub descriptor: WaitDescriptor,
    pub events: Interest,
    pub revents: Interest,
}

impl PollFd {
    pub fn readable(descriptor: WaitDescriptor) -> Self {
        Self {
            descriptor,
            events: Interest::READABLE,
            revents: Interest::NONE,
        }
    }
}

/// Multiplexed wait over the descriptors created from it
#[derive(Clone, Default)]
pub struct Poller {
    notify: Arc<Notify>,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill in `revents` for every entry and return how many are ready.
    ///
    /// With [`Timeout::Infinite`] this only returns once something is ready.
    /// Entries with an empty interest mask are skipped.
    pub async fn poll(&self, fds: &mut [PollFd], timeout: Timeout) -> Result<usize, WaitError> {
        if let Some(slot) = fds.iter().position(|fd| !fd.descriptor.belongs_to(self)) {
            return Err(WaitError::ForeignDescriptor { slot });
        }

        loop {
            let ready = Self::scan(fds);
            if ready > 0 || timeout == Timeout::Immediate {
                trace!("[poll] {} descriptor(s) ready", ready);
                return Ok(ready);
            }
            self.notify.notified().await;
        }
    }

    fn scan(fds: &mut [PollFd]) -> usize {
        let mut ready = 0;
        for fd in fds.iter_mut() {
            fd.revents = if fd.events.is_readable() && fd.descriptor.is_readable() {
                Interest::READABLE
            } else {
                Interest::NONE
            };
            if !fd.revents.is_empty() {
                ready += 1;
            }
        }
        ready
    }

    pub(crate) fn notify_handle(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}
