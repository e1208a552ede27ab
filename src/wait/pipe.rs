use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::Notify;

use super::{Poller, Readable, WaitDescriptor};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeError {
    #[error("pipe is full")]
    WouldBlock,
    #[error("read end of the pipe is closed")]
    Closed,
}

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    reader_open: AtomicBool,
    notify: Arc<Notify>,
}

impl<T> Shared<T> {
    fn queue(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send> Readable for Shared<T> {
    fn is_readable(&self) -> bool {
        !self.queue().is_empty()
    }
}

/// Write end of a bounded, non-blocking pipe
pub struct PipeWriter<T> {
    shared: Arc<Shared<T>>,
}

/// Read end of a bounded, non-blocking pipe
pub struct PipeReader<T> {
    shared: Arc<Shared<T>>,
}

/// Create a pipe whose read end is readable while it holds at least one item.
pub fn pipe<T: Send + 'static>(poller: &Poller, capacity: usize) -> (PipeWriter<T>, PipeReader<T>) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity,
        reader_open: AtomicBool::new(true),
        notify: poller.notify_handle(),
    });
    (
        PipeWriter { shared: shared.clone() },
        PipeReader { shared },
    )
}

impl<T> PipeWriter<T> {
    /// Push one item without blocking and wake the poller.
    pub fn send(&self, item: T) -> Result<(), PipeError> {
        if !self.shared.reader_open.load(Ordering::Acquire) {
            return Err(PipeError::Closed);
        }
        {
            let mut queue = self.shared.queue();
            if queue.len() >= self.shared.capacity {
                return Err(PipeError::WouldBlock);
            }
            queue.push_back(item);
        }
        self.shared.notify.notify_one();
        Ok(())
    }
}

impl<T> Clone for PipeWriter<T> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<T: Send + 'static> PipeReader<T> {
    pub fn try_recv(&self) -> Option<T> {
        self.shared.queue().pop_front()
    }

    /// Take everything currently queued.
    pub fn drain(&self) -> Vec<T> {
        self.shared.queue().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.shared.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn descriptor(&self) -> WaitDescriptor {
        WaitDescriptor {
            level: self.shared.clone(),
            notify: self.shared.notify.clone(),
        }
    }
}

impl<T> Drop for PipeReader<T> {
    fn drop(&mut self) {
        self.shared.reader_open.store(false, Ordering::Release);
    }
}
