use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Frame, InputEvent, INPUT_EVENT_SIZE};
use crate::wait::{PipeError, PipeWriter};

/// Background task that moves raw input records into a driver's frame pipe.
///
/// The task ends on EOF, on a read error, or once the pipe's read end is
/// gone. Dropping the reader aborts it.
pub struct InputReader {
    task: JoinHandle<()>,
}

impl InputReader {
    pub fn spawn<R>(name: &'static str, mut source: R, frames: PipeWriter<Frame>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let task = tokio::spawn(async move {
            debug!("[input] {} reader started", name);
            let mut buf = [0u8; INPUT_EVENT_SIZE];
            let mut dropped = 0u64;

            loop {
                if let Err(e) = source.read_exact(&mut buf).await {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        info!("[input] {} reached end of stream", name);
                    } else {
                        error!("[input] {} read failed: {}; no further events", name, e);
                    }
                    break;
                }

                let event = InputEvent::from_bytes(&buf);
                match frames.send(Frame::Input(event)) {
                    Ok(()) => {}
                    Err(PipeError::WouldBlock) => {
                        dropped += 1;
                        if dropped.is_power_of_two() {
                            warn!("[input] {} queue full, {} event(s) dropped", name, dropped);
                        }
                    }
                    Err(PipeError::Closed) => break,
                }
            }
        });
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for InputReader {
    fn drop(&mut self) {
        self.task.abort();
    }
}
