use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, Interest, ReadBuf};

/// Non-blocking `/dev/input/eventN` reader.
///
/// Reads wait on reactor readiness instead of a blocking-pool thread, so
/// dropping the node (or aborting the task that owns it) closes the
/// descriptor even when the device never reports again. Regular files, such
/// as recorded event captures, are always readable and are read directly.
pub struct EventNode {
    inner: NodeInner,
}

enum NodeInner {
    Polled(AsyncFd<File>),
    Plain(File),
}

impl EventNode {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(path)?;
        Self::from_file(file)
    }

    /// Wrap an already-open descriptor. Character devices, pipes and sockets
    /// must be in non-blocking mode.
    pub fn from_file(file: File) -> io::Result<Self> {
        let inner = if file.metadata()?.is_file() {
            NodeInner::Plain(file)
        } else {
            NodeInner::Polled(AsyncFd::with_interest(file, Interest::READABLE)?)
        };
        Ok(Self { inner })
    }
}

impl AsyncRead for EventNode {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            NodeInner::Plain(file) => {
                let n = file.read(buf.initialize_unfilled())?;
                buf.advance(n);
                Poll::Ready(Ok(()))
            }
            NodeInner::Polled(fd) => loop {
                let mut guard = ready!(fd.poll_read_ready(cx))?;
                let unfilled = buf.initialize_unfilled();
                match guard.try_io(|inner| {
                    let mut file: &File = inner.get_ref();
                    file.read(unfilled)
                }) {
                    Ok(result) => {
                        let n = result?;
                        buf.advance(n);
                        return Poll::Ready(Ok(()));
                    }
                    Err(_would_block) => continue,
                }
            },
        }
    }
}
