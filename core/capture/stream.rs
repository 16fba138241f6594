use super::*;
use crate::events::Logger;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::unistd;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tracing::*;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum ReadStatus {
    /// Everything available was read, the writer may still send more.
    Open,
    Eof,
}

struct StreamState {
    reader: Option<OwnedFd>,
    buffer: LineBuffer,
    eof: bool,
}

/// The read side of a captured stream, shared with the reader thread.
///
pub(crate) struct StreamInner {
    fd: RawFd,
    kind: StreamKind,
    state: Mutex<StreamState>,
    lines: Arc<Mutex<Vec<OutputLine>>>,
    echo: Option<Arc<dyn Logger>>,
}

impl StreamInner {
    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    /// Read everything currently available.
    ///
    /// In non-blocking mode this stops as soon as the pipe is empty; in blocking mode it keeps
    /// going until the writer side is closed.
    ///
    pub(crate) fn read(&self) -> Result<ReadStatus, CaptureError> {
        let mut state = lock(&self.state);
        if state.eof {
            return Ok(ReadStatus::Eof);
        }
        let Some(fd) = state.reader.as_ref().map(AsRawFd::as_raw_fd) else {
            return Ok(ReadStatus::Eof);
        };

        let mut buf = [0u8; 4096];
        loop {
            match unistd::read(fd, &mut buf) {
                Ok(0) => {
                    state.eof = true;
                    let last = state.buffer.finish();
                    self.append(last);
                    return Ok(ReadStatus::Eof);
                }
                Ok(n) => {
                    let bytes = &buf[..n];
                    if let Some(echo) = &self.echo {
                        match self.kind {
                            StreamKind::Stdout => echo.stdout(bytes),
                            StreamKind::Stderr => echo.stderr(bytes),
                        }
                    }
                    let lines = state.buffer.push(bytes);
                    self.append(lines);
                }
                Err(Errno::EINTR) => continue,
                Err(Errno::EAGAIN) => return Ok(ReadStatus::Open),
                Err(err) => return Err(CaptureError::Pipe(err)),
            }
        }
    }

    fn append<I: IntoIterator<Item = String>>(&self, lines: I) {
        let mut sink = lock(&self.lines);
        sink.extend(lines.into_iter().map(|text| OutputLine::new(text, self.kind)));
    }
}

impl std::fmt::Debug for StreamInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamInner")
            .field("fd", &self.fd)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

fn set_nonblocking(fd: RawFd, nonblocking: bool) -> Result<(), CaptureError> {
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(CaptureError::Pipe)?;
    let mut flags = OFlag::from_bits_truncate(flags);
    flags.set(OFlag::O_NONBLOCK, nonblocking);
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(CaptureError::Pipe)?;
    Ok(())
}

/// Create a pipe whose descriptors are not inherited by children.
pub(crate) fn pipe(flags: OFlag) -> Result<(OwnedFd, OwnedFd), CaptureError> {
    let (read, write) = unistd::pipe2(flags | OFlag::O_CLOEXEC).map_err(CaptureError::Pipe)?;
    // SAFETY: pipe2 just created both descriptors and nothing else refers to them.
    Ok(unsafe { (OwnedFd::from_raw_fd(read), OwnedFd::from_raw_fd(write)) })
}

/// One captured standard stream of a child process.
///
#[derive(Debug)]
pub(crate) struct OutputStream {
    inner: Arc<StreamInner>,
    writer: Option<OwnedFd>,
}

impl OutputStream {
    pub(crate) fn open(
        kind: StreamKind,
        lines: Arc<Mutex<Vec<OutputLine>>>,
        echo: Option<Arc<dyn Logger>>,
        reader: &OutputReader,
    ) -> Result<Self, CaptureError> {
        let (read, write) = pipe(OFlag::empty())?;
        set_nonblocking(read.as_raw_fd(), true)?;

        let inner = Arc::new(StreamInner {
            fd: read.as_raw_fd(),
            kind,
            state: Mutex::new(StreamState {
                reader: Some(read),
                buffer: LineBuffer::default(),
                eof: false,
            }),
            lines,
            echo,
        });
        reader.register(inner.clone())?;
        trace!("Capturing {:?} on fd {}", kind, inner.fd);

        Ok(Self {
            inner,
            writer: Some(write),
        })
    }

    /// The end the child writes to. Once handed out, this process no longer holds it, so the
    /// stream ends when the child exits.
    pub(crate) fn stdio(&mut self) -> Stdio {
        self.writer
            .take()
            .map(Stdio::from)
            .unwrap_or_else(Stdio::null)
    }

    /// Stop capturing and collect whatever the reader thread has not read yet.
    ///
    /// The stream is taken away from the reader thread before the write end is dropped and the
    /// read end made blocking, so the final read runs alone and stops at end of stream.
    ///
    pub(crate) fn close(mut self, reader: &OutputReader) -> Result<(), CaptureError> {
        let unregistered = reader.unregister(self.inner.fd);
        self.writer = None;

        let drained = set_nonblocking(self.inner.fd, false).and_then(|()| self.inner.read());
        lock(&self.inner.state).reader = None;

        unregistered?;
        drained.map(|_| ())
    }
}
