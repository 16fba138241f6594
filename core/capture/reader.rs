use super::*;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{poll, PollFd, PollFlags};
use nix::unistd;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::*;

enum Registration {
    Add(Arc<StreamInner>),
    Remove { fd: RawFd, done: Sender<()> },
    Shutdown,
}

/// The background thread that reads the output of every running command.
///
/// Registrations travel over a channel. Every message is followed by a byte on a wake pipe that
/// the thread polls alongside the streams, so it never keeps waiting on a stale set of streams.
///
/// Dropping the reader stops the thread.
///
pub struct OutputReader {
    messages: Sender<Registration>,
    wake: OwnedFd,
    thread: Option<JoinHandle<()>>,
}

impl OutputReader {
    #[tracing::instrument(name = "OutputReader::start")]
    pub fn start() -> Result<Self, CaptureError> {
        let (messages, inbox) = channel::unbounded();
        let (wake_read, wake) = pipe(OFlag::O_NONBLOCK)?;

        let thread = std::thread::Builder::new()
            .name("forge-output-reader".to_string())
            .spawn(move || {
                ReaderLoop {
                    inbox,
                    wake: wake_read,
                    streams: vec![],
                }
                .run()
            })?;

        Ok(Self {
            messages,
            wake,
            thread: Some(thread),
        })
    }

    pub(crate) fn register(&self, stream: Arc<StreamInner>) -> Result<(), CaptureError> {
        self.send(Registration::Add(stream))
    }

    /// Stop reading from a stream. Once this returns, the reader thread will not touch it again.
    ///
    pub(crate) fn unregister(&self, fd: RawFd) -> Result<(), CaptureError> {
        let (done, removed) = channel::bounded(1);
        self.send(Registration::Remove { fd, done })?;
        removed.recv().map_err(|_| CaptureError::ReaderGone)
    }

    fn send(&self, message: Registration) -> Result<(), CaptureError> {
        self.messages
            .send(message)
            .map_err(|_| CaptureError::ReaderGone)?;
        loop {
            match unistd::write(self.wake.as_raw_fd(), &[1]) {
                Err(Errno::EINTR) => continue,
                // A full pipe already has a wake-up pending.
                Ok(_) | Err(Errno::EAGAIN) => return Ok(()),
                Err(err) => return Err(CaptureError::Pipe(err)),
            }
        }
    }
}

impl Drop for OutputReader {
    fn drop(&mut self) {
        if let Err(err) = self.send(Registration::Shutdown) {
            debug!("Output reader already stopped: {}", err);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("The output reader thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for OutputReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputReader")
            .field("running", &self.thread.is_some())
            .finish_non_exhaustive()
    }
}

struct ReaderLoop {
    inbox: Receiver<Registration>,
    wake: OwnedFd,
    streams: Vec<Arc<StreamInner>>,
}

impl ReaderLoop {
    fn run(mut self) {
        debug!("Output reader started");
        while self.apply_registrations() {
            let readable = match self.wait() {
                Ok(readable) => readable,
                Err(Errno::EINTR) => continue,
                Err(err) => {
                    error!("Output reader stopped polling: {}", err);
                    return;
                }
            };

            let mut finished = vec![];
            for (stream, readable) in self.streams.iter().zip(readable) {
                if !readable {
                    continue;
                }
                match stream.read() {
                    Ok(ReadStatus::Open) => (),
                    Ok(ReadStatus::Eof) => finished.push(stream.fd()),
                    Err(err) => {
                        warn!("Stopped reading fd {}: {}", stream.fd(), err);
                        finished.push(stream.fd());
                    }
                }
            }
            self.streams.retain(|stream| !finished.contains(&stream.fd()));
        }
        debug!("Output reader stopped");
    }

    /// Returns false once the reader should stop.
    fn apply_registrations(&mut self) -> bool {
        loop {
            match self.inbox.try_recv() {
                Ok(Registration::Add(stream)) => self.streams.push(stream),
                Ok(Registration::Remove { fd, done }) => {
                    self.streams.retain(|stream| stream.fd() != fd);
                    let _ = done.send(());
                }
                Ok(Registration::Shutdown) | Err(TryRecvError::Disconnected) => return false,
                Err(TryRecvError::Empty) => return true,
            }
        }
    }

    /// Block until the wake pipe or a stream is readable. Returns which streams are.
    fn wait(&mut self) -> Result<Vec<bool>, Errno> {
        let interesting =
            PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL;
        let mut fds: Vec<PollFd> = std::iter::once(self.wake.as_raw_fd())
            .chain(self.streams.iter().map(|stream| stream.fd()))
            .map(|fd| PollFd::new(fd, PollFlags::POLLIN))
            .collect();
        poll(&mut fds, -1)?;

        let mut ready = fds
            .iter()
            .map(|fd| fd.revents().map_or(false, |revents| revents.intersects(interesting)));
        if ready.next().unwrap_or(false) {
            self.drain_wake_pipe();
        }
        Ok(ready.collect())
    }

    fn drain_wake_pipe(&self) {
        let mut buf = [0u8; 64];
        loop {
            match unistd::read(self.wake.as_raw_fd(), &mut buf) {
                Ok(n) if n == buf.len() => continue,
                Err(Errno::EINTR) => continue,
                _ => return,
            }
        }
    }
}
