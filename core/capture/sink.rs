use super::*;
use crate::events::Logger;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tracing::*;

/// The captured output of one process: both of its streams, and the lines read from them in the
/// order they arrived.
///
#[derive(Debug)]
pub(crate) struct OutputSink {
    lines: Arc<Mutex<Vec<OutputLine>>>,
    stdout: OutputStream,
    stderr: OutputStream,
}

impl OutputSink {
    /// Open both streams. When `echo` is set, raw output is forwarded to it as soon as it is read.
    pub(crate) fn open(
        reader: &OutputReader,
        echo: Option<Arc<dyn Logger>>,
    ) -> Result<Self, CaptureError> {
        let lines = Arc::new(Mutex::new(vec![]));
        let stdout = OutputStream::open(StreamKind::Stdout, lines.clone(), echo.clone(), reader)?;
        let stderr = match OutputStream::open(StreamKind::Stderr, lines.clone(), echo, reader) {
            Ok(stderr) => stderr,
            Err(err) => {
                if let Err(close_err) = stdout.close(reader) {
                    warn!("Could not close a half open output sink: {}", close_err);
                }
                return Err(err);
            }
        };
        Ok(Self {
            lines,
            stdout,
            stderr,
        })
    }

    pub(crate) fn stdout(&mut self) -> Stdio {
        self.stdout.stdio()
    }

    pub(crate) fn stderr(&mut self) -> Stdio {
        self.stderr.stdio()
    }

    /// Finish capturing. Only call this once the process has exited.
    ///
    pub(crate) fn close(self, reader: &OutputReader) -> Vec<OutputLine> {
        for stream in [self.stdout, self.stderr] {
            if let Err(err) = stream.close(reader) {
                warn!("Lost some output while closing a stream: {}", err);
            }
        }
        std::mem::take(&mut *lock(&self.lines))
    }
}
