//! # Output capture
//!
//! Every command gets an `OutputSink` with one `OutputStream` per standard stream. The child
//! writes into pipes, and a single `OutputReader` thread per engine waits on every registered pipe
//! at once, turning the bytes into `OutputLine`s as they arrive. The scheduler thread never reads
//! from a pipe until the command has exited, at which point it closes the sink and drains what
//! is left.
//!
mod reader;
mod sink;
mod stream;

pub use reader::*;
pub(crate) use sink::*;
pub(crate) use stream::*;

use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::*;

#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// One line printed by a command, without its trailing newline.
///
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct OutputLine {
    text: String,
    stream: StreamKind,
}

impl OutputLine {
    pub fn new<S: Into<String>>(text: S, stream: StreamKind) -> Self {
        Self {
            text: text.into(),
            stream,
        }
    }

    pub fn stdout<S: Into<String>>(text: S) -> Self {
        Self::new(text, StreamKind::Stdout)
    }

    pub fn stderr<S: Into<String>>(text: S) -> Self {
        Self::new(text, StreamKind::Stderr)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    pub fn is_stderr(&self) -> bool {
        self.stream == StreamKind::Stderr
    }
}

impl std::fmt::Display for OutputLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Pipe operation failed: {0}")]
    Pipe(#[source] nix::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("The output reader thread is no longer running")]
    ReaderGone,
}

/// Splits a byte stream into lines, holding on to a trailing partial line between chunks.
///
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    partial: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, mut bytes: &[u8]) -> Vec<String> {
        let mut lines = vec![];
        while let Some(newline) = bytes.iter().position(|b| *b == b'\n') {
            self.partial.extend_from_slice(&bytes[..newline]);
            lines.push(String::from_utf8_lossy(&self.partial).into_owned());
            self.partial.clear();
            bytes = &bytes[newline + 1..];
        }
        self.partial.extend_from_slice(bytes);
        lines
    }

    /// Flush the last line, if the stream did not end with a newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial.clear();
        Some(line)
    }
}

/// Lock a mutex shared with the reader thread. A panic on the other side does not make the
/// captured lines any less valid.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
