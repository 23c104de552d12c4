// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ReportSink, SinkCompletion};
use crate::errors::SinkCloseError;
use std::{
    io::{self, Write},
    sync::{Arc, Mutex, PoisonError},
};

/// Where console output goes.
#[derive(Clone, Debug, Default)]
pub enum ConsoleOutput {
    /// Standard output.
    #[default]
    Stdout,

    /// An in-memory buffer, shared with the caller.
    Buffer(ConsoleBuffer),
}

impl ConsoleOutput {
    /// Opens a sink writing to this output.
    pub fn open(&self) -> ConsoleSink {
        ConsoleSink {
            output: self.clone(),
        }
    }
}

/// A string buffer shared between a [`ConsoleSink`] and its creator.
#[derive(Clone, Debug, Default)]
pub struct ConsoleBuffer {
    inner: Arc<Mutex<String>>,
}

impl ConsoleBuffer {
    /// Creates a new, empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything written so far.
    pub fn contents(&self) -> String {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, String> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The local console fallback sink.
///
/// Used when the transport is disabled, or when a sink could not be opened and the run continues
/// anyway.
#[derive(Debug)]
pub struct ConsoleSink {
    output: ConsoleOutput,
}

impl ReportSink for ConsoleSink {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        match &self.output {
            ConsoleOutput::Stdout => io::stdout().lock().write_all(s.as_bytes()),
            ConsoleOutput::Buffer(buffer) => {
                buffer.lock().push_str(s);
                Ok(())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &self.output {
            ConsoleOutput::Stdout => io::stdout().flush(),
            ConsoleOutput::Buffer(_) => Ok(()),
        }
    }

    fn close(mut self: Box<Self>) -> Result<Option<SinkCompletion>, SinkCloseError> {
        self.flush()?;
        Ok(None)
    }
}
