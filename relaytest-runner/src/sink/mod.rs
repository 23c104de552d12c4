// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Destinations for report output.
//!
//! Every destination implements [`ReportSink`]. Sinks are string-only: the report is always UTF-8
//! text, so there is no need to deal with arbitrary bytes. Sinks are opened by
//! [`open_sink`](crate::selector::open_sink) and owned by the
//! [`ResultListener`](crate::listener::ResultListener) for the duration of a run.

mod console;
mod file;
mod http;
mod junit;
mod tcp;

pub use console::{ConsoleBuffer, ConsoleOutput, ConsoleSink};
pub(crate) use file::FileSink;
pub(crate) use http::HttpSink;
pub use junit::JunitSink;
pub(crate) use tcp::TcpSink;

use crate::{
    errors::{SinkCloseError, SinkCompletionError},
    events::NodeResult,
};
use futures::future::BoxFuture;
use std::{fmt, io};

/// Resolves once a sink has delivered all of its buffered output.
///
/// Only sinks that deliver off-thread return one of these from [`ReportSink::close`].
pub type SinkCompletion = BoxFuture<'static, Result<(), SinkCompletionError>>;

/// A write-only destination for report output.
///
/// For more, see the [module-level documentation](self).
pub trait ReportSink: Send {
    /// Writes a string to the sink.
    fn write_str(&mut self, s: &str) -> io::Result<()>;

    /// Flushes the sink, ensuring that all intermediately buffered contents reach their
    /// destination.
    fn flush(&mut self) -> io::Result<()>;

    /// Writes a formatted string to the sink.
    ///
    /// This makes `write!` and `writeln!` usable with sinks.
    fn write_fmt(&mut self, fmt: fmt::Arguments<'_>) -> io::Result<()> {
        // This code is adapted from the `write_fmt` implementation for `std::io::Write`, and is
        // used under the terms of the MIT and Apache-2.0 licenses.

        // Create a shim which translates self to a fmt::Write and saves off errors instead of
        // discarding them.
        struct Adapter<'a, T: ?Sized> {
            inner: &'a mut T,
            error: Result<(), io::Error>,
        }

        impl<T: ?Sized + ReportSink> fmt::Write for Adapter<'_, T> {
            fn write_str(&mut self, s: &str) -> fmt::Result {
                self.inner.write_str(s).map_err(|error| {
                    self.error = Err(error);
                    fmt::Error
                })
            }
        }

        let mut output = Adapter {
            inner: self,
            error: Ok(()),
        };
        match fmt::write(&mut output, fmt) {
            Ok(()) => Ok(()),
            // Check if the error came from the underlying sink or not.
            Err(_) if output.error.is_err() => output.error,
            Err(_) => Err(io::Error::other("formatter error")),
        }
    }

    /// Records the result of a finished node.
    ///
    /// Plain-text sinks ignore this: the listener has already written the formatted line. The
    /// [`JunitSink`] uses it to build its report.
    fn record_result(&mut self, result: &NodeResult<'_>) {
        let _ = result;
    }

    /// Flushes and closes the sink.
    ///
    /// Sinks that hand output to a background task return a [`SinkCompletion`] that resolves once
    /// delivery is confirmed.
    fn close(self: Box<Self>) -> Result<Option<SinkCompletion>, SinkCloseError>;
}
