// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Formats lifecycle events into report lines and counts outcomes.

use crate::{
    errors::DisplayErrorChain,
    events::{NodeRef, NodeResult, ResultState, TestListener},
    platform::DeviceInfo,
    sink::{ReportSink, SinkCompletion},
};
use chrono::{DateTime, FixedOffset};
use std::{fmt, io};

/// Outcome counts for a run.
///
/// Counts only ever go up during a run; they are reset when a new sink is attached.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunCounts {
    /// Cases that passed.
    pub passed: usize,

    /// Cases that failed.
    pub failed: usize,

    /// Cases that were not run.
    pub ignored: usize,

    /// Cases that ran without passing or failing.
    pub inconclusive: usize,
}

impl RunCounts {
    /// Returns the number of cases that ran. Ignored cases did not run, so they're excluded.
    pub fn total_run(&self) -> usize {
        self.passed + self.failed + self.inconclusive
    }

    /// Returns true if any case failed.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    fn record(&mut self, state: ResultState) {
        match state {
            ResultState::Success => self.passed += 1,
            ResultState::Failure => self.failed += 1,
            ResultState::Ignored => self.ignored += 1,
            ResultState::Inconclusive => self.inconclusive += 1,
            ResultState::Info => {}
        }
    }
}

impl fmt::Display for RunCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tests run: {} Passed: {} Inconclusive: {} Failed: {} Ignored: {}",
            self.total_run(),
            self.passed,
            self.inconclusive,
            self.failed,
            self.ignored
        )
    }
}

/// Turns test events into plain-text report lines, written to the attached sink.
///
/// A listener without a sink still counts outcomes, but writes nothing.
#[derive(Default)]
pub struct ResultListener {
    sink: Option<Box<dyn ReportSink>>,
    counts: RunCounts,
    write_errors: usize,
}

impl fmt::Debug for ResultListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultListener")
            .field("open", &self.is_open())
            .field("counts", &self.counts)
            .field("write_errors", &self.write_errors)
            .finish()
    }
}

impl ResultListener {
    /// Creates a listener with no sink attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a sink and resets the counts for a new run.
    ///
    /// A sink that is still attached is closed first.
    pub fn attach(&mut self, sink: Box<dyn ReportSink>) {
        if self.sink.is_some() {
            tracing::debug!("closing previous report sink before attaching a new one");
            self.finish();
        }
        self.sink = Some(sink);
        self.counts = RunCounts::default();
        self.write_errors = 0;
    }

    /// Returns true if a sink is attached.
    pub fn is_open(&self) -> bool {
        self.sink.is_some()
    }

    /// Returns the counts for the current (or last) run.
    pub fn counts(&self) -> RunCounts {
        self.counts
    }

    /// Writes the report preamble.
    pub fn write_preamble(&mut self, label: &str, device: &DeviceInfo, now: DateTime<FixedOffset>) {
        self.write(|sink| {
            writeln!(sink, "[Runner executing:\t{label}]")?;
            writeln!(sink, "[Runner Version:\t{}]", env!("CARGO_PKG_VERSION"))?;
            writeln!(
                sink,
                "[Assembly:\t{} ({} bits)]",
                env!("CARGO_PKG_NAME"),
                usize::BITS
            )?;
            writeln!(sink, "[Allocator:\tsystem]")?;
            writeln!(
                sink,
                "[{}:\t{} v{}]",
                device.model, device.system_name, device.system_version
            )?;
            writeln!(sink, "[Device Name:\t{}]", device.name)?;
            writeln!(sink, "[Device Locale:\t{}]", device.locale)?;
            writeln!(
                sink,
                "[Device Date/Time:\t{}]",
                now.format("%Y-%m-%d %H:%M:%S %:z")
            )?;
            writeln!(sink, "[Bundle:\t{}]", device.bundle_id)
        });
    }

    /// Writes the summary line and closes the sink.
    ///
    /// The sink is detached whether or not closing it succeeds. Close errors are logged, not
    /// returned. Returns the sink's completion future, if it has one. Calling this without an
    /// attached sink does nothing.
    pub fn finish(&mut self) -> Option<SinkCompletion> {
        if self.sink.is_none() {
            return None;
        }

        let counts = self.counts;
        self.write(|sink| writeln!(sink, "{counts}"));
        if self.write_errors > 1 {
            tracing::warn!(
                "{} further report writes failed after the first",
                self.write_errors - 1
            );
        }

        let sink = self.sink.take()?;
        match sink.close() {
            Ok(completion) => completion,
            Err(error) => {
                tracing::warn!(
                    "error closing report sink: {}",
                    DisplayErrorChain::new(&error)
                );
                None
            }
        }
    }

    fn write(&mut self, f: impl FnOnce(&mut dyn ReportSink) -> io::Result<()>) {
        let Some(sink) = self.sink.as_deref_mut() else {
            return;
        };
        if let Err(error) = f(sink) {
            self.write_errors += 1;
            if self.write_errors == 1 {
                tracing::warn!("error writing test results (continuing the run): {error}");
            }
        }
    }
}

impl TestListener for ResultListener {
    fn node_started(&mut self, node: NodeRef<'_>) {
        match node {
            NodeRef::Suite(suite) => self.write(|sink| {
                writeln!(sink)?;
                writeln!(sink, "{}", suite.name())
            }),
            // Cases are written when they finish, with their outcome.
            NodeRef::Case(_) => {}
        }
    }

    fn node_finished(&mut self, result: &NodeResult<'_>) {
        match result.node {
            NodeRef::Suite(suite) => self.write(|sink| {
                if result.state == ResultState::Info {
                    writeln!(sink, "\t[INFO] {}", result.message.as_deref().unwrap_or(""))?;
                }
                if !suite.name().is_empty() {
                    writeln!(
                        sink,
                        "{} : {} ms",
                        suite.name(),
                        result.duration.as_nanos() as f64 / 1_000_000.0
                    )?;
                }
                Ok(())
            }),
            NodeRef::Case(case) => {
                self.counts.record(result.state);
                self.write(|sink| {
                    write!(
                        sink,
                        "\t[{}] {}.{}",
                        result.state.label(),
                        case.fixture(),
                        case.method()
                    )?;
                    if let Some(message) = result.message.as_deref().filter(|m| !m.is_empty()) {
                        write!(sink, " : {}", message.replace("\r\n", "\\r\\n"))?;
                    }
                    writeln!(sink)?;
                    if let Some(stack_trace) = &result.stack_trace {
                        for line in stack_trace.split(['\r', '\n']).filter(|l| !l.is_empty()) {
                            writeln!(sink, "\t\t{line}")?;
                        }
                    }
                    Ok(())
                });
            }
        }

        if let Some(sink) = &mut self.sink {
            sink.record_result(result);
        }
    }
}
