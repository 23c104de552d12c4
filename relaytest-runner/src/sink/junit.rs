// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The structured-output decorator.

use super::{ReportSink, SinkCompletion};
use crate::{
    config::XmlMode,
    errors::SinkCloseError,
    events::{NodeRef, NodeResult, ResultState},
};
use chrono::{DateTime, FixedOffset, Local};
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use std::{io, time::Instant};

/// Wraps a sink and writes a JUnit XML report to it when the run finishes.
///
/// Results are collected in memory through [`ReportSink::record_result`] and serialized only on
/// close. Plain-text writes are dropped in [`XmlMode::Default`]; in [`XmlMode::Wrapped`] they are
/// kept and written next to the report, in a single document.
#[derive(Debug)]
pub struct JunitSink {
    inner: DebugIgnore<Box<dyn ReportSink>>,
    mode: XmlMode,
    report_name: String,
    start_time: DateTime<FixedOffset>,
    started: Instant,
    test_suites: DebugIgnore<IndexMap<String, TestSuite>>,
    plain_output: String,
}

impl JunitSink {
    /// Creates a new decorator around `inner`. `report_name` becomes the name of the report.
    pub fn new(inner: Box<dyn ReportSink>, report_name: impl Into<String>, mode: XmlMode) -> Self {
        Self {
            inner: DebugIgnore(inner),
            mode,
            report_name: report_name.into(),
            start_time: Local::now().fixed_offset(),
            started: Instant::now(),
            test_suites: DebugIgnore(IndexMap::new()),
            plain_output: String::new(),
        }
    }

    fn testsuite_for(&mut self, fixture: &str) -> &mut TestSuite {
        self.test_suites
            .entry(fixture.to_owned())
            .or_insert_with(|| TestSuite::new(fixture))
    }

    fn write_report(
        inner: &mut dyn ReportSink,
        mode: XmlMode,
        xml: &str,
        plain_output: &str,
    ) -> io::Result<()> {
        match mode {
            XmlMode::Default => inner.write_str(xml)?,
            XmlMode::Wrapped => {
                writeln!(inner, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
                writeln!(inner, "<relaytest-run>")?;
                writeln!(inner, "<junit-report>")?;
                writeln!(inner, "{}", strip_xml_declaration(xml).trim_end())?;
                writeln!(inner, "</junit-report>")?;
                writeln!(
                    inner,
                    "<plain-output><![CDATA[{}]]></plain-output>",
                    plain_output.replace("]]>", "]]]]><![CDATA[>")
                )?;
                writeln!(inner, "</relaytest-run>")?;
            }
        }
        inner.flush()
    }
}

impl ReportSink for JunitSink {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        match self.mode {
            XmlMode::Default => {}
            XmlMode::Wrapped => self.plain_output.push_str(s),
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    fn record_result(&mut self, result: &NodeResult<'_>) {
        let case = match result.node {
            NodeRef::Case(case) => case,
            // Suites map to the fixture of each case.
            NodeRef::Suite(_) => return,
        };

        let status = match result.state {
            ResultState::Success => TestCaseStatus::success(),
            ResultState::Failure => {
                let mut status = TestCaseStatus::non_success(NonSuccessKind::Failure);
                if let Some(message) = &result.message {
                    status.set_message(message.as_str());
                }
                if let Some(stack_trace) = &result.stack_trace {
                    status.set_description(stack_trace.as_str());
                }
                status
            }
            ResultState::Ignored => {
                let mut status = TestCaseStatus::skipped();
                if let Some(message) = &result.message {
                    status.set_message(message.as_str());
                }
                status
            }
            ResultState::Inconclusive | ResultState::Info => {
                let mut status = TestCaseStatus::skipped();
                status.set_type(match result.state {
                    ResultState::Inconclusive => "inconclusive",
                    _ => "info",
                });
                if let Some(message) = &result.message {
                    status.set_message(message.as_str());
                }
                status
            }
        };

        let mut testcase = TestCase::new(case.method(), status);
        testcase
            .set_classname(case.fixture())
            .set_timestamp(result.start_time)
            .set_time(result.duration);
        self.testsuite_for(case.fixture()).add_test_case(testcase);
    }

    fn close(self: Box<Self>) -> Result<Option<SinkCompletion>, SinkCloseError> {
        let JunitSink {
            inner,
            mode,
            report_name,
            start_time,
            started,
            test_suites,
            plain_output,
        } = *self;
        let mut inner = inner.0;

        let mut report = Report::new(report_name);
        report
            .set_timestamp(start_time)
            .set_time(started.elapsed())
            .add_test_suites(test_suites.0.into_values());

        // The inner sink is closed even if the report couldn't be written.
        let written = report
            .to_string()
            .map_err(SinkCloseError::from)
            .and_then(|xml| {
                Self::write_report(&mut *inner, mode, &xml, &plain_output).map_err(Into::into)
            });
        let closed = inner.close();
        written?;
        closed
    }
}

fn strip_xml_declaration(xml: &str) -> &str {
    match xml.strip_prefix("<?xml") {
        Some(rest) => match rest.find("?>") {
            Some(end) => rest[end + 2..].trim_start(),
            None => xml,
        },
        None => xml,
    }
}
