// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use indoc::indoc;
use pretty_assertions::assert_eq;
use relaytest_runner::{
    config::{OutputFormat, RelayConfig, TransportConfig, XmlMode},
    orchestrator::{RunOrchestratorBuilder, RunState, Terminator},
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// Everything after the preamble, which has a timestamp in it.
fn body_after_preamble(report: &str) -> &str {
    let start = report.find("[Bundle:").expect("preamble present");
    let end = report[start..].find('\n').expect("newline after bundle") + start + 1;
    &report[end..]
}

#[test]
fn tcp_report_reaches_collector() -> Result<()> {
    let (port, collector) = tcp_collector();
    let mut config = RelayConfig::default();
    // 127.0.0.2 refuses connections on this port, so 127.0.0.1 wins the race.
    config.transport = TransportConfig::tcp("127.0.0.2, 127.0.0.1", port);

    let mut builder = RunOrchestratorBuilder::default();
    builder.set_device_info(fixed_device);
    let orchestrator = builder.build(sample_tree(), config)?;
    let outcome = orchestrator.run()?;
    ensure!(outcome.summary().is_some(), "run completed: {outcome:?}");

    let report = collector.join().unwrap();
    ensure!(
        report.starts_with("[Runner executing:\tRun Everything]\n"),
        "report: {report}"
    );
    ensure!(
        report.contains("[x86_64:\tlinux v6.1]\n"),
        "report: {report}"
    );

    let body = body_after_preamble(&report);
    let timings_removed: Vec<_> = body
        .lines()
        .filter(|line| !line.ends_with(" ms"))
        .collect();
    assert_eq!(
        timings_removed.join("\n") + "\n",
        indoc! {r"



            Math
            	[PASS] Math.Add
            	[FAIL] Math.Div : expected 2\r\nbut was 3
            		at Math.Div()
            		at Runner.Run()

            Strings
            	[IGNORED] Strings.Upper : locale dependent
            	[INCONCLUSIVE] Strings.Lower : no locale data
            Tests run: 3 Passed: 1 Inconclusive: 1 Failed: 1 Ignored: 1
        "}
    );
    assert_eq!(orchestrator.state(), RunState::Idle);
    Ok(())
}

#[derive(Clone)]
struct RecordingTerminator {
    received: Arc<AtomicBool>,
    delivered_before_exit: Arc<AtomicUsize>,
}

impl Terminator for RecordingTerminator {
    fn terminate(&self) {
        if self.received.load(Ordering::SeqCst) {
            self.delivered_before_exit.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn http_auto_run_waits_for_delivery() -> Result<()> {
    let received = Arc::new(AtomicBool::new(false));
    let (port, collector) = http_collector(received.clone());

    let mut config = RelayConfig::default();
    config.runner.auto_start = true;
    config.runner.terminate_after_run = true;
    config.transport = TransportConfig::http("127.0.0.1, 10.0.0.99", port);

    let terminator = RecordingTerminator {
        received,
        delivered_before_exit: Arc::new(AtomicUsize::new(0)),
    };
    let mut builder = RunOrchestratorBuilder::default();
    builder
        .set_device_info(fixed_device)
        .set_terminator(terminator.clone());
    let orchestrator = builder.build(sample_tree(), config)?;

    let outcome = orchestrator.auto_run()?.expect("auto-start is enabled");
    ensure!(outcome.summary().is_some(), "run completed: {outcome:?}");
    assert_eq!(
        terminator.delivered_before_exit.load(Ordering::SeqCst),
        1,
        "terminated exactly once, after the collector read everything"
    );

    let report = collector.join().unwrap();
    ensure!(
        report.ends_with("Tests run: 3 Passed: 1 Inconclusive: 1 Failed: 1 Ignored: 1\n"),
        "report: {report}"
    );
    Ok(())
}

#[test]
fn wrapped_xml_over_tcp() -> Result<()> {
    let (port, collector) = tcp_collector();
    let mut config = RelayConfig::default();
    config.transport = TransportConfig::tcp("127.0.0.1", port)
        .set_output_format(OutputFormat::Xml)
        .set_xml_mode(XmlMode::Wrapped);

    let mut builder = RunOrchestratorBuilder::default();
    builder.set_device_info(fixed_device);
    let orchestrator = builder.build(sample_tree(), config)?;
    orchestrator.run()?;

    let report = collector.join().unwrap();
    ensure!(report.contains("<junit-report>"), "report: {report}");
    ensure!(
        report.contains(r#"name="Run Everything""#),
        "report: {report}"
    );
    ensure!(
        report.contains("<![CDATA[[Runner executing:\tRun Everything]"),
        "plain output is kept: {report}"
    );
    ensure!(report.ends_with("</relaytest-run>\n"), "report: {report}");
    Ok(())
}
