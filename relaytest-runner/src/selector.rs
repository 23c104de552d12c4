// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns a [`TransportConfig`] into a sink.

use crate::{
    config::{OutputFormat, TransportConfig, TransportKind},
    errors::SinkOpenError,
    race::{HostRace, RaceOutcome},
    sink::{FileSink, HttpSink, JunitSink, ReportSink, TcpSink},
};
use tokio::runtime::Handle;

/// Opens the sink described by `config`.
///
/// `label` names the run in progress messages and, for XML output, the report. Network work
/// (the host race and the HTTP request) runs on `handle`; this function blocks until the sink is
/// ready, so it must not be called from within an async context.
///
/// On failure the error is returned as is: falling back to another sink is up to the caller.
pub fn open_sink(
    config: &TransportConfig,
    label: &str,
    handle: &Handle,
) -> Result<Box<dyn ReportSink>, SinkOpenError> {
    let raw = open_raw(config, label, handle)?;
    Ok(match config.output_format() {
        OutputFormat::Plain => raw,
        OutputFormat::Xml => Box::new(JunitSink::new(raw, label, config.xml_mode())),
    })
}

fn open_raw(
    config: &TransportConfig,
    label: &str,
    handle: &Handle,
) -> Result<Box<dyn ReportSink>, SinkOpenError> {
    let port = config.host_port();
    match config.kind() {
        TransportKind::File => {
            let path = config.log_file();
            tracing::info!("Sending '{label}' results to {path}");
            Ok(Box::new(FileSink::open(path)?))
        }
        TransportKind::Tcp => {
            let hosts = config.host_list();
            if hosts.is_empty() {
                return Err(SinkOpenError::NoHostNames {
                    kind: TransportKind::Tcp,
                });
            }

            let mut race = HostRace::new(port);
            race.set_connect_timeout(config.connect_timeout())
                .set_max_concurrency(config.race_concurrency());
            let host = match handle.block_on(race.race(&hosts)) {
                RaceOutcome::Winner(host) => host,
                RaceOutcome::NoWinner => return Err(SinkOpenError::Unreachable { hosts, port }),
            };

            tracing::info!("Sending '{label}' results to {host}:{port}");
            Ok(Box::new(TcpSink::connect(
                &host,
                port,
                config.connect_timeout(),
            )?))
        }
        TransportKind::Http => {
            let hosts = config.host_list();
            let Some((host, warning)) = http_target(&hosts) else {
                return Err(SinkOpenError::NoHostNames {
                    kind: TransportKind::Http,
                });
            };
            if let Some(warning) = warning {
                tracing::warn!("{warning}");
            }

            tracing::info!("Sending '{label}' results to {host}:{port}");
            Ok(Box::new(HttpSink::open(
                host,
                port,
                config.connect_timeout(),
                handle,
            )?))
        }
    }
}

/// Picks the host the HTTP transport sends to, along with a warning naming the hosts it ignores.
fn http_target(hosts: &[String]) -> Option<(&str, Option<String>)> {
    let (host, ignored) = hosts.split_first()?;
    let warning = (!ignored.is_empty()).then(|| {
        format!(
            "the HTTP transport only uses the first host `{host}`, ignoring: {}",
            ignored.join(", ")
        )
    });
    Some((host, warning))
}
