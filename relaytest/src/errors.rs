// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING, StderrStyles};
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use relaytest_runner::{
    errors::{ConfigParseError, OrchestratorBuildError, RunError, SinkOpenError},
    listener::RunCounts,
};
use std::error::Error;
use thiserror::Error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Process exit codes used by relaytest.
#[doc(hidden)]
pub enum RelaytestExitCode {}

impl RelaytestExitCode {
    /// The configuration, the plan or the command line was invalid.
    pub const SETUP_ERROR: i32 = 96;

    /// The results could not be sent anywhere: the sink failed to open and the run was
    /// cancelled, or no candidate host was reachable.
    pub const SINK_UNAVAILABLE: i32 = 97;

    /// The run finished, and at least one test failed.
    pub const TEST_RUN_FAILED: i32 = 100;
}

// The #[error()] strings are placeholders: errors are printed with display_to_stderr.

/// An error that relaytest reports to the user before exiting.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("plan read error")]
    PlanReadError {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("plan parse error")]
    PlanParseError {
        path: Utf8PathBuf,
        #[source]
        err: Box<toml::de::Error>,
    },
    #[error("suite not found")]
    SuiteNotFound { path: String },
    #[error("error building run orchestrator")]
    OrchestratorBuildError {
        #[from]
        err: OrchestratorBuildError,
    },
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate {
        #[source]
        err: std::io::Error,
    },
    #[error("run rejected")]
    RunRejected,
    #[error("run aborted")]
    RunAborted {
        #[source]
        err: SinkOpenError,
    },
    #[error("test execution error")]
    RunError {
        #[from]
        err: RunError,
    },
    #[error("test run failed")]
    TestRunFailed { counts: RunCounts },
    #[error("no hosts configured")]
    NoHostNames,
    #[error("no reachable host")]
    NoReachableHost { hosts: Vec<String>, port: u16 },
    #[error("collector bind error")]
    CollectorBindError {
        addr: String,
        #[source]
        err: std::io::Error,
    },
    #[error("collector error")]
    CollectorError {
        #[source]
        err: std::io::Error,
    },
    #[error("error writing output")]
    WriteOutputError {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    pub(crate) fn plan_read_error(path: impl Into<Utf8PathBuf>, err: std::io::Error) -> Self {
        Self::PlanReadError {
            path: path.into(),
            err,
        }
    }

    pub(crate) fn plan_parse_error(path: impl Into<Utf8PathBuf>, err: toml::de::Error) -> Self {
        Self::PlanParseError {
            path: path.into(),
            err: Box::new(err),
        }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ConfigParseError { .. }
            | Self::PlanReadError { .. }
            | Self::PlanParseError { .. }
            | Self::SuiteNotFound { .. }
            | Self::OrchestratorBuildError { .. }
            | Self::TokioRuntimeCreate { .. }
            | Self::RunRejected
            | Self::NoHostNames
            | Self::CollectorBindError { .. }
            | Self::CollectorError { .. }
            | Self::WriteOutputError { .. } => RelaytestExitCode::SETUP_ERROR,
            Self::RunAborted { .. } | Self::NoReachableHost { .. } => {
                RelaytestExitCode::SINK_UNAVAILABLE
            }
            Self::RunError { .. } | Self::TestRunFailed { .. } => {
                RelaytestExitCode::TEST_RUN_FAILED
            }
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::ConfigParseError { err } => {
                tracing::error!(
                    "failed to parse config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::PlanReadError { path, err } => {
                tracing::error!("failed to read test plan `{}`", path.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::PlanParseError { path, err } => {
                tracing::error!("failed to parse test plan `{}`", path.style(styles.bold));
                Some(err.as_ref() as &dyn Error)
            }
            Self::SuiteNotFound { path } => {
                tracing::error!(
                    "suite `{}` not found in the test plan",
                    path.style(styles.bold)
                );
                None
            }
            Self::OrchestratorBuildError { err } => {
                tracing::error!("failed to set up the test run");
                Some(err as &dyn Error)
            }
            Self::TokioRuntimeCreate { err } => {
                tracing::error!("error creating Tokio runtime");
                Some(err as &dyn Error)
            }
            Self::RunRejected => {
                tracing::error!("another test run is already in progress");
                None
            }
            Self::RunAborted { err } => {
                tracing::error!("test run cancelled: {err}");
                err.source()
            }
            Self::RunError { err } => {
                tracing::error!("{err}");
                err.source()
            }
            Self::TestRunFailed { counts } => {
                tracing::error!(
                    "test run failed: {} of {} tests {}",
                    counts.failed.style(styles.fail),
                    counts.total_run(),
                    "failed".style(styles.fail),
                );
                None
            }
            Self::NoHostNames => {
                tracing::error!(
                    "no host names configured (hint: pass {} or set {})",
                    "--hosts".style(styles.bold),
                    "transport.host-names".style(styles.bold),
                );
                None
            }
            Self::NoReachableHost { hosts, port } => {
                tracing::error!(
                    "none of the hosts ({}) are reachable on port {}",
                    hosts.join(", ").style(styles.bold),
                    port.style(styles.bold),
                );
                None
            }
            Self::CollectorBindError { addr, err } => {
                tracing::error!("failed to listen on `{}`", addr.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::CollectorError { err } => {
                tracing::error!("error receiving results");
                Some(err as &dyn Error)
            }
            Self::WriteOutputError { err } => {
                tracing::error!("error writing output");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            tracing::error!(target: NO_HEADING, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
