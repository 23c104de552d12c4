// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by relaytest.

use crate::config::TransportKind;
use camino::Utf8PathBuf;
use config::ConfigError;
use std::{error::Error, fmt, io};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse relaytest config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
///
/// Returned by [`ConfigParseError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// A sink could not be opened.
///
/// This is the only error that can stop a run before any test executes: the
/// [`RunOrchestrator`](crate::orchestrator::RunOrchestrator) consults its
/// [`ConnectionErrorPolicy`](crate::orchestrator::ConnectionErrorPolicy) to decide whether to
/// continue on the console instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SinkOpenError {
    /// A network transport was selected, but no host names were configured.
    #[error("transport `{kind}` requires at least one host name")]
    NoHostNames {
        /// The transport that was selected.
        kind: TransportKind,
    },

    /// None of the candidate hosts accepted a connection.
    #[error("none of the hosts ({}) are reachable on port {port}", .hosts.join(", "))]
    Unreachable {
        /// The hosts that were tried.
        hosts: Vec<String>,

        /// The port.
        port: u16,
    },

    /// Connecting to the selected host failed.
    #[error("failed to connect to {host}:{port}")]
    Connect {
        /// The host.
        host: String,

        /// The port.
        port: u16,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The log file could not be opened for appending.
    #[error("failed to open log file `{path}`")]
    FileOpen {
        /// The path to the log file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The HTTP client could not be created.
    #[error("failed to create HTTP client")]
    HttpClient(#[source] reqwest::Error),
}

/// An error that occurred while closing a sink.
///
/// Close errors are logged and never re-raised: the sink is dropped regardless.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SinkCloseError {
    /// Flushing or shutting down the underlying channel failed.
    #[error("error flushing report output")]
    Io(#[from] io::Error),

    /// Serializing the JUnit report failed.
    #[error("error serializing JUnit report")]
    Junit(#[from] quick_junit::SerializeError),
}

/// An error that occurred while waiting for a sink to deliver its output.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SinkCompletionError {
    /// The HTTP collector rejected or failed the upload.
    #[error("error delivering results over HTTP")]
    Http(#[from] reqwest::Error),

    /// The background delivery task panicked or was cancelled.
    #[error("delivery task failed")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// An error produced by an execution engine while running tests.
///
/// relaytest does not classify these further: they're propagated to the caller once the sink
/// has been closed.
#[derive(Debug, Error)]
#[error("test execution failed: {message}")]
pub struct RunError {
    message: String,
    #[source]
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl RunError {
    /// Creates a new `RunError` with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new `RunError` caused by another error.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An error that occurred while building a
/// [`RunOrchestrator`](crate::orchestrator::RunOrchestrator).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OrchestratorBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] io::Error),
}

/// Displays an error along with the chain of errors that caused it.
///
/// Used for log lines, where the `caused by` chain is otherwise lost.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut current = self.error.source();
        while let Some(source) = current {
            write!(f, "\n  caused by: {source}")?;
            current = source.source();
        }

        Ok(())
    }
}
