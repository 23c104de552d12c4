// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for relaytest.
//!
//! Configuration is layered, lowest priority first:
//!
//! 1. the default config embedded in the binary (see [`RelayConfig::DEFAULT_CONFIG`]),
//! 2. `relaytest.toml` in the given directory, or an explicitly specified file,
//! 3. [`ConfigOverrides`], usually built from command-line arguments.

use crate::errors::{ConfigParseError, ConfigParseErrorKind};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{collections::BTreeSet, fmt, str::FromStr, time::Duration};
use thiserror::Error;

/// relaytest configuration: how a run behaves and where its results go.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelayConfig {
    /// Run lifecycle settings.
    pub runner: RunnerConfig,

    /// Where results are sent.
    pub transport: TransportConfig,
}

impl RelayConfig {
    /// The name of the config file read from the given directory by [`Self::from_sources`].
    pub const CONFIG_PATH: &'static str = "relaytest.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config from the given file, or if not specified from `relaytest.toml` in the
    /// given directory.
    ///
    /// If the file isn't specified and the directory doesn't have `relaytest.toml`, uses the
    /// default config options. Unknown keys are reported through `warnings`.
    pub fn from_sources(
        dir: &Utf8Path,
        file: Option<&Utf8Path>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = dir.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (config, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;

        if !unknown.is_empty() {
            warnings.unknown_config_keys(&config_file, &unknown);
        }

        Ok(config)
    }

    /// Applies overrides on top of this config.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        let ConfigOverrides {
            auto_start,
            terminate_after_run,
            kind,
            host_names,
            host_port,
            log_file,
            output_format,
            xml_mode,
        } = overrides;

        if let Some(auto_start) = auto_start {
            self.runner.auto_start = *auto_start;
        }
        if let Some(terminate_after_run) = terminate_after_run {
            self.runner.terminate_after_run = *terminate_after_run;
        }
        if let Some(kind) = kind {
            self.transport.kind = *kind;
        }
        if let Some(host_names) = host_names {
            self.transport.host_names.clone_from(host_names);
        }
        if let Some(host_port) = host_port {
            self.transport.host_port = *host_port;
        }
        if let Some(log_file) = log_file {
            self.transport.log_file.clone_from(log_file);
        }
        if let Some(output_format) = output_format {
            self.transport.output_format = *output_format;
        }
        if let Some(xml_mode) = xml_mode {
            self.transport.xml_mode = *xml_mode;
        }
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(Self, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: RelayConfig = serde_path_to_error::deserialize(ignored_de).map_err(|error| {
            // Both serde_path_to_error and the config crate report the key. Drop the key from
            // the config error so it isn't printed twice.
            let path = error.path().clone();
            let config_error = error.into_inner();
            let error = match config_error {
                ConfigError::At { error, .. } => *error,
                other => other,
            };
            ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                path, error,
            )))
        })?;

        Ok((config, ignored))
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        let (config, _) = Self::build_and_deserialize_config(&Self::make_default_config())
            .expect("default config should be valid");
        config
    }
}

/// Receives warnings produced while reading configuration.
pub trait ConfigWarnings {
    /// Called when the config file contains keys relaytest doesn't know about.
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>);
}

/// Logs config warnings through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
        let keys: Vec<_> = unknown.iter().map(String::as_str).collect();
        tracing::warn!(
            "ignoring unknown configuration keys in `{config_file}`: {}",
            keys.join(", ")
        );
    }
}

/// Settings for the run lifecycle.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunnerConfig {
    /// Whether the run starts without an explicit request.
    pub auto_start: bool,

    /// Whether the process ends once an automatic run is over.
    pub terminate_after_run: bool,
}

/// Where results are sent.
///
/// A `TransportConfig` is read once, when a sink is opened, and is passed explicitly to
/// [`open_sink`](crate::selector::open_sink).
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransportConfig {
    enabled: bool,
    kind: TransportKind,
    host_names: String,
    host_port: u16,
    log_file: Utf8PathBuf,
    output_format: OutputFormat,
    xml_mode: XmlMode,
    #[serde(with = "humantime_serde")]
    connect_timeout: Duration,
    race_concurrency: usize,
}

impl TransportConfig {
    /// Creates a config that appends results to the given file.
    pub fn file(log_file: impl Into<Utf8PathBuf>) -> Self {
        let mut config = Self::default_transport();
        config.kind = TransportKind::File;
        config.log_file = log_file.into();
        config
    }

    /// Creates a config that sends results to the first reachable host over TCP.
    pub fn tcp(host_names: impl Into<String>, host_port: u16) -> Self {
        let mut config = Self::default_transport();
        config.kind = TransportKind::Tcp;
        config.host_names = host_names.into();
        config.host_port = host_port;
        config
    }

    /// Creates a config that streams results to the first host over HTTP.
    pub fn http(host_names: impl Into<String>, host_port: u16) -> Self {
        let mut config = Self::default_transport();
        config.kind = TransportKind::Http;
        config.host_names = host_names.into();
        config.host_port = host_port;
        config
    }

    fn default_transport() -> Self {
        RelayConfig::default().transport
    }

    /// Sets whether the transport is used at all. If disabled, results go to the console.
    pub fn set_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the output format.
    pub fn set_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = output_format;
        self
    }

    /// Sets how plain-text output is treated in XML mode.
    pub fn set_xml_mode(mut self, xml_mode: XmlMode) -> Self {
        self.xml_mode = xml_mode;
        self
    }

    /// Sets the upper bound for each connection attempt.
    pub fn set_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Sets the maximum number of concurrent host probes.
    pub fn set_race_concurrency(mut self, race_concurrency: usize) -> Self {
        self.race_concurrency = race_concurrency;
        self
    }

    /// Returns true if the transport is used.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the kind of transport.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Returns the configured host names as a list, with whitespace trimmed and empty entries
    /// removed.
    pub fn host_list(&self) -> Vec<String> {
        self.host_names
            .split(',')
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Returns the port used for network transports.
    pub fn host_port(&self) -> u16 {
        self.host_port
    }

    /// Returns the log file used by the file transport.
    pub fn log_file(&self) -> &Utf8Path {
        &self.log_file
    }

    /// Returns the output format.
    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    /// Returns the XML mode.
    pub fn xml_mode(&self) -> XmlMode {
        self.xml_mode
    }

    /// Returns the upper bound for each connection attempt.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the maximum number of concurrent host probes. Always at least 1.
    pub fn race_concurrency(&self) -> usize {
        self.race_concurrency.max(1)
    }
}

/// Overrides applied on top of file-based configuration.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Overrides `runner.auto-start`.
    pub auto_start: Option<bool>,
    /// Overrides `runner.terminate-after-run`.
    pub terminate_after_run: Option<bool>,
    /// Overrides `transport.kind`.
    pub kind: Option<TransportKind>,
    /// Overrides `transport.host-names`.
    pub host_names: Option<String>,
    /// Overrides `transport.host-port`.
    pub host_port: Option<u16>,
    /// Overrides `transport.log-file`.
    pub log_file: Option<Utf8PathBuf>,
    /// Overrides `transport.output-format`.
    pub output_format: Option<OutputFormat>,
    /// Overrides `transport.xml-mode`.
    pub xml_mode: Option<XmlMode>,
}

/// The kind of transport results are sent over.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Append to a local file.
    #[serde(alias = "FILE")]
    File,

    /// Stream lines over a raw TCP connection.
    #[serde(alias = "TCP")]
    Tcp,

    /// Stream lines in the body of an HTTP request.
    #[serde(alias = "HTTP")]
    Http,
}

impl TransportKind {
    /// Returns string representations of all known variants.
    pub fn variants() -> [&'static str; 3] {
        ["file", "tcp", "http"]
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::File => write!(f, "file"),
            TransportKind::Tcp => write!(f, "tcp"),
            TransportKind::Http => write!(f, "http"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = TransportKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(TransportKind::File),
            "tcp" => Ok(TransportKind::Tcp),
            "http" => Ok(TransportKind::Http),
            _ => Err(TransportKindParseError::new(s)),
        }
    }
}

/// Error returned while parsing a [`TransportKind`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for transport: {input}\n(known values: {})",
    TransportKind::variants().join(", "),
)]
pub struct TransportKindParseError {
    input: String,
}

impl TransportKindParseError {
    fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// The format results are written in.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One line per result, streamed as the run progresses.
    #[default]
    Plain,

    /// A JUnit XML report, written when the run finishes.
    Xml,
}

impl OutputFormat {
    /// Returns string representations of all known variants.
    pub fn variants() -> [&'static str; 2] {
        ["plain", "xml"]
    }
}

impl FromStr for OutputFormat {
    type Err = OutputFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(OutputFormat::Plain),
            "xml" => Ok(OutputFormat::Xml),
            _ => Err(OutputFormatParseError {
                input: s.to_owned(),
            }),
        }
    }
}

/// Error returned while parsing an [`OutputFormat`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for output format: {input}\n(known values: {})",
    OutputFormat::variants().join(", "),
)]
pub struct OutputFormatParseError {
    input: String,
}

/// What happens to plain-text output when writing XML.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XmlMode {
    /// Only the XML report is written; plain-text lines are dropped.
    #[default]
    Default,

    /// The XML report and the plain-text lines are written together in one document.
    Wrapped,
}

impl XmlMode {
    /// Returns string representations of all known variants.
    pub fn variants() -> [&'static str; 2] {
        ["default", "wrapped"]
    }
}

impl FromStr for XmlMode {
    type Err = XmlModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(XmlMode::Default),
            "wrapped" => Ok(XmlMode::Wrapped),
            _ => Err(XmlModeParseError {
                input: s.to_owned(),
            }),
        }
    }
}

/// Error returned while parsing an [`XmlMode`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for XML mode: {input}\n(known values: {})",
    XmlMode::variants().join(", "),
)]
pub struct XmlModeParseError {
    input: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DisplayErrorChain;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[derive(Default)]
    struct CollectWarnings {
        unknown: Vec<String>,
    }

    impl ConfigWarnings for CollectWarnings {
        fn unknown_config_keys(&mut self, _config_file: &Utf8Path, unknown: &BTreeSet<String>) {
            self.unknown.extend(unknown.iter().cloned());
        }
    }

    #[test]
    fn default_config_is_valid() {
        let config = RelayConfig::default();
        assert!(!config.runner.auto_start);
        assert!(!config.runner.terminate_after_run);
        assert!(config.transport.enabled());
        assert_eq!(config.transport.kind(), TransportKind::Tcp);
        assert_eq!(config.transport.host_port(), 16384);
        assert_eq!(config.transport.output_format(), OutputFormat::Plain);
        assert_eq!(config.transport.xml_mode(), XmlMode::Default);
        assert_eq!(config.transport.connect_timeout(), Duration::from_secs(5));
        assert!(config.transport.host_list().is_empty());
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = Utf8TempDir::new().unwrap();
        let mut warnings = CollectWarnings::default();
        let config = RelayConfig::from_sources(dir.path(), None, &mut warnings).unwrap();
        assert_eq!(config.transport.kind(), TransportKind::Tcp);
        assert!(warnings.unknown.is_empty());
    }

    #[test]
    fn config_file_layers_over_defaults() {
        let dir = Utf8TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(RelayConfig::CONFIG_PATH),
            indoc! {r#"
                [runner]
                auto-start = true

                [transport]
                kind = "http"
                host-names = "10.0.0.2, build-host"
                output-format = "xml"
                connect-timeout = "750ms"
                colour = "blue"
            "#},
        )
        .unwrap();

        let mut warnings = CollectWarnings::default();
        let config = RelayConfig::from_sources(dir.path(), None, &mut warnings).unwrap();

        assert!(config.runner.auto_start);
        assert!(!config.runner.terminate_after_run, "default is kept");
        assert_eq!(config.transport.kind(), TransportKind::Http);
        assert_eq!(
            config.transport.host_list(),
            vec!["10.0.0.2".to_owned(), "build-host".to_owned()]
        );
        assert_eq!(config.transport.host_port(), 16384, "default is kept");
        assert_eq!(config.transport.output_format(), OutputFormat::Xml);
        assert_eq!(
            config.transport.connect_timeout(),
            Duration::from_millis(750)
        );
        assert_eq!(warnings.unknown, vec!["transport.colour".to_owned()]);
    }

    #[test]
    fn invalid_transport_kind_is_an_error() {
        let dir = Utf8TempDir::new().unwrap();
        let file = dir.path().join("custom.toml");
        std::fs::write(&file, "[transport]\nkind = \"pigeon\"\n").unwrap();

        let error = RelayConfig::from_sources(dir.path(), Some(&file), &mut DefaultConfigWarnings)
            .expect_err("unknown transport kind");
        assert_eq!(error.config_file(), &file);
        assert!(
            matches!(error.kind(), ConfigParseErrorKind::DeserializeError(_)),
            "unexpected error: {}",
            DisplayErrorChain::new(&error)
        );
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = Utf8TempDir::new().unwrap();
        let file = dir.path().join("missing.toml");
        let error = RelayConfig::from_sources(dir.path(), Some(&file), &mut DefaultConfigWarnings)
            .expect_err("file is required");
        assert!(matches!(error.kind(), ConfigParseErrorKind::BuildError(_)));
    }

    #[test]
    fn overrides_take_precedence() {
        let mut config = RelayConfig::default();
        config.apply_overrides(&ConfigOverrides {
            terminate_after_run: Some(true),
            kind: Some(TransportKind::File),
            log_file: Some("out/results.log".into()),
            ..Default::default()
        });
        assert!(config.runner.terminate_after_run);
        assert_eq!(config.transport.kind(), TransportKind::File);
        assert_eq!(config.transport.log_file(), "out/results.log");
    }

    #[test_case(" a , ,b,, c ", &["a", "b", "c"]; "whitespace and empty entries")]
    #[test_case("", &[]; "empty")]
    #[test_case("single", &["single"]; "single host")]
    fn host_list_splitting(input: &str, expected: &[&str]) {
        let config = TransportConfig::tcp(input, 1);
        assert_eq!(config.host_list(), expected);
    }

    #[test_case("file", TransportKind::File)]
    #[test_case("TCP", TransportKind::Tcp)]
    #[test_case("Http", TransportKind::Http)]
    fn transport_kind_from_str(input: &str, expected: TransportKind) {
        assert_eq!(input.parse::<TransportKind>().unwrap(), expected);
    }

    #[test]
    fn transport_kind_parse_error_lists_variants() {
        let error = "smoke-signal".parse::<TransportKind>().unwrap_err();
        assert_eq!(
            error.to_string(),
            "unrecognized value for transport: smoke-signal\n(known values: file, tcp, http)"
        );
    }
}
