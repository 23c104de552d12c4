// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::Result,
    listen::Collector,
    output::{OutputContext, OutputOpts},
    plan::TestPlan,
    prompt::PromptPolicy,
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use relaytest_runner::{
    config::{
        ConfigOverrides, DefaultConfigWarnings, OutputFormat, RelayConfig, TransportKind, XmlMode,
    },
    errors::DisplayErrorChain,
    orchestrator::{RunOrchestratorBuilder, RunOutcome},
    platform::HostDeviceInfo,
    race::{HostRace, RaceOutcome},
};
use std::io::{IsTerminal, Write};
use tokio::runtime::Runtime;

/// Run a test plan and stream its results to a collector.
///
/// Results are written one line at a time to a file, a TCP connection to the first reachable
/// host, or the body of an HTTP request, as configured in relaytest.toml.
#[derive(Debug, Parser)]
#[command(
    version,
    styles = crate::output::clap_styles::style(),
    max_term_width = 100,
)]
pub struct RelaytestApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(subcommand)]
    command: Command,
}

impl RelaytestApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    ///
    /// Returns the exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        match self.command {
            Command::Run(opts) => opts.exec(&self.config_opts, output),
            Command::Probe(opts) => opts.exec(&self.config_opts),
            Command::Listen(opts) => opts.exec(&self.config_opts),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a test plan and report its results
    ///
    /// The plan is a TOML file describing suites and cases with scripted outcomes. If the
    /// configured transport can't be opened, results are printed to the console instead; on a
    /// terminal, relaytest asks first unless --auto-start is passed.
    Run(RunOpts),

    /// Print the host that would receive results
    ///
    /// Probes the configured hosts concurrently and prints the first one to accept a connection.
    /// A single host is printed without being probed.
    Probe(ProbeOpts),

    /// Receive results over TCP and print them to stdout
    ///
    /// Probes sent by `relaytest probe` and `relaytest run` are recognized and skipped.
    Listen(ListenOpts),
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: ./relaytest.toml]
    #[arg(long, global = true, value_name = "PATH", env = "RELAYTEST_CONFIG")]
    config_file: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    fn make_config(&self, overrides: &ConfigOverrides) -> Result<RelayConfig> {
        let mut config = RelayConfig::from_sources(
            Utf8Path::new("."),
            self.config_file.as_deref(),
            &mut DefaultConfigWarnings,
        )?;
        config.apply_overrides(overrides);
        Ok(config)
    }
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Transport options")]
struct TransportOpts {
    /// Transport to send results over: file, tcp or http
    #[arg(long, value_name = "KIND", env = "RELAYTEST_TRANSPORT")]
    transport: Option<TransportKind>,

    #[clap(flatten)]
    hosts: HostOpts,

    /// File results are appended to, for the file transport
    #[arg(long, value_name = "PATH", env = "RELAYTEST_LOG_FILE")]
    log_file: Option<Utf8PathBuf>,

    /// Output format: plain or xml
    #[arg(long, value_name = "FORMAT", env = "RELAYTEST_FORMAT")]
    format: Option<OutputFormat>,

    /// For xml output, whether to keep plain-text output alongside the report: default or
    /// wrapped
    #[arg(long, value_name = "MODE", env = "RELAYTEST_XML_MODE")]
    xml_mode: Option<XmlMode>,
}

impl TransportOpts {
    fn to_overrides(&self) -> ConfigOverrides {
        let mut overrides = self.hosts.to_overrides();
        overrides.kind = self.transport;
        overrides.log_file = self.log_file.clone();
        overrides.output_format = self.format;
        overrides.xml_mode = self.xml_mode;
        overrides
    }
}

#[derive(Debug, Default, Args)]
struct HostOpts {
    /// Comma-separated candidate hosts
    #[arg(long, value_name = "HOSTS", env = "RELAYTEST_HOSTS")]
    hosts: Option<String>,

    /// Port the collector listens on
    #[arg(long, value_name = "PORT", env = "RELAYTEST_PORT")]
    port: Option<u16>,
}

impl HostOpts {
    fn to_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host_names: self.hosts.clone(),
            host_port: self.port,
            ..Default::default()
        }
    }
}

#[derive(Debug, Args)]
struct RunOpts {
    /// Test plan to run
    #[arg(long, value_name = "PATH", env = "RELAYTEST_PLAN")]
    plan: Utf8PathBuf,

    /// Only run this suite, given as a `/`-separated path of suite names
    #[arg(long, value_name = "PATH")]
    suite: Option<String>,

    /// Never ask what to do if results can't be sent: print them to the console
    #[arg(long, env = "RELAYTEST_AUTO_START")]
    auto_start: bool,

    #[clap(flatten)]
    transport: TransportOpts,
}

impl RunOpts {
    fn exec(self, config_opts: &ConfigOpts, output: OutputContext) -> Result<i32> {
        let mut overrides = self.transport.to_overrides();
        overrides.auto_start = self.auto_start.then_some(true);
        let config = config_opts.make_config(&overrides)?;
        let root = TestPlan::from_path(&self.plan)?.into_tree();

        let mut builder = RunOrchestratorBuilder::default();
        builder.set_device_info(HostDeviceInfo::new(env!("CARGO_PKG_NAME")));
        if !config.runner.auto_start && std::io::stdin().is_terminal() {
            builder.set_connection_error_policy(PromptPolicy::new(output));
        }
        let orchestrator = builder.build(root, config)?;

        let outcome = match &self.suite {
            Some(path) => {
                let names: Vec<_> = path.split('/').filter(|name| !name.is_empty()).collect();
                let suite = orchestrator.root().find_suite(&names).ok_or_else(|| {
                    ExpectedError::SuiteNotFound {
                        path: path.clone(),
                    }
                })?;
                orchestrator.run_suite(suite)?
            }
            None => orchestrator.run()?,
        };

        let mut summary = match outcome {
            RunOutcome::Completed(summary) => summary,
            RunOutcome::Rejected => return Err(ExpectedError::RunRejected),
            RunOutcome::Aborted(err) => return Err(ExpectedError::RunAborted { err }),
        };

        if let Some(completion) = summary.take_completion()
            && let Err(error) = orchestrator.wait_for_delivery(completion)
        {
            tracing::warn!(
                "results may not have been delivered: {}",
                DisplayErrorChain::new(&error)
            );
        }

        let counts = summary.counts();
        if counts.has_failures() {
            return Err(ExpectedError::TestRunFailed { counts });
        }

        let styles = output.stderr_styles();
        tracing::info!("{}: {counts}", "test run passed".style(styles.pass));
        Ok(0)
    }
}

#[derive(Debug, Args)]
struct ProbeOpts {
    #[clap(flatten)]
    hosts: HostOpts,
}

impl ProbeOpts {
    fn exec(self, config_opts: &ConfigOpts) -> Result<i32> {
        let config = config_opts.make_config(&self.hosts.to_overrides())?;
        let transport = &config.transport;
        let hosts = transport.host_list();
        if hosts.is_empty() {
            return Err(ExpectedError::NoHostNames);
        }

        let mut race = HostRace::new(transport.host_port());
        race.set_connect_timeout(transport.connect_timeout())
            .set_max_concurrency(transport.race_concurrency());
        match make_runtime()?.block_on(race.race(&hosts)) {
            RaceOutcome::Winner(host) => {
                writeln!(std::io::stdout().lock(), "{host}")
                    .map_err(|err| ExpectedError::WriteOutputError { err })?;
                Ok(0)
            }
            RaceOutcome::NoWinner => Err(ExpectedError::NoReachableHost {
                hosts,
                port: race.port(),
            }),
        }
    }
}

#[derive(Debug, Args)]
struct ListenOpts {
    /// Address to listen on
    #[arg(
        long,
        value_name = "ADDR",
        default_value = "0.0.0.0",
        env = "RELAYTEST_LISTEN_ADDR"
    )]
    bind: String,

    /// Port to listen on [default: transport.host-port]
    #[arg(long, value_name = "PORT", env = "RELAYTEST_PORT")]
    port: Option<u16>,

    /// Exit after the first report has been received
    #[arg(long)]
    once: bool,
}

impl ListenOpts {
    fn exec(self, config_opts: &ConfigOpts) -> Result<i32> {
        let port = match self.port {
            Some(port) => port,
            None => config_opts
                .make_config(&ConfigOverrides::default())?
                .transport
                .host_port(),
        };
        let addr = listen_addr(&self.bind, port);

        make_runtime()?.block_on(async {
            let collector =
                Collector::bind(&addr)
                    .await
                    .map_err(|err| ExpectedError::CollectorBindError {
                        addr: addr.clone(),
                        err,
                    })?;
            match collector.local_addr() {
                Ok(local_addr) => tracing::info!("listening on {local_addr}"),
                Err(_) => tracing::info!("listening on {addr}"),
            }

            let mut stdout = tokio::io::stdout();
            collector
                .serve(self.once, &mut stdout)
                .await
                .map_err(|err| ExpectedError::CollectorError { err })?;
            Ok::<_, ExpectedError>(0)
        })
    }
}

fn listen_addr(bind: &str, port: u16) -> String {
    if bind.contains(':') && !bind.starts_with('[') {
        format!("[{bind}]:{port}")
    } else {
        format!("{bind}:{port}")
    }
}

fn make_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("relaytest-worker")
        .build()
        .map_err(|err| ExpectedError::TokioRuntimeCreate { err })
}
