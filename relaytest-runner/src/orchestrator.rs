// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The run lifecycle.
//!
//! A [`RunOrchestrator`] owns a test tree and its configuration. Each run goes through
//! `Idle -> Opening -> Running -> Closing -> Idle`: the sink is opened, the tree is executed into
//! a [`ResultListener`], the summary is written and the sink closed. Only one run can be active at
//! a time; requests made while a run is active are rejected.

use crate::{
    config::RelayConfig,
    engine::{Execute, SequentialExecutor},
    errors::{
        DisplayErrorChain, OrchestratorBuildError, RunError, SinkCompletionError, SinkOpenError,
    },
    events::ResultState,
    listener::{ResultListener, RunCounts},
    platform::{DeviceInfoProvider, HostDeviceInfo},
    selector::open_sink,
    sink::{ConsoleOutput, ReportSink, SinkCompletion},
    tree::TestSuite,
};
use chrono::Local;
use debug_ignore::DebugIgnore;
use std::{
    fmt,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::runtime::Runtime;

/// The label used when the whole tree is run.
pub const RUN_EVERYTHING_LABEL: &str = "Run Everything";

/// The lifecycle state of a [`RunOrchestrator`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunState {
    /// No run is active.
    Idle,

    /// The sink is being opened.
    Opening,

    /// Tests are executing.
    Running,

    /// The summary is being written and the sink closed.
    Closing,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Opening => write!(f, "opening"),
            RunState::Running => write!(f, "running"),
            RunState::Closing => write!(f, "closing"),
        }
    }
}

/// What to do when the configured sink can't be opened.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConnectionErrorAction {
    /// Run anyway, writing the report to the console.
    ContinueOnConsole,

    /// Don't run any tests.
    Abort,
}

/// Decides what happens when a sink fails to open.
///
/// Only consulted for interactive runs: automated runs (`runner.auto-start`) always continue on
/// the console. Implemented for any `Fn(&SinkOpenError) -> ConnectionErrorAction`.
pub trait ConnectionErrorPolicy: Send + Sync {
    /// Called with the error that prevented the sink from opening.
    fn on_connection_error(&self, error: &SinkOpenError) -> ConnectionErrorAction;
}

impl<F> ConnectionErrorPolicy for F
where
    F: Fn(&SinkOpenError) -> ConnectionErrorAction + Send + Sync,
{
    fn on_connection_error(&self, error: &SinkOpenError) -> ConnectionErrorAction {
        self(error)
    }
}

/// A [`ConnectionErrorPolicy`] that always continues on the console. Suitable for
/// non-interactive hosts.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContinueOnConsole;

impl ConnectionErrorPolicy for ContinueOnConsole {
    fn on_connection_error(&self, _error: &SinkOpenError) -> ConnectionErrorAction {
        ConnectionErrorAction::ContinueOnConsole
    }
}

/// Ends the process once an automatic run is over.
pub trait Terminator: Send + Sync {
    /// Ends the process successfully.
    fn terminate(&self);
}

/// Exits the current process with code 0.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self) {
        std::process::exit(0);
    }
}

/// Builder for a [`RunOrchestrator`].
pub struct RunOrchestratorBuilder {
    executor: Box<dyn Execute>,
    device_info: Box<dyn DeviceInfoProvider>,
    policy: Box<dyn ConnectionErrorPolicy>,
    terminator: Box<dyn Terminator>,
    console: ConsoleOutput,
}

impl Default for RunOrchestratorBuilder {
    fn default() -> Self {
        Self {
            executor: Box::new(SequentialExecutor),
            device_info: Box::new(HostDeviceInfo::default()),
            policy: Box::new(ContinueOnConsole),
            terminator: Box::new(ProcessTerminator),
            console: ConsoleOutput::default(),
        }
    }
}

impl fmt::Debug for RunOrchestratorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOrchestratorBuilder")
            .field("console", &self.console)
            .finish_non_exhaustive()
    }
}

impl RunOrchestratorBuilder {
    /// Sets the engine used to execute the tree. Defaults to [`SequentialExecutor`].
    pub fn set_executor(&mut self, executor: impl Execute + 'static) -> &mut Self {
        self.executor = Box::new(executor);
        self
    }

    /// Sets the source of device metadata for the preamble. Defaults to [`HostDeviceInfo`].
    pub fn set_device_info(&mut self, device_info: impl DeviceInfoProvider + 'static) -> &mut Self {
        self.device_info = Box::new(device_info);
        self
    }

    /// Sets the policy consulted when a sink can't be opened. Defaults to [`ContinueOnConsole`].
    pub fn set_connection_error_policy(
        &mut self,
        policy: impl ConnectionErrorPolicy + 'static,
    ) -> &mut Self {
        self.policy = Box::new(policy);
        self
    }

    /// Sets how the process ends after an automatic run. Defaults to [`ProcessTerminator`].
    pub fn set_terminator(&mut self, terminator: impl Terminator + 'static) -> &mut Self {
        self.terminator = Box::new(terminator);
        self
    }

    /// Sets where console output goes. Defaults to standard output.
    pub fn set_console(&mut self, console: ConsoleOutput) -> &mut Self {
        self.console = console;
        self
    }

    /// Creates a new orchestrator for `root`.
    pub fn build(
        self,
        root: TestSuite,
        config: RelayConfig,
    ) -> Result<RunOrchestrator, OrchestratorBuildError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("relaytest-runner-worker")
            .build()
            .map_err(OrchestratorBuildError::TokioRuntimeCreate)?;

        Ok(RunOrchestrator {
            root,
            config,
            runtime,
            executor: DebugIgnore(self.executor),
            device_info: DebugIgnore(self.device_info),
            policy: DebugIgnore(self.policy),
            terminator: DebugIgnore(self.terminator),
            console: self.console,
            state: Mutex::new(RunState::Idle),
            last_counts: Mutex::new(RunCounts::default()),
            connection_failed: AtomicBool::new(false),
        })
    }
}

/// The result of a run that completed.
#[derive(Debug)]
pub struct RunSummary {
    counts: RunCounts,
    state: ResultState,
    completion: DebugIgnore<Option<SinkCompletion>>,
}

impl RunSummary {
    /// Returns the outcome counts.
    pub fn counts(&self) -> RunCounts {
        self.counts
    }

    /// Returns the aggregated state of the suite that was run.
    pub fn state(&self) -> ResultState {
        self.state
    }

    /// Takes the sink's completion future, if it has one.
    ///
    /// Pass it to [`RunOrchestrator::wait_for_delivery`] to wait until the collector has
    /// received everything.
    pub fn take_completion(&mut self) -> Option<SinkCompletion> {
        self.completion.take()
    }
}

/// The result of a run request.
#[derive(Debug)]
pub enum RunOutcome {
    /// The run completed. Individual tests may still have failed.
    Completed(RunSummary),

    /// Another run was already active; nothing was done.
    Rejected,

    /// The sink couldn't be opened and the policy chose not to continue. No tests ran.
    Aborted(SinkOpenError),
}

impl RunOutcome {
    /// Returns the summary if the run completed.
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunOutcome::Completed(summary) => Some(summary),
            RunOutcome::Rejected | RunOutcome::Aborted(_) => None,
        }
    }
}

/// Owns the run lifecycle for a test tree.
///
/// Created using [`RunOrchestratorBuilder::build`].
#[derive(Debug)]
pub struct RunOrchestrator {
    root: TestSuite,
    config: RelayConfig,
    runtime: Runtime,
    executor: DebugIgnore<Box<dyn Execute>>,
    device_info: DebugIgnore<Box<dyn DeviceInfoProvider>>,
    policy: DebugIgnore<Box<dyn ConnectionErrorPolicy>>,
    terminator: DebugIgnore<Box<dyn Terminator>>,
    console: ConsoleOutput,
    state: Mutex<RunState>,
    last_counts: Mutex<RunCounts>,
    connection_failed: AtomicBool,
}

impl RunOrchestrator {
    /// Returns the tree this orchestrator runs.
    pub fn root(&self) -> &TestSuite {
        &self.root
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Returns the number of cases in the tree.
    pub fn test_count(&self) -> usize {
        self.root.case_count()
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> RunState {
        *lock(&self.state)
    }

    /// Returns the counts of the last run to finish.
    pub fn counts(&self) -> RunCounts {
        *lock(&self.last_counts)
    }

    /// Returns true if the sink of the last run failed to open.
    pub fn connection_failed(&self) -> bool {
        self.connection_failed.load(Ordering::SeqCst)
    }

    /// Runs the whole tree.
    pub fn run(&self) -> Result<RunOutcome, RunError> {
        self.run_labelled(&self.root, RUN_EVERYTHING_LABEL)
    }

    /// Runs `suite`, typically a subtree of [`Self::root`]. The report is labelled with the
    /// suite's name.
    pub fn run_suite(&self, suite: &TestSuite) -> Result<RunOutcome, RunError> {
        self.run_labelled(suite, suite.name())
    }

    /// Runs everything if `runner.auto-start` is set.
    ///
    /// Afterwards, if `runner.terminate-after-run` is set and the sink opened successfully,
    /// waits for the sink to deliver its output and then calls the [`Terminator`]. Returns
    /// `None` if auto-start is disabled.
    pub fn auto_run(&self) -> Result<Option<RunOutcome>, RunError> {
        if !self.config.runner.auto_start {
            return Ok(None);
        }

        let mut outcome = self.run()?;
        if let RunOutcome::Completed(summary) = &mut outcome
            && self.config.runner.terminate_after_run
            && !self.connection_failed()
        {
            if let Some(completion) = summary.take_completion()
                && let Err(error) = self.wait_for_delivery(completion)
            {
                tracing::warn!(
                    "results may not have been delivered: {}",
                    DisplayErrorChain::new(&error)
                );
            }
            tracing::info!("Exiting test run with success");
            self.terminator.terminate();
        }

        Ok(Some(outcome))
    }

    /// Blocks until a sink's completion future resolves.
    pub fn wait_for_delivery(&self, completion: SinkCompletion) -> Result<(), SinkCompletionError> {
        self.runtime.block_on(completion)
    }

    fn run_labelled(&self, suite: &TestSuite, label: &str) -> Result<RunOutcome, RunError> {
        let Some(guard) = StateGuard::begin(&self.state) else {
            tracing::info!("Not running because another test run is already in progress.");
            return Ok(RunOutcome::Rejected);
        };

        let sink = match self.open(label) {
            Ok(sink) => sink,
            Err(error) => return Ok(RunOutcome::Aborted(error)),
        };

        let mut listener = ResultListener::new();
        listener.attach(sink);
        listener.write_preamble(
            label,
            &self.device_info.device_info(),
            Local::now().fixed_offset(),
        );

        guard.set(RunState::Running);
        let result = self.executor.execute(suite, &mut listener);

        guard.set(RunState::Closing);
        let completion = listener.finish();
        let counts = listener.counts();
        *lock(&self.last_counts) = counts;

        let state = result?;
        Ok(RunOutcome::Completed(RunSummary {
            counts,
            state,
            completion: DebugIgnore(completion),
        }))
    }

    fn open(&self, label: &str) -> Result<Box<dyn ReportSink>, SinkOpenError> {
        let transport = &self.config.transport;
        if !transport.enabled() {
            self.connection_failed.store(false, Ordering::SeqCst);
            return Ok(Box::new(self.console.open()));
        }

        let error = match open_sink(transport, label, self.runtime.handle()) {
            Ok(sink) => {
                self.connection_failed.store(false, Ordering::SeqCst);
                return Ok(sink);
            }
            Err(error) => error,
        };

        self.connection_failed.store(true, Ordering::SeqCst);
        tracing::error!(
            "cannot open results sink: {}",
            DisplayErrorChain::new(&error)
        );

        let action = if self.config.runner.auto_start {
            ConnectionErrorAction::ContinueOnConsole
        } else {
            self.policy.on_connection_error(&error)
        };
        match action {
            ConnectionErrorAction::ContinueOnConsole => {
                tracing::warn!("[Host unreachable: Switching to console output]");
                Ok(Box::new(self.console.open()))
            }
            ConnectionErrorAction::Abort => {
                tracing::warn!("[Host unreachable: Execution cancelled]");
                Err(error)
            }
        }
    }
}

/// Holds the single-flight slot for the duration of a run, and releases it on drop.
struct StateGuard<'a> {
    state: &'a Mutex<RunState>,
}

impl<'a> StateGuard<'a> {
    fn begin(state: &'a Mutex<RunState>) -> Option<Self> {
        let mut current = lock(state);
        if *current != RunState::Idle {
            return None;
        }
        *current = RunState::Opening;
        Some(Self { state })
    }

    fn set(&self, next: RunState) {
        *lock(self.state) = next;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.set(RunState::Idle);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
