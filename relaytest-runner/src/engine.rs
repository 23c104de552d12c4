// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Executing a test tree.
//!
//! The orchestrator only needs something that walks a tree and reports lifecycle events to a
//! [`TestListener`]: that's the [`Execute`] trait. [`SequentialExecutor`] is the stock
//! implementation.

use crate::{
    errors::RunError,
    events::{NodeRef, NodeResult, ResultState, TestListener},
    tree::{TestCase, TestNode, TestSuite},
};
use chrono::Local;
use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    time::Instant,
};

/// Message reported for a suite with a failing descendant.
pub const CHILD_FAILURE_MESSAGE: &str = "One or more child tests had errors";

/// Message reported for a suite without any cases.
pub const NO_CASES_MESSAGE: &str = "Has no test cases";

/// Executes a test tree, driving a listener.
///
/// Implementations must emit events depth-first and synchronously: `node_started` for a suite
/// before any event of its descendants, `node_finished` after all of them.
pub trait Execute: Send + Sync {
    /// Executes `suite` and everything below it, returning the suite's aggregated state.
    fn execute(
        &self,
        suite: &TestSuite,
        listener: &mut dyn TestListener,
    ) -> Result<ResultState, RunError>;
}

/// Runs cases one after the other on the calling thread, in tree order.
///
/// Panics in case bodies are caught and reported as failures. Ignored cases are reported without
/// running their body.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialExecutor;

impl Execute for SequentialExecutor {
    fn execute(
        &self,
        suite: &TestSuite,
        listener: &mut dyn TestListener,
    ) -> Result<ResultState, RunError> {
        Ok(run_suite(suite, listener))
    }
}

fn run_node(node: &TestNode, listener: &mut dyn TestListener) -> ResultState {
    match node {
        TestNode::Suite(suite) => run_suite(suite, listener),
        TestNode::Case(case) => run_case(case, listener),
    }
}

fn run_suite(suite: &TestSuite, listener: &mut dyn TestListener) -> ResultState {
    let start_time = Local::now().fixed_offset();
    let start = Instant::now();
    listener.node_started(NodeRef::Suite(suite));

    let child_states: Vec<_> = suite
        .children()
        .iter()
        .map(|child| run_node(child, listener))
        .collect();

    let state = aggregate_state(&child_states);
    let message = match state {
        ResultState::Failure => Some(CHILD_FAILURE_MESSAGE.to_owned()),
        ResultState::Info if child_states.is_empty() => Some(NO_CASES_MESSAGE.to_owned()),
        _ => None,
    };
    listener.node_finished(&NodeResult {
        node: NodeRef::Suite(suite),
        state,
        message,
        stack_trace: None,
        start_time,
        duration: start.elapsed(),
    });

    state
}

fn run_case(case: &TestCase, listener: &mut dyn TestListener) -> ResultState {
    let start_time = Local::now().fixed_offset();
    let start = Instant::now();
    listener.node_started(NodeRef::Case(case));

    let (state, message, stack_trace) = match case.ignore_reason() {
        Some(reason) => (ResultState::Ignored, Some(reason.to_owned()), None),
        None => match catch_unwind(AssertUnwindSafe(|| (case.body())())) {
            Ok(Ok(())) => (ResultState::Success, None, None),
            Ok(Err(error)) => (
                error.state(),
                Some(error.message().to_owned()),
                error.stack_trace().map(str::to_owned),
            ),
            Err(payload) => (
                ResultState::Failure,
                Some(panic_message(payload.as_ref())),
                None,
            ),
        },
    };

    listener.node_finished(&NodeResult {
        node: NodeRef::Case(case),
        state,
        message,
        stack_trace,
        start_time,
        duration: start.elapsed(),
    });

    state
}

/// Combines the states of a suite's children into the suite's state.
///
/// Any failure fails the suite. Otherwise a single success makes it pass, then a single
/// inconclusive child makes it inconclusive. A suite whose children were all ignored is ignored,
/// and a suite with no children is informational.
pub fn aggregate_state(children: &[ResultState]) -> ResultState {
    let any = |state| children.contains(&state);
    if any(ResultState::Failure) {
        ResultState::Failure
    } else if any(ResultState::Success) {
        ResultState::Success
    } else if any(ResultState::Inconclusive) {
        ResultState::Inconclusive
    } else if !children.is_empty() && children.iter().all(|s| *s == ResultState::Ignored) {
        ResultState::Ignored
    } else {
        ResultState::Info
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked with a non-string payload".to_owned()
    }
}
