// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test lifecycle events.
//!
//! Events are produced by an [`Execute`](crate::engine::Execute) implementation and consumed by a
//! [`TestListener`], usually the [`ResultListener`](crate::listener::ResultListener).

use crate::tree::{TestCase, TestNode, TestSuite};
use chrono::{DateTime, FixedOffset};
use std::{fmt, time::Duration};

/// A borrowed view of a node in the test tree.
#[derive(Clone, Copy, Debug)]
pub enum NodeRef<'a> {
    /// A suite.
    Suite(&'a TestSuite),

    /// A case.
    Case(&'a TestCase),
}

impl<'a> NodeRef<'a> {
    /// Returns the name of the node.
    pub fn name(self) -> &'a str {
        match self {
            NodeRef::Suite(suite) => suite.name(),
            NodeRef::Case(case) => case.method(),
        }
    }
}

impl<'a> From<&'a TestNode> for NodeRef<'a> {
    fn from(node: &'a TestNode) -> Self {
        match node {
            TestNode::Suite(suite) => NodeRef::Suite(suite),
            TestNode::Case(case) => NodeRef::Case(case),
        }
    }
}

impl<'a> From<&'a TestSuite> for NodeRef<'a> {
    fn from(suite: &'a TestSuite) -> Self {
        NodeRef::Suite(suite)
    }
}

/// The outcome of a node.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ResultState {
    /// The node passed.
    Success,

    /// The node failed.
    Failure,

    /// The node was not run.
    Ignored,

    /// The node ran, but could neither pass nor fail.
    Inconclusive,

    /// Anything else: an informational result that is not counted.
    Info,
}

impl ResultState {
    /// Returns the label used for this state in plain-text reports.
    pub fn label(self) -> &'static str {
        match self {
            ResultState::Success => "PASS",
            ResultState::Failure => "FAIL",
            ResultState::Ignored => "IGNORED",
            ResultState::Inconclusive => "INCONCLUSIVE",
            ResultState::Info => "INFO",
        }
    }
}

impl fmt::Display for ResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The result of a finished node, passed to [`TestListener::node_finished`].
#[derive(Clone, Debug)]
pub struct NodeResult<'a> {
    /// The node that finished.
    pub node: NodeRef<'a>,

    /// The outcome.
    pub state: ResultState,

    /// An optional message, e.g. the assertion that failed.
    pub message: Option<String>,

    /// An optional, possibly multi-line, stack trace.
    pub stack_trace: Option<String>,

    /// The time at which the node started, including the offset from UTC.
    pub start_time: DateTime<FixedOffset>,

    /// How long the node took. For suites, this covers every child.
    pub duration: Duration,
}

/// The kind of non-success outcome a case body can report.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CaseErrorKind {
    /// An assertion failed.
    Failure,

    /// The case could not determine a result.
    Inconclusive,

    /// The case decided at runtime that it should not run.
    Ignored,
}

/// A non-success outcome returned by a case body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CaseError {
    kind: CaseErrorKind,
    message: String,
    stack_trace: Option<String>,
}

impl CaseError {
    /// Creates a new failure.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(CaseErrorKind::Failure, message)
    }

    /// Creates a new inconclusive result.
    pub fn inconclusive(message: impl Into<String>) -> Self {
        Self::new(CaseErrorKind::Inconclusive, message)
    }

    /// Creates a new runtime ignore.
    pub fn ignored(reason: impl Into<String>) -> Self {
        Self::new(CaseErrorKind::Ignored, reason)
    }

    fn new(kind: CaseErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack_trace: None,
        }
    }

    /// Attaches a stack trace.
    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> CaseErrorKind {
        self.kind
    }

    /// Returns the message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the stack trace, if any.
    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    /// Returns the result state corresponding to this error.
    pub fn state(&self) -> ResultState {
        match self.kind {
            CaseErrorKind::Failure => ResultState::Failure,
            CaseErrorKind::Inconclusive => ResultState::Inconclusive,
            CaseErrorKind::Ignored => ResultState::Ignored,
        }
    }
}

/// Consumer of test lifecycle events.
///
/// Events arrive depth-first: a suite's `node_started` precedes every event of its descendants,
/// and its `node_finished` follows them.
pub trait TestListener {
    /// Called when a node starts.
    fn node_started(&mut self, node: NodeRef<'_>);

    /// Called when a node finishes.
    fn node_finished(&mut self, result: &NodeResult<'_>);
}

impl<T: TestListener + ?Sized> TestListener for &mut T {
    fn node_started(&mut self, node: NodeRef<'_>) {
        (**self).node_started(node)
    }

    fn node_finished(&mut self, result: &NodeResult<'_>) {
        (**self).node_finished(result)
    }
}
