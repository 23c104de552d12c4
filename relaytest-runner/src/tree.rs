// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The tree of tests handed to the runner.
//!
//! Discovery happens elsewhere: by the time a tree reaches relaytest it is already filtered and
//! ordered. A tree is built once, bottom-up, and is not modified while a run executes.

use crate::events::CaseError;
use debug_ignore::DebugIgnore;
use std::sync::Arc;

/// The body of a test case.
///
/// Returning `Ok(())` marks the case as passed. Panics are caught by the
/// [`SequentialExecutor`](crate::engine::SequentialExecutor) and reported as failures.
pub type CaseBody = Arc<dyn Fn() -> Result<(), CaseError> + Send + Sync>;

/// A node in the test tree: either a suite or a case.
#[derive(Clone, Debug)]
pub enum TestNode {
    /// A container of other nodes.
    Suite(TestSuite),

    /// A single test.
    Case(TestCase),
}

impl TestNode {
    /// Returns the name of this node: the suite name, or the method name for a case.
    pub fn name(&self) -> &str {
        match self {
            TestNode::Suite(suite) => suite.name(),
            TestNode::Case(case) => case.method(),
        }
    }

    /// Returns the number of cases at or below this node.
    pub fn case_count(&self) -> usize {
        match self {
            TestNode::Suite(suite) => suite.case_count(),
            TestNode::Case(_) => 1,
        }
    }
}

impl From<TestSuite> for TestNode {
    fn from(suite: TestSuite) -> Self {
        TestNode::Suite(suite)
    }
}

impl From<TestCase> for TestNode {
    fn from(case: TestCase) -> Self {
        TestNode::Case(case)
    }
}

/// A named, ordered collection of test nodes.
#[derive(Clone, Debug)]
pub struct TestSuite {
    name: String,
    children: Vec<TestNode>,
    case_count: usize,
}

impl TestSuite {
    /// Creates a new, empty suite.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            case_count: 0,
        }
    }

    /// Appends a child node, keeping the cached case count in sync.
    pub fn add(&mut self, child: impl Into<TestNode>) -> &mut Self {
        let child = child.into();
        self.case_count += child.case_count();
        self.children.push(child);
        self
    }

    /// Appends a child node, builder-style.
    pub fn with(mut self, child: impl Into<TestNode>) -> Self {
        self.add(child);
        self
    }

    /// Returns the name of the suite. The root suite usually has an empty name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the children of this suite, in execution order.
    pub fn children(&self) -> &[TestNode] {
        &self.children
    }

    /// Returns the number of cases below this suite.
    pub fn case_count(&self) -> usize {
        self.case_count
    }

    /// Looks up a descendant suite by its path of names, starting below this suite.
    ///
    /// An empty path returns `self`.
    pub fn find_suite(&self, path: &[&str]) -> Option<&TestSuite> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };
        self.children.iter().find_map(|child| match child {
            TestNode::Suite(suite) if suite.name == *first => suite.find_suite(rest),
            TestNode::Suite(_) | TestNode::Case(_) => None,
        })
    }
}

/// A single test: a method on a fixture type.
#[derive(Clone, Debug)]
pub struct TestCase {
    fixture: String,
    method: String,
    ignore_reason: Option<String>,
    body: DebugIgnore<CaseBody>,
}

impl TestCase {
    /// Creates a new test case with the given body.
    pub fn new(
        fixture: impl Into<String>,
        method: impl Into<String>,
        body: impl Fn() -> Result<(), CaseError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            fixture: fixture.into(),
            method: method.into(),
            ignore_reason: None,
            body: DebugIgnore(Arc::new(body)),
        }
    }

    /// Marks this case as ignored: it is reported, but its body is never invoked.
    pub fn ignored(mut self, reason: impl Into<String>) -> Self {
        self.ignore_reason = Some(reason.into());
        self
    }

    /// Returns the name of the type declaring this test.
    pub fn fixture(&self) -> &str {
        &self.fixture
    }

    /// Returns the name of the test method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the reason this case is ignored, if it is.
    pub fn ignore_reason(&self) -> Option<&str> {
        self.ignore_reason.as_deref()
    }

    /// Returns the body of this case.
    pub fn body(&self) -> &CaseBody {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass() -> Result<(), CaseError> {
        Ok(())
    }

    fn sample_tree() -> TestSuite {
        TestSuite::new("")
            .with(
                TestSuite::new("Math")
                    .with(TestCase::new("Math", "Add", pass))
                    .with(TestCase::new("Math", "Div", pass))
                    .with(TestSuite::new("Trig").with(TestCase::new("Trig", "Sin", pass))),
            )
            .with(TestSuite::new("Strings").with(TestCase::new("Strings", "Concat", pass)))
    }

    #[test]
    fn case_count_tracks_descendants() {
        let root = sample_tree();
        assert_eq!(root.case_count(), 4);

        let math = root.find_suite(&["Math"]).expect("Math exists");
        assert_eq!(math.case_count(), 3);
        assert_eq!(TestNode::from(math.clone()).case_count(), 3);
    }

    #[test]
    fn find_suite_by_path() {
        let root = sample_tree();
        assert_eq!(root.find_suite(&[]).map(|s| s.name()), Some(""));
        assert_eq!(
            root.find_suite(&["Math", "Trig"]).map(|s| s.case_count()),
            Some(1)
        );
        assert!(
            root.find_suite(&["Math", "Add"]).is_none(),
            "cases are not suites"
        );
        assert!(root.find_suite(&["Nope"]).is_none());
    }

    #[test]
    fn ignored_case_keeps_reason() {
        let case = TestCase::new("Math", "Slow", pass).ignored("takes too long");
        assert_eq!(case.ignore_reason(), Some("takes too long"));
        assert_eq!(TestNode::from(case).name(), "Slow");
    }
}
