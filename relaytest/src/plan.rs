// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test plans: TOML descriptions of a test tree with scripted outcomes.
//!
//! ```toml
//! name = "Calculator"
//!
//! [[suite]]
//! name = "Math"
//!
//! [[suite.case]]
//! name = "Add"
//!
//! [[suite.case]]
//! name = "Div"
//! outcome = "fail"
//! message = "expected 2"
//! stack-trace = "at Math.Div()"
//! ```
//!
//! Within a suite, cases come before nested suites.

use crate::errors::ExpectedError;
use camino::Utf8Path;
use relaytest_runner::{
    events::CaseError,
    tree::{TestCase, TestSuite},
};
use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub(crate) struct TestPlan {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "suite")]
    suites: Vec<PlanSuite>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PlanSuite {
    name: String,
    #[serde(default, rename = "case")]
    cases: Vec<PlanCase>,
    #[serde(default, rename = "suite")]
    suites: Vec<PlanSuite>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PlanCase {
    name: String,
    #[serde(default)]
    outcome: PlanOutcome,
    message: Option<String>,
    stack_trace: Option<String>,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum PlanOutcome {
    #[default]
    Pass,
    Fail,
    Inconclusive,
    Ignore,
    Panic,
}

impl TestPlan {
    pub(crate) fn from_path(path: &Utf8Path) -> Result<Self, ExpectedError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|err| ExpectedError::plan_read_error(path, err))?;
        Self::parse(&contents).map_err(|err| ExpectedError::plan_parse_error(path, err))
    }

    pub(crate) fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Builds the test tree this plan describes.
    pub(crate) fn into_tree(self) -> TestSuite {
        let mut root = TestSuite::new(self.name);
        for suite in self.suites {
            root.add(suite.into_suite());
        }
        root
    }
}

impl PlanSuite {
    fn into_suite(self) -> TestSuite {
        let mut suite = TestSuite::new(self.name.clone());
        for case in self.cases {
            suite.add(case.into_case(&self.name));
        }
        for child in self.suites {
            suite.add(child.into_suite());
        }
        suite
    }
}

impl PlanCase {
    fn into_case(self, fixture: &str) -> TestCase {
        let PlanCase {
            name,
            outcome,
            message,
            stack_trace,
        } = self;

        if outcome == PlanOutcome::Ignore {
            return TestCase::new(fixture, name, || Ok(())).ignored(message.unwrap_or_default());
        }

        TestCase::new(fixture, name, move || {
            let message = message.clone().unwrap_or_default();
            let error = match outcome {
                PlanOutcome::Pass => return Ok(()),
                PlanOutcome::Fail => CaseError::failure(message),
                PlanOutcome::Inconclusive => CaseError::inconclusive(message),
                PlanOutcome::Ignore => CaseError::ignored(message),
                PlanOutcome::Panic => panic!("{message}"),
            };
            Err(match &stack_trace {
                Some(stack_trace) => error.with_stack_trace(stack_trace.clone()),
                None => error,
            })
        })
    }
}
