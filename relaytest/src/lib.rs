// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs a declarative test plan and streams its results to a collector.
//!
//! `relaytest run` loads a TOML plan, builds a test tree from it and reports every result over
//! the configured transport. `relaytest probe` shows which candidate host would be picked, and
//! `relaytest listen` is a minimal TCP collector that prints what it receives.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod listen;
mod output;
mod plan;
mod prompt;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputContext;
