// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for relaytest: reporting the results of a hierarchical test run to an
//! external collector as the run happens.
//!
//! The basic flow is:
//!
//! 1. A [`RunOrchestrator`](orchestrator::RunOrchestrator) is built over a
//!    [`TestSuite`](tree::TestSuite) and a [`RelayConfig`](config::RelayConfig).
//! 2. On each run, the [transport selector](selector) opens a [sink](sink): a file, a TCP
//!    connection to the first reachable host (see [`race`]), or a streaming HTTP request.
//! 3. An [`Execute`](engine::Execute) implementation walks the tree and drives a
//!    [`ResultListener`](listener::ResultListener), which writes one line per result and counts
//!    outcomes.
//! 4. The summary is written, the sink is closed, and the process is optionally terminated once
//!    the collector has received everything.

pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod listener;
pub mod orchestrator;
pub mod platform;
pub mod race;
pub mod selector;
pub mod sink;
pub mod tree;
