// Copyright (c) The relaytest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::OutputContext;
use relaytest_runner::{
    errors::{DisplayErrorChain, SinkOpenError},
    orchestrator::{ConnectionErrorAction, ConnectionErrorPolicy},
};

/// Asks on the terminal whether to continue on the console when the results can't be sent.
#[derive(Debug)]
pub(crate) struct PromptPolicy {
    colorize: bool,
}

impl PromptPolicy {
    pub(crate) fn new(output: OutputContext) -> Self {
        Self {
            colorize: output
                .color
                .should_colorize(supports_color::Stream::Stderr),
        }
    }
}

impl ConnectionErrorPolicy for PromptPolicy {
    fn on_connection_error(&self, error: &SinkOpenError) -> ConnectionErrorAction {
        let colorful_theme = dialoguer::theme::ColorfulTheme::default();
        let confirm = if self.colorize {
            dialoguer::Confirm::with_theme(&colorful_theme)
        } else {
            dialoguer::Confirm::with_theme(&dialoguer::theme::SimpleTheme)
        };

        let answer = confirm
            .with_prompt(format!(
                "{}\nrun the tests anyway and print results to the console?",
                DisplayErrorChain::new(error)
            ))
            .default(true)
            .show_default(true)
            .interact();

        match answer {
            Ok(true) => ConnectionErrorAction::ContinueOnConsole,
            Ok(false) => ConnectionErrorAction::Abort,
            Err(error) => {
                tracing::warn!("error reading input prompt, cancelling the run: {error}");
                ConnectionErrorAction::Abort
            }
        }
    }
}
