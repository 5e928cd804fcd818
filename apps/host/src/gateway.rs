//! Stdin stand-in for the chat platform: one command per line.

use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tracing::{debug, error, info};

use orator_core::module::ModuleRegistry;
use orator_core::{CommandErrorReporter, Result};

use crate::modules::console_context;

pub struct ConsoleGateway {
    registry: Arc<ModuleRegistry>,
    reporter: CommandErrorReporter,
    activation: String,
}

impl ConsoleGateway {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        reporter: CommandErrorReporter,
        activation: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            reporter,
            activation: activation.into(),
        }
    }

    /// Split `\say hello` into `("say", "hello")`. The activation prefix is optional.
    pub fn split_command<'a>(&self, line: &'a str) -> Option<(&'a str, &'a str)> {
        let line = line.trim();
        let line = line.strip_prefix(self.activation.as_str()).unwrap_or(line);
        if line.is_empty() {
            return None;
        }
        match line.split_once(char::is_whitespace) {
            Some((cmd, rest)) => Some((cmd, rest.trim())),
            None => Some((line, "")),
        }
    }

    /// Dispatch one line; returns the reply to print, if any.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let (command, input) = self.split_command(line)?;
        let ctx = console_context(line.trim());

        let Some(module) = self.registry.find_command(command).await else {
            let reason = format!("Command \"{}\" is not found", command);
            return Some(self.reporter.report(&ctx, command, &reason));
        };

        debug!(target = "orator_host", module = %module.name(), command, "Dispatching");
        match module.handle(command, input).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(target = "orator_host", error = %e, "Command failed");
                Some(self.reporter.report(&ctx, command, &e.to_string()))
            }
        }
    }

    /// Read lines until EOF or shutdown.
    pub async fn run<R>(&self, reader: R, mut shutdown: watch::Receiver<bool>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if let Some(reply) = self.handle_line(&line).await {
                            println!("{}", reply);
                        }
                    }
                    None => {
                        info!(target = "orator_host", "Console closed");
                        return Ok(());
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }
}
