//! External process invocation under a deadline.
//!
//! The synthesizer is launched with `tokio::process` so a slow or hanging child
//! never blocks other requests. Expiry of the deadline kills the child; a
//! shutdown signal on the optional watch channel does the same but is reported
//! as [`InvocationOutcome::Cancelled`].

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

/// Fully resolved argv for one external invocation. No shell is involved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandLine {
    pub envs: Vec<(String, String)>,
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            envs: Vec::new(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Wrap the current program behind `prefix`, e.g. `wine say.exe ...`.
    pub fn wrapped_by(mut self, prefix: &[String]) -> Self {
        let Some((program, rest)) = prefix.split_first() else {
            return self;
        };
        let mut args: Vec<String> = rest.to_vec();
        args.push(std::mem::take(&mut self.program));
        args.append(&mut self.args);
        self.program = program.clone();
        self.args = args;
        self
    }

    /// The last positional argument (the formatted text for synthesis calls).
    pub fn last_arg(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in &self.envs {
            write!(f, "{}={} ", k, v)?;
        }
        write!(f, "{}", self.program)?;
        for a in &self.args {
            if a.contains(char::is_whitespace) || a.is_empty() {
                write!(f, " \"{}\"", a)?;
            } else {
                write!(f, " {}", a)?;
            }
        }
        Ok(())
    }
}

/// Result of waiting on an external process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// Process finished. Signal-terminated children report `-1`.
    Exited(i32),
    TimedOut,
    Cancelled,
}

impl InvocationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationOutcome::Exited(0))
    }
}

/// Launches an external command and waits for it, bounded by `deadline`.
///
/// Spawn failures are the `Err` arm; everything after a successful spawn is an
/// [`InvocationOutcome`]. Implementations never retry.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProcessInvoker: Send + Sync {
    async fn run(&self, command: &CommandLine, deadline: Duration) -> io::Result<InvocationOutcome>;
}

/// Default invoker backed by `tokio::process`.
#[derive(Clone, Debug, Default)]
pub struct TokioProcessInvoker {
    shutdown: Option<watch::Receiver<bool>>,
}

impl TokioProcessInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel in-flight waits when `true` is published on the channel.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn build(command: &CommandLine) -> Command {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

async fn wait_for_shutdown(rx: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = rx else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: nobody can cancel any more.
            return std::future::pending().await;
        }
    }
}

#[async_trait]
impl ProcessInvoker for TokioProcessInvoker {
    async fn run(&self, command: &CommandLine, deadline: Duration) -> io::Result<InvocationOutcome> {
        debug!(target: "process", command = %command, deadline_ms = deadline.as_millis() as u64, "Spawning process");
        let mut child = Self::build(command).spawn()?;

        let outcome = tokio::select! {
            waited = timeout(deadline, child.wait()) => match waited {
                Ok(status) => {
                    let status = status?;
                    InvocationOutcome::Exited(status.code().unwrap_or(-1))
                }
                Err(_) => InvocationOutcome::TimedOut,
            },
            _ = wait_for_shutdown(self.shutdown.clone()) => InvocationOutcome::Cancelled,
        };

        match outcome {
            InvocationOutcome::TimedOut => {
                warn!(target: "process", program = %command.program, deadline_ms = deadline.as_millis() as u64, "Process exceeded deadline; killing");
                if let Err(e) = child.kill().await {
                    warn!(target: "process", error = %e, "Failed to kill timed out process");
                }
            }
            InvocationOutcome::Cancelled => {
                warn!(target: "process", program = %command.program, "Process wait cancelled, but not from a timeout");
                if let Err(e) = child.kill().await {
                    warn!(target: "process", error = %e, "Failed to kill cancelled process");
                }
            }
            InvocationOutcome::Exited(code) => {
                debug!(target: "process", program = %command.program, code, "Process exited");
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_by_moves_program_into_args() {
        let cmd = CommandLine::new("say.exe")
            .arg("-w")
            .arg("/tmp/1.wav")
            .wrapped_by(&["wine".to_string()]);
        assert_eq!(cmd.program, "wine");
        assert_eq!(cmd.args, vec!["say.exe", "-w", "/tmp/1.wav"]);
    }

    #[test]
    fn wrapped_by_empty_prefix_is_noop() {
        let cmd = CommandLine::new("espeak").arg("hi").wrapped_by(&[]);
        assert_eq!(cmd.program, "espeak");
        assert_eq!(cmd.args, vec!["hi"]);
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let cmd = CommandLine::new("say.exe")
            .env("DISPLAY", ":0.0")
            .arg("-w")
            .arg("hello world");
        assert_eq!(cmd.to_string(), "DISPLAY=:0.0 say.exe -w \"hello world\"");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reports_exit_code() {
        let invoker = TokioProcessInvoker::new();
        let cmd = CommandLine::new("sh").arg("-c").arg("exit 3");
        let out = invoker.run(&cmd, Duration::from_secs(5)).await.unwrap();
        assert_eq!(out, InvocationOutcome::Exited(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn times_out_and_returns_promptly() {
        let invoker = TokioProcessInvoker::new();
        let cmd = CommandLine::new("sleep").arg("5");
        let started = std::time::Instant::now();
        let out = invoker.run(&cmd, Duration::from_millis(100)).await.unwrap();
        assert_eq!(out, InvocationOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shutdown_cancels_wait() {
        let (tx, rx) = watch::channel(false);
        let invoker = TokioProcessInvoker::new().with_shutdown(rx);
        let cmd = CommandLine::new("sleep").arg("5");
        let handle = tokio::spawn(async move { invoker.run(&cmd, Duration::from_secs(10)).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let out = handle.await.unwrap().unwrap();
        assert_eq!(out, InvocationOutcome::Cancelled);
    }

    #[tokio::test]
    async fn spawn_failure_is_io_error() {
        let invoker = TokioProcessInvoker::new();
        let cmd = CommandLine::new("/definitely/not/a/real/binary");
        assert!(invoker.run(&cmd, Duration::from_secs(1)).await.is_err());
    }
}
