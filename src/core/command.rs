// src/core/command.rs

use crate::core::{
    binder::BindError,
    cancellation::{CancellationToken, Cancelled},
    command_line::CommandLine,
    converter::Value,
};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// How long a cooperative sleep waits between cancellation checks.
const CANCELLATION_POLL: Duration = Duration::from_millis(25);

/// Why a command body stopped before finishing.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The body observed the cancellation signal and gave up. Never counted as a fault.
    #[error("Command was cancelled.")]
    Cancelled,
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl From<Cancelled> for CommandError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// A command that can be bound from a command line and executed.
///
/// Instances come zero-valued from their descriptor's factory; the binder then calls
/// [`Command::assign`] once per parameter that resolved to a value, using the
/// parameter's canonical name.
pub trait Command: Send {
    /// Stores one bound parameter. Implementations usually match on `parameter` and
    /// convert with `value.try_into()?`.
    fn assign(&mut self, parameter: &str, value: Value) -> Result<(), BindError>;

    fn execute(&mut self, ctx: &ExecutionContext<'_>) -> Result<(), CommandError>;
}

impl<C: Command + ?Sized> Command for Box<C> {
    fn assign(&mut self, parameter: &str, value: Value) -> Result<(), BindError> {
        (**self).assign(parameter, value)
    }

    fn execute(&mut self, ctx: &ExecutionContext<'_>) -> Result<(), CommandError> {
        (**self).execute(ctx)
    }
}

/// Everything a running command may look at besides its own bound fields.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    invocation: Uuid,
    command: &'a str,
    line: &'a CommandLine,
    cancellation: &'a CancellationToken,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        invocation: Uuid,
        command: &'a str,
        line: &'a CommandLine,
        cancellation: &'a CancellationToken,
    ) -> Self {
        Self {
            invocation,
            command,
            line,
            cancellation,
        }
    }

    /// Id of the executor invocation this command belongs to.
    pub fn invocation(&self) -> Uuid {
        self.invocation
    }

    /// The canonical name of the running command.
    pub fn command(&self) -> &str {
        self.command
    }

    /// The command line this command was bound from.
    pub fn line(&self) -> &CommandLine {
        self.line
    }

    pub fn cancellation(&self) -> &CancellationToken {
        self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Suspension point for long-running bodies: `ctx.check_cancelled()?`.
    pub fn check_cancelled(&self) -> Result<(), Cancelled> {
        self.cancellation.check()
    }

    /// Sleeps for `duration`, waking early with `Err(Cancelled)` once the signal is set.
    pub fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        let deadline = Instant::now() + duration;
        loop {
            self.check_cancelled()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(CANCELLATION_POLL.min(deadline - now));
        }
    }
}
