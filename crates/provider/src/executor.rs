//! Running external commands.
//!
//! Membership commands run through [`Executor::execute_sequence`], which never
//! fails: a command that exits nonzero is logged as a warning and the rest of
//! the sequence still runs, so one bad member name cannot block the others.
//! Everything else goes through [`Executor::run_checked`].

use crate::command::Command;
use crate::error::{Error, Result};
use log::{debug, info, warn};
use std::io::{self, Read};
use std::process::Stdio;

/// Exit status and combined stdout/stderr of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Something that can run a [`Command`] to completion.
pub trait Runner {
    fn run(&self, command: &Command) -> io::Result<CommandOutput>;
}

/// Runs commands as child processes and waits for them.
///
/// stdout and stderr share one pipe, so the captured output keeps the order
/// the child wrote it in.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, command: &Command) -> io::Result<CommandOutput> {
        let (mut reader, writer) = io::pipe()?;
        // The process builder holds our copies of the write end; it is
        // dropped at the end of this statement so the read below sees EOF.
        let mut child = command
            .to_process()
            .stdin(Stdio::null())
            .stdout(writer.try_clone()?)
            .stderr(writer)
            .spawn()?;

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        let status = child.wait()?;

        Ok(CommandOutput {
            status: status.code(),
            output: String::from_utf8_lossy(&buf).into_owned(),
        })
    }
}

pub struct Executor<R = SystemRunner> {
    runner: R,
    dry_run: bool,
}

impl Executor<SystemRunner> {
    pub fn system() -> Self {
        Self::new(SystemRunner)
    }
}

impl<R: Runner> Executor<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            dry_run: false,
        }
    }

    /// Log commands instead of running them.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run `commands` in order on behalf of `group`. Failures are warnings.
    pub fn execute_sequence(&self, group: &str, commands: &[Command]) {
        for cmd in commands {
            if self.dry_run {
                info!("[dry-run] {cmd}");
                continue;
            }

            match self.runner.run(cmd) {
                Ok(out) if out.success() => debug!("Success: {cmd}"),
                Ok(out) => warn!(
                    "Error modifying {group} using '{cmd}': {}",
                    out.output.trim_end()
                ),
                Err(e) => warn!("Error modifying {group} using '{cmd}': {e}"),
            }
        }
    }

    /// Run one command and fail unless it exits zero.
    pub fn run_checked(&self, command: &Command) -> Result<CommandOutput> {
        if self.dry_run {
            info!("[dry-run] {command}");
            return Ok(CommandOutput {
                status: Some(0),
                output: String::new(),
            });
        }

        let out = self.runner.run(command).map_err(|source| Error::Spawn {
            command: command.to_string(),
            source,
        })?;

        if !out.success() {
            return Err(Error::CommandFailed {
                command: command.to_string(),
                status: out.status,
                output: out.output.trim_end().to_string(),
            });
        }
        debug!("Success: {command}");
        Ok(out)
    }
}
