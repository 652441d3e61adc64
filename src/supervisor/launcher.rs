//! Process launching seam.
//!
//! The supervisor only needs "run this build to completion" and "start this
//! command and give me something killable". `ShellLauncher` does both with
//! real child processes; tests substitute a scripted launcher.

use std::io;
use std::path::PathBuf;
use std::process::Child;

use super::SupervisorError;
use crate::utils::exec::Cmd;

/// A running target process.
pub trait ProcessHandle: Send {
    fn id(&self) -> u32;

    /// Kill the process and reap it.
    fn kill(&mut self) -> io::Result<()>;
}

/// Runs build commands and starts target processes.
pub trait Launcher: Send + Sync {
    /// Run `command` to completion; non-zero exit is an error.
    fn build(&self, command: &str) -> Result<(), SupervisorError>;

    /// Start `command` without waiting for it.
    fn start(&self, command: &str) -> Result<Box<dyn ProcessHandle>, SupervisorError>;
}

/// Launches commands through the shell, in the project root.
#[derive(Debug, Clone)]
pub struct ShellLauncher {
    cwd: PathBuf,
}

impl ShellLauncher {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }
}

impl Launcher for ShellLauncher {
    fn build(&self, command: &str) -> Result<(), SupervisorError> {
        let status = Cmd::shell(command)
            .cwd(&self.cwd)
            .run_until(crate::core::is_shutdown)
            .map_err(SupervisorError::BuildSpawn)?;

        if status.success() {
            Ok(())
        } else {
            Err(SupervisorError::BuildStatus {
                command: command.to_string(),
                status,
            })
        }
    }

    fn start(&self, command: &str) -> Result<Box<dyn ProcessHandle>, SupervisorError> {
        let child = Cmd::shell(command)
            .cwd(&self.cwd)
            .spawn()
            .map_err(SupervisorError::Run)?;
        Ok(Box::new(ChildHandle(child)))
    }
}

/// `std::process::Child` as a process handle.
struct ChildHandle(Child);

impl ProcessHandle for ChildHandle {
    fn id(&self) -> u32 {
        self.0.id()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.0.kill()?;
        self.0.wait()?;
        Ok(())
    }
}
