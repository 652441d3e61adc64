//! Supervisor error types.

use std::process::ExitStatus;
use thiserror::Error;

/// A failed build/kill/run step. Recorded on the supervisor and shown to
/// every request until the next successful cycle.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("build: command is invalid")]
    EmptyBuild,

    #[error("build: `{command}` failed with {status}")]
    BuildStatus { command: String, status: ExitStatus },

    #[error("build: {0}")]
    BuildSpawn(std::io::Error),

    #[error("kill: {0}")]
    Kill(std::io::Error),

    #[error("run: command is invalid")]
    EmptyRun,

    #[error("run: {0}")]
    Run(std::io::Error),
}

impl SupervisorError {
    /// Short label for status output.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::EmptyBuild | Self::BuildStatus { .. } | Self::BuildSpawn(_) => "build",
            Self::Kill(_) => "kill",
            Self::EmptyRun | Self::Run(_) => "run",
        }
    }
}
