//! External command execution utilities.
//!
//! Build and run commands are configured as shell command lines. They are
//! handed to `bash -c` (or `sh -c`) when a shell is available, otherwise split
//! on whitespace and executed directly. Children inherit our stdout/stderr.
//!
//! # Examples
//!
//! ```ignore
//! use crate::utils::exec::Cmd;
//!
//! // Blocking build, aborted when shutdown is requested
//! let status = Cmd::shell("go build -o app .").cwd(root).run_until(is_shutdown)?;
//!
//! // Long-running target process
//! let child = Cmd::shell("./app").cwd(root).spawn()?;
//! ```

use std::{
    ffi::{OsStr, OsString},
    io,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    sync::OnceLock,
    time::Duration,
};

/// How often a blocking wait checks for cancellation.
const WAIT_POLL: Duration = Duration::from_millis(50);

// ============================================================================
// Builder API
// ============================================================================

/// Command builder for external process execution.
#[derive(Debug, Default)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            ..Default::default()
        }
    }

    /// Create from a command array (e.g., `["go", "build"]`).
    pub fn from_slice<S: AsRef<OsStr>>(cmd: &[S]) -> Self {
        let mut iter = cmd.iter();
        let program = iter
            .next()
            .map(|s| s.as_ref().to_owned())
            .unwrap_or_default();
        let args: Vec<_> = iter.map(|s| s.as_ref().to_owned()).collect();
        Self {
            program,
            args,
            ..Default::default()
        }
    }

    /// Create from a shell command line.
    ///
    /// Uses the first of `bash`, `sh` found on `PATH`; without a shell the
    /// line is split on whitespace (no quoting support).
    pub fn shell(command: &str) -> Self {
        match resolve_shell() {
            Some(sh) => Self::new(sh).arg("-c").arg(command),
            None => Self::from_slice(&split_command(command)),
        }
    }

    /// Add a single argument.
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        let arg = arg.as_ref();
        if !arg.is_empty() {
            self.args.push(arg.to_owned());
        }
        self
    }

    /// Set working directory.
    pub fn cwd<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    /// Get the program name for error messages.
    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().to_string()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Start the command without waiting for it.
    pub fn spawn(self) -> io::Result<Child> {
        self.command()
            .spawn()
            .map_err(|e| io::Error::new(e.kind(), format!("{}: {}", self.program_name(), e)))
    }

    /// Run the command to completion.
    ///
    /// `cancelled` is polled while waiting; when it returns true the child is
    /// killed and `ErrorKind::Interrupted` is returned.
    pub fn run_until(self, cancelled: impl Fn() -> bool) -> io::Result<ExitStatus> {
        let mut child = self.spawn()?;
        wait_until(&mut child, cancelled)
    }
}

/// Wait for a child, killing it if `cancelled` fires first.
pub fn wait_until(child: &mut Child, cancelled: impl Fn() -> bool) -> io::Result<ExitStatus> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(io::ErrorKind::Interrupted, "cancelled"));
        }
        std::thread::sleep(WAIT_POLL);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Locate an interactive shell once per process.
fn resolve_shell() -> Option<&'static Path> {
    static SHELL: OnceLock<Option<PathBuf>> = OnceLock::new();
    SHELL
        .get_or_init(|| ["bash", "sh"].iter().find_map(|sh| which::which(sh).ok()))
        .as_deref()
}

/// Split a command line on whitespace. Used only when no shell exists.
fn split_command(command: &str) -> Vec<&str> {
    command.split_whitespace().collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmd_builder() {
        let cmd = Cmd::new("echo").arg("hello").arg("").cwd("/tmp");

        assert_eq!(cmd.program, OsString::from("echo"));
        assert_eq!(cmd.args.len(), 1);
        assert_eq!(cmd.cwd, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_from_slice() {
        let cmd = Cmd::from_slice(&["go", "build", "-o", "app"]);
        assert_eq!(cmd.program_name(), "go");
        assert_eq!(cmd.args.len(), 3);
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("go  build -o app"), vec!["go", "build", "-o", "app"]);
        assert!(split_command("   ").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_uses_shell() {
        let cmd = Cmd::shell("echo hi && echo there");
        let program = cmd.program_name();
        assert!(program.ends_with("bash") || program.ends_with("sh"));
        assert_eq!(cmd.args[0], OsString::from("-c"));
        assert_eq!(cmd.args[1], OsString::from("echo hi && echo there"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_until_success_and_failure() {
        assert!(Cmd::shell("exit 0").run_until(|| false).unwrap().success());
        assert!(!Cmd::shell("exit 3").run_until(|| false).unwrap().success());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_until_cancelled() {
        let started = std::time::Instant::now();
        let err = Cmd::shell("sleep 30").run_until(|| true).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
