//! Build/run supervisor for the target process.
//!
//! One cycle, always under the supervisor lock:
//!
//! ```text
//! Idle → Building ─┬─ fail → record error → Idle (old process keeps running)
//!                  └─ ok → Killing ─┬─ fail → record error → Idle (no new start)
//!                                   └─ ok → Starting ─┬─ fail → record error, no handle
//!                                                     └─ ok → install handle, clear error
//! ```
//!
//! The previous process is only killed after a successful build, and the new
//! one only started after the previous is gone. At most one handle is live.
//!
//! Errors are sticky: the recorded error is served to every request until the
//! next cycle succeeds. It is published through `ArcSwapOption`, so requests
//! read a consistent snapshot without waiting for a cycle in progress.

mod error;
mod launcher;

#[cfg(test)]
mod tests;

pub use error::SupervisorError;
pub use launcher::{Launcher, ProcessHandle, ShellLauncher};

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::core::PendingTrigger;
use crate::logger::{status_error, status_success};
use crate::{debug, log};

type Handle = Box<dyn ProcessHandle>;

/// Owns the (at most one) running target process.
pub struct Supervisor {
    build: String,
    run: String,
    launcher: Box<dyn Launcher>,
    trigger: Arc<PendingTrigger>,
    /// Held for a whole build → kill → run cycle.
    current: Mutex<Option<Handle>>,
    last_error: ArcSwapOption<SupervisorError>,
}

impl Supervisor {
    pub fn new(
        build: impl Into<String>,
        run: impl Into<String>,
        launcher: Box<dyn Launcher>,
        trigger: Arc<PendingTrigger>,
    ) -> Self {
        Self {
            build: build.into(),
            run: run.into(),
            launcher,
            trigger,
            current: Mutex::new(None),
            last_error: ArcSwapOption::empty(),
        }
    }

    /// Trigger shared with the debouncer.
    pub fn trigger(&self) -> &Arc<PendingTrigger> {
        &self.trigger
    }

    /// Run a rebuild if one is owed.
    ///
    /// Only the caller that claims the trigger rebuilds; everyone else returns
    /// immediately. Returns whether this caller rebuilt.
    pub fn materialize(&self) -> bool {
        if !self.trigger.claim() {
            return false;
        }
        debug!("build"; "trigger claimed");
        let _ = self.rebuild();
        true
    }

    /// Build, replace the running process, and record the outcome.
    pub fn rebuild(&self) -> Result<(), Arc<SupervisorError>> {
        let mut current = self.current.lock();

        match self.cycle(&mut current) {
            Ok(handle) => {
                log!("run"; "started `{}` (pid {})", self.run, handle.id());
                *current = Some(handle);
                self.last_error.store(None);
                status_success("target running");
                Ok(())
            }
            Err(e) => {
                let e = Arc::new(e);
                status_error(&format!("{} failed", e.phase()), &e.to_string());
                self.last_error.store(Some(Arc::clone(&e)));
                Err(e)
            }
        }
    }

    fn cycle(&self, current: &mut Option<Handle>) -> Result<Handle, SupervisorError> {
        if self.build.is_empty() {
            return Err(SupervisorError::EmptyBuild);
        }
        log!("build"; "building: {}", self.build);
        self.launcher.build(&self.build)?;

        // Before the kill: an empty run command keeps the old process.
        if self.run.is_empty() {
            return Err(SupervisorError::EmptyRun);
        }

        if let Some(mut old) = current.take() {
            debug!("run"; "killing pid {}", old.id());
            if let Err(e) = old.kill() {
                *current = Some(old);
                return Err(SupervisorError::Kill(e));
            }
        }

        log!("run"; "running: {}", self.run);
        self.launcher.start(&self.run)
    }

    /// Snapshot of the sticky error, if any.
    pub fn last_error(&self) -> Option<Arc<SupervisorError>> {
        self.last_error.load_full()
    }

    /// Pid of the running target, if any. Waits for a cycle in progress.
    pub fn running_pid(&self) -> Option<u32> {
        self.current.lock().as_ref().map(|handle| handle.id())
    }

    /// Kill the running target. Called once the request loop has stopped.
    pub fn shutdown(&self) {
        let Some(mut handle) = self.current.lock().take() else {
            return;
        };
        let pid = handle.id();
        match handle.kill() {
            Ok(()) => debug!("run"; "stopped pid {}", pid),
            Err(e) => log!("run"; "failed to stop pid {}: {}", pid, e),
        }
    }
}
