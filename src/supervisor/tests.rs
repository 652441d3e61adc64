use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use parking_lot::Mutex;

use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Build,
    Kill(u32),
    Start(u32),
}

/// Shared record of what the launcher was asked to do.
#[derive(Default)]
struct Journal {
    steps: Mutex<Vec<Step>>,
    alive: AtomicUsize,
    max_alive: AtomicUsize,
}

impl Journal {
    fn steps(&self) -> Vec<Step> {
        self.steps.lock().clone()
    }

    fn builds(&self) -> usize {
        self.steps().iter().filter(|s| **s == Step::Build).count()
    }
}

/// Launcher that plays back scripted outcomes.
struct ScriptedLauncher {
    journal: Arc<Journal>,
    builds: Mutex<VecDeque<bool>>,
    starts: Mutex<VecDeque<bool>>,
    kill_ok: Arc<Mutex<bool>>,
    next_pid: AtomicU32,
}

impl ScriptedLauncher {
    fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            builds: Mutex::new(VecDeque::new()),
            starts: Mutex::new(VecDeque::new()),
            kill_ok: Arc::new(Mutex::new(true)),
            next_pid: AtomicU32::new(1),
        }
    }

    fn builds(self, outcomes: &[bool]) -> Self {
        self.builds.lock().extend(outcomes);
        self
    }

    fn starts(self, outcomes: &[bool]) -> Self {
        self.starts.lock().extend(outcomes);
        self
    }
}

impl Launcher for ScriptedLauncher {
    fn build(&self, command: &str) -> Result<(), SupervisorError> {
        self.journal.steps.lock().push(Step::Build);
        if self.builds.lock().pop_front().unwrap_or(true) {
            Ok(())
        } else {
            Err(SupervisorError::BuildSpawn(io::Error::other(format!(
                "`{command}` exploded"
            ))))
        }
    }

    fn start(&self, _command: &str) -> Result<Box<dyn ProcessHandle>, SupervisorError> {
        if !self.starts.lock().pop_front().unwrap_or(true) {
            return Err(SupervisorError::Run(io::Error::other("no such file")));
        }
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.journal.steps.lock().push(Step::Start(pid));
        let alive = self.journal.alive.fetch_add(1, Ordering::SeqCst) + 1;
        self.journal.max_alive.fetch_max(alive, Ordering::SeqCst);
        Ok(Box::new(FakeProcess {
            pid,
            journal: Arc::clone(&self.journal),
            kill_ok: Arc::clone(&self.kill_ok),
        }))
    }
}

struct FakeProcess {
    pid: u32,
    journal: Arc<Journal>,
    kill_ok: Arc<Mutex<bool>>,
}

impl ProcessHandle for FakeProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn kill(&mut self) -> io::Result<()> {
        if !*self.kill_ok.lock() {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        }
        self.journal.steps.lock().push(Step::Kill(self.pid));
        self.journal.alive.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn supervisor(launcher: ScriptedLauncher) -> Supervisor {
    Supervisor::new(
        "make",
        "./app",
        Box::new(launcher),
        Arc::new(PendingTrigger::new()),
    )
}

#[test]
fn test_first_cycle_starts_without_kill() {
    let journal = Arc::new(Journal::default());
    let sup = supervisor(ScriptedLauncher::new(Arc::clone(&journal)));

    sup.rebuild().unwrap();

    assert_eq!(journal.steps(), vec![Step::Build, Step::Start(1)]);
    assert_eq!(sup.running_pid(), Some(1));
    assert!(sup.last_error().is_none());
}

#[test]
fn test_kill_before_start() {
    let journal = Arc::new(Journal::default());
    let sup = supervisor(ScriptedLauncher::new(Arc::clone(&journal)));

    sup.rebuild().unwrap();
    sup.rebuild().unwrap();
    sup.rebuild().unwrap();

    assert_eq!(
        journal.steps(),
        vec![
            Step::Build,
            Step::Start(1),
            Step::Build,
            Step::Kill(1),
            Step::Start(2),
            Step::Build,
            Step::Kill(2),
            Step::Start(3),
        ]
    );
    assert_eq!(journal.max_alive.load(Ordering::SeqCst), 1);
    assert_eq!(sup.running_pid(), Some(3));
}

#[test]
fn test_build_failure_is_sticky_and_keeps_process() {
    let journal = Arc::new(Journal::default());
    let sup = supervisor(ScriptedLauncher::new(Arc::clone(&journal)).builds(&[true, false]));

    sup.rebuild().unwrap();
    let err = sup.rebuild().unwrap_err();
    assert!(matches!(*err, SupervisorError::BuildSpawn(_)));

    // Previous process untouched
    assert_eq!(sup.running_pid(), Some(1));
    assert!(!journal.steps().contains(&Step::Kill(1)));

    // Error stays until the next cycle
    for _ in 0..3 {
        let sticky = sup.last_error().expect("error should stick");
        assert!(sticky.to_string().starts_with("build:"));
    }

    // Next successful cycle clears it
    sup.rebuild().unwrap();
    assert!(sup.last_error().is_none());
    assert_eq!(sup.running_pid(), Some(2));
}

#[test]
fn test_kill_failure_blocks_start() {
    let journal = Arc::new(Journal::default());
    let launcher = ScriptedLauncher::new(Arc::clone(&journal));
    let kill_ok = Arc::clone(&launcher.kill_ok);
    let sup = supervisor(launcher);

    sup.rebuild().unwrap();
    *kill_ok.lock() = false;

    let err = sup.rebuild().unwrap_err();
    assert!(matches!(*err, SupervisorError::Kill(_)));
    assert_eq!(err.phase(), "kill");

    // No second start; the handle is kept so the next cycle retries the kill
    assert_eq!(journal.steps(), vec![Step::Build, Step::Start(1), Step::Build]);
    assert_eq!(sup.running_pid(), Some(1));

    *kill_ok.lock() = true;
    sup.rebuild().unwrap();
    assert_eq!(sup.running_pid(), Some(2));
    assert_eq!(journal.max_alive.load(Ordering::SeqCst), 1);
}

#[test]
fn test_run_failure_leaves_no_handle() {
    let journal = Arc::new(Journal::default());
    let sup = supervisor(ScriptedLauncher::new(Arc::clone(&journal)).starts(&[true, false]));

    sup.rebuild().unwrap();
    let err = sup.rebuild().unwrap_err();

    assert!(matches!(*err, SupervisorError::Run(_)));
    assert_eq!(sup.running_pid(), None);
    assert!(sup.last_error().is_some());
    assert_eq!(journal.alive.load(Ordering::SeqCst), 0);
}

#[test]
fn test_empty_build_command() {
    let journal = Arc::new(Journal::default());
    let sup = Supervisor::new(
        "",
        "./app",
        Box::new(ScriptedLauncher::new(Arc::clone(&journal))),
        Arc::new(PendingTrigger::new()),
    );

    let err = sup.rebuild().unwrap_err();
    assert!(matches!(*err, SupervisorError::EmptyBuild));
    assert_eq!(err.to_string(), "build: command is invalid");
    assert!(journal.steps().is_empty());
}

#[test]
fn test_empty_run_command_keeps_old_process() {
    let journal = Arc::new(Journal::default());
    let launcher = ScriptedLauncher::new(Arc::clone(&journal));
    let trigger = Arc::new(PendingTrigger::new());
    let sup = Supervisor::new("make", "./app", Box::new(launcher), Arc::clone(&trigger));
    sup.rebuild().unwrap();

    let sup_no_run = Supervisor {
        run: String::new(),
        ..sup
    };
    let err = sup_no_run.rebuild().unwrap_err();
    assert!(matches!(*err, SupervisorError::EmptyRun));
    assert_eq!(sup_no_run.running_pid(), Some(1));
}

#[test]
fn test_materialize_without_trigger_is_noop() {
    let journal = Arc::new(Journal::default());
    let sup = supervisor(ScriptedLauncher::new(Arc::clone(&journal)));

    assert!(!sup.materialize());
    assert!(journal.steps().is_empty());

    sup.trigger().set();
    assert!(sup.materialize());
    assert!(!sup.materialize());
    assert_eq!(journal.builds(), 1);
}

#[test]
fn test_concurrent_requests_rebuild_once() {
    const REQUESTS: usize = 12;

    let journal = Arc::new(Journal::default());
    let sup = Arc::new(supervisor(ScriptedLauncher::new(Arc::clone(&journal))));
    let barrier = Arc::new(Barrier::new(REQUESTS));
    sup.trigger().set();

    let handles: Vec<_> = (0..REQUESTS)
        .map(|_| {
            let sup = Arc::clone(&sup);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                sup.materialize()
            })
        })
        .collect();

    let rebuilt = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|rebuilt| *rebuilt)
        .count();

    assert_eq!(rebuilt, 1);
    assert_eq!(journal.builds(), 1);
}

#[test]
fn test_shutdown_kills_current() {
    let journal = Arc::new(Journal::default());
    let sup = supervisor(ScriptedLauncher::new(Arc::clone(&journal)));

    sup.rebuild().unwrap();
    sup.shutdown();

    assert_eq!(sup.running_pid(), None);
    assert_eq!(journal.alive.load(Ordering::SeqCst), 0);

    // idempotent
    sup.shutdown();
}

#[cfg(unix)]
#[test]
fn test_shell_launcher_real_processes() {
    let temp = tempfile::TempDir::new().unwrap();
    let launcher = ShellLauncher::new(temp.path());

    launcher.build("touch built").unwrap();
    assert!(temp.path().join("built").exists());

    let err = launcher.build("exit 2").unwrap_err();
    assert!(matches!(err, SupervisorError::BuildStatus { .. }));
    assert!(err.to_string().contains("exit 2"));

    let mut handle = launcher.start("sleep 30").unwrap();
    assert!(handle.id() > 0);
    handle.kill().unwrap();
}
