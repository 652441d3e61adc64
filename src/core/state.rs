//! Process-wide run state.
//!
//! Only the shutdown lifecycle lives here:
//! - `requested`: Has shutdown been requested? (Ctrl+C received)
//! - `server`: listener to unblock so the request loop can return
//! - `shutdown_tx`: signal for the watcher actor
//!
//! Proxy state (process handle, last error) is owned by the `Supervisor`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crossbeam::channel::Sender;
use tiny_http::Server;

/// Shutdown flag plus what has to be woken when it is raised.
///
/// The handler never exits the process. Whatever is running when Ctrl+C
/// arrives sees the flag and unwinds to `Supervisor::shutdown`.
struct ShutdownState {
    requested: AtomicBool,
    server: OnceLock<Arc<Server>>,
    shutdown_tx: OnceLock<Sender<()>>,
}

impl ShutdownState {
    const fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            server: OnceLock::new(),
            shutdown_tx: OnceLock::new(),
        }
    }

    /// Ctrl+C: raise the flag, wake the watcher and the request loop.
    fn interrupt(&self) {
        self.request();
        if let Some(server) = self.server.get() {
            crate::log!("serve"; "shutting down...");
            server.unblock();
        }
    }

    /// Attach the listener. If shutdown was requested before it existed,
    /// it is unblocked right away.
    fn register(&self, server: Arc<Server>, shutdown_tx: Sender<()>) {
        let _ = self.server.set(server);
        let _ = self.shutdown_tx.set(shutdown_tx);

        if self.requested.load(Ordering::SeqCst) {
            self.request();
            if let Some(server) = self.server.get() {
                server.unblock();
            }
        }
    }

    fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        if let Some(tx) = self.shutdown_tx.get() {
            let _ = tx.send(());
        }
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }
}

static STATE: ShutdownState = ShutdownState::new();

/// Setup the global Ctrl+C handler. Call once at program start
///
/// Before `register_server()` only the flag is set: a running build is
/// aborted by its poll loop and `main` kills the target before binding.
/// After it, the server is unblocked and the watcher notified.
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| STATE.interrupt())
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Register the HTTP server for graceful shutdown
///
/// Call this after binding the server, before entering the request loop
pub fn register_server(server: Arc<Server>, shutdown_tx: Sender<()>) {
    STATE.register(server, shutdown_tx);
}

/// Mark shutdown as requested and notify the watcher actor.
pub fn request_shutdown() {
    STATE.request();
}

/// Check if shutdown has been requested
///
/// Uses Relaxed ordering: a build poll loop may run one more tick
/// before noticing, which is fine
pub fn is_shutdown() -> bool {
    STATE.is_requested()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn server() -> Arc<Server> {
        Arc::new(Server::http("127.0.0.1:0").unwrap())
    }

    #[test]
    fn test_interrupt_before_server_only_sets_flag() {
        let state = ShutdownState::new();
        state.interrupt();
        // still running here: no exit, the caller cleans up
        assert!(state.is_requested());
    }

    #[test]
    fn test_register_after_interrupt_unblocks_at_once() {
        let state = ShutdownState::new();
        state.interrupt();

        let server = server();
        let (tx, rx) = crossbeam::channel::unbounded();
        state.register(Arc::clone(&server), tx);

        assert!(rx.try_recv().is_ok(), "watcher was not notified");
        let started = Instant::now();
        let _ = server.recv_timeout(Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_interrupt_after_register_unblocks_server() {
        let state = ShutdownState::new();
        let server = server();
        let (tx, rx) = crossbeam::channel::unbounded();
        state.register(Arc::clone(&server), tx);
        assert!(!state.is_requested());
        assert!(rx.try_recv().is_err());

        state.interrupt();
        assert!(state.is_requested());
        assert!(rx.try_recv().is_ok());
        let started = Instant::now();
        let _ = server.recv_timeout(Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
