//! Server lifecycle management.

use crate::{core::register_server, log, watch::Watcher};
use anyhow::Result;
use crossbeam::channel::{Receiver, Sender};
use std::{
    net::SocketAddr,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};
use tiny_http::Server;

/// How often the watcher runtime checks for shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Bind the listener. The address is configured, so a taken port is fatal.
pub fn bind(addr: SocketAddr) -> Result<Server> {
    Server::http(addr).map_err(|e| anyhow::anyhow!("failed to bind {}: {}", addr, e))
}

/// Register server for graceful shutdown.
///
/// This registers the server with the global shutdown handler set up in main().
/// When Ctrl+C is pressed, the handler will unblock the server and stop the watcher.
pub fn register_server_for_shutdown(server: Arc<Server>, shutdown_tx: Sender<()>) {
    register_server(server, shutdown_tx);
}

/// Run the watcher on its own thread and tokio runtime.
pub fn spawn_watcher(watcher: Watcher, shutdown_rx: Receiver<()>) -> JoinHandle<()> {
    thread::spawn(move || run_watcher(watcher, shutdown_rx))
}

fn run_watcher(watcher: Watcher, shutdown_rx: Receiver<()>) {
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log!("watch"; "failed to create runtime: {}", e);
            return;
        }
    };

    rt.block_on(async {
        let task = tokio::spawn(watcher.run());

        loop {
            if shutdown_rx.try_recv().is_ok() || crate::core::is_shutdown() {
                crate::debug!("watch"; "shutdown signal received");
                break;
            }
            tokio::time::sleep(SHUTDOWN_POLL).await;
        }

        // Dropping the task drops the notify watcher, which ends the bridge thread.
        task.abort();
        let _ = task.await;
    });
}

/// Wait for the watcher thread to finish (max 2 seconds).
pub fn wait_for_shutdown(handle: JoinHandle<()>) {
    for _ in 0..40 {
        if handle.is_finished() {
            let _ = handle.join();
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
}
