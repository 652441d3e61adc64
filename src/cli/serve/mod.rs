//! HTTP entry point: the listener in front of the target.
//!
//! Every request first gives the supervisor a chance to run a pending
//! rebuild, then either reports the recorded error or goes through the
//! retrying proxy.

mod lifecycle;
mod response;


use crate::{
    log,
    proxy::{Forward, HttpForwarder, RetryingProxy},
    supervisor::Supervisor,
    watch::Watcher,
};
use anyhow::Result;
use crossbeam::channel;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use tiny_http::{Request, Server};

/// Per-request handling shared by all request threads.
pub struct Gateway<F = HttpForwarder> {
    supervisor: Arc<Supervisor>,
    proxy: RetryingProxy<F>,
}

impl<F: Forward> Gateway<F> {
    pub fn new(supervisor: Arc<Supervisor>, proxy: RetryingProxy<F>) -> Self {
        Self { supervisor, proxy }
    }

    /// Handle a single HTTP request
    pub fn handle(&self, mut request: Request) -> Result<()> {
        // Early exit if shutdown requested
        if crate::core::is_shutdown() {
            return response::respond_unavailable(request);
        }

        // The claimant blocks here for the whole rebuild; everyone else
        // falls through immediately.
        self.supervisor.materialize();

        if let Some(error) = self.supervisor.last_error() {
            return response::respond_error(request, &error);
        }

        let inbound = response::inbound(&request);
        // Read once; a retry sees what is left of it, which is nothing.
        let mut body = Vec::new();
        request.as_reader().read_to_end(&mut body)?;

        let mut sink = response::StreamingResponse::new(request);
        self.proxy.serve(&inbound, &mut body.as_slice(), &mut sink)?;
        Ok(())
    }
}

/// Bound server ready to accept requests
pub struct BoundServer {
    server: Arc<Server>,
    shutdown_rx: channel::Receiver<()>,
}

/// Bind the HTTP server without starting the request loop
///
/// The initial build has already run by now, so the first request can be
/// proxied straight away.
pub fn bind_server(addr: SocketAddr, target: &url::Url) -> Result<BoundServer> {
    let server = Arc::new(lifecycle::bind(addr)?);

    let (shutdown_tx, shutdown_rx) = channel::unbounded::<()>();
    lifecycle::register_server_for_shutdown(Arc::clone(&server), shutdown_tx);

    log!("serve"; "http://{} -> {}", addr, target);

    Ok(BoundServer {
        server,
        shutdown_rx,
    })
}

impl BoundServer {
    /// Start the watcher and the request loop (blocking until shutdown).
    pub fn run<F: Forward + 'static>(
        self,
        watcher: Watcher,
        gateway: Arc<Gateway<F>>,
    ) -> Result<()> {
        let watcher_handle = lifecycle::spawn_watcher(watcher, self.shutdown_rx);
        run_request_loop(&self.server, &gateway);
        lifecycle::wait_for_shutdown(watcher_handle);
        Ok(())
    }
}

/// One thread per request. A request that is rebuilding or retrying only
/// blocks itself. Returns once the server is unblocked.
fn run_request_loop<F: Forward + 'static>(server: &Server, gateway: &Arc<Gateway<F>>) {
    for request in server.incoming_requests() {
        let gateway = Arc::clone(gateway);
        thread::spawn(move || {
            if let Err(e) = gateway.handle(request) {
                log!("serve"; "request error: {e}");
            }
        });
    }
}
