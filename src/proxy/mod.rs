//! Retrying reverse proxy.
//!
//! Right after a restart the target is usually not listening yet, and
//! forwarding fails with a bad gateway. Instead of showing that to the
//! client, the request is replayed against the target a bounded number of
//! times, a fixed interval apart. Once the budget is spent the last response
//! goes through as is.

mod forward;
mod retry;
mod sink;


pub use forward::HttpForwarder;
pub use retry::{BAD_GATEWAY, RetryWriter};
pub use sink::{Head, HeaderPair, InboundRequest, ResponseSink};

use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;

use crate::debug;

/// One attempt at answering a request from the target.
pub trait Forward: Send + Sync {
    /// Write exactly one response head to `sink`, then stream its body.
    ///
    /// An unreachable target is a 502 response, not an error. Errors are
    /// everything after that: reading the client body, writing to the sink,
    /// or an upstream body that breaks off once its head was written.
    fn forward(
        &self,
        request: &InboundRequest,
        body: &mut dyn Read,
        sink: &mut dyn ResponseSink,
    ) -> io::Result<()>;
}

impl<T: Forward + ?Sized> Forward for Arc<T> {
    fn forward(
        &self,
        request: &InboundRequest,
        body: &mut dyn Read,
        sink: &mut dyn ResponseSink,
    ) -> io::Result<()> {
        (**self).forward(request, body, sink)
    }
}

/// How many 502s to hold back, and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            interval: Duration::from_millis(100),
        }
    }
}

/// Forwarder wrapped in the retry loop.
pub struct RetryingProxy<F = HttpForwarder> {
    forward: F,
    policy: RetryPolicy,
}

impl<F: Forward> RetryingProxy<F> {
    pub fn new(forward: F, policy: RetryPolicy) -> Self {
        Self { forward, policy }
    }

    /// Forward `request` until a response reaches `sink`.
    ///
    /// Sleeps only between attempts, so worst case adds
    /// `max_retries × interval`. The sleep blocks this request alone.
    pub fn serve(
        &self,
        request: &InboundRequest,
        body: &mut dyn Read,
        sink: &mut dyn ResponseSink,
    ) -> io::Result<()> {
        let mut writer = RetryWriter::new(sink, self.policy.max_retries);

        loop {
            self.forward.forward(request, body, &mut writer)?;
            if !writer.attempt_written() {
                writer.write_head(Head::new(BAD_GATEWAY))?;
                writer.finish()?;
            }
            if writer.responded() {
                return Ok(());
            }

            debug!("proxy"; "{} {}: target unavailable, retry {}/{}",
                request.method, request.url, writer.failed(), self.policy.max_retries);
            std::thread::sleep(self.policy.interval);
            writer.next_attempt();
        }
    }
}
