use std::io;

use super::sink::{Head, ResponseSink};

/// Status that means "upstream not ready yet".
pub const BAD_GATEWAY: u16 = 502;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Nothing written in the current attempt.
    Waiting,
    /// This attempt got a 502 that is being discarded.
    Swallowing,
    /// A head went through to the client. Final.
    Responded,
}

/// Response sink decorator that holds back up to `max_retries` bad gateway
/// responses.
///
/// ```text
/// Waiting ─┬─ 502, failed < max → Swallowing (retry) ─ next attempt → Waiting
///          └─ anything else     → Responded (pass-through)
/// ```
///
/// A fresh writer is created for every inbound request.
pub struct RetryWriter<'a> {
    inner: &'a mut dyn ResponseSink,
    max_retries: usize,
    failed: usize,
    state: State,
}

impl<'a> RetryWriter<'a> {
    pub fn new(inner: &'a mut dyn ResponseSink, max_retries: usize) -> Self {
        Self {
            inner,
            max_retries,
            failed: 0,
            state: State::Waiting,
        }
    }

    /// Whether a response reached the client.
    pub fn responded(&self) -> bool {
        self.state == State::Responded
    }

    /// Number of swallowed bad gateway responses.
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Whether the current attempt has written a head.
    pub(super) fn attempt_written(&self) -> bool {
        self.state != State::Waiting
    }

    /// Reset per-attempt state before re-invoking the forwarder.
    pub(super) fn next_attempt(&mut self) {
        if self.state == State::Swallowing {
            self.state = State::Waiting;
        }
    }
}

impl ResponseSink for RetryWriter<'_> {
    fn write_head(&mut self, head: Head) -> io::Result<()> {
        match self.state {
            State::Waiting if head.status == BAD_GATEWAY && self.failed < self.max_retries => {
                self.failed += 1;
                self.state = State::Swallowing;
                Ok(())
            }
            State::Waiting => {
                self.state = State::Responded;
                self.inner.write_head(head)
            }
            // one head per attempt
            State::Swallowing | State::Responded => Ok(()),
        }
    }

    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self.state {
            State::Responded => self.inner.write_body(chunk),
            State::Waiting | State::Swallowing => Ok(()),
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        match self.state {
            State::Responded => self.inner.finish(),
            State::Waiting | State::Swallowing => Ok(()),
        }
    }
}
