//! Request and response shapes shared by the forwarder and the listener.

use std::io;
use std::net::SocketAddr;

/// Header name and raw value. Values are not required to be UTF-8.
pub type HeaderPair = (String, Vec<u8>);

/// An inbound client request, detached from the listener's types.
///
/// The body is passed separately as a reader.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: String,
    /// Request target as received: path plus optional query.
    pub url: String,
    pub headers: Vec<HeaderPair>,
    pub remote_addr: Option<SocketAddr>,
}

impl InboundRequest {
    /// First value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_slice())
    }
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Head {
    pub status: u16,
    pub headers: Vec<HeaderPair>,
}

impl Head {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
        }
    }
}

/// Destination of a response.
///
/// `write_head` is called once per response, before any `write_body`.
/// `finish` marks a complete body; a body cut short ends without it.
pub trait ResponseSink {
    fn write_head(&mut self, head: Head) -> io::Result<()>;

    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()>;

    fn finish(&mut self) -> io::Result<()>;
}
