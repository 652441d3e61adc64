//! Conversions between tiny_http and the proxy's request/response types.

use std::io::{self, Write};

use anyhow::Result;
use tiny_http::{HTTPVersion, Header, Method, Request, Response, StatusCode};

use crate::proxy::{Head, InboundRequest, ResponseSink};
use crate::supervisor::SupervisorError;

const PLAIN: &str = "text/plain; charset=utf-8";

/// Detach method, target, headers and peer address from a tiny_http request.
pub fn inbound(request: &Request) -> InboundRequest {
    InboundRequest {
        method: request.method().as_str().to_string(),
        url: request.url().to_string(),
        headers: request
            .headers()
            .iter()
            .map(|h| (h.field.as_str().as_str().to_string(), h.value.as_bytes().to_vec()))
            .collect(),
        remote_addr: request.remote_addr().copied(),
    }
}

/// Response sink writing straight to the client connection.
///
/// The head goes out as soon as the proxy lets it through, and every body
/// chunk is flushed as it arrives. An upstream `Content-Length` is passed
/// through; otherwise HTTP/1.1 clients get a chunked body and HTTP/1.0
/// clients get the body collected and sent with a length.
pub struct StreamingResponse {
    request: Option<Request>,
    writer: Option<Writer>,
    /// Client HTTP version, major and minor.
    version: (u8, u8),
    head_method: bool,
    framing: Framing,
}

enum Framing {
    /// No head yet.
    Pending,
    /// Body bytes pass through unchanged.
    Raw { send_body: bool },
    Chunked,
    /// HTTP/1.0 client without an upstream length.
    Collect { head: Head, body: Vec<u8> },
    Finished,
}

impl StreamingResponse {
    pub fn new(request: Request) -> Self {
        let HTTPVersion(major, minor) = *request.http_version();
        Self {
            version: (major, minor),
            head_method: *request.method() == Method::Head,
            request: Some(request),
            writer: None,
            framing: Framing::Pending,
        }
    }

    /// Take over the connection and write status line and headers.
    fn start(&mut self, head: &Head, framing: Option<(&str, String)>) -> io::Result<()> {
        let request = self
            .request
            .take()
            .ok_or_else(|| io::Error::other("response already started"))?;
        let mut writer = request.into_writer();

        let (major, minor) = self.version;
        let reason = StatusCode(head.status).default_reason_phrase();
        write!(writer, "HTTP/{major}.{minor} {} {reason}\r\n", head.status)?;
        for (name, value) in &head.headers {
            writer.write_all(name.as_bytes())?;
            writer.write_all(b": ")?;
            writer.write_all(value)?;
            writer.write_all(b"\r\n")?;
        }
        if let Some((name, value)) = framing {
            write!(writer, "{name}: {value}\r\n")?;
        }
        writer.write_all(b"Connection: close\r\n\r\n")?;
        writer.flush()?;

        self.writer = Some(writer);
        Ok(())
    }
}

type Writer = Box<dyn Write + Send + 'static>;

fn started(writer: &mut Option<Writer>) -> io::Result<&mut (dyn Write + Send + 'static)> {
    writer
        .as_deref_mut()
        .ok_or_else(|| io::Error::other("response not started"))
}

impl ResponseSink for StreamingResponse {
    fn write_head(&mut self, head: Head) -> io::Result<()> {
        let bodyless = self.head_method || matches!(head.status, 100..=199 | 204 | 304);
        let has_length = head
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-length"));

        if bodyless || has_length {
            self.start(&head, None)?;
            self.framing = Framing::Raw {
                send_body: !bodyless,
            };
        } else if self.version >= (1, 1) {
            self.start(&head, Some(("Transfer-Encoding", "chunked".to_string())))?;
            self.framing = Framing::Chunked;
        } else {
            self.framing = Framing::Collect {
                head,
                body: Vec::new(),
            };
        }
        Ok(())
    }

    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()> {
        match &mut self.framing {
            Framing::Raw { send_body: false } => Ok(()),
            Framing::Raw { send_body: true } => {
                let writer = started(&mut self.writer)?;
                writer.write_all(chunk)?;
                writer.flush()
            }
            Framing::Chunked if chunk.is_empty() => Ok(()),
            Framing::Chunked => {
                let writer = started(&mut self.writer)?;
                write!(writer, "{:x}\r\n", chunk.len())?;
                writer.write_all(chunk)?;
                writer.write_all(b"\r\n")?;
                writer.flush()
            }
            Framing::Collect { body, .. } => {
                body.extend_from_slice(chunk);
                Ok(())
            }
            Framing::Pending | Framing::Finished => {
                Err(io::Error::other("body outside a response"))
            }
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        match std::mem::replace(&mut self.framing, Framing::Finished) {
            Framing::Chunked => {
                let writer = started(&mut self.writer)?;
                writer.write_all(b"0\r\n\r\n")?;
                writer.flush()
            }
            Framing::Collect { head, body } => {
                self.start(&head, Some(("Content-Length", body.len().to_string())))?;
                let writer = started(&mut self.writer)?;
                writer.write_all(&body)?;
                writer.flush()
            }
            Framing::Raw { .. } | Framing::Pending | Framing::Finished => Ok(()),
        }
    }
}

/// Respond with the recorded build/kill/run error (500).
pub fn respond_error(request: Request, error: &SupervisorError) -> Result<()> {
    send_plain(request, 500, format!("{error}\n"))
}

/// Respond with 503 Service Unavailable (server shutting down).
pub fn respond_unavailable(request: Request) -> Result<()> {
    send_plain(request, 503, "503 Service Unavailable\n".to_string())
}

fn send_plain(request: Request, status: u16, body: String) -> Result<()> {
    let mut response = Response::from_string(body).with_status_code(StatusCode(status));
    if let Ok(header) = Header::from_bytes("Content-Type", PLAIN) {
        response.add_header(header);
    }
    request.respond(response)?;
    Ok(())
}
