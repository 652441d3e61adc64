//! Single-target HTTP forwarder.

use std::io::{self, Read};
use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use url::Url;

use super::Forward;
use super::retry::BAD_GATEWAY;
use super::sink::{Head, HeaderPair, InboundRequest, ResponseSink};
use crate::debug;

/// Upstream body read size. Each read is handed on as soon as it arrives.
const CHUNK_SIZE: usize = 8 * 1024;

/// Headers that only describe a single connection.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forwards requests to one upstream origin.
///
/// Scheme and host come from the target; path and query are joined onto the
/// target's own. Redirects are passed back to the client, not followed.
pub struct HttpForwarder {
    client: Client,
    target: Url,
}

impl HttpForwarder {
    pub fn new(target: Url) -> reqwest::Result<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(None::<Duration>)
            // The target restarts; a pooled connection may point at a dead process.
            .pool_max_idle_per_host(0)
            .no_proxy()
            .build()?;
        Ok(Self { client, target })
    }
}

impl Forward for HttpForwarder {
    fn forward(
        &self,
        request: &InboundRequest,
        body: &mut dyn Read,
        sink: &mut dyn ResponseSink,
    ) -> io::Result<()> {
        // Re-read on every attempt: once the client stream is drained, later
        // attempts send an empty body.
        let mut buf = Vec::new();
        body.read_to_end(&mut buf)?;

        let url = rewrite_url(&self.target, &request.url);
        let Ok(method) = Method::from_bytes(request.method.as_bytes()) else {
            sink.write_head(Head::new(400))?;
            return sink.finish();
        };

        // Only a request that never got a response head counts as a bad
        // gateway. Past this point the target has answered.
        let mut response = match self
            .client
            .request(method, url)
            .headers(outbound_headers(request))
            .body(buf)
            .send()
        {
            Ok(response) => response,
            Err(e) => {
                debug!("proxy"; "{} {}: {}", request.method, request.url, e);
                sink.write_head(Head::new(BAD_GATEWAY))?;
                return sink.finish();
            }
        };

        sink.write_head(Head {
            status: response.status().as_u16(),
            headers: inbound_headers(response.headers()),
        })?;

        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            let n = match response.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(io::Error::new(
                        e.kind(),
                        format!("{} {}: upstream body: {e}", request.method, request.url),
                    ));
                }
            };
            sink.write_body(&chunk[..n])?;
        }
        sink.finish()
    }
}

/// Join the request target onto the upstream URL.
///
/// Paths are joined with exactly one slash; queries are concatenated with `&`
/// when both sides have one.
pub(super) fn rewrite_url(target: &Url, request_url: &str) -> Url {
    let (path, query) = match request_url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (request_url, None),
    };

    let mut url = target.clone();
    url.set_path(&join_path(target.path(), path));

    let target_query = target.query().filter(|q| !q.is_empty());
    let query = match (target_query, query.filter(|q| !q.is_empty())) {
        (Some(a), Some(b)) => Some(format!("{a}&{b}")),
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (None, None) => None,
    };
    url.set_query(query.as_deref());
    url
}

fn join_path(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Whether `name` must not cross the proxy, given the request's own
/// `Connection` header tokens.
fn is_hop_by_hop(name: &str, connection_tokens: &[String]) -> bool {
    HOP_BY_HOP.iter().any(|hop| name.eq_ignore_ascii_case(hop))
        || connection_tokens
            .iter()
            .any(|token| name.eq_ignore_ascii_case(token))
}

fn connection_tokens(value: Option<&[u8]>) -> Vec<String> {
    value
        .map(String::from_utf8_lossy)
        .map(|value| {
            value
                .split(',')
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
}

/// Client headers as sent upstream.
///
/// `Host` is dropped so the target's authority is used. `Content-Length` is
/// recomputed from the body.
pub(super) fn outbound_headers(request: &InboundRequest) -> HeaderMap {
    let tokens = connection_tokens(request.header("connection"));
    let mut headers = HeaderMap::with_capacity(request.headers.len() + 1);
    let mut forwarded_for = None;

    for (name, value) in &request.headers {
        if is_hop_by_hop(name, &tokens)
            || name.eq_ignore_ascii_case("host")
            || name.eq_ignore_ascii_case("content-length")
        {
            continue;
        }
        if name.eq_ignore_ascii_case("x-forwarded-for") {
            forwarded_for = Some(String::from_utf8_lossy(value).into_owned());
            continue;
        }
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(value),
        ) else {
            debug!("proxy"; "dropping malformed header `{}`", name);
            continue;
        };
        headers.append(name, value);
    }

    if let Some(addr) = request.remote_addr {
        let ip = addr.ip().to_string();
        let value = match forwarded_for {
            Some(prior) => format!("{prior}, {ip}"),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert("x-forwarded-for", value);
        }
    } else if let Some(prior) = forwarded_for
        && let Ok(value) = HeaderValue::from_str(&prior)
    {
        headers.insert("x-forwarded-for", value);
    }

    headers
}

/// Upstream response headers as sent to the client.
///
/// Hop-by-hop headers are dropped. `Content-Length` is kept so the client
/// connection can reuse it; without one the listener picks its own framing.
pub(super) fn inbound_headers(headers: &HeaderMap) -> Vec<HeaderPair> {
    let tokens = connection_tokens(
        headers
            .get(reqwest::header::CONNECTION)
            .map(HeaderValue::as_bytes),
    );
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str(), &tokens))
        .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
        .collect()
}
