//! Configuration utility functions.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use url::{ParseError, Url};

use super::ConfigError;

/// Normalize the upstream address into an absolute HTTP(S) URL.
///
/// The target may be written like a listen address, without a scheme.
/// Parsing is forward-only:
/// 1. parse as-is
/// 2. on a missing scheme, prepend `http://` and parse once more
///
/// Any other failure is fatal. Only `http` and `https` are accepted.
///
/// # Examples
/// ```ignore
/// parse_target_addr("http://localhost:3001") -> http://localhost:3001/
/// parse_target_addr("localhost:9000")        -> http://localhost:9000/
/// parse_target_addr("127.0.0.1:9000")        -> http://127.0.0.1:9000/
/// parse_target_addr("ftp://x")               -> Err(TargetScheme)
/// ```
pub fn parse_target_addr(addr: &str) -> Result<Url, ConfigError> {
    let url = match Url::parse(addr) {
        Ok(url) if !url.cannot_be_a_base() => url,
        // `localhost:9000` parses as an opaque `scheme:path` URL;
        // `127.0.0.1:9000` has no scheme at all.
        Ok(_) | Err(ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("http://{addr}"))
                .map_err(|e| ConfigError::TargetAddr(addr.to_string(), e))?
        }
        Err(e) => return Err(ConfigError::TargetAddr(addr.to_string(), e)),
    };

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::TargetScheme {
            addr: addr.to_string(),
            scheme: url.scheme().to_string(),
        });
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::TargetHost(addr.to_string()));
    }

    Ok(url)
}

/// Resolve the proxy listen address.
///
/// `:3000` listens on all interfaces, like a bare port in most servers.
/// Hostnames are resolved and the first address is used.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ConfigError> {
    let candidate = match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_string(),
    };

    let mut resolved = candidate
        .to_socket_addrs()
        .map_err(|e| ConfigError::ListenAddr(addr.to_string(), e.to_string()))?;

    resolved
        .next()
        .ok_or_else(|| ConfigError::ListenAddr(addr.to_string(), "no address resolved".into()))
}

/// Find config file by searching upward from current directory
///
/// Starts from cwd and walks up parent directories until finding `config_name`
/// Returns the absolute path to the config file if found
///
/// # Example
/// ```text
/// /home/user/service/handlers/  ← cwd
/// /home/user/service/recharge.conf  ← found!
/// ```
pub fn find_config_file(config_name: &Path) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_from(&cwd, config_name)
}

fn find_config_from(start: &Path, config_name: &Path) -> Option<PathBuf> {
    if config_name.is_absolute() {
        return config_name.exists().then(|| config_name.to_path_buf());
    }

    let mut current = start;
    loop {
        let candidate = current.join(config_name);
        if candidate.exists() {
            return Some(candidate);
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => return None, // Reached filesystem root
        }
    }
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_target_with_scheme() {
        let url = parse_target_addr("http://localhost:3001").unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.host_str(), Some("localhost"));
        assert_eq!(url.port(), Some(3001));
    }

    #[test]
    fn test_target_missing_scheme_hostname() {
        let url = parse_target_addr("localhost:9000").unwrap();
        assert_eq!(url.origin().ascii_serialization(), "http://localhost:9000");
    }

    #[test]
    fn test_target_missing_scheme_ip() {
        let url = parse_target_addr("127.0.0.1:9000").unwrap();
        assert_eq!(url.origin().ascii_serialization(), "http://127.0.0.1:9000");
    }

    #[test]
    fn test_target_bare_host() {
        let url = parse_target_addr("localhost").unwrap();
        assert_eq!(url.origin().ascii_serialization(), "http://localhost");
    }

    #[test]
    fn test_target_https_kept() {
        let url = parse_target_addr("https://example.com/api").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.path(), "/api");
    }

    #[test]
    fn test_target_other_scheme_rejected() {
        let err = parse_target_addr("ftp://x").unwrap_err();
        assert!(matches!(err, ConfigError::TargetScheme { ref scheme, .. } if scheme == "ftp"));
    }

    #[test]
    fn test_target_malformed_rejected() {
        // missing scheme, but still broken after prepending one
        assert!(matches!(
            parse_target_addr("localhost:notaport"),
            Err(ConfigError::TargetAddr(..))
        ));
        assert!(parse_target_addr("http://").is_err());
    }

    #[test]
    fn test_listen_addr_bare_port() {
        let addr = parse_listen_addr(":3000").unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_listen_addr_explicit() {
        let addr = parse_listen_addr("127.0.0.1:8080").unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_listen_addr_invalid() {
        assert!(parse_listen_addr("not an address").is_err());
        assert!(parse_listen_addr(":99999").is_err());
    }

    #[test]
    fn test_find_config_walks_upward() {
        let temp = tempfile::TempDir::new().unwrap();
        let nested = temp.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp.path().join("recharge.conf"), "").unwrap();

        let found = find_config_from(&nested, Path::new("recharge.conf")).unwrap();
        assert_eq!(found, temp.path().join("recharge.conf"));
    }

    #[test]
    fn test_find_config_missing() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(find_config_from(temp.path(), Path::new("no-such-file.conf")).is_none());
    }
}
