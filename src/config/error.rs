//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file `{0}` not found")]
    NotFound(PathBuf),

    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse target address `{0}`")]
    TargetAddr(String, #[source] url::ParseError),

    #[error("unsupported scheme `{scheme}` in target address `{addr}` (expected http or https)")]
    TargetScheme { addr: String, scheme: String },

    #[error("target address `{0}` has no host")]
    TargetHost(String),

    #[error("invalid listen address `{0}`: {1}")]
    ListenAddr(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_config_error_display() {
        let io_err = ConfigError::Io(
            PathBuf::from("recharge.conf"),
            Error::new(ErrorKind::NotFound, "file not found"),
        );
        let display = format!("{io_err}");
        assert!(display.contains("IO error"));
        assert!(display.contains("recharge.conf"));

        let scheme_err = ConfigError::TargetScheme {
            addr: "ftp://x".into(),
            scheme: "ftp".into(),
        };
        let display = format!("{scheme_err}");
        assert!(display.contains("ftp"));
        assert!(display.contains("http or https"));
    }
}
