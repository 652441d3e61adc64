//! Command-line interface definitions.

use clap::{ColorChoice, Parser};
use std::path::PathBuf;

/// Live-reload proxy: rebuilds and restarts an HTTP service on change
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file name, searched upward from the current directory
    #[arg(short = 'C', long, default_value = "recharge.conf", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Directory to watch (overrides `RootDir`)
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub root: Option<PathBuf>,

    /// Proxy listen address, e.g. `:3000` (overrides `SourceAddr`)
    #[arg(short, long)]
    pub source: Option<String>,

    /// Target address, e.g. `localhost:3001` (overrides `TargetAddr`)
    #[arg(short, long, value_hint = clap::ValueHint::Url)]
    pub target: Option<String>,

    /// Enable verbose output for debugging
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["recharge"]);
        assert_eq!(cli.config, PathBuf::from("recharge.conf"));
        assert!(cli.root.is_none());
        assert!(!cli.verbose);
        assert!(matches!(cli.color, ColorChoice::Auto));
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "recharge", "-C", "dev.conf", "--root", "src", "-s", ":8000", "-t",
            "localhost:8001", "-v", "--color", "never",
        ]);
        assert_eq!(cli.config, PathBuf::from("dev.conf"));
        assert_eq!(cli.root, Some(PathBuf::from("src")));
        assert_eq!(cli.source.as_deref(), Some(":8000"));
        assert_eq!(cli.target.as_deref(), Some("localhost:8001"));
        assert!(cli.verbose);
        assert!(matches!(cli.color, ColorChoice::Never));
    }
}
