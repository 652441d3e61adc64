//! recharge - A live-reload proxy for HTTP services.

#![allow(dead_code)]

mod cli;
mod config;
mod core;
mod logger;
mod proxy;
mod supervisor;
mod utils;
mod watch;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ColorChoice, Parser};
use cli::{
    Cli,
    serve::{Gateway, bind_server},
};
use config::ProxyConfig;
use core::{PendingTrigger, is_shutdown};
use proxy::{HttpForwarder, RetryPolicy, RetryingProxy};
use supervisor::{ShellLauncher, Supervisor};
use watch::{ChangeFilter, Watcher};

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = ProxyConfig::load(&cli)?;
    debug!("config"; "loaded {}", config.config_path.display());

    serve(&config)
}

/// Build, start the target, then proxy until Ctrl+C.
fn serve(config: &ProxyConfig) -> Result<()> {
    let trigger = Arc::new(PendingTrigger::new());
    let supervisor = Arc::new(Supervisor::new(
        &config.build,
        &config.run,
        Box::new(ShellLauncher::new(&config.root)),
        Arc::clone(&trigger),
    ));

    // Watcher first: changes made during the initial build still count
    let filter = ChangeFilter::new(
        &config.watch_root,
        config.extensions.clone(),
        config.ignore.clone(),
    );
    let watcher = Watcher::new(filter, config.debounce, trigger)
        .with_context(|| format!("failed to watch {}", config.watch_root.display()))?;

    // A failed initial build is not fatal; it is served as the recorded error
    let _ = supervisor.rebuild();
    if is_shutdown() {
        supervisor.shutdown();
        return Ok(());
    }

    let policy = RetryPolicy {
        max_retries: config.max_retries,
        interval: config.retry_interval,
    };
    let forwarder =
        HttpForwarder::new(config.target.clone()).context("failed to create HTTP client")?;
    let gateway = Arc::new(Gateway::new(
        Arc::clone(&supervisor),
        RetryingProxy::new(forwarder, policy),
    ));

    let result = bind_server(config.source_addr, &config.target)
        .and_then(|server| server.run(watcher, gateway));

    supervisor.shutdown();
    result
}
