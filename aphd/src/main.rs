//! APH daemon.
//!
//! Watches acme's event log and runs the save pipeline (format, check,
//! build, test) for every file put from a window.

#![forbid(unsafe_code)]

mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};
use aph_common::errors::Coded;
use aph_common::{Acme, LogConfig, SaveHandler, config, init_logging};
use clap::Parser;
use tracing::{error, info};

use watch::{Scheduler, Watcher};

#[derive(Parser)]
#[command(name = "aphd")]
#[command(
    author,
    version,
    about = "APH daemon - runs format/check/build/test when acme saves a file"
)]
struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/aph/config.toml)
    #[arg(short, long, env = "APH_CONFIG")]
    config: Option<PathBuf>,

    /// Namespace directory holding acme's 9P socket
    #[arg(long, conflicts_with = "mount")]
    namespace: Option<PathBuf>,

    /// Reach acme through a mounted directory instead of 9P
    #[arg(long)]
    mount: Option<PathBuf>,

    /// Keep logs out of acme's console (+Errors); log to stderr only
    #[arg(long)]
    no_console: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut loaded = config::load(cli.config.as_deref()).context("loading configuration")?;
    loaded.apply_acme_flags(cli.namespace, cli.mount);
    let acme = Acme::from_config(&loaded.config.acme);

    let mut log_config = LogConfig::from_env("info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    if !cli.no_console {
        log_config = log_config.with_console(acme.clone());
    }
    let logging_guards = init_logging(&log_config).context("setting up logging")?;

    info!(
        "Starting APH daemon (transport {}, config {:?})",
        loaded.config.acme.transport, loaded.path
    );

    let handler = SaveHandler::from_config(acme.clone(), &loaded.config);
    let mut watcher = Watcher::new(acme, Scheduler::new(handler));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let code = match watcher.run(shutdown).await {
        Ok(()) => {
            info!("APH daemon stopped");
            0
        }
        Err(e) => {
            error!(code = %e.code().code_string(), "Watching acme failed: {}", e);
            1
        }
    };

    // Blocking pipeline tasks would hold up runtime shutdown; exit directly.
    drop(logging_guards);
    std::process::exit(code);
}
