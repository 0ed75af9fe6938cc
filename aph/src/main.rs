//! APH one-shot commands.
//!
//! Run from an acme tag (`aph do`, `aph format -- gofmt`) or a shell
//! (`aph root`, `aph config`).

#![forbid(unsafe_code)]

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use aph_common::{
    Acme, LoadedConfig, LogConfig, LoggingGuards, RootResolver, config, init_logging,
};
use clap::{Parser, Subcommand};

use commands::env::EditorEnv;

#[derive(Parser)]
#[command(name = "aph")]
#[command(
    author,
    version,
    about = "Acme Put Helper - format, check, build and test files saved in acme"
)]
struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/aph/config.toml)
    #[arg(short, long, global = true, env = "APH_CONFIG")]
    config: Option<PathBuf>,

    /// Namespace directory holding acme's 9P socket
    #[arg(long, global = true, conflicts_with = "mount")]
    namespace: Option<PathBuf>,

    /// Reach acme through a mounted directory instead of 9P
    #[arg(long, global = true)]
    mount: Option<PathBuf>,

    /// Keep `aph do` logs out of acme's console (+Errors); log to stderr only
    #[arg(long, global = true)]
    no_console: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Put the current window, then format, check, build and test its file
    Do,

    /// Replace the current window's body with the output of CMD ARGS... <file>
    Format {
        /// Formatter command and arguments, after `--`
        #[arg(last = true, required = true, value_name = "CMD")]
        command: Vec<String>,
    },

    /// Print the project root of PATH (default: the current directory)
    Root { path: Option<PathBuf> },

    /// Print the effective configuration and where each value came from
    Config {
        /// Print JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprint!("{}", commands::describe_error(&e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut loaded = config::load(cli.config.as_deref()).context("loading configuration")?;
    loaded.apply_acme_flags(cli.namespace, cli.mount);
    let acme = Acme::from_config(&loaded.config.acme);

    match cli.command {
        Commands::Do => {
            // Read the window first: run from a shell, `do` fails on the
            // missing winid rather than on the console.
            let env = EditorEnv::from_env().context("reading acme environment")?;
            let console = (!cli.no_console).then(|| acme.clone());
            let _logging_guards = init_cli_logging(cli.verbose, console)?;
            commands::save::run(&acme, &loaded.config, &env)?.into_result()?;
        }
        Commands::Format { command } => {
            let _logging_guards = init_cli_logging(cli.verbose, None)?;
            let env = EditorEnv::from_env().context("reading acme environment")?;
            commands::format::run(&acme, &env, &command)?;
        }
        Commands::Root { path } => {
            let _logging_guards = init_cli_logging(cli.verbose, None)?;
            let resolver = RootResolver::from_config(&loaded.config.resolver);
            println!("{}", commands::root::run(&resolver, path.as_deref()).display());
        }
        Commands::Config { json } => print_config(&loaded, json)?,
    }
    Ok(())
}

/// Warnings and errors to stderr, and to acme's console when given.
fn init_cli_logging(verbose: bool, console: Option<Acme>) -> Result<LoggingGuards> {
    let mut log_config = LogConfig::from_env("warn").with_stderr();
    if verbose {
        log_config = log_config.with_level("debug");
    }
    if let Some(acme) = console {
        log_config = log_config.with_console(acme);
    }
    init_logging(&log_config).context("setting up logging")
}

fn print_config(loaded: &LoadedConfig, json: bool) -> Result<()> {
    let text = if json {
        commands::show_config::render_json(loaded)?
    } else {
        commands::show_config::render_toml(loaded)?
    };
    println!("{text}");
    Ok(())
}
