//! Warden CLI - permission checks with a human in the loop.
//!
//! Loads the layered configuration, then either validates it or runs a
//! single file or command check. `Ask` decisions are shown on the terminal.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use warden_core::{AccessKind, GrantScope};

pub mod approval_handler;
mod commands;
pub mod config_bridge;
mod theme;

use commands::check::{self, CheckOptions};
use commands::validate;
use theme::Theme;

/// Warden - permission decisions for agent tools
#[derive(Parser)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Workspace root (defaults to the current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// User-level config directory (defaults to ~/.warden)
    #[arg(long, global = true, env = "WARDEN_HOME")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the configuration, then list agents and tools
    Validate,

    /// Check whether an agent may access a file
    CheckFile {
        #[command(flatten)]
        check: CheckArgs,

        /// Kind of access
        #[arg(short, long, value_enum, default_value = "read")]
        kind: KindArg,

        /// File path, relative to the workspace or absolute
        path: String,
    },

    /// Check whether an agent may run a command
    CheckExec {
        #[command(flatten)]
        check: CheckArgs,

        /// Environment variable passed to the command (NAME or NAME=VALUE).
        /// Only names are shown to the approver.
        #[arg(short, long = "env")]
        env: Vec<String>,

        /// Command and arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Agent whose rules apply
    #[arg(short, long)]
    agent: String,

    /// Tool making the call; its declaration bounds the check
    #[arg(short, long)]
    tool: Option<String>,

    /// Reason shown to the approver
    #[arg(short, long)]
    reason: Option<String>,

    /// Scope to request if approval is needed
    #[arg(short, long, value_enum)]
    scope: Option<ScopeArg>,

    /// Approval timeout in seconds, overriding the configured value
    #[arg(long)]
    timeout: Option<u64>,

    /// Never prompt; checks that need approval fail
    #[arg(long)]
    non_interactive: bool,
}

impl From<CheckArgs> for CheckOptions {
    fn from(args: CheckArgs) -> Self {
        Self {
            agent: args.agent,
            tool: args.tool,
            reason: args.reason,
            scope: args.scope.map(GrantScope::from),
            timeout: args.timeout.map(Duration::from_secs),
            interactive: !args.non_interactive,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Read,
    Write,
    List,
    Execute,
    Edit,
}

impl From<KindArg> for AccessKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Read => Self::Read,
            KindArg::Write => Self::Write,
            KindArg::List => Self::List,
            KindArg::Execute => Self::Execute,
            KindArg::Edit => Self::Edit,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    Once,
    Session,
    Always,
}

impl From<ScopeArg> for GrantScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Once => Self::OneTime,
            ScopeArg::Session => Self::Session,
            ScopeArg::Always => Self::Persistent,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let workspace_root = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let loaded = warden_config::load(Some(workspace_root.as_path()), cli.home.as_deref());

    // Set up logging from config, with --verbose override.
    let log_config = if let Ok(loaded) = &loaded {
        let mut lc = config_bridge::to_log_config(&loaded.config);
        if cli.verbose {
            "debug".clone_into(&mut lc.level);
        }
        lc
    } else {
        // Fallback if config loading fails.
        let level = if cli.verbose { "debug" } else { "warn" };
        warden_telemetry::LogConfig::new(level).with_format(warden_telemetry::LogFormat::Compact)
    };
    if let Err(e) = warden_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let loaded = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}", Theme::error(&format!("invalid configuration: {e}")));
            return Ok(ExitCode::from(2));
        },
    };

    match cli.command {
        Commands::Validate => {
            if validate::run_validate(&loaded) {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(1))
            }
        },
        Commands::CheckFile { check, kind, path } => {
            check::check_file(
                &loaded,
                &workspace_root,
                &check.into(),
                kind.into(),
                &path,
            )
            .await
        },
        Commands::CheckExec {
            check,
            env,
            command,
        } => check::check_exec(&loaded, &workspace_root, &check.into(), &command, &env).await,
    }
}
