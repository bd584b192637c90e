mod cmd;
mod output;

use clap::{Parser, Subcommand};
use doctor_core::paths::ClaudePaths;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "claude-doctor",
    about = "Diagnostic and audit tool for Claude Code installations",
    version,
    propagate_version = true
)]
struct Cli {
    /// Claude home directory (default: ~/.claude)
    #[arg(long, global = true, env = "CLAUDE_HOME")]
    claude_home: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run diagnostic health checks
    Check {
        /// Regex pattern to filter checks (e.g. 'plugin.*')
        #[arg(long, short = 'F')]
        filter: Option<String>,

        /// Attempt to fix issues automatically
        #[arg(long)]
        fix: bool,

        /// Show what fixes would be applied without applying them
        #[arg(long, short = 'n')]
        dry_run: bool,
    },

    /// Audit approved tool calls from conversation history
    AuditTools {
        /// Start date (YYYY-MM-DD or relative like -12h, -7d, -1m)
        #[arg(long)]
        start_date: Option<String>,

        /// End date (YYYY-MM-DD or relative like -1d, -2w)
        #[arg(long)]
        end_date: Option<String>,

        /// Conversation projects directory (default: <claude-home>/projects)
        #[arg(long)]
        projects: Option<PathBuf>,

        /// Suggest allow-list patterns for calls not yet permitted
        #[arg(long)]
        suggest_permissions: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let result = ClaudePaths::resolve(cli.claude_home.as_deref())
        .map_err(anyhow::Error::from)
        .and_then(|paths| match cli.command {
            Commands::Check {
                filter,
                fix,
                dry_run,
            } => cmd::check::run(&paths, filter.as_deref(), fix, dry_run, cli.json),
            Commands::AuditTools {
                start_date,
                end_date,
                projects,
                suggest_permissions,
            } => cmd::audit::run(
                &paths,
                start_date.as_deref(),
                end_date.as_deref(),
                projects.as_deref(),
                suggest_permissions,
                cli.json,
            ),
        });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
