//! gitsync: personal file sync over git.
//!
//!   gitsync serve --repo <path> [--listen <addr>]   → HTTP backend + auto-pull

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};

use gitsync::config::{self, SyncConfig};
use gitsync::logging::{self, LogFormat};
use gitsync::server;

// ─── Help text ────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = "\
SETUP:
    # Serve ./files of the repository in the current directory
    gitsync serve --repo .

    # Pull every five minutes, skip the startup pull
    gitsync serve --repo ~/notes --pull-interval 300 --no-pull-on-startup";

const SERVE_AFTER_HELP: &str = "\
EXAMPLES:
    gitsync serve --repo /srv/notes
    gitsync serve --repo . --files-dir shared --listen 0.0.0.0:45553
    GITSYNC_REPO=/srv/notes GITSYNC_LOG_FORMAT=json gitsync serve";

// ─── CLI definition ───────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "gitsync",
    version,
    about = "gitsync: personal file sync over git",
    after_help = AFTER_HELP,
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP backend and the auto-pull scheduler (foreground)
    #[command(after_help = SERVE_AFTER_HELP)]
    Serve(ServeArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "GITSYNC_LISTEN", default_value = config::DEFAULT_LISTEN)]
    listen: String,
    /// Path to the git working tree
    #[arg(long, env = "GITSYNC_REPO", default_value = ".")]
    repo: PathBuf,
    /// Files directory served by the API (relative paths are under --repo)
    #[arg(long, env = "GITSYNC_FILES_DIR", default_value = config::DEFAULT_FILES_DIR)]
    files_dir: PathBuf,
    /// Remote to push to and pull from
    #[arg(long, env = "GITSYNC_REMOTE", default_value = config::DEFAULT_REMOTE)]
    remote: String,
    /// Seconds between automatic pulls
    #[arg(long, env = "GITSYNC_PULL_INTERVAL", default_value_t = config::DEFAULT_PULL_INTERVAL_SECS)]
    pull_interval: u64,
    /// Skip the pull performed when auto-sync starts
    #[arg(long, env = "GITSYNC_NO_PULL_ON_STARTUP")]
    no_pull_on_startup: bool,
    /// Commit message used when a request does not supply one
    #[arg(long, env = "GITSYNC_COMMIT_MESSAGE", default_value = config::DEFAULT_COMMIT_MESSAGE)]
    commit_message: String,
    /// Per-file upload cap in bytes
    #[arg(long, env = "GITSYNC_MAX_UPLOAD_SIZE", default_value_t = config::DEFAULT_MAX_UPLOAD_SIZE)]
    max_upload_size: u64,
    /// Allowed CORS origin (repeatable)
    #[arg(long = "cors-origin", env = "GITSYNC_CORS_ORIGINS", value_delimiter = ',')]
    cors_origins: Vec<String>,
    /// Log level (trace, debug, info, warn, error) or directives like
    /// `warn,gitsync::scheduler=debug`
    #[arg(long, env = "GITSYNC_LOG_LEVEL", default_value = "info")]
    log_level: String,
    /// Log format
    #[arg(long, env = "GITSYNC_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl ServeArgs {
    fn into_config(self) -> SyncConfig {
        let defaults = SyncConfig::default();
        SyncConfig {
            listen: self.listen,
            repo_dir: self.repo,
            files_dir: self.files_dir,
            remote: self.remote,
            pull_interval: Duration::from_secs(self.pull_interval),
            pull_on_startup: !self.no_pull_on_startup,
            commit_message: self.commit_message,
            max_upload_size: self.max_upload_size,
            cors_origins: if self.cors_origins.is_empty() {
                defaults.cors_origins
            } else {
                self.cors_origins
            },
        }
    }
}

// ─── Dispatch ─────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        None => {
            Cli::command().print_help().ok();
            println!();
            ExitCode::SUCCESS
        }
        Some(Commands::Serve(args)) => run_serve(args),
    }
}

// ─── Server mode ──────────────────────────────────────────────────────────────

fn run_serve(args: ServeArgs) -> ExitCode {
    if let Err(err) = logging::init_tracing(&args.log_level, args.log_format) {
        eprintln!("error: {err:#}");
        return ExitCode::FAILURE;
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("error: cannot start tokio runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = rt.block_on(server::run_serve(args.into_config())) {
        eprintln!("error: {err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
