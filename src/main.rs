//! gitdeck - keyboard-driven terminal dashboard for git repositories
//!
//! ## Usage
//!
//! ```bash
//! # Browse the repository containing the current directory
//! gitdeck
//!
//! # Another repository
//! gitdeck --path ~/src/project
//!
//! # Verbose logging to a custom directory
//! gitdeck -v --log-dir /tmp/gitdeck-logs
//!
//! # Explicit config file
//! gitdeck --config ./gitdeck.yml
//! ```

use std::panic;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use gitdeck_config::UserConfig;
use gitdeck_core::{DeckError, LogGuard, init_logging};
use gitdeck_exec::git::git;
use gitdeck_exec::{CommandRunner, GitCommands, OsCommandRunner, RepoProvider};
use gitdeck_tui::{App, restore_terminal};
use tracing::{error, info};

/// Keyboard-driven terminal dashboard for git repositories
///
/// Shows status, files, branches, commits and stash side by side with the
/// diff or log of the selected item.
#[derive(Parser, Debug)]
#[command(name = "gitdeck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Repository to open (defaults to the current directory)
    #[arg(short, long, default_value = ".")]
    path: PathBuf,

    /// Config file (defaults to $GITDECK_CONFIG, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory for log files (defaults to the user data dir)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::from(1);
        }
    };

    install_panic_hook();

    info!(path = %cli.path.display(), "starting gitdeck");

    match run_app(&cli) {
        Ok(()) => {
            info!("gitdeck exited normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "gitdeck failed");
            eprintln!("Error: {e:#}");
            if let Some(hint) = e.downcast_ref::<DeckError>().and_then(DeckError::guidance) {
                eprintln!("Hint: {hint}");
            }
            ExitCode::from(1)
        }
    }
}

/// Install a panic hook that restores the terminal before printing the
/// panic message, so a crash in raw mode leaves a usable shell behind.
fn install_panic_hook() {
    let original_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        let _ = restore_terminal();
        original_hook(panic_info);
    }));
}

fn setup_logging(cli: &Cli) -> gitdeck_core::Result<LogGuard> {
    init_logging(cli.log_dir.clone(), cli.verbose > 0)
}

fn run_app(cli: &Cli) -> anyhow::Result<()> {
    let config = UserConfig::load(cli.config.as_deref()).context("loading configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("gitdeck-worker")
        .build()
        .context("starting async runtime")?;

    let repo_dir = runtime.block_on(find_repo_root(&cli.path))?;
    info!(repo = %repo_dir.display(), "repository found");

    let runner: Arc<dyn CommandRunner> = Arc::new(OsCommandRunner::in_dir(&repo_dir));
    let git_commands = runtime.block_on(GitCommands::load(config.git.paging.clone(), runner.as_ref()));
    let repo = Arc::new(RepoProvider::new(runner, git_commands, &repo_dir));

    let mut app = App::new(config, repo, runtime.handle().clone());
    app.run()?;
    Ok(())
}

/// Top-level directory of the work tree containing `path`.
async fn find_repo_root(path: &Path) -> anyhow::Result<PathBuf> {
    if !path.is_dir() {
        bail!("{} is not a directory", path.display());
    }
    let runner = OsCommandRunner::in_dir(path);
    let out = runner
        .run_captured(&git().args(["rev-parse", "--show-toplevel"]))
        .await
        .with_context(|| format!("{} is not inside a git work tree", path.display()))?;
    Ok(PathBuf::from(out.trim()))
}
