//! Process execution for gitdeck.
//!
//! This crate runs git on behalf of the dashboard and turns its output into
//! panel content.
//!
//! # Overview
//!
//! - [`CommandRunner`] - captured and pseudo-terminal streaming execution
//! - [`GitCommands`] - git command builders and pager resolution
//! - [`RepoProvider`] - side-panel records loaded from the repository
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │    RepoProvider      │
//! │ (lists, fetch lock)  │
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │    GitCommands       │
//! │ (argv, pager pipe)   │
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │   CommandRunner      │
//! │ (tokio process, pty) │
//! └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use gitdeck_exec::{CommandRunner, GitCommands, OsCommandRunner};
//! use gitdeck_config::PagingConfig;
//!
//! #[tokio::main]
//! async fn main() -> gitdeck_core::Result<()> {
//!     let runner = OsCommandRunner::in_dir("/path/to/repo");
//!     let git = GitCommands::new(PagingConfig::default());
//!
//!     let log = runner.run_captured(&git.log("HEAD", 10, None)).await?;
//!     println!("{log}");
//!     Ok(())
//! }
//! ```

pub mod git;
pub mod repo;
pub mod runner;
pub mod types;

pub use git::GitCommands;
pub use repo::{FileChange, RepoProvider, RepoSnapshot};
pub use runner::{CommandRunner, OsCommandRunner, StreamHandle, Terminate};
pub use types::{CommandSpec, ListItem, TermSize};
