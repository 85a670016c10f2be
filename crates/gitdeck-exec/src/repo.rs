//! Repository-state provider.
//!
//! Loads the records shown in the side panels by running captured git
//! commands. Parsing is deliberately shallow: every record is an id the
//! dashboard hands back to git plus the label it displays.

use std::path::Path;
use std::sync::Arc;

use gitdeck_core::{DeckError, Result};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::git::{GitCommands, git};
use crate::runner::CommandRunner;
use crate::types::ListItem;

/// Commits loaded into the commits and sub-commits lists.
pub const COMMIT_LIMIT: usize = 300;

/// Everything the side panels show, loaded together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoSnapshot {
    pub status: Vec<ListItem>,
    pub files: Vec<ListItem>,
    pub branches: Vec<ListItem>,
    pub commits: Vec<ListItem>,
    pub stash: Vec<ListItem>,
}

/// A working-tree entry parsed from `git status --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    /// Index column is set
    pub staged: bool,
    /// Work-tree column is set
    pub unstaged: bool,
    pub tracked: bool,
}

impl FileChange {
    /// Parse one porcelain v1 line (`XY path` or `XY old -> new`).
    pub fn parse(line: &str) -> Option<Self> {
        let code = line.get(..2)?;
        let path = line.get(3..)?.trim();
        if path.is_empty() {
            return None;
        }
        let path = match path.rsplit_once(" -> ") {
            Some((_, new)) => new,
            None => path,
        };
        let mut columns = code.chars();
        let x = columns.next()?;
        let y = columns.next()?;
        let tracked = code != "??";

        Some(Self {
            path: unquote(path).to_string(),
            staged: tracked && x != ' ',
            unstaged: !tracked || y != ' ',
            tracked,
        })
    }

    /// Whether the diff shown for this file is the staged one.
    pub fn show_cached(&self) -> bool {
        self.staged && !self.unstaged
    }
}

fn unquote(path: &str) -> &str {
    path.strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .unwrap_or(path)
}

/// Provider of side-panel records.
pub struct RepoProvider {
    runner: Arc<dyn CommandRunner>,
    git: GitCommands,
    repo_name: String,
    /// Serializes remote refreshes so timer and manual fetches never overlap
    fetch_lock: Mutex<()>,
}

impl RepoProvider {
    pub fn new(runner: Arc<dyn CommandRunner>, git: GitCommands, repo_dir: &Path) -> Self {
        let repo_name = repo_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| repo_dir.display().to_string());
        Self {
            runner,
            git,
            repo_name,
            fetch_lock: Mutex::new(()),
        }
    }

    pub fn git(&self) -> &GitCommands {
        &self.git
    }

    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(&self.runner)
    }

    /// Load all five side lists concurrently.
    #[instrument(level = "debug", skip(self))]
    pub async fn load_all(&self) -> Result<RepoSnapshot> {
        let (status, files, branches, commits, stash) = tokio::try_join!(
            self.status(),
            self.files(),
            self.branches(),
            self.commits(),
            self.stash(),
        )?;
        debug!(
            files = files.len(),
            branches = branches.len(),
            commits = commits.len(),
            "repository state loaded"
        );
        Ok(RepoSnapshot {
            status,
            files,
            branches,
            commits,
            stash,
        })
    }

    /// The single status row: repository name and checked-out branch.
    pub async fn status(&self) -> Result<Vec<ListItem>> {
        let out = self
            .runner
            .run_captured(&git().args(["rev-parse", "--abbrev-ref", "HEAD"]))
            .await
            .or_else(|e| if no_commits(&e) { Ok(String::new()) } else { Err(e) })?;
        let branch = match out.trim() {
            "" => "(no branch)",
            b => b,
        };
        Ok(vec![ListItem::new(
            branch,
            format!("{} → {}", self.repo_name, branch),
        )])
    }

    pub async fn files(&self) -> Result<Vec<ListItem>> {
        let out = self
            .runner
            .run_captured(&git().args(["status", "--porcelain=v1", "--untracked-files=all"]))
            .await?;
        Ok(parse_status(&out))
    }

    pub async fn branches(&self) -> Result<Vec<ListItem>> {
        let out = self
            .runner
            .run_captured(&git().args([
                "branch",
                "--format=%(HEAD)%09%(refname:short)%09%(upstream:short)",
            ]))
            .await?;
        Ok(parse_branches(&out))
    }

    pub async fn commits(&self) -> Result<Vec<ListItem>> {
        self.sub_commits("HEAD").await
    }

    /// Commits reachable from `git_ref`; an unborn branch has none.
    pub async fn sub_commits(&self, git_ref: &str) -> Result<Vec<ListItem>> {
        match self
            .runner
            .run_captured(&self.git.log(git_ref, COMMIT_LIMIT, None))
            .await
        {
            Ok(out) => Ok(parse_log(&out)),
            Err(e) if no_commits(&e) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Files changed by `sha`.
    pub async fn commit_files(&self, sha: &str) -> Result<Vec<ListItem>> {
        let out = self.runner.run_captured(&self.git.commit_files(sha)).await?;
        Ok(parse_name_status(&out))
    }

    pub async fn stash(&self) -> Result<Vec<ListItem>> {
        let out = self.runner.run_captured(&git().args(["stash", "list"])).await?;
        Ok(parse_stash(&out))
    }

    /// Fetch from the default remote without prompting for credentials.
    pub async fn fetch(&self) -> Result<()> {
        let _guard = self.fetch_lock.lock().await;
        info!("fetching remote state");
        self.runner
            .run_captured(&git().arg("fetch").env("GIT_TERMINAL_PROMPT", "0"))
            .await?;
        Ok(())
    }
}

fn no_commits(err: &DeckError) -> bool {
    match err {
        DeckError::CommandFailed { stderr, .. } => {
            stderr.contains("does not have any commits")
                || stderr.contains("unknown revision")
                || stderr.contains("ambiguous argument 'HEAD'")
        }
        _ => false,
    }
}

fn non_empty_lines(out: &str) -> impl Iterator<Item = &str> {
    out.lines().filter(|l| !l.trim().is_empty())
}

pub fn parse_status(out: &str) -> Vec<ListItem> {
    non_empty_lines(out)
        .filter_map(|line| FileChange::parse(line).map(|f| ListItem::new(f.path, line)))
        .collect()
}

/// Branch rows with the checked-out branch first. Input lines are
/// `HEAD marker<TAB>name<TAB>upstream`.
pub fn parse_branches(out: &str) -> Vec<ListItem> {
    let mut head = Vec::new();
    let mut rest = Vec::new();
    for line in non_empty_lines(out) {
        let mut fields = line.split('\t');
        let marker = fields.next().unwrap_or_default();
        let name = fields.next().unwrap_or_default().trim();
        let upstream = fields.next().unwrap_or_default().trim();
        if name.is_empty() {
            continue;
        }
        if marker.starts_with('*') {
            head.push(ListItem::new(name, format!("* {name}")).with_detail(upstream));
        } else {
            rest.push(ListItem::new(name, format!("  {name}")).with_detail(upstream));
        }
    }
    head.extend(rest);
    head
}

/// Commit rows from `sha<TAB>author<TAB>subject` lines.
pub fn parse_log(out: &str) -> Vec<ListItem> {
    non_empty_lines(out)
        .filter_map(|line| {
            let mut fields = line.splitn(3, '\t');
            let sha = fields.next()?.trim();
            let author = fields.next().unwrap_or_default();
            let subject = fields.next().unwrap_or_default();
            Some(ListItem::new(sha, format!("{sha} {subject}")).with_detail(author))
        })
        .collect()
}

pub fn parse_name_status(out: &str) -> Vec<ListItem> {
    non_empty_lines(out)
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let status = fields.next()?;
            // Renames and copies list the destination last
            let path = fields.last()?;
            Some(ListItem::new(path, format!("{status} {path}")))
        })
        .collect()
}

pub fn parse_stash(out: &str) -> Vec<ListItem> {
    non_empty_lines(out)
        .filter_map(|line| {
            let (stash_ref, _) = line.split_once(':')?;
            Some(ListItem::new(stash_ref, line))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::StreamHandle;
    use crate::types::{CommandSpec, TermSize};
    use async_trait::async_trait;
    use gitdeck_config::PagingConfig;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers captured commands from a table keyed by argument line.
    #[derive(Default)]
    struct TableRunner {
        outputs: HashMap<String, Result<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl TableRunner {
        fn with(mut self, args: &str, out: &str) -> Self {
            self.outputs.insert(args.into(), Ok(out.into()));
            self
        }

        fn failing(mut self, args: &str, stderr: &str) -> Self {
            self.outputs.insert(
                args.into(),
                Err(DeckError::CommandFailed {
                    command: format!("git {args}"),
                    exit_code: Some(128),
                    stderr: stderr.into(),
                }),
            );
            self
        }
    }

    #[async_trait]
    impl CommandRunner for TableRunner {
        async fn run_captured(&self, spec: &CommandSpec) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let key = spec.args.join(" ");
            match self.outputs.get(&key) {
                Some(Ok(out)) => Ok(out.clone()),
                Some(Err(DeckError::CommandFailed {
                    command,
                    exit_code,
                    stderr,
                })) => Err(DeckError::CommandFailed {
                    command: command.clone(),
                    exit_code: *exit_code,
                    stderr: stderr.clone(),
                }),
                _ => Ok(String::new()),
            }
        }

        fn run_streaming(&self, spec: &CommandSpec, _size: TermSize) -> Result<StreamHandle> {
            Err(DeckError::command_spawn(spec.to_string(), "not supported"))
        }
    }

    fn provider(runner: TableRunner) -> (RepoProvider, Arc<TableRunner>) {
        let runner = Arc::new(runner);
        let provider = RepoProvider::new(
            runner.clone(),
            GitCommands::new(PagingConfig::default()),
            Path::new("/home/me/project"),
        );
        (provider, runner)
    }

    #[test]
    fn test_file_change_parse() {
        let modified = FileChange::parse(" M src/lib.rs").unwrap();
        assert_eq!(modified.path, "src/lib.rs");
        assert!(!modified.staged && modified.unstaged && modified.tracked);
        assert!(!modified.show_cached());

        let staged = FileChange::parse("A  new.rs").unwrap();
        assert!(staged.show_cached());

        let untracked = FileChange::parse("?? notes.txt").unwrap();
        assert!(!untracked.tracked);
        assert!(!untracked.show_cached());

        let renamed = FileChange::parse("R  old.rs -> new.rs").unwrap();
        assert_eq!(renamed.path, "new.rs");

        let quoted = FileChange::parse("?? \"with space.txt\"").unwrap();
        assert_eq!(quoted.path, "with space.txt");

        assert!(FileChange::parse("M").is_none());
    }

    #[test]
    fn test_parse_branches_puts_head_first() {
        let items = parse_branches(" \tfeature\t\n*\tmain\torigin/main\n \ttopic\t\n");
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["main", "feature", "topic"]);
        assert_eq!(items[0].label, "* main");
        assert_eq!(items[0].detail.as_deref(), Some("origin/main"));
        assert_eq!(items[1].detail, None);
    }

    #[test]
    fn test_parse_log_and_stash() {
        let commits = parse_log("abc1234\tAda\tFix things\ndef5678\tGrace\tAdd\tstuff\n\n");
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[1].id, "def5678");
        assert_eq!(commits[1].label, "def5678 Add\tstuff");
        assert_eq!(commits[0].detail.as_deref(), Some("Ada"));

        let stash = parse_stash("stash@{0}: WIP on main: abc Fix\nstash@{1}: On topic: wip\n");
        assert_eq!(stash[1].id, "stash@{1}");
    }

    #[test]
    fn test_parse_name_status() {
        let items = parse_name_status("M\tsrc/a.rs\nR100\told.rs\tnew.rs\n");
        assert_eq!(items[0], ListItem::new("src/a.rs", "M src/a.rs"));
        assert_eq!(items[1], ListItem::new("new.rs", "R100 new.rs"));
    }

    #[tokio::test]
    async fn test_load_all() {
        let runner = TableRunner::default()
            .with("rev-parse --abbrev-ref HEAD", "main\n")
            .with("status --porcelain=v1 --untracked-files=all", " M a.rs\n?? b.rs\n")
            .with(
                "branch --format=%(HEAD)%09%(refname:short)%09%(upstream:short)",
                "*\tmain\t\n",
            )
            .with(
                "log --no-color --format=%h%x09%an%x09%s -n300 HEAD",
                "abc1234\tAda\tFirst\n",
            )
            .with("stash list", "");
        let (provider, _) = provider(runner);

        let snapshot = provider.load_all().await.unwrap();
        assert_eq!(snapshot.status, vec![ListItem::new("main", "project → main")]);
        assert_eq!(snapshot.files.len(), 2);
        assert_eq!(snapshot.branches.len(), 1);
        assert_eq!(snapshot.commits[0].id, "abc1234");
        assert!(snapshot.stash.is_empty());
    }

    #[tokio::test]
    async fn test_unborn_branch_has_no_commits() {
        let runner = TableRunner::default().failing(
            "log --no-color --format=%h%x09%an%x09%s -n300 HEAD",
            "fatal: your current branch 'main' does not have any commits yet",
        );
        let (provider, _) = provider(runner);
        assert!(provider.commits().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_failures_propagate() {
        let runner = TableRunner::default().failing("stash list", "fatal: not a git repository");
        let (provider, _) = provider(runner);
        assert!(provider.stash().await.is_err());
    }

    #[tokio::test]
    async fn test_fetches_never_overlap() {
        let (provider, runner) = provider(TableRunner::default());
        let provider = Arc::new(provider);

        let a = tokio::spawn({
            let p = provider.clone();
            async move { p.fetch().await }
        });
        let b = tokio::spawn({
            let p = provider.clone();
            async move { p.fetch().await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(runner.max_in_flight.load(Ordering::SeqCst), 1);
    }
}
