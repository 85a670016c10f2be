//! Git command builders and pager resolution.
//!
//! Commands that feed the main panel are built here so the dashboard never
//! assembles git argument lists itself. When a pager is configured the
//! command is piped through it via the shell.

use gitdeck_config::PagingConfig;
use tracing::debug;

use crate::runner::CommandRunner;
use crate::types::CommandSpec;

/// Placeholder substituted in the pager template.
pub const COLUMN_WIDTH_PLACEHOLDER: &str = "{{columnWidth}}";

/// Builds git commands honoring the paging configuration.
#[derive(Debug, Clone)]
pub struct GitCommands {
    paging: PagingConfig,
    /// Pager resolved from the environment / git config when `useConfig` is set
    configured_pager: Option<String>,
}

impl GitCommands {
    /// Create builders that use the configured pager template.
    pub fn new(paging: PagingConfig) -> Self {
        Self {
            paging,
            configured_pager: None,
        }
    }

    /// Create builders, resolving the user's own pager first when
    /// `git.paging.useConfig` is set.
    pub async fn load(paging: PagingConfig, runner: &dyn CommandRunner) -> Self {
        let configured_pager = if paging.use_config {
            let core_pager = runner
                .run_captured(&config_get_all("core.pager"))
                .await
                .unwrap_or_default();
            let pager = pick_configured_pager(
                std::env::var("GIT_PAGER").ok(),
                std::env::var("PAGER").ok(),
                &core_pager,
            );
            debug!(pager = %pager, "resolved configured pager");
            Some(pager)
        } else {
            None
        };

        Self {
            paging,
            configured_pager,
        }
    }

    /// The pager command for a main panel `width` columns wide, or an empty
    /// string when output should not be paged.
    pub fn pager(&self, width: u16) -> String {
        match &self.configured_pager {
            Some(pager) => strip_less(pager),
            None => resolve_pager_template(&self.paging.pager, width),
        }
    }

    /// Pipe `spec` through the pager when one is set.
    pub fn paged(&self, spec: CommandSpec, width: u16) -> CommandSpec {
        let pager = self.pager(width);
        if pager.is_empty() {
            return spec;
        }
        let mut piped = CommandSpec::shell(format!("{} | {}", spec.to_shell_line(), pager));
        piped.cwd = spec.cwd;
        piped.env = spec.env;
        piped
    }

    fn color_arg(&self) -> String {
        format!("--color={}", self.paging.color_arg)
    }

    /// `git show` for a commit, optionally limited to one path.
    pub fn show(&self, sha: &str, filter_path: Option<&str>) -> CommandSpec {
        let spec = git()
            .args(["show", "--stat", "-p"])
            .arg(self.color_arg())
            .arg(sha);
        with_filter(spec, filter_path)
    }

    /// Diff of one working-tree file.
    ///
    /// Untracked files are diffed against /dev/null so their contents show.
    pub fn diff_file(&self, path: &str, cached: bool, tracked: bool) -> CommandSpec {
        let mut spec = git().arg("diff").arg("--submodule").arg(self.color_arg());
        if cached {
            spec = spec.arg("--cached");
        }
        if tracked {
            spec.args(["--", path])
        } else {
            spec.args(["--no-index", "--", "/dev/null", path])
        }
    }

    /// Graph of the history reachable from `branch`.
    pub fn branch_log_graph(&self, branch: &str) -> CommandSpec {
        git()
            .args(["log", "--graph", "--abbrev-commit", "--decorate", "--date=relative"])
            .arg("--pretty=medium")
            .arg(self.color_arg())
            .arg(branch)
            .arg("--")
    }

    /// Patch and stat of one stash entry (`stash@{n}`).
    pub fn stash_show(&self, stash_ref: &str) -> CommandSpec {
        git()
            .args(["stash", "show", "-p", "--stat"])
            .arg(self.color_arg())
            .arg(stash_ref)
    }

    /// Tab-separated `sha, author, subject` log of `git_ref` for list
    /// panels. Never colored or paged.
    pub fn log(&self, git_ref: &str, limit: usize, filter_path: Option<&str>) -> CommandSpec {
        let spec = git()
            .args(["log", "--no-color", "--format=%h%x09%an%x09%s"])
            .arg(format!("-n{limit}"))
            .arg(git_ref);
        with_filter(spec, filter_path)
    }

    /// Files touched by a commit, one per line.
    pub fn commit_files(&self, sha: &str) -> CommandSpec {
        git().args(["diff-tree", "--no-commit-id", "--name-status", "-r", "--root", sha])
    }

    /// Diff of one file within a commit.
    pub fn commit_file_diff(&self, sha: &str, path: &str) -> CommandSpec {
        git()
            .args(["show", "--format="])
            .arg(self.color_arg())
            .arg(sha)
            .args(["--", path])
    }
}

/// A bare `git` invocation with optional locks disabled, so background
/// refreshes never contend with the user's own git commands.
pub fn git() -> CommandSpec {
    CommandSpec::new("git").env("GIT_OPTIONAL_LOCKS", "0")
}

/// `git config --get-all <key>`.
pub fn config_get_all(key: &str) -> CommandSpec {
    git().args(["config", "--get-all", key])
}

fn with_filter(spec: CommandSpec, filter_path: Option<&str>) -> CommandSpec {
    match filter_path {
        Some(path) if !path.is_empty() => spec.args(["--", path]),
        _ => spec,
    }
}

/// Substitute `{{columnWidth}}` (half the panel width minus 6) in `template`.
pub fn resolve_pager_template(template: &str, width: u16) -> String {
    let column_width = i32::from(width) / 2 - 6;
    template.replace(COLUMN_WIDTH_PLACEHOLDER, &column_width.to_string())
}

/// `$GIT_PAGER`, then `$PAGER`, then the first line of `core.pager`.
pub fn pick_configured_pager(
    git_pager: Option<String>,
    pager: Option<String>,
    core_pager_output: &str,
) -> String {
    if let Some(p) = git_pager.filter(|p| !p.is_empty()) {
        return p;
    }
    if let Some(p) = pager.filter(|p| !p.is_empty()) {
        return p;
    }
    core_pager_output
        .trim()
        .lines()
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Drop a trailing `| less` stage; the panel already scrolls.
fn strip_less(pager: &str) -> String {
    pager
        .split("| less")
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands() -> GitCommands {
        GitCommands::new(PagingConfig::default())
    }

    #[test]
    fn test_resolve_pager_template() {
        assert_eq!(
            resolve_pager_template("delta --width={{columnWidth}}", 100),
            "delta --width=44"
        );
        assert_eq!(resolve_pager_template("diff-so-fancy", 100), "diff-so-fancy");
        // Narrow panels give a negative width, the same arithmetic as a wide one
        assert_eq!(resolve_pager_template("{{columnWidth}}", 4), "-4");
    }

    #[test]
    fn test_pick_configured_pager_order() {
        assert_eq!(
            pick_configured_pager(Some("delta".into()), Some("less".into()), "bat\n"),
            "delta"
        );
        assert_eq!(pick_configured_pager(Some(String::new()), Some("most".into()), ""), "most");
        assert_eq!(
            pick_configured_pager(None, None, "diff-so-fancy | less --tabs=4\nother\n"),
            "diff-so-fancy | less --tabs=4"
        );
        assert_eq!(pick_configured_pager(None, None, ""), "");
    }

    #[test]
    fn test_configured_pager_strips_less() {
        let git = GitCommands {
            paging: PagingConfig::default(),
            configured_pager: Some("diff-so-fancy | less --tabs=4 -RFX".into()),
        };
        assert_eq!(git.pager(80), "diff-so-fancy");
    }

    #[test]
    fn test_show_command() {
        let spec = commands().show("abc123", None);
        assert_eq!(spec.to_string(), "git show --stat -p --color=always abc123");

        let spec = commands().show("abc123", Some("src/main.rs"));
        assert!(spec.to_string().ends_with("abc123 -- src/main.rs"));
    }

    #[test]
    fn test_diff_file_variants() {
        let staged = commands().diff_file("a.txt", true, true);
        assert_eq!(
            staged.to_string(),
            "git diff --submodule --color=always --cached -- a.txt"
        );

        let untracked = commands().diff_file("new.txt", false, false);
        assert!(untracked.to_string().ends_with("--no-index -- /dev/null new.txt"));
    }

    #[test]
    fn test_log_command() {
        let spec = commands().log("main", 300, Some("README.md"));
        assert_eq!(
            spec.to_string(),
            "git log --no-color --format=%h%x09%an%x09%s -n300 main -- README.md"
        );
    }

    #[test]
    fn test_paged_wraps_in_shell() {
        let mut paging = PagingConfig::default();
        paging.pager = "delta --width={{columnWidth}}".into();
        let git = GitCommands::new(paging);

        let spec = git.paged(git.stash_show("stash@{0}"), 60);
        assert_eq!(spec.program, "sh");
        assert_eq!(
            spec.args[1],
            "git stash show -p --stat --color=always 'stash@{0}' | delta --width=24"
        );
        // The env of the inner command survives the wrapping
        assert!(spec.env.iter().any(|(k, _)| k == "GIT_OPTIONAL_LOCKS"));
    }

    #[test]
    fn test_paged_without_pager_is_unchanged() {
        let git = commands();
        let spec = git.branch_log_graph("main");
        assert_eq!(git.paged(spec.clone(), 80), spec);
    }
}
