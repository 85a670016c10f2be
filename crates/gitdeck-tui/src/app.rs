//! Main application state and logic for the gitdeck TUI.
//!
//! [`App`] owns the context stack, the screen mode, the task pipeline and the
//! repository provider. Every frame it arranges the windows for the current
//! terminal size, records the content panels' inner sizes for the producers,
//! and paints each window from the state behind it.
//!
//! Repository reads run on the tokio runtime and report back over a channel
//! drained by [`App::tick`], so the UI thread never waits on git.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use ansi_to_tui::IntoText;
use crossterm::event::{self, Event, KeyEvent, KeyEventKind, MouseEvent};
use gitdeck_config::UserConfig;
use gitdeck_core::{DeckError, Result};
use gitdeck_exec::{FileChange, ListItem, RepoProvider, RepoSnapshot};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Position, Rect},
    style::Style,
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph},
};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::arrangement::{
    ArrangementInput, INFO_SECTION_PADDING, SEARCH_PREFIX, arrange_windows,
};
use crate::buffer::find_wrapping;
use crate::context::{ContextKey, ContextKind, ContextManager};
use crate::event::{AppEvent, InputHandler};
use crate::screen_mode::{MODE_DEPENDENT_WINDOWS, ScreenMode, ScreenModeController};
use crate::scroll::ScrollPolicy;
use crate::tasks::{CONTENT_WINDOWS, PipelineEvent, Task, TaskManager};
use crate::theme::Theme;
use crate::view::Window;

/// Target frame rate (60 FPS = ~16.67ms per frame).
const TARGET_FPS: u64 = 60;
const FRAME_DURATION: Duration = Duration::from_millis(1000 / TARGET_FPS);

/// How long an error stays in the app status area.
const STATUS_MESSAGE_TTL: Duration = Duration::from_secs(5);

const STATUS_MESSAGE_MAX: usize = 60;

/// An entry of the keybindings menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub key: &'static str,
    pub description: &'static str,
    /// Event dispatched when the entry is executed from the menu
    pub event: AppEvent,
}

/// Keybindings listed in the menu, in display order.
pub const KEYBINDINGS: &[Binding] = &[
    Binding {
        key: "<tab>",
        description: "Next panel",
        event: AppEvent::NextPanel,
    },
    Binding {
        key: "<s-tab>",
        description: "Previous panel",
        event: AppEvent::PrevPanel,
    },
    Binding {
        key: "<enter>",
        description: "View selected item",
        event: AppEvent::Select,
    },
    Binding {
        key: "<esc>",
        description: "Go back",
        event: AppEvent::Cancel,
    },
    Binding {
        key: "+",
        description: "Next screen mode",
        event: AppEvent::NextScreenMode,
    },
    Binding {
        key: "_",
        description: "Previous screen mode",
        event: AppEvent::PrevScreenMode,
    },
    Binding {
        key: "<c-d>",
        description: "Scroll main panel down",
        event: AppEvent::ScrollMainDown,
    },
    Binding {
        key: "<c-u>",
        description: "Scroll main panel up",
        event: AppEvent::ScrollMainUp,
    },
    Binding {
        key: "J",
        description: "Scroll secondary panel down",
        event: AppEvent::ScrollSecondaryDown,
    },
    Binding {
        key: "K",
        description: "Scroll secondary panel up",
        event: AppEvent::ScrollSecondaryUp,
    },
    Binding {
        key: "/",
        description: "Search the current panel",
        event: AppEvent::StartSearch,
    },
    Binding {
        key: "n",
        description: "Next match",
        event: AppEvent::NextMatch,
    },
    Binding {
        key: "N",
        description: "Previous match",
        event: AppEvent::PrevMatch,
    },
    Binding {
        key: "r",
        description: "Refresh",
        event: AppEvent::Refresh,
    },
    Binding {
        key: "f",
        description: "Fetch",
        event: AppEvent::Fetch,
    },
    Binding {
        key: "q",
        description: "Quit",
        event: AppEvent::Quit,
    },
];

/// Results of repository work done off the UI thread.
enum Background {
    Snapshot(Result<RepoSnapshot>),
    SubCommits {
        git_ref: String,
        result: Result<Vec<ListItem>>,
    },
    CommitFiles {
        sha: String,
        result: Result<Vec<ListItem>>,
    },
    Fetched(Result<()>),
}

/// What the main section was last rendered for.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MainSource {
    context: ContextKey,
    item: Option<ListItem>,
}

/// Tasks for the main section.
struct MainContent {
    title: &'static str,
    task: Task,
    /// Present when the main section is split
    secondary: Option<(&'static str, Task)>,
}

impl MainContent {
    fn single(title: &'static str, task: Task) -> Self {
        Self {
            title,
            task,
            secondary: None,
        }
    }
}

#[derive(Debug, Default)]
struct SearchState {
    /// The prompt is open
    active: bool,
    query: String,
    /// Context the query applies to
    target: Option<ContextKey>,
}

/// Main application state.
pub struct App {
    config: UserConfig,
    theme: Theme,
    scroll: ScrollPolicy,
    contexts: ContextManager,
    screen: ScreenModeController,
    tasks: TaskManager,
    pipeline: mpsc::Receiver<PipelineEvent>,
    repo: Arc<RepoProvider>,
    runtime: Handle,
    background_tx: mpsc::Sender<Background>,
    background_rx: mpsc::Receiver<Background>,
    /// Input handler for key events
    input_handler: InputHandler,
    search: SearchState,
    /// Whether the app should quit
    should_quit: bool,
    /// Dirty flag - whether UI needs redraw
    dirty: bool,
    /// Window rectangles from the last frame, for mouse hit-testing
    layout: HashMap<Window, Rect>,
    main_split: bool,
    main_source: Option<MainSource>,
    /// Content panels whose producer was stopped while hidden
    stale_panels: HashSet<Window>,
    /// Commit whose files the commit-files list shows
    commit_files_sha: Option<String>,
    refreshing: bool,
    fetching: bool,
    /// Outstanding drill-down loads
    loading: usize,
    /// Re-render the main section when the running refresh lands
    force_main: bool,
    last_refresh: Instant,
    last_fetch: Instant,
    /// Error shown in the app status area
    status_message: Option<(String, Instant)>,
}

impl App {
    /// Create the app. No git command runs until [`App::refresh`] or
    /// [`App::run`] is called.
    pub fn new(config: UserConfig, repo: Arc<RepoProvider>, runtime: Handle) -> Self {
        let (tasks, pipeline) = TaskManager::new(
            repo.runner(),
            runtime.clone(),
            config.gui.follow_streaming_output,
        );
        let (background_tx, background_rx) = mpsc::channel();
        let now = Instant::now();
        Self {
            theme: Theme::from_config(&config.gui.theme),
            scroll: ScrollPolicy::from(&config.gui),
            config,
            contexts: ContextManager::default(),
            screen: ScreenModeController::new(),
            tasks,
            pipeline,
            repo,
            runtime,
            background_tx,
            background_rx,
            input_handler: InputHandler::new(),
            search: SearchState::default(),
            should_quit: false,
            dirty: true,
            layout: HashMap::new(),
            main_split: false,
            main_source: None,
            stale_panels: HashSet::new(),
            commit_files_sha: None,
            refreshing: false,
            fetching: false,
            loading: 0,
            force_main: false,
            last_refresh: now,
            last_fetch: now,
            status_message: None,
        }
    }

    /// Returns whether the app should quit.
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn contexts(&self) -> &ContextManager {
        &self.contexts
    }

    pub fn screen_mode(&self) -> ScreenMode {
        self.screen.mode()
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    /// Whether the main section currently shows main and secondary.
    pub fn main_split(&self) -> bool {
        self.main_split
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_ref().map(|(m, _)| m.as_str())
    }

    /// Mark the UI as dirty (needs redraw).
    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Check if UI needs redraw and clear the dirty flag.
    fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = Some((message.into(), Instant::now()));
    }

    fn report(&mut self, what: &str, err: &DeckError) {
        warn!(error = %err, "{what}");
        self.set_status_message(format!("{what}: {}", truncate_status_error(&err.to_string())));
    }

    pub fn handle_key_event(&mut self, key: KeyEvent) {
        let event = self.input_handler.handle_key(key);
        self.handle_app_event(event);
    }

    pub fn handle_mouse_event(&mut self, mouse: MouseEvent) {
        let event = self.input_handler.handle_mouse(mouse);
        self.handle_app_event(event);
    }

    /// Apply an app event to the state.
    pub fn handle_app_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Quit | AppEvent::ForceQuit => self.should_quit = true,
            AppEvent::NextScreenMode => {
                let windows = self.screen.next();
                self.screen_mode_changed(windows);
            }
            AppEvent::PrevScreenMode => {
                let windows = self.screen.prev();
                self.screen_mode_changed(windows);
            }
            AppEvent::FocusSide(window) => self.focus_side(window),
            AppEvent::NextPanel => self.cycle_panel(true),
            AppEvent::PrevPanel => self.cycle_panel(false),
            AppEvent::NavigateUp => self.navigate(-1),
            AppEvent::NavigateDown => self.navigate(1),
            AppEvent::ScrollMainUp => self.tasks.scroll_up(Window::Main, &self.scroll),
            AppEvent::ScrollMainDown => self.tasks.scroll_down(Window::Main, &self.scroll),
            AppEvent::ScrollSecondaryUp => self.tasks.scroll_up(Window::Secondary, &self.scroll),
            AppEvent::ScrollSecondaryDown => {
                self.tasks.scroll_down(Window::Secondary, &self.scroll)
            }
            AppEvent::Select => self.select(),
            AppEvent::Cancel => self.cancel(),
            AppEvent::Refresh => self.refresh(true),
            AppEvent::Fetch => self.fetch(),
            AppEvent::ShowMenu => self.open_menu(),
            AppEvent::StartSearch => self.start_search(),
            AppEvent::SearchInput(c) => {
                self.search.query.push(c);
                self.jump_to_match(true, true);
            }
            AppEvent::SearchBackspace => {
                self.search.query.pop();
            }
            AppEvent::SearchSubmit => self.search.active = false,
            AppEvent::NextMatch => self.jump_to_match(true, false),
            AppEvent::PrevMatch => self.jump_to_match(false, false),
            AppEvent::Click { column, row } => self.click(column, row),
            AppEvent::WheelUp { column, row } => self.wheel(column, row, -1),
            AppEvent::WheelDown { column, row } => self.wheel(column, row, 1),
            AppEvent::None => return,
        }
        self.mark_dirty();
    }

    fn screen_mode_changed(&mut self, windows: &[Window]) {
        // The whole frame is repainted; the affected list windows pick up
        // their detail columns from the new mode.
        debug!(mode = %self.screen.mode(), windows = ?windows, "screen mode changed");
    }

    fn focus_side(&mut self, window: Window) {
        if let Some(key) = ContextKey::for_side_window(window) {
            self.contexts.replace_side(key);
            self.refresh_main(false);
        }
    }

    fn cycle_panel(&mut self, forward: bool) {
        let current = self.contexts.current();
        match current.kind() {
            ContextKind::Main => {
                if !self.main_split {
                    return;
                }
                let other = match current {
                    ContextKey::Main => ContextKey::Secondary,
                    _ => ContextKey::Main,
                };
                let parent = self.contexts.parent_of(current);
                self.contexts.pop();
                self.contexts.push(other, parent);
            }
            ContextKind::Popup => {}
            ContextKind::Side | ContextKind::SubList => {
                if forward {
                    self.contexts.next_side();
                } else {
                    self.contexts.prev_side();
                }
                self.refresh_main(false);
            }
        }
    }

    fn navigate(&mut self, delta: isize) {
        let current = self.contexts.current();
        if current.kind() == ContextKind::Main {
            let window = current.window();
            if delta > 0 {
                self.tasks.scroll_down(window, &self.scroll);
            } else {
                self.tasks.scroll_up(window, &self.scroll);
            }
            return;
        }
        if self.contexts.move_selection(current, delta) && current != ContextKey::Menu {
            self.refresh_main(false);
        }
    }

    fn select(&mut self) {
        let current = self.contexts.current();
        match current {
            ContextKey::Menu => {
                let idx = self.contexts.with_list(ContextKey::Menu, |l| l.selected());
                self.contexts.pop();
                if let Some(binding) = KEYBINDINGS.get(idx) {
                    debug!(key = binding.key, "menu action");
                    self.handle_app_event(binding.event);
                }
            }
            ContextKey::Branches => {
                if let Some(branch) = self.contexts.selected_item_id(current) {
                    self.load_sub_commits(branch);
                }
            }
            ContextKey::Commits => {
                if let Some(sha) = self.contexts.selected_item_id(current) {
                    self.load_commit_files(sha);
                }
            }
            ContextKey::Files
            | ContextKey::Stash
            | ContextKey::SubCommits
            | ContextKey::CommitFiles => {
                if self.contexts.selected_item(current).is_some() {
                    self.contexts.push(ContextKey::Main, Some(current));
                }
            }
            ContextKey::Status | ContextKey::Main | ContextKey::Secondary => {}
        }
    }

    fn cancel(&mut self) {
        if self.search.active || !self.search.query.is_empty() {
            self.search = SearchState::default();
            return;
        }
        if let Some(popped) = self.contexts.pop() {
            debug!(context = ?popped, "back");
            self.refresh_main(false);
        }
    }

    fn open_menu(&mut self) {
        let parent = self.contexts.current();
        if parent == ContextKey::Menu {
            return;
        }
        let items = KEYBINDINGS
            .iter()
            .enumerate()
            .map(|(i, b)| ListItem::new(i.to_string(), format!("{:<10}{}", b.key, b.description)))
            .collect();
        self.contexts.set_items(ContextKey::Menu, items);
        self.contexts.select(ContextKey::Menu, 0);
        self.contexts.push(ContextKey::Menu, Some(parent));
    }

    fn start_search(&mut self) {
        self.input_handler.set_search_mode(true);
        self.search = SearchState {
            active: true,
            query: String::new(),
            target: Some(self.contexts.current()),
        };
    }

    /// Move to the next match of the search query. `inclusive` lets the
    /// current line match, which is what typing wants.
    fn jump_to_match(&mut self, forward: bool, inclusive: bool) {
        let Some(target) = self.search.target else {
            return;
        };
        if self.search.query.is_empty() {
            return;
        }
        let query = self.search.query.clone();

        let found = if target.kind() == ContextKind::Main {
            let policy = self.scroll;
            self.tasks
                .with_buffer_mut(target.window(), |buf| {
                    let origin = buf.origin();
                    let hit = match (forward, inclusive) {
                        (_, true) => buf.find(&query, origin),
                        (true, false) => buf.find(&query, origin + 1),
                        (false, false) => buf.rfind(&query, origin + buf.len().saturating_sub(1)),
                    };
                    if let Some(line) = hit {
                        buf.scroll_to(line, &policy);
                    }
                    hit.is_some()
                })
                .unwrap_or(false)
        } else {
            let hit = self.contexts.with_list(target, |list| {
                let labels: Vec<&str> = list.items().iter().map(|i| i.label.as_str()).collect();
                let selected = list.selected();
                let from = match (forward, inclusive) {
                    (_, true) => selected,
                    (true, false) => selected + 1,
                    (false, false) => selected + labels.len().saturating_sub(1),
                };
                find_wrapping(&labels, &query, from, forward)
            });
            if let Some(idx) = hit {
                if self.contexts.select(target, idx) && target != ContextKey::Menu {
                    self.refresh_main(false);
                }
            }
            hit.is_some()
        };

        if !found {
            self.set_status_message(format!("No match for '{query}'"));
        }
    }

    /// Content window and rectangle under a screen position.
    fn window_at(&self, column: u16, row: u16) -> Option<(Window, Rect)> {
        self.layout
            .iter()
            .find(|(w, r)| {
                (w.is_side() || w.is_main()) && r.area() > 0 && r.contains(Position::new(column, row))
            })
            .map(|(w, r)| (*w, *r))
    }

    fn click(&mut self, column: u16, row: u16) {
        if self.contexts.current() == ContextKey::Menu {
            self.contexts.pop();
            return;
        }
        let Some((window, rect)) = self.window_at(column, row) else {
            return;
        };

        if window.is_main() {
            let key = content_context(window);
            let current = self.contexts.current();
            if current != key {
                if current.kind() == ContextKind::Main {
                    self.contexts.pop();
                }
                let parent = self.main_source.as_ref().map(|s| s.context);
                self.contexts.push(key, parent);
            }
            return;
        }

        let Some(key) = self.contexts.context_for_window(window) else {
            return;
        };
        let (offset, len) = self
            .contexts
            .with_list(key, |l| (list_offset(l.selected(), inner_height(rect)), l.len()));
        if self.contexts.current() != key {
            if key.kind() == ContextKind::Side {
                self.contexts.replace_side(key);
            } else {
                while self.contexts.current() != key && self.contexts.pop().is_some() {}
            }
        }
        if row > rect.y && row + 1 < rect.bottom() {
            let idx = offset + usize::from(row - rect.y - 1);
            if idx < len {
                self.contexts.select(key, idx);
            }
        }
        self.refresh_main(false);
    }

    fn wheel(&mut self, column: u16, row: u16, delta: isize) {
        let Some((window, _)) = self.window_at(column, row) else {
            return;
        };
        if window.is_main() {
            if delta > 0 {
                self.tasks.scroll_down(window, &self.scroll);
            } else {
                self.tasks.scroll_up(window, &self.scroll);
            }
            return;
        }
        let Some(key) = self.contexts.context_for_window(window) else {
            return;
        };
        let drives_main = self.main_source.as_ref().is_some_and(|s| s.context == key);
        if self.contexts.move_selection(key, delta) && drives_main {
            self.refresh_main(false);
        }
    }

    fn spawn_background<F>(&self, work: F)
    where
        F: Future<Output = Background> + Send + 'static,
    {
        let tx = self.background_tx.clone();
        self.runtime.spawn(async move {
            // The app may have quit while the work ran
            let _ = tx.send(work.await);
        });
    }

    /// Reload every side list. A `manual` refresh also re-renders the main
    /// section even when the selection did not change.
    pub fn refresh(&mut self, manual: bool) {
        self.last_refresh = Instant::now();
        self.force_main |= manual;
        if self.refreshing {
            return;
        }
        self.refreshing = true;
        let repo = Arc::clone(&self.repo);
        self.spawn_background(async move { Background::Snapshot(repo.load_all().await) });
    }

    /// Fetch from the remote, then refresh.
    pub fn fetch(&mut self) {
        self.last_fetch = Instant::now();
        if self.fetching {
            return;
        }
        self.fetching = true;
        let repo = Arc::clone(&self.repo);
        self.spawn_background(async move { Background::Fetched(repo.fetch().await) });
    }

    fn load_sub_commits(&mut self, git_ref: String) {
        self.loading += 1;
        let repo = Arc::clone(&self.repo);
        self.spawn_background(async move {
            let result = repo.sub_commits(&git_ref).await;
            Background::SubCommits { git_ref, result }
        });
    }

    fn load_commit_files(&mut self, sha: String) {
        self.loading += 1;
        let repo = Arc::clone(&self.repo);
        self.spawn_background(async move {
            let result = repo.commit_files(&sha).await;
            Background::CommitFiles { sha, result }
        });
    }

    fn handle_background(&mut self, message: Background) {
        match message {
            Background::Snapshot(result) => {
                self.refreshing = false;
                let force = std::mem::take(&mut self.force_main);
                match result {
                    Ok(snapshot) => self.apply_snapshot(snapshot, force),
                    Err(e) => self.report("Refresh failed", &e),
                }
            }
            Background::Fetched(result) => {
                self.fetching = false;
                match result {
                    Ok(()) => {
                        info!("fetch complete");
                        self.refresh(false);
                    }
                    Err(e) => self.report("Fetch failed", &e),
                }
            }
            Background::SubCommits { git_ref, result } => {
                self.loading = self.loading.saturating_sub(1);
                match result {
                    Ok(items) => {
                        debug!(git_ref = %git_ref, commits = items.len(), "sub commits loaded");
                        self.open_sub_list(ContextKey::SubCommits, ContextKey::Branches, items);
                    }
                    Err(e) => self.report("Loading commits failed", &e),
                }
            }
            Background::CommitFiles { sha, result } => {
                self.loading = self.loading.saturating_sub(1);
                match result {
                    Ok(items) => {
                        self.commit_files_sha = Some(sha);
                        self.open_sub_list(ContextKey::CommitFiles, ContextKey::Commits, items);
                    }
                    Err(e) => self.report("Loading commit files failed", &e),
                }
            }
        }
        self.mark_dirty();
    }

    fn open_sub_list(&mut self, key: ContextKey, parent: ContextKey, items: Vec<ListItem>) {
        // Focus moved on while the list was loading
        if self.contexts.current() != parent {
            debug!(context = ?key, "discarding late list");
            return;
        }
        self.contexts.set_items(key, items);
        self.contexts.select(key, 0);
        self.contexts.push(key, Some(parent));
        self.refresh_main(false);
    }

    /// Install freshly loaded side lists, keeping each selection on the same
    /// record when it still exists.
    pub fn apply_snapshot(&mut self, snapshot: RepoSnapshot, force_main: bool) {
        let RepoSnapshot {
            status,
            files,
            branches,
            commits,
            stash,
        } = snapshot;

        for (key, items) in [
            (ContextKey::Status, status),
            (ContextKey::Files, files),
            (ContextKey::Branches, branches),
            (ContextKey::Commits, commits),
            (ContextKey::Stash, stash),
        ] {
            let previous = self.contexts.selected_item_id(key);
            self.contexts.set_items(key, items);
            if let Some(id) = previous {
                let idx = self
                    .contexts
                    .with_list(key, |l| l.items().iter().position(|i| i.id == id));
                if let Some(idx) = idx {
                    self.contexts.select(key, idx);
                }
            }
        }

        self.refresh_main(force_main);
        self.mark_dirty();
    }

    /// The list context whose selection drives the main section.
    fn main_context(&self) -> Option<ContextKey> {
        self.contexts
            .stack()
            .into_iter()
            .rev()
            .find(|k| matches!(k.kind(), ContextKind::Side | ContextKind::SubList))
    }

    fn is_visible(&self, window: Window) -> bool {
        // Before the first frame every window counts as visible
        self.layout.is_empty()
            || self
                .layout
                .get(&window)
                .is_some_and(|r| has_inner_area(*r))
    }

    /// Submit new main section tasks if what they should show changed.
    fn refresh_main(&mut self, force: bool) {
        let Some(context) = self.main_context() else {
            return;
        };
        if !self.is_visible(Window::Main) {
            self.stale_panels.insert(Window::Main);
            return;
        }

        let source = MainSource {
            context,
            item: self.contexts.selected_item(context),
        };
        let stale = self.stale_panels.iter().any(|w| self.is_visible(*w));
        if !force && !stale && self.main_source.as_ref() == Some(&source) {
            return;
        }

        let content = self.main_content(&source);
        debug!(context = ?context, title = content.title, "rendering main section");
        self.main_source = Some(source);
        self.stale_panels.clear();
        self.show(content);
    }

    fn show(&mut self, content: MainContent) {
        let MainContent {
            title,
            task,
            secondary,
        } = content;
        self.tasks.set_title(Window::Main, title);
        self.tasks.submit(Window::Main, task);

        self.main_split = secondary.is_some();
        match secondary {
            Some((title, task)) => {
                self.tasks.set_title(Window::Secondary, title);
                self.tasks.submit(Window::Secondary, task);
            }
            None => {
                self.tasks.stop(Window::Secondary);
                if self.contexts.current() == ContextKey::Secondary {
                    self.contexts.pop();
                }
            }
        }
    }

    fn main_content(&self, source: &MainSource) -> MainContent {
        let git = self.repo.git();
        let main_width = self.tasks.viewport_width(Window::Main);
        let stream = |spec, width| Task::Stream(git.paged(spec, width));

        let Some(item) = &source.item else {
            return MainContent::single(
                source.context.title(),
                Task::text(empty_message(source.context)),
            );
        };

        match source.context {
            ContextKey::Files => match FileChange::parse(&item.label) {
                Some(change) if change.staged && change.unstaged => MainContent {
                    title: "Unstaged changes",
                    task: stream(git.diff_file(&change.path, false, true), main_width),
                    secondary: Some((
                        "Staged changes",
                        stream(
                            git.diff_file(&change.path, true, true),
                            self.tasks.viewport_width(Window::Secondary),
                        ),
                    )),
                },
                Some(change) => {
                    let cached = change.show_cached();
                    let title = if cached {
                        "Staged changes"
                    } else {
                        "Unstaged changes"
                    };
                    MainContent::single(
                        title,
                        stream(git.diff_file(&change.path, cached, change.tracked), main_width),
                    )
                }
                None => MainContent::single(
                    "Diff",
                    Task::text(format!("Unrecognized status line: {}", item.label)),
                ),
            },
            ContextKey::Branches => {
                MainContent::single("Log", stream(git.branch_log_graph(&item.id), main_width))
            }
            ContextKey::Commits | ContextKey::SubCommits => {
                MainContent::single("Patch", stream(git.show(&item.id, None), main_width))
            }
            ContextKey::CommitFiles => match &self.commit_files_sha {
                Some(sha) => MainContent::single(
                    "Patch",
                    stream(git.commit_file_diff(sha, &item.id), main_width),
                ),
                None => MainContent::single("Patch", Task::text(empty_message(source.context))),
            },
            ContextKey::Stash => {
                MainContent::single("Stash", stream(git.stash_show(&item.id), main_width))
            }
            ContextKey::Status => MainContent::single("Status", Task::text(self.status_text(item))),
            ContextKey::Main | ContextKey::Secondary | ContextKey::Menu => {
                MainContent::single("", Task::text(""))
            }
        }
    }

    fn status_text(&self, item: &ListItem) -> String {
        let count = |key| self.contexts.with_list(key, |l| l.len());
        format!(
            "{}\n\nFiles changed: {}\nBranches:      {}\nCommits:       {}\nStash entries: {}\n\nPress ? for keybindings",
            item.label,
            count(ContextKey::Files),
            count(ContextKey::Branches),
            count(ContextKey::Commits),
            count(ContextKey::Stash),
        )
    }

    /// Process producer notifications, background results and timers.
    pub fn tick(&mut self) {
        while let Ok(PipelineEvent::Redraw(window)) = self.pipeline.try_recv() {
            let unread = self
                .tasks
                .with_buffer(window, |b| b.has_unread())
                .unwrap_or(false);
            if unread && self.is_visible(window) {
                self.mark_dirty();
            }
        }

        while let Ok(message) = self.background_rx.try_recv() {
            self.handle_background(message);
        }

        let refresh_every = self.config.refresher.refresh_interval;
        if refresh_every > 0 && self.last_refresh.elapsed() >= Duration::from_secs(refresh_every) {
            self.refresh(false);
        }
        let fetch_every = self.config.refresher.fetch_interval;
        if fetch_every > 0 && self.last_fetch.elapsed() >= Duration::from_secs(fetch_every) {
            self.fetch();
        }

        if self.stale_panels.iter().any(|w| self.is_visible(*w)) {
            self.refresh_main(true);
            self.mark_dirty();
        }

        if self
            .status_message
            .as_ref()
            .is_some_and(|(_, at)| at.elapsed() >= STATUS_MESSAGE_TTL)
        {
            self.status_message = None;
            self.mark_dirty();
        }
    }

    /// Run the main application loop.
    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        self.refresh(false);

        let result = self.run_loop(&mut terminal);

        let restored = restore_terminal();
        if let Err(e) = terminal.show_cursor() {
            warn!(error = %e, "failed to show cursor");
        }
        result.and(restored)
    }

    /// The inner event loop with frame-rate limiting.
    fn run_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
        let terminal_io = |e: io::Error| DeckError::io("driving", "terminal", e);

        while !self.should_quit {
            let frame_start = Instant::now();

            self.tick();
            if self.take_dirty() {
                terminal.draw(|frame| self.draw(frame)).map_err(terminal_io)?;
            }

            let timeout = FRAME_DURATION
                .saturating_sub(frame_start.elapsed())
                .max(Duration::from_millis(1));
            if event::poll(timeout).map_err(terminal_io)? {
                match event::read().map_err(terminal_io)? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        self.handle_key_event(key)
                    }
                    Event::Mouse(mouse) => self.handle_mouse_event(mouse),
                    Event::Resize(..) => self.mark_dirty(),
                    _ => {}
                }
            }
        }
        info!("quitting");
        Ok(())
    }

    /// Window of the topmost context that is not a popup.
    fn focus_window(&self) -> Window {
        self.contexts
            .stack()
            .iter()
            .rev()
            .find(|k| k.kind() != ContextKind::Popup)
            .map(|k| k.window())
            .unwrap_or(Window::Files)
    }

    fn app_status(&self) -> String {
        if let Some((message, _)) = &self.status_message {
            return message.clone();
        }
        let status = if self.fetching {
            "Fetching..."
        } else if self.refreshing && self.force_main {
            "Refreshing..."
        } else if self.loading > 0 {
            "Loading..."
        } else {
            ""
        };
        status.to_string()
    }

    fn information(&self) -> String {
        let version = concat!("gitdeck ", env!("CARGO_PKG_VERSION"));
        let mode = self.screen.mode();
        if mode.is_enlarged() {
            format!("[{mode}] {version}")
        } else {
            version.to_string()
        }
    }

    fn options_hint(&self) -> &'static str {
        match self.contexts.current().kind() {
            ContextKind::Popup => "Execute: <enter> | Close: <esc>",
            ContextKind::Main => "Scroll: ↑ ↓ | Switch panel: <tab> | Back: <esc> | Search: /",
            ContextKind::Side | ContextKind::SubList => {
                "View: <enter> | Panels: <tab> | Screen mode: + _ | Search: / | Keybindings: ? | Quit: q"
            }
        }
    }

    /// Draw the UI.
    pub fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let app_status = self.app_status();
        let information = self.information();
        let focus = self.focus_window();

        let layout = arrange_windows(&ArrangementInput {
            width: area.width,
            height: area.height,
            screen_mode: self.screen.mode(),
            current_window: focus,
            current_side_window: self.contexts.current_side_window(),
            stash_in_stack: self.contexts.contains(ContextKey::Stash),
            main_split: self.main_split,
            searching: self.search.active,
            app_status: &app_status,
            information: &information,
            gui: &self.config.gui,
        });
        self.sync_viewports(&layout);

        for window in Window::SIDE {
            if let Some(rect) = layout.get(&window) {
                self.draw_list_window(frame, window, *rect, focus == window);
            }
        }
        for window in CONTENT_WINDOWS {
            if let Some(rect) = layout.get(&window) {
                self.draw_content_window(frame, window, *rect, focus == window);
            }
        }
        self.draw_info_bar(frame, &layout, &app_status, &information);

        if self.contexts.current() == ContextKey::Menu {
            self.draw_menu(frame, area);
        }

        self.layout = layout;
    }

    /// Hand content panel sizes to the pipeline and stop producers of
    /// panels that are no longer on screen.
    fn sync_viewports(&mut self, layout: &HashMap<Window, Rect>) {
        for window in CONTENT_WINDOWS {
            match layout.get(&window) {
                Some(rect) if has_inner_area(*rect) => {
                    self.tasks
                        .set_viewport(window, rect.width - 2, rect.height - 2);
                }
                _ => {
                    if self.tasks.is_running(window) {
                        self.tasks.stop(window);
                        self.stale_panels.insert(window);
                    }
                }
            }
        }
    }

    fn draw_list_window(&self, frame: &mut Frame, window: Window, rect: Rect, focused: bool) {
        if rect.width == 0 || rect.height == 0 {
            return;
        }
        let Some(key) = self.contexts.context_for_window(window) else {
            return;
        };
        let theme = self.theme;
        let height = inner_height(rect);
        let show_detail =
            self.screen.mode().is_enlarged() && MODE_DEPENDENT_WINDOWS.contains(&window);

        let lines: Vec<Line> = self.contexts.with_list(key, |list| {
            let offset = list_offset(list.selected(), height);
            list.items()
                .iter()
                .enumerate()
                .skip(offset)
                .take(height)
                .map(|(i, item)| {
                    let mut spans = vec![Span::raw(item.label.clone())];
                    if show_detail {
                        if let Some(detail) = item.detail.as_deref().filter(|d| !d.is_empty()) {
                            spans.push(Span::styled(
                                format!("  {detail}"),
                                Style::default().fg(theme.detail),
                            ));
                        }
                    }
                    let line = Line::from(spans);
                    if focused && i == list.selected() {
                        line.patch_style(theme.selected_line())
                    } else {
                        line
                    }
                })
                .collect()
        });

        let block = panel_block(&theme, key.title(), focused);
        frame.render_widget(Paragraph::new(lines).block(block), rect);
    }

    fn draw_content_window(&self, frame: &mut Frame, window: Window, rect: Rect, focused: bool) {
        if rect.width == 0 || rect.height == 0 {
            return;
        }
        let text = ansi_text(&self.tasks.visible_lines(window));
        let block = panel_block(&self.theme, &self.tasks.title(window), focused);
        frame.render_widget(Paragraph::new(text).block(block), rect);
        self.tasks.with_buffer_mut(window, |b| b.mark_read());
    }

    fn draw_info_bar(
        &self,
        frame: &mut Frame,
        layout: &HashMap<Window, Rect>,
        app_status: &str,
        information: &str,
    ) {
        let theme = self.theme;
        if self.search.active {
            render_at(
                frame,
                layout,
                Window::SearchPrefix,
                Paragraph::new(SEARCH_PREFIX).style(Style::default().fg(theme.search_prefix)),
            );
            render_at(
                frame,
                layout,
                Window::Search,
                Paragraph::new(self.search.query.clone()),
            );
            return;
        }

        render_at(
            frame,
            layout,
            Window::AppStatus,
            Paragraph::new(format!("{app_status}{INFO_SECTION_PADDING}"))
                .style(Style::default().fg(theme.app_status)),
        );
        render_at(
            frame,
            layout,
            Window::Options,
            Paragraph::new(self.options_hint()).style(Style::default().fg(theme.options_text)),
        );
        render_at(
            frame,
            layout,
            Window::Information,
            Paragraph::new(format!("{INFO_SECTION_PADDING}{information}"))
                .style(Style::default().fg(theme.information)),
        );
    }

    /// Draw the keybindings menu centered over the layout.
    fn draw_menu(&self, frame: &mut Frame, area: Rect) {
        let theme = self.theme;
        let rows = self.contexts.with_list(ContextKey::Menu, |l| l.len());
        let width = 60.min(area.width.saturating_sub(4));
        let height = u16::try_from(rows + 2)
            .unwrap_or(u16::MAX)
            .min(area.height.saturating_sub(2));
        let overlay = Rect::new(
            area.x + area.width.saturating_sub(width) / 2,
            area.y + area.height.saturating_sub(height) / 2,
            width,
            height,
        );

        frame.render_widget(Clear, overlay);

        let visible = inner_height(overlay);
        let lines: Vec<Line> = self.contexts.with_list(ContextKey::Menu, |list| {
            let offset = list_offset(list.selected(), visible);
            list.items()
                .iter()
                .enumerate()
                .skip(offset)
                .take(visible)
                .map(|(i, item)| {
                    let line = Line::from(item.label.clone());
                    if i == list.selected() {
                        line.patch_style(theme.selected_line())
                    } else {
                        line
                    }
                })
                .collect()
        });

        let block = panel_block(&theme, ContextKey::Menu.title(), true);
        frame.render_widget(Paragraph::new(lines).block(block), overlay);
    }
}

/// Switch the terminal to raw mode and the alternate screen.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    let init = |e: io::Error| DeckError::TerminalInit {
        message: e.to_string(),
    };
    crossterm::terminal::enable_raw_mode().map_err(init)?;
    let mut stdout = io::stdout();
    crossterm::execute!(
        stdout,
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )
    .map_err(init)?;
    Terminal::new(CrosstermBackend::new(stdout)).map_err(init)
}

/// Leave raw mode and the alternate screen. Safe to call more than once,
/// which the panic hook relies on.
pub fn restore_terminal() -> Result<()> {
    let restore = |e: io::Error| DeckError::TerminalRestore {
        message: e.to_string(),
    };
    crossterm::terminal::disable_raw_mode().map_err(restore)?;
    let mut stdout = io::stdout();
    crossterm::execute!(
        stdout,
        crossterm::terminal::LeaveAlternateScreen,
        crossterm::event::DisableMouseCapture,
        crossterm::cursor::Show
    )
    .map_err(restore)
}

fn content_context(window: Window) -> ContextKey {
    if window == Window::Secondary {
        ContextKey::Secondary
    } else {
        ContextKey::Main
    }
}

fn empty_message(context: ContextKey) -> &'static str {
    match context {
        ContextKey::Files => "No changed files",
        ContextKey::Branches => "No branches",
        ContextKey::Commits | ContextKey::SubCommits => "No commits",
        ContextKey::CommitFiles => "No files in this commit",
        ContextKey::Stash => "No stash entries",
        _ => "",
    }
}

fn panel_block(theme: &Theme, title: &str, focused: bool) -> Block<'static> {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.border(focused));
    if title.is_empty() {
        block
    } else {
        block.title(Span::styled(format!(" {title} "), theme.title(focused)))
    }
}

fn render_at(
    frame: &mut Frame,
    layout: &HashMap<Window, Rect>,
    window: Window,
    widget: Paragraph<'_>,
) {
    if let Some(rect) = layout.get(&window) {
        if rect.area() > 0 {
            frame.render_widget(widget, *rect);
        }
    }
}

/// Styled text from lines that may carry ANSI escapes.
fn ansi_text(lines: &[String]) -> Text<'static> {
    let joined = lines.join("\n");
    joined
        .into_text()
        .unwrap_or_else(|_| Text::from(strip_ansi_escapes::strip_str(&joined)))
}

/// Whether a bordered window has room for at least one cell of content.
/// Content panels without it count as hidden.
fn has_inner_area(rect: Rect) -> bool {
    rect.width > 2 && rect.height > 2
}

/// Rows inside a bordered window.
fn inner_height(rect: Rect) -> usize {
    usize::from(rect.height.saturating_sub(2))
}

/// First list row to draw so that `selected` is visible.
fn list_offset(selected: usize, height: usize) -> usize {
    if height == 0 {
        0
    } else {
        selected.saturating_sub(height - 1)
    }
}

/// Shorten an error for the app status area.
fn truncate_status_error(err: &str) -> String {
    let first_line = err.lines().next().unwrap_or_default();
    if first_line.chars().count() <= STATUS_MESSAGE_MAX {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(STATUS_MESSAGE_MAX - 3).collect();
        format!("{cut}...")
    }
}
