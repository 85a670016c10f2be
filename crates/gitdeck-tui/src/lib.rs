//! Terminal UI for gitdeck.
//!
//! This crate provides the Ratatui-based dashboard: side lists on the left,
//! a main section on the right that is optionally split into main and
//! secondary panels, and a one-line info bar at the bottom.
//!
//! ## Hotkeys
//!
//! - `1`-`5` - Focus Status, Files, Branches, Commits, Stash
//! - `Tab` / `Shift+Tab` - Cycle panels
//! - `j` / `k` - Move selection, or scroll a focused content panel
//! - `Enter` - Drill into the selected item
//! - `Esc` - Go back / close / cancel search
//! - `+` / `_` - Cycle screen mode (normal, half, full)
//! - `Ctrl+d` / `Ctrl+u` - Scroll main panel
//! - `J` / `K` - Scroll secondary panel
//! - `/`, `n`, `N` - Search
//! - `r` - Refresh, `f` - Fetch
//! - `?` - Keybindings menu
//! - `q` - Quit

pub mod app;
pub mod arrangement;
pub mod buffer;
pub mod context;
pub mod event;
pub mod layout;
pub mod screen_mode;
pub mod scroll;
pub mod tasks;
pub mod theme;
pub mod view;

pub use app::{App, restore_terminal};
pub use context::{ContextKey, ContextKind, ContextManager};
pub use screen_mode::ScreenMode;
pub use tasks::{Task, TaskManager};
pub use view::Window;
