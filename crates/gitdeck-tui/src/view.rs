//! Window identities for the gitdeck dashboard.
//!
//! Every screen region has a fixed name that survives layout passes, so mouse
//! hit-testing and keyboard focus can address it even when it is collapsed
//! to zero size.

use std::fmt;

/// Named screen regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Window {
    /// Repository name and checked-out branch
    Status,
    /// Working-tree changes
    Files,
    /// Local branches
    Branches,
    /// Commit log (also hosts sub-commits and commit files)
    Commits,
    /// Stash entries
    Stash,
    /// Main content panel
    Main,
    /// Secondary content panel, shown when the main section is split
    Secondary,
    /// Keybinding hints in the info bar
    Options,
    /// Version / mode text at the right of the info bar
    Information,
    /// Background activity indicator at the left of the info bar
    AppStatus,
    /// Search prompt label
    SearchPrefix,
    /// Search input
    Search,
    /// Popup menu drawn over the layout
    Menu,
}

impl Window {
    /// The side windows in display and cycling order.
    pub const SIDE: [Window; 5] = [
        Window::Status,
        Window::Files,
        Window::Branches,
        Window::Commits,
        Window::Stash,
    ];

    /// Stable identifier used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Window::Status => "status",
            Window::Files => "files",
            Window::Branches => "branches",
            Window::Commits => "commits",
            Window::Stash => "stash",
            Window::Main => "main",
            Window::Secondary => "secondary",
            Window::Options => "options",
            Window::Information => "information",
            Window::AppStatus => "appStatus",
            Window::SearchPrefix => "searchPrefix",
            Window::Search => "search",
            Window::Menu => "menu",
        }
    }

    /// Whether this window belongs to the side section.
    pub fn is_side(&self) -> bool {
        Self::SIDE.contains(self)
    }

    /// Position in [`Window::SIDE`].
    pub fn side_index(&self) -> Option<usize> {
        Self::SIDE.iter().position(|w| w == self)
    }

    /// Side window for a number key (`1`-`5`).
    pub fn from_side_hotkey(key: char) -> Option<Window> {
        let idx = key.to_digit(10)?.checked_sub(1)? as usize;
        Self::SIDE.get(idx).copied()
    }

    /// Whether the window paints a view buffer rather than a list.
    pub fn is_main(&self) -> bool {
        matches!(self, Window::Main | Window::Secondary)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_windows() {
        assert!(Window::Stash.is_side());
        assert!(!Window::Main.is_side());
        assert_eq!(Window::Branches.side_index(), Some(2));
        assert_eq!(Window::Search.side_index(), None);
    }

    #[test]
    fn test_side_hotkeys() {
        assert_eq!(Window::from_side_hotkey('1'), Some(Window::Status));
        assert_eq!(Window::from_side_hotkey('5'), Some(Window::Stash));
        assert_eq!(Window::from_side_hotkey('0'), None);
        assert_eq!(Window::from_side_hotkey('6'), None);
        assert_eq!(Window::from_side_hotkey('x'), None);
    }

    #[test]
    fn test_display_uses_name() {
        assert_eq!(Window::AppStatus.to_string(), "appStatus");
        assert_eq!(format!("{}", Window::Main), "main");
    }
}
