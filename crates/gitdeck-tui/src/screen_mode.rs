//! Screen mode controller.

use std::fmt;

use crate::view::Window;

/// How much of the screen the focused panel gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenMode {
    #[default]
    Normal,
    Half,
    Full,
}

impl ScreenMode {
    /// All modes in cycle order.
    pub const ALL: [ScreenMode; 3] = [ScreenMode::Normal, ScreenMode::Half, ScreenMode::Full];

    pub fn next(&self) -> ScreenMode {
        let idx = Self::ALL.iter().position(|m| m == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn prev(&self) -> ScreenMode {
        let idx = Self::ALL.iter().position(|m| m == self).unwrap_or(0);
        if idx == 0 {
            Self::ALL[Self::ALL.len() - 1]
        } else {
            Self::ALL[idx - 1]
        }
    }

    /// Half or Full.
    pub fn is_enlarged(&self) -> bool {
        !matches!(self, ScreenMode::Normal)
    }

    pub fn title(&self) -> &'static str {
        match self {
            ScreenMode::Normal => "normal",
            ScreenMode::Half => "half",
            ScreenMode::Full => "full",
        }
    }
}

impl fmt::Display for ScreenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// Windows whose content changes detail level with the screen mode.
pub const MODE_DEPENDENT_WINDOWS: [Window; 2] = [Window::Branches, Window::Commits];

/// Holds the current [`ScreenMode`].
///
/// Changing the mode returns the windows the caller must re-render.
#[derive(Debug, Default)]
pub struct ScreenModeController {
    mode: ScreenMode,
}

impl ScreenModeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ScreenMode {
        self.mode
    }

    pub fn next(&mut self) -> &'static [Window] {
        self.mode = self.mode.next();
        &MODE_DEPENDENT_WINDOWS
    }

    pub fn prev(&mut self) -> &'static [Window] {
        self.mode = self.mode.prev();
        &MODE_DEPENDENT_WINDOWS
    }
}
