//! Event handling for the gitdeck TUI.
//!
//! Turns crossterm key and mouse events into [`AppEvent`]s. What an event
//! does depends on the focused context and is decided by the app.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

use crate::view::Window;

/// Application-level events that can trigger state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// Request application quit
    Quit,
    /// Force quit (Ctrl+C)
    ForceQuit,
    /// Cycle screen mode forward (`+`)
    NextScreenMode,
    /// Cycle screen mode backward (`_`)
    PrevScreenMode,
    /// Jump to a side window (`1`-`5`)
    FocusSide(Window),
    /// Next side window, or the other content panel when one is focused
    NextPanel,
    /// Previous side window, or the other content panel when one is focused
    PrevPanel,
    /// Move the selection (or scroll a focused content panel) up
    NavigateUp,
    /// Move the selection (or scroll a focused content panel) down
    NavigateDown,
    /// Scroll the main panel up
    ScrollMainUp,
    /// Scroll the main panel down
    ScrollMainDown,
    /// Scroll the secondary panel up
    ScrollSecondaryUp,
    /// Scroll the secondary panel down
    ScrollSecondaryDown,
    /// Drill into the selected item
    Select,
    /// Go back / close popup / cancel search
    Cancel,
    /// Reload the side lists
    Refresh,
    /// Fetch from the remote
    Fetch,
    /// Show the keybindings menu
    ShowMenu,
    /// Open the search prompt
    StartSearch,
    /// Jump to the next search match
    NextMatch,
    /// Jump to the previous search match
    PrevMatch,
    /// Text typed into the search prompt
    SearchInput(char),
    /// Backspace in the search prompt
    SearchBackspace,
    /// Confirm the search prompt
    SearchSubmit,
    /// Left click at a screen position
    Click { column: u16, row: u16 },
    /// Wheel up over a screen position
    WheelUp { column: u16, row: u16 },
    /// Wheel down over a screen position
    WheelDown { column: u16, row: u16 },
    /// No action needed
    None,
}

/// Input handler for converting terminal events to app events.
#[derive(Debug, Default)]
pub struct InputHandler {
    /// Whether keystrokes go to the search prompt
    search_mode: bool,
}

impl InputHandler {
    /// Create a new input handler.
    pub fn new() -> Self {
        Self { search_mode: false }
    }

    pub fn set_search_mode(&mut self, active: bool) {
        self.search_mode = active;
    }

    pub fn is_search_mode(&self) -> bool {
        self.search_mode
    }

    /// Handle a key event and return the corresponding app event.
    pub fn handle_key(&mut self, key: KeyEvent) -> AppEvent {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        // Ctrl+C always force quits
        if ctrl && key.code == KeyCode::Char('c') {
            return AppEvent::ForceQuit;
        }

        if key.code == KeyCode::Esc {
            self.search_mode = false;
            return AppEvent::Cancel;
        }

        if self.search_mode {
            return self.handle_search_input(key);
        }

        if ctrl {
            return match key.code {
                KeyCode::Char('d') => AppEvent::ScrollMainDown,
                KeyCode::Char('u') => AppEvent::ScrollMainUp,
                KeyCode::Char('r') => AppEvent::Refresh,
                _ => AppEvent::None,
            };
        }

        self.handle_normal_mode(key)
    }

    fn handle_search_input(&mut self, key: KeyEvent) -> AppEvent {
        match key.code {
            KeyCode::Enter => {
                self.search_mode = false;
                AppEvent::SearchSubmit
            }
            KeyCode::Backspace => AppEvent::SearchBackspace,
            KeyCode::Char(c) => AppEvent::SearchInput(c),
            _ => AppEvent::None,
        }
    }

    fn handle_normal_mode(&mut self, key: KeyEvent) -> AppEvent {
        match key.code {
            KeyCode::Char('q') => AppEvent::Quit,

            KeyCode::Char('+') => AppEvent::NextScreenMode,
            KeyCode::Char('_') => AppEvent::PrevScreenMode,

            KeyCode::Char(c @ '1'..='5') => {
                Window::from_side_hotkey(c).map_or(AppEvent::None, AppEvent::FocusSide)
            }

            KeyCode::Tab => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    AppEvent::PrevPanel
                } else {
                    AppEvent::NextPanel
                }
            }
            KeyCode::BackTab | KeyCode::Char('h') | KeyCode::Left => AppEvent::PrevPanel,
            KeyCode::Char('l') | KeyCode::Right => AppEvent::NextPanel,

            KeyCode::Up | KeyCode::Char('k') => AppEvent::NavigateUp,
            KeyCode::Down | KeyCode::Char('j') => AppEvent::NavigateDown,
            KeyCode::PageUp => AppEvent::ScrollMainUp,
            KeyCode::PageDown => AppEvent::ScrollMainDown,
            KeyCode::Char('K') => AppEvent::ScrollSecondaryUp,
            KeyCode::Char('J') => AppEvent::ScrollSecondaryDown,

            KeyCode::Enter => AppEvent::Select,

            KeyCode::Char('r') => AppEvent::Refresh,
            KeyCode::Char('f') => AppEvent::Fetch,
            KeyCode::Char('?') => AppEvent::ShowMenu,

            KeyCode::Char('/') => {
                self.search_mode = true;
                AppEvent::StartSearch
            }
            KeyCode::Char('n') => AppEvent::NextMatch,
            KeyCode::Char('N') => AppEvent::PrevMatch,

            _ => AppEvent::None,
        }
    }

    /// Handle a mouse event.
    pub fn handle_mouse(&self, mouse: MouseEvent) -> AppEvent {
        let (column, row) = (mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => AppEvent::Click { column, row },
            MouseEventKind::ScrollUp => AppEvent::WheelUp { column, row },
            MouseEventKind::ScrollDown => AppEvent::WheelDown { column, row },
            _ => AppEvent::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_event(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn key_event_with_mods(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    fn mouse_event(kind: MouseEventKind, column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    #[test]
    fn test_side_hotkeys() {
        let mut handler = InputHandler::new();

        assert_eq!(
            handler.handle_key(key_event(KeyCode::Char('1'))),
            AppEvent::FocusSide(Window::Status)
        );
        assert_eq!(
            handler.handle_key(key_event(KeyCode::Char('4'))),
            AppEvent::FocusSide(Window::Commits)
        );
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('6'))), AppEvent::None);
    }

    #[test]
    fn test_screen_mode_keys() {
        let mut handler = InputHandler::new();
        assert_eq!(
            handler.handle_key(key_event(KeyCode::Char('+'))),
            AppEvent::NextScreenMode
        );
        assert_eq!(
            handler.handle_key(key_event(KeyCode::Char('_'))),
            AppEvent::PrevScreenMode
        );
    }

    #[test]
    fn test_ctrl_c_force_quit() {
        let mut handler = InputHandler::new();

        assert_eq!(
            handler.handle_key(key_event_with_mods(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            AppEvent::ForceQuit
        );

        // Also works while searching
        handler.set_search_mode(true);
        assert_eq!(
            handler.handle_key(key_event_with_mods(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            AppEvent::ForceQuit
        );
    }

    #[test]
    fn test_panel_cycling() {
        let mut handler = InputHandler::new();

        assert_eq!(handler.handle_key(key_event(KeyCode::Tab)), AppEvent::NextPanel);
        assert_eq!(
            handler.handle_key(key_event_with_mods(KeyCode::Tab, KeyModifiers::SHIFT)),
            AppEvent::PrevPanel
        );
        assert_eq!(handler.handle_key(key_event(KeyCode::BackTab)), AppEvent::PrevPanel);
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('l'))), AppEvent::NextPanel);
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('h'))), AppEvent::PrevPanel);
    }

    #[test]
    fn test_navigation_and_scroll_keys() {
        let mut handler = InputHandler::new();

        assert_eq!(handler.handle_key(key_event(KeyCode::Char('j'))), AppEvent::NavigateDown);
        assert_eq!(handler.handle_key(key_event(KeyCode::Up)), AppEvent::NavigateUp);
        assert_eq!(
            handler.handle_key(key_event_with_mods(KeyCode::Char('d'), KeyModifiers::CONTROL)),
            AppEvent::ScrollMainDown
        );
        assert_eq!(handler.handle_key(key_event(KeyCode::PageUp)), AppEvent::ScrollMainUp);
        assert_eq!(
            handler.handle_key(key_event_with_mods(KeyCode::Char('J'), KeyModifiers::SHIFT)),
            AppEvent::ScrollSecondaryDown
        );
        assert_eq!(
            handler.handle_key(key_event(KeyCode::Char('K'))),
            AppEvent::ScrollSecondaryUp
        );
    }

    #[test]
    fn test_search_mode() {
        let mut handler = InputHandler::new();
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('/'))), AppEvent::StartSearch);
        assert!(handler.is_search_mode());

        // Letters that are normally bound go to the prompt
        assert_eq!(
            handler.handle_key(key_event(KeyCode::Char('q'))),
            AppEvent::SearchInput('q')
        );
        assert_eq!(
            handler.handle_key(key_event(KeyCode::Backspace)),
            AppEvent::SearchBackspace
        );
        assert_eq!(handler.handle_key(key_event(KeyCode::Enter)), AppEvent::SearchSubmit);
        assert!(!handler.is_search_mode());

        assert_eq!(handler.handle_key(key_event(KeyCode::Char('n'))), AppEvent::NextMatch);
    }

    #[test]
    fn test_escape_leaves_search_mode() {
        let mut handler = InputHandler::new();
        handler.set_search_mode(true);
        assert_eq!(handler.handle_key(key_event(KeyCode::Esc)), AppEvent::Cancel);
        assert!(!handler.is_search_mode());
    }

    #[test]
    fn test_mouse_events() {
        let handler = InputHandler::new();
        assert_eq!(
            handler.handle_mouse(mouse_event(MouseEventKind::Down(MouseButton::Left), 3, 7)),
            AppEvent::Click { column: 3, row: 7 }
        );
        assert_eq!(
            handler.handle_mouse(mouse_event(MouseEventKind::ScrollDown, 50, 2)),
            AppEvent::WheelDown { column: 50, row: 2 }
        );
        assert_eq!(
            handler.handle_mouse(mouse_event(MouseEventKind::Moved, 1, 1)),
            AppEvent::None
        );
    }

    #[test]
    fn test_quit_refresh_fetch_menu() {
        let mut handler = InputHandler::new();
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('q'))), AppEvent::Quit);
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('r'))), AppEvent::Refresh);
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('f'))), AppEvent::Fetch);
        assert_eq!(handler.handle_key(key_event(KeyCode::Char('?'))), AppEvent::ShowMenu);
        assert_eq!(handler.handle_key(key_event(KeyCode::Enter)), AppEvent::Select);
    }
}
