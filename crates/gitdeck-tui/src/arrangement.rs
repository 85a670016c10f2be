//! Window arrangement: the dashboard's box tree.
//!
//! Builds the declarative layout for the current terminal size, screen mode
//! and focus, then hands it to the layout engine.
//!
//! ```text
//! ┌────────┬──────────────────────┐
//! │ status │                      │
//! ├────────┤                      │
//! │ files  │        main          │
//! ├────────┤                      │
//! │branches├──────────────────────┤
//! ├────────┤                      │
//! │commits │      secondary       │
//! ├────────┤     (when split)     │
//! │ stash  │                      │
//! ├────────┴──────────────────────┤
//! │ appStatus  options  information│
//! └───────────────────────────────┘
//! ```

use std::collections::HashMap;

use gitdeck_config::{GuiConfig, MainPanelSplitMode};
use ratatui::layout::Rect;
use unicode_width::UnicodeWidthStr;

use crate::layout::{Direction, LayoutBox, arrange};
use crate::screen_mode::ScreenMode;
use crate::view::Window;

/// Label shown in front of the search input.
pub const SEARCH_PREFIX: &str = "search: ";

/// Space kept around fixed-width info bar items.
pub const INFO_SECTION_PADDING: &str = " ";

/// Everything the arrangement depends on, read once per frame.
#[derive(Debug, Clone)]
pub struct ArrangementInput<'a> {
    pub width: u16,
    pub height: u16,
    pub screen_mode: ScreenMode,
    /// Window of the focused context
    pub current_window: Window,
    /// Window of the side context
    pub current_side_window: Window,
    /// A stash context is somewhere in the stack
    pub stash_in_stack: bool,
    /// The main section shows both main and secondary
    pub main_split: bool,
    pub searching: bool,
    pub app_status: &'a str,
    pub information: &'a str,
    pub gui: &'a GuiConfig,
}

/// Terminal cell width of `text`, ignoring ANSI escape sequences.
pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi_escapes::strip_str(text).as_str())
}

fn fixed_width(text_width: usize) -> u16 {
    u16::try_from(text_width + INFO_SECTION_PADDING.len()).unwrap_or(u16::MAX)
}

/// Tall, narrow terminals stack the side section above the main section.
pub fn is_portrait(width: u16, height: u16) -> bool {
    width <= 84 && height > 45
}

/// Whether main and secondary sit side by side.
pub fn split_main_side_by_side(input: &ArrangementInput<'_>) -> bool {
    if !input.main_split {
        return false;
    }
    match input.gui.main_panel_split_mode {
        MainPanelSplitMode::Vertical => false,
        MainPanelSplitMode::Horizontal => true,
        // Two 80 column panels plus a 40 column side section
        MainPanelSplitMode::Flexible => !(input.width < 200 && input.height > 30),
    }
}

/// Weights of the side and main sections.
pub fn mid_section_weights(input: &ArrangementInput<'_>) -> (u16, u16) {
    // A ratio of 0.25 means one part side to three parts main
    let ratio_weight = ((1.0 / input.gui.side_panel_width) as i64 - 1).clamp(1, i64::from(u16::MAX));
    let mut main_weight = ratio_weight as u16;
    let mut side_weight = 1;

    if split_main_side_by_side(input) {
        main_weight = 5;
    }

    if input.current_window.is_main() {
        if input.screen_mode.is_enlarged() {
            side_weight = 0;
        }
    } else {
        match input.screen_mode {
            ScreenMode::Normal => {}
            ScreenMode::Half => main_weight = 1,
            ScreenMode::Full => main_weight = 0,
        }
    }

    (side_weight, main_weight)
}

fn main_section_children(input: &ArrangementInput<'_>) -> Vec<LayoutBox> {
    if !input.main_split {
        return vec![LayoutBox::window(Window::Main).weight(1)];
    }

    // Full screen on a content panel hides the other one at zero size
    if input.screen_mode == ScreenMode::Full && input.current_window.is_main() {
        let hidden = if input.current_window == Window::Main {
            Window::Secondary
        } else {
            Window::Main
        };
        return vec![
            LayoutBox::window(input.current_window).weight(1),
            LayoutBox::window(hidden).size(0),
        ];
    }

    let (first, second) = if input.current_window == Window::Secondary {
        (Window::Secondary, Window::Main)
    } else {
        (Window::Main, Window::Secondary)
    };
    vec![
        LayoutBox::window(first).weight(1),
        LayoutBox::window(second).weight(1),
    ]
}

/// Inputs of the side section's conditional children, copied so the
/// producer owns them.
#[derive(Debug, Clone, Copy)]
struct SideSection {
    current: Window,
    screen_mode: ScreenMode,
    accordion: bool,
    stash_in_stack: bool,
}

impl SideSection {
    fn children(&self, height: u16) -> Vec<LayoutBox> {
        if self.screen_mode.is_enlarged() {
            // Unfocused windows keep their slot at zero size
            return Window::SIDE
                .iter()
                .map(|&w| {
                    if w == self.current {
                        LayoutBox::window(w).weight(1)
                    } else {
                        LayoutBox::window(w).size(0)
                    }
                })
                .collect();
        }

        if height >= 28 {
            let accordion = |b: LayoutBox, window: Window| {
                if self.accordion && window == self.current {
                    LayoutBox::window(window).weight(2)
                } else {
                    b
                }
            };
            // The stash window stays small until it has been visited
            let stash = if self.stash_in_stack {
                LayoutBox::window(Window::Stash).weight(1)
            } else {
                LayoutBox::window(Window::Stash).size(3)
            };
            return vec![
                LayoutBox::window(Window::Status).size(3),
                accordion(LayoutBox::window(Window::Files).weight(1), Window::Files),
                accordion(LayoutBox::window(Window::Branches).weight(1), Window::Branches),
                accordion(LayoutBox::window(Window::Commits).weight(1), Window::Commits),
                accordion(stash, Window::Stash),
            ];
        }

        let squashed = if height >= 21 { 3 } else { 1 };
        Window::SIDE
            .iter()
            .map(|&w| {
                if w == self.current {
                    LayoutBox::window(w).weight(1)
                } else {
                    LayoutBox::window(w).size(squashed)
                }
            })
            .collect()
    }
}

fn info_section_children(input: &ArrangementInput<'_>) -> Vec<LayoutBox> {
    if input.searching {
        return vec![
            LayoutBox::window(Window::SearchPrefix).size(SEARCH_PREFIX.len() as u16),
            LayoutBox::window(Window::Search).weight(1),
        ];
    }

    let mut children = Vec::with_capacity(3);
    if !input.app_status.is_empty() {
        children.push(
            LayoutBox::window(Window::AppStatus).size(fixed_width(display_width(input.app_status))),
        );
    }
    children.push(LayoutBox::window(Window::Options).weight(1));
    children.push(
        LayoutBox::window(Window::Information).size(fixed_width(display_width(input.information))),
    );
    children
}

/// Build the dashboard's box tree.
pub fn window_tree(input: &ArrangementInput<'_>) -> LayoutBox {
    let (side_weight, main_weight) = mid_section_weights(input);

    let mid_direction = if is_portrait(input.width, input.height) {
        Direction::Column
    } else {
        Direction::Row
    };
    let main_direction = if split_main_side_by_side(input) {
        Direction::Row
    } else {
        Direction::Column
    };

    let side = SideSection {
        current: input.current_side_window,
        screen_mode: input.screen_mode,
        accordion: input.gui.expand_focused_side_panel,
        stash_in_stack: input.stash_in_stack,
    };

    LayoutBox::column(vec![
        LayoutBox::row(vec![
            LayoutBox::conditional(Direction::Column, move |_, height| side.children(height))
                .weight(side_weight),
            LayoutBox::row(main_section_children(input))
                .direction(main_direction)
                .weight(main_weight),
        ])
        .direction(mid_direction)
        .weight(1),
        LayoutBox::row(info_section_children(input)).size(1),
    ])
}

/// Rectangles of every dashboard window.
pub fn arrange_windows(input: &ArrangementInput<'_>) -> HashMap<Window, Rect> {
    arrange(&window_tree(input), Rect::new(0, 0, input.width, input.height))
}
