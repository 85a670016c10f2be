//! Scroll controller arithmetic.
//!
//! Origins are line offsets into a panel's buffer. Two bottom policies exist:
//! with scroll-past-bottom off a full viewport of content stays visible;
//! with it on, scrolling stops when one line remains.

use gitdeck_config::GuiConfig;

/// Scrolling settings for content panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollPolicy {
    /// Lines moved per scroll step
    pub step: usize,
    pub past_bottom: bool,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self {
            step: 2,
            past_bottom: true,
        }
    }
}

impl From<&GuiConfig> for ScrollPolicy {
    fn from(gui: &GuiConfig) -> Self {
        Self {
            step: usize::from(gui.scroll_height.max(1)),
            past_bottom: gui.scroll_past_bottom,
        }
    }
}

impl ScrollPolicy {
    /// Largest origin allowed for `content` lines in a `view`-line viewport.
    pub fn max_origin(&self, content: usize, view: usize) -> usize {
        if self.past_bottom {
            content.saturating_sub(1)
        } else {
            content.saturating_sub(view)
        }
    }

    pub fn scroll_down(&self, origin: usize, content: usize, view: usize) -> usize {
        origin
            .saturating_add(self.step)
            .min(self.max_origin(content, view))
    }

    pub fn scroll_up(&self, origin: usize) -> usize {
        origin.saturating_sub(self.step)
    }
}

/// Origin that keeps the last `view` lines of `content` on screen.
pub fn follow_origin(content: usize, view: usize) -> usize {
    content.saturating_sub(view)
}
