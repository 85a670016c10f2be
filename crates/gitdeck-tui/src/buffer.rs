//! Line buffers behind the content panels.

use crate::scroll::{ScrollPolicy, follow_origin};

/// Accumulated output of a panel's task plus its viewport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewBuffer {
    lines: Vec<String>,
    /// Lines the renderer has already painted
    read_cursor: usize,
    /// First visible line
    origin: usize,
    /// Height of the panel's inner area, updated on every draw
    view_height: usize,
    /// Keep the newest output in view
    follow: bool,
}

impl ViewBuffer {
    pub fn new(follow: bool) -> Self {
        Self {
            follow,
            ..Self::default()
        }
    }

    /// Start over for a new task. Viewport height is kept.
    pub fn reset(&mut self, follow: bool) {
        self.lines.clear();
        self.read_cursor = 0;
        self.origin = 0;
        self.follow = follow;
    }

    /// Replace the whole content at once.
    pub fn set_content(&mut self, text: &str) {
        self.lines = split_lines(text);
        self.read_cursor = 0;
        self.origin = self.origin.min(self.lines.len().saturating_sub(1));
    }

    /// Append complete lines, advancing the origin when following.
    pub fn append_lines<I>(&mut self, lines: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.lines.extend(lines);
        if self.follow {
            self.origin = follow_origin(self.lines.len(), self.view_height);
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn origin(&self) -> usize {
        self.origin
    }

    pub fn view_height(&self) -> usize {
        self.view_height
    }

    pub fn is_following(&self) -> bool {
        self.follow
    }

    /// Record the panel's visible height.
    pub fn set_view_height(&mut self, height: usize) {
        self.view_height = height;
        if self.follow {
            self.origin = follow_origin(self.lines.len(), height);
        }
    }

    /// The lines inside the viewport.
    pub fn visible(&self) -> &[String] {
        let start = self.origin.min(self.lines.len());
        let end = start.saturating_add(self.view_height).min(self.lines.len());
        &self.lines[start..end]
    }

    /// Whether output arrived since the last [`ViewBuffer::mark_read`].
    pub fn has_unread(&self) -> bool {
        self.read_cursor < self.lines.len()
    }

    pub fn mark_read(&mut self) {
        self.read_cursor = self.lines.len();
    }

    /// Manual scroll down. Stops auto-follow until the next task.
    pub fn scroll_down(&mut self, policy: &ScrollPolicy) {
        self.follow = false;
        self.origin = policy.scroll_down(self.origin, self.lines.len(), self.view_height);
    }

    /// Manual scroll up. Stops auto-follow until the next task.
    pub fn scroll_up(&mut self, policy: &ScrollPolicy) {
        self.follow = false;
        self.origin = policy.scroll_up(self.origin);
    }

    /// Move the origin to `line`, as a search jump does. Stops auto-follow.
    pub fn scroll_to(&mut self, line: usize, policy: &ScrollPolicy) {
        self.follow = false;
        self.origin = line.min(policy.max_origin(self.lines.len(), self.view_height));
    }

    /// Index of the first line at or after `from` containing `needle`,
    /// ignoring case and ANSI styling. Wraps around.
    pub fn find(&self, needle: &str, from: usize) -> Option<usize> {
        find_wrapping(&self.lines, needle, from, true)
    }

    /// Like [`ViewBuffer::find`], searching backwards from `from`.
    pub fn rfind(&self, needle: &str, from: usize) -> Option<usize> {
        find_wrapping(&self.lines, needle, from, false)
    }
}

/// Case-insensitive match that ignores ANSI escape sequences in `text`.
/// `needle` must already be lowercase.
pub fn matches_query(text: &str, needle: &str) -> bool {
    strip_ansi_escapes::strip_str(text)
        .to_lowercase()
        .contains(needle)
}

/// Search `haystack` starting at `from` and wrapping around.
pub fn find_wrapping<S: AsRef<str>>(
    haystack: &[S],
    needle: &str,
    from: usize,
    forward: bool,
) -> Option<usize> {
    let n = haystack.len();
    if needle.is_empty() || n == 0 {
        return None;
    }
    let needle = needle.to_lowercase();
    let from = from % n;
    (0..n)
        .map(|i| if forward { (from + i) % n } else { (from + n - i) % n })
        .find(|&i| matches_query(haystack[i].as_ref(), &needle))
}

/// Split text into lines, dropping carriage returns and a trailing newline.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(|l| l.trim_end_matches('\r').to_string()).collect()
}
