//! Async task and view-stream pipeline.
//!
//! Each content window owns a [`Panel`]: a view buffer plus a generation
//! counter. Submitting a [`Task`] bumps the generation and tells the previous
//! producer to stop. The buffer is cleared when the new producer first
//! writes (or ends without output), so the old content stays on screen until
//! there is something to replace it. Producers tag every write with the
//! generation they started under; a write carrying an old generation is
//! dropped, so a cancelled producer can never touch a buffer that a newer
//! task owns.
//!
//! Captured commands run as tokio tasks and land in one update. Streaming
//! commands run on the blocking pool behind a pseudo-terminal and append
//! lines as they arrive, sending a redraw request after each chunk.
//!
//! ```text
//!   submit(window, task)
//!        │  generation += 1, reset pending, old cancel fired
//!        ▼
//!   ┌─────────┐  Text      ┌──────────────┐
//!   │  Panel  │◄───────────│  UI thread   │
//!   │ buffer  │            └──────────────┘
//!   │ gen = n │◄── Captured: tokio task, select!(cancel, run_captured)
//!   │         │◄── Stream:   blocking reader, append if gen == n
//!   └─────────┘
//! ```

use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::sync::mpsc;

use gitdeck_exec::{CommandRunner, CommandSpec, StreamHandle, TermSize};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::buffer::{ViewBuffer, split_lines};
use crate::scroll::ScrollPolicy;
use crate::view::Window;

/// Bytes requested per read from a streaming command.
const READ_CHUNK: usize = 8192;

/// Output without a newline is flushed as a line once this much piles up.
const MAX_PARTIAL_LINE: usize = READ_CHUNK * 4;

/// Windows whose content is produced by tasks.
pub const CONTENT_WINDOWS: [Window; 2] = [Window::Main, Window::Secondary];

/// What a content window should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Fixed text, written immediately
    Text(String),
    /// Run to completion, then show stdout (or the error)
    Captured(CommandSpec),
    /// Run attached to a pseudo-terminal and show output as it arrives
    Stream(CommandSpec),
}

impl Task {
    pub fn text(text: impl Into<String>) -> Self {
        Task::Text(text.into())
    }

    fn kind(&self) -> &'static str {
        match self {
            Task::Text(_) => "text",
            Task::Captured(_) => "captured",
            Task::Stream(_) => "stream",
        }
    }
}

/// Notifications from producers to the UI thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// New content is available for the window
    Redraw(Window),
}

#[derive(Debug)]
struct PanelState {
    generation: u64,
    buffer: ViewBuffer,
    /// Follow setting to reset the buffer with on the current generation's
    /// first write
    pending_reset: Option<bool>,
    title: String,
    size: TermSize,
    cancel: Option<oneshot::Sender<()>>,
}

/// A content window's buffer and producer bookkeeping.
#[derive(Debug)]
pub struct Panel {
    window: Window,
    state: Mutex<PanelState>,
}

impl Panel {
    fn new(window: Window, follow: bool) -> Self {
        Self {
            window,
            state: Mutex::new(PanelState {
                generation: 0,
                buffer: ViewBuffer::new(follow),
                pending_reset: None,
                title: String::new(),
                size: TermSize::default(),
                cancel: None,
            }),
        }
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Claim the panel for a new producer and cancel the old one. The
    /// buffer is reset by the new generation's first write.
    fn begin(&self, cancel: Option<oneshot::Sender<()>>, follow: bool) -> (u64, TermSize) {
        let (previous, generation, size) = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.pending_reset = Some(follow);
            let previous = std::mem::replace(&mut state.cancel, cancel);
            (previous, state.generation, state.size)
        };
        // Fire and forget; teardown finishes on the producer's side
        if let Some(tx) = previous {
            let _ = tx.send(());
        }
        (generation, size)
    }

    /// Invalidate the current producer without touching the buffer.
    fn halt(&self) -> bool {
        let previous = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.pending_reset = None;
            state.cancel.take()
        };
        match previous {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Producer finished on its own. Returns whether the buffer was cleared
    /// because the producer never wrote anything.
    fn finish(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        state.cancel = None;
        state.apply_pending_reset()
    }

    fn replace_content(&self, generation: u64, text: &str) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        state.apply_pending_reset();
        state.buffer.set_content(text);
        true
    }

    fn append(&self, generation: u64, lines: Vec<String>) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        state.apply_pending_reset();
        state.buffer.append_lines(lines);
        true
    }
}

impl PanelState {
    fn apply_pending_reset(&mut self) -> bool {
        match self.pending_reset.take() {
            Some(follow) => {
                self.buffer.reset(follow);
                true
            }
            None => false,
        }
    }
}

/// Owner of every content panel and the producers feeding them.
pub struct TaskManager {
    runner: Arc<dyn CommandRunner>,
    runtime: Handle,
    panels: HashMap<Window, Arc<Panel>>,
    events: mpsc::Sender<PipelineEvent>,
    follow: bool,
}

impl TaskManager {
    /// Create panels for [`CONTENT_WINDOWS`]. `follow` is the auto-follow
    /// setting each new task starts with.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        runtime: Handle,
        follow: bool,
    ) -> (Self, mpsc::Receiver<PipelineEvent>) {
        let (events, rx) = mpsc::channel();
        let panels = CONTENT_WINDOWS
            .iter()
            .map(|w| (*w, Arc::new(Panel::new(*w, follow))))
            .collect();
        let manager = Self {
            runner,
            runtime,
            panels,
            events,
            follow,
        };
        (manager, rx)
    }

    fn panel(&self, window: Window) -> Option<&Arc<Panel>> {
        self.panels.get(&window)
    }

    /// Replace whatever `window` shows with `task`. Returns the generation
    /// the task runs under, or `None` for a window without a panel.
    pub fn submit(&self, window: Window, task: Task) -> Option<u64> {
        let Some(panel) = self.panel(window) else {
            warn!(window = %window, "task submitted for a window without a panel");
            return None;
        };
        let kind = task.kind();

        let generation = match task {
            Task::Text(text) => {
                let (generation, _) = panel.begin(None, self.follow);
                panel.replace_content(generation, &text);
                notify(&self.events, window);
                generation
            }
            Task::Captured(spec) => {
                let (cancel_tx, cancel_rx) = oneshot::channel();
                let (generation, _) = panel.begin(Some(cancel_tx), self.follow);
                notify(&self.events, window);
                self.spawn_captured(Arc::clone(panel), generation, spec, cancel_rx);
                generation
            }
            Task::Stream(spec) => {
                let (cancel_tx, cancel_rx) = oneshot::channel();
                let (generation, size) = panel.begin(Some(cancel_tx), self.follow);
                notify(&self.events, window);
                self.spawn_stream(Arc::clone(panel), generation, spec, size, cancel_rx);
                generation
            }
        };

        debug!(window = %window, generation, kind, "task submitted");
        Some(generation)
    }

    /// Stop the producer of a window that is no longer visible. The
    /// buffer keeps what was already produced.
    pub fn stop(&self, window: Window) {
        if let Some(panel) = self.panel(window) {
            if panel.halt() {
                debug!(window = %window, "producer stopped");
            }
        }
    }

    /// Whether a producer is still running for `window`.
    pub fn is_running(&self, window: Window) -> bool {
        self.panel(window)
            .is_some_and(|p| p.state.lock().cancel.is_some())
    }

    pub fn generation(&self, window: Window) -> Option<u64> {
        self.panel(window).map(|p| p.generation())
    }

    /// Read a window's buffer under its lock.
    pub fn with_buffer<R>(&self, window: Window, f: impl FnOnce(&ViewBuffer) -> R) -> Option<R> {
        self.panel(window).map(|p| f(&p.state.lock().buffer))
    }

    /// Mutate a window's buffer under its lock.
    pub fn with_buffer_mut<R>(
        &self,
        window: Window,
        f: impl FnOnce(&mut ViewBuffer) -> R,
    ) -> Option<R> {
        self.panel(window).map(|p| f(&mut p.state.lock().buffer))
    }

    /// Snapshot of a buffer's visible lines.
    pub fn visible_lines(&self, window: Window) -> Vec<String> {
        self.with_buffer(window, |b| b.visible().to_vec())
            .unwrap_or_default()
    }

    pub fn title(&self, window: Window) -> String {
        self.panel(window)
            .map(|p| p.state.lock().title.clone())
            .unwrap_or_default()
    }

    pub fn set_title(&self, window: Window, title: impl Into<String>) {
        if let Some(panel) = self.panel(window) {
            panel.state.lock().title = title.into();
        }
    }

    /// Record the inner size of a window. Streaming commands started later
    /// get a terminal of this size.
    pub fn set_viewport(&self, window: Window, cols: u16, rows: u16) {
        if let Some(panel) = self.panel(window) {
            let mut state = panel.state.lock();
            state.size = TermSize::new(cols, rows);
            state.buffer.set_view_height(usize::from(rows));
        }
    }

    /// Inner width last recorded for `window`.
    pub fn viewport_width(&self, window: Window) -> u16 {
        self.panel(window)
            .map(|p| p.state.lock().size.cols)
            .unwrap_or(TermSize::default().cols)
    }

    pub fn scroll_down(&self, window: Window, policy: &ScrollPolicy) {
        self.with_buffer_mut(window, |b| b.scroll_down(policy));
    }

    pub fn scroll_up(&self, window: Window, policy: &ScrollPolicy) {
        self.with_buffer_mut(window, |b| b.scroll_up(policy));
    }

    fn spawn_captured(
        &self,
        panel: Arc<Panel>,
        generation: u64,
        spec: CommandSpec,
        cancel_rx: oneshot::Receiver<()>,
    ) {
        let runner = Arc::clone(&self.runner);
        let events = self.events.clone();

        self.runtime.spawn(async move {
            tokio::select! {
                _ = cancel_rx => {
                    // Dropping the run future kills the child
                    debug!(window = %panel.window(), generation, "captured task cancelled");
                }
                result = runner.run_captured(&spec) => {
                    let text = match result {
                        Ok(out) => out,
                        Err(e) => {
                            warn!(command = %spec, error = %e, "captured task failed");
                            e.to_string()
                        }
                    };
                    if panel.replace_content(generation, &text) {
                        notify(&events, panel.window());
                    }
                    panel.finish(generation);
                }
            }
        });
    }

    fn spawn_stream(
        &self,
        panel: Arc<Panel>,
        generation: u64,
        spec: CommandSpec,
        size: TermSize,
        cancel_rx: oneshot::Receiver<()>,
    ) {
        let runner = Arc::clone(&self.runner);
        let events = self.events.clone();
        let runtime = self.runtime.clone();

        self.runtime.spawn_blocking(move || {
            if !panel.is_current(generation) {
                return;
            }

            let StreamHandle { reader, terminator } = match runner.run_streaming(&spec, size) {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(command = %spec, error = %e, "streaming task failed to start");
                    if panel.replace_content(generation, &e.to_string()) {
                        notify(&events, panel.window());
                    }
                    panel.finish(generation);
                    return;
                }
            };

            // Resolves on cancel, or when the sender is dropped after finish
            let watcher = Arc::clone(&terminator);
            runtime.spawn(async move {
                let _ = cancel_rx.await;
                watcher.terminate();
            });

            let complete = pump(reader, &panel, generation, &events);
            let exit_code = terminator.reap();
            debug!(
                window = %panel.window(),
                generation,
                complete,
                exit_code,
                "streaming task ended"
            );
            if panel.finish(generation) {
                notify(&events, panel.window());
            }
        });
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        for panel in self.panels.values() {
            panel.halt();
        }
    }
}

fn notify(events: &mpsc::Sender<PipelineEvent>, window: Window) {
    // The UI may already be gone during shutdown
    let _ = events.send(PipelineEvent::Redraw(window));
}

/// Copy output into the panel until EOF or until the panel moves on.
/// Returns `false` when the producer was superseded.
fn pump(
    mut reader: Box<dyn Read + Send>,
    panel: &Panel,
    generation: u64,
    events: &mpsc::Sender<PipelineEvent>,
) -> bool {
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut pending = Vec::new();

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            // A pty reports EIO once the child side has closed
            Err(_) => break,
        };
        pending.extend_from_slice(&chunk[..n]);

        let mut lines = take_complete_lines(&mut pending);
        lines.extend(take_overlong_line(&mut pending, MAX_PARTIAL_LINE));
        if lines.is_empty() {
            if !panel.is_current(generation) {
                return false;
            }
            continue;
        }
        if !panel.append(generation, lines) {
            return false;
        }
        notify(events, panel.window());
    }

    if !pending.is_empty() {
        let tail = split_lines(&String::from_utf8_lossy(&pending));
        if !panel.append(generation, tail) {
            return false;
        }
        notify(events, panel.window());
    }
    true
}

/// Drain every newline-terminated line from `pending`, leaving a partial
/// trailing line in place.
fn take_complete_lines(pending: &mut Vec<u8>) -> Vec<String> {
    let Some(last_newline) = pending.iter().rposition(|b| *b == b'\n') else {
        return Vec::new();
    };
    let rest = pending.split_off(last_newline + 1);
    let complete = std::mem::replace(pending, rest);
    complete[..complete.len() - 1]
        .split(|b| *b == b'\n')
        .map(|line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            String::from_utf8_lossy(line).into_owned()
        })
        .collect()
}

/// Flush a partial line that reached `limit` bytes, keeping an incomplete
/// UTF-8 sequence at its end for the next read.
fn take_overlong_line(pending: &mut Vec<u8>, limit: usize) -> Option<String> {
    if pending.len() < limit {
        return None;
    }
    let cut = match std::str::from_utf8(pending) {
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        _ => pending.len(),
    };
    let rest = pending.split_off(cut);
    let line = std::mem::replace(pending, rest);
    Some(String::from_utf8_lossy(&line).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_complete_lines() {
        let mut pending = b"one\r\ntwo\nthr".to_vec();
        assert_eq!(take_complete_lines(&mut pending), ["one", "two"]);
        assert_eq!(pending, b"thr");

        pending.extend_from_slice(b"ee\n");
        assert_eq!(take_complete_lines(&mut pending), ["three"]);
        assert!(pending.is_empty());

        pending.extend_from_slice(b"partial");
        assert!(take_complete_lines(&mut pending).is_empty());
        assert_eq!(pending, b"partial");
    }

    #[test]
    fn test_take_complete_lines_keeps_empty_lines() {
        let mut pending = b"a\n\nb\n".to_vec();
        assert_eq!(take_complete_lines(&mut pending), ["a", "", "b"]);
    }

    #[test]
    fn test_take_complete_lines_multibyte_split_across_chunks() {
        let text = "héllo\n".as_bytes();
        let mut pending = text[..2].to_vec();
        assert!(take_complete_lines(&mut pending).is_empty());
        pending.extend_from_slice(&text[2..]);
        assert_eq!(take_complete_lines(&mut pending), ["héllo"]);
    }

    #[test]
    fn test_panel_generation_filters_stale_writes() {
        let panel = Panel::new(Window::Main, true);
        let (first, _) = panel.begin(None, true);
        assert!(panel.append(first, vec!["a".into()]));

        let (second, _) = panel.begin(None, true);
        assert!(second > first);
        assert!(!panel.append(first, vec!["late".into()]));
        assert!(!panel.replace_content(first, "late"));
        // The old content stays until the new producer writes
        assert_eq!(panel.state.lock().buffer.lines(), ["a"]);

        assert!(panel.append(second, vec!["b".into()]));
        assert_eq!(panel.state.lock().buffer.lines(), ["b"]);
    }

    #[test]
    fn test_finish_without_output_clears_buffer() {
        let panel = Panel::new(Window::Main, true);
        let (first, _) = panel.begin(None, true);
        panel.append(first, vec!["old".into()]);

        let (second, _) = panel.begin(None, true);
        assert!(!panel.finish(first));
        assert_eq!(panel.state.lock().buffer.lines(), ["old"]);
        assert!(panel.finish(second));
        assert!(panel.state.lock().buffer.is_empty());
    }

    #[test]
    fn test_overlong_partial_line_is_flushed() {
        let mut pending = b"12345".to_vec();
        assert_eq!(take_overlong_line(&mut pending, 8), None);

        pending.extend_from_slice(b"6789");
        assert_eq!(take_overlong_line(&mut pending, 8).as_deref(), Some("123456789"));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_overlong_line_keeps_split_multibyte_char() {
        let mut pending = b"abcdefg".to_vec();
        pending.extend_from_slice(&"é".as_bytes()[..1]);
        assert_eq!(take_overlong_line(&mut pending, 8).as_deref(), Some("abcdefg"));
        assert_eq!(pending, &"é".as_bytes()[..1]);
    }

    #[test]
    fn test_begin_fires_previous_cancel() {
        let panel = Panel::new(Window::Main, true);
        let (tx, mut rx) = oneshot::channel();
        panel.begin(Some(tx), true);
        panel.begin(None, true);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_halt_keeps_buffer() {
        let panel = Panel::new(Window::Secondary, false);
        let (tx, mut rx) = oneshot::channel();
        let (generation, _) = panel.begin(Some(tx), false);
        panel.append(generation, vec!["kept".into()]);

        assert!(panel.halt());
        assert!(rx.try_recv().is_ok());
        assert!(!panel.halt());
        assert!(!panel.append(generation, vec!["dropped".into()]));
        assert_eq!(panel.state.lock().buffer.lines(), ["kept"]);
    }

    #[test]
    fn test_finish_only_clears_own_generation() {
        let panel = Panel::new(Window::Main, true);
        let (tx1, _rx1) = oneshot::channel();
        let (old, _) = panel.begin(Some(tx1), true);
        let (tx2, _rx2) = oneshot::channel();
        let (new, _) = panel.begin(Some(tx2), true);

        panel.finish(old);
        assert!(panel.state.lock().cancel.is_some());
        panel.finish(new);
        assert!(panel.state.lock().cancel.is_none());
    }
}
