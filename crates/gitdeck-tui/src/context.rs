//! Context stack: which panel has focus and how focus nests.
//!
//! Every context is created once, up front, and keeps its list state for the
//! whole session; navigation only moves keys on and off the stack. The stack
//! always holds exactly one side context. Non-side contexts are layered
//! above it when the user drills in, and removed again on pop.
//!
//! All state sits behind one `RwLock`: layout passes and rendering read it,
//! navigation writes it, and a reader never sees a half-applied push.

use std::fmt;

use gitdeck_exec::ListItem;
use parking_lot::RwLock;
use tracing::debug;

use crate::view::Window;

/// Behavioural class of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// Lives in the side section; side contexts are peers, one at a time
    Side,
    /// A list drilled into from a side context
    SubList,
    /// The main or secondary content panel
    Main,
    /// Drawn over the layout
    Popup,
}

/// Every context the dashboard knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    Status,
    Files,
    Branches,
    Commits,
    Stash,
    SubCommits,
    CommitFiles,
    Main,
    Secondary,
    Menu,
}

/// Static facts about a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextDescriptor {
    pub kind: ContextKind,
    pub window: Window,
    pub title: &'static str,
}

impl ContextKey {
    pub const ALL: [ContextKey; 10] = [
        ContextKey::Status,
        ContextKey::Files,
        ContextKey::Branches,
        ContextKey::Commits,
        ContextKey::Stash,
        ContextKey::SubCommits,
        ContextKey::CommitFiles,
        ContextKey::Main,
        ContextKey::Secondary,
        ContextKey::Menu,
    ];

    /// Side contexts in cycling order.
    pub const SIDE: [ContextKey; 5] = [
        ContextKey::Status,
        ContextKey::Files,
        ContextKey::Branches,
        ContextKey::Commits,
        ContextKey::Stash,
    ];

    /// Dispatch table for kind, window and title.
    pub fn descriptor(&self) -> ContextDescriptor {
        use ContextKind::*;
        let (kind, window, title) = match self {
            ContextKey::Status => (Side, Window::Status, "Status"),
            ContextKey::Files => (Side, Window::Files, "Files"),
            ContextKey::Branches => (Side, Window::Branches, "Local Branches"),
            ContextKey::Commits => (Side, Window::Commits, "Commits"),
            ContextKey::Stash => (Side, Window::Stash, "Stash"),
            ContextKey::SubCommits => (SubList, Window::Branches, "Commits"),
            ContextKey::CommitFiles => (SubList, Window::Commits, "Commit Files"),
            ContextKey::Main => (Main, Window::Main, "Main"),
            ContextKey::Secondary => (Main, Window::Secondary, "Secondary"),
            ContextKey::Menu => (Popup, Window::Menu, "Keybindings"),
        };
        ContextDescriptor {
            kind,
            window,
            title,
        }
    }

    pub fn kind(&self) -> ContextKind {
        self.descriptor().kind
    }

    pub fn window(&self) -> Window {
        self.descriptor().window
    }

    pub fn title(&self) -> &'static str {
        self.descriptor().title
    }

    /// The side context that owns a side window.
    pub fn for_side_window(window: Window) -> Option<ContextKey> {
        Self::SIDE.iter().copied().find(|k| k.window() == window)
    }

    /// Whether this context shows a selectable list.
    pub fn is_list(&self) -> bool {
        matches!(self.kind(), ContextKind::Side | ContextKind::SubList | ContextKind::Popup)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// Items of a list context and the selected row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListState {
    items: Vec<ListItem>,
    selected: usize,
}

impl ListState {
    pub fn items(&self) -> &[ListItem] {
        &self.items
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn selected_item(&self) -> Option<&ListItem> {
        self.items.get(self.selected)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace the items, keeping the selection in range.
    pub fn set_items(&mut self, items: Vec<ListItem>) {
        self.items = items;
        self.selected = self.selected.min(self.items.len().saturating_sub(1));
    }

    /// Select row `idx`, clamped. Returns whether the selection changed.
    pub fn select(&mut self, idx: usize) -> bool {
        let idx = idx.min(self.items.len().saturating_sub(1));
        let changed = idx != self.selected;
        self.selected = idx;
        changed
    }

    /// Move the selection by `delta` rows, clamped to the list.
    pub fn move_by(&mut self, delta: isize) -> bool {
        self.select(self.selected.saturating_add_signed(delta))
    }
}

#[derive(Debug, Clone, Default)]
struct ContextState {
    parent: Option<ContextKey>,
    list: ListState,
}

struct ContextStack {
    stack: Vec<ContextKey>,
    states: [ContextState; ContextKey::ALL.len()],
}

impl ContextStack {
    fn side_slot(&self) -> Option<usize> {
        self.stack
            .iter()
            .rposition(|k| k.kind() == ContextKind::Side)
    }

    fn current_side(&self) -> ContextKey {
        self.side_slot()
            .map(|i| self.stack[i])
            .unwrap_or(ContextKey::Files)
    }

    fn replace_side(&mut self, key: ContextKey) -> Vec<ContextKey> {
        let slot = self.side_slot().unwrap_or(0);
        let mut dropped: Vec<ContextKey> = self.stack.drain(slot..).skip(1).collect();
        dropped.reverse();
        self.stack.push(key);
        debug!(context = ?key, dropped = dropped.len(), "side context replaced");
        dropped
    }

    fn state(&self, key: ContextKey) -> &ContextState {
        &self.states[key.index()]
    }

    fn state_mut(&mut self, key: ContextKey) -> &mut ContextState {
        &mut self.states[key.index()]
    }
}

/// Owner of the context stack and all context states.
pub struct ContextManager {
    inner: RwLock<ContextStack>,
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new(ContextKey::Files)
    }
}

impl ContextManager {
    /// Start with `initial` as the only (side) context. A non-side key
    /// falls back to files.
    pub fn new(initial: ContextKey) -> Self {
        let initial = if initial.kind() == ContextKind::Side {
            initial
        } else {
            ContextKey::Files
        };
        Self {
            inner: RwLock::new(ContextStack {
                stack: vec![initial],
                states: Default::default(),
            }),
        }
    }

    /// Focus `key`, returning to `parent` on pop.
    ///
    /// A side key replaces the side slot instead, since side contexts are
    /// peers. A key already on the stack is moved to the top.
    pub fn push(&self, key: ContextKey, parent: Option<ContextKey>) {
        if key.kind() == ContextKind::Side {
            self.replace_side(key);
            return;
        }

        let mut inner = self.inner.write();
        inner.stack.retain(|k| *k != key);
        inner.stack.push(key);
        inner.state_mut(key).parent = parent;
        debug!(context = ?key, parent = ?parent, depth = inner.stack.len(), "context pushed");
    }

    /// Remove the focused context. The side context is never removed, so
    /// this is a no-op when it is on top. Returns the popped key.
    pub fn pop(&self) -> Option<ContextKey> {
        let mut inner = self.inner.write();
        let top = *inner.stack.last()?;
        if top.kind() == ContextKind::Side {
            return None;
        }
        inner.stack.pop();
        debug!(context = ?top, depth = inner.stack.len(), "context popped");
        Some(top)
    }

    /// Put `key` in the side slot. Contexts that were layered above the old
    /// side context are dropped and returned, top first.
    pub fn replace_side(&self, key: ContextKey) -> Vec<ContextKey> {
        if key.kind() != ContextKind::Side {
            return Vec::new();
        }

        self.inner.write().replace_side(key)
    }

    /// The focused context.
    pub fn current(&self) -> ContextKey {
        let inner = self.inner.read();
        inner.stack.last().copied().unwrap_or(ContextKey::Files)
    }

    /// The side context, found by scanning from the top.
    pub fn current_side(&self) -> ContextKey {
        self.inner.read().current_side()
    }

    /// Window of the side context (`files` by default).
    pub fn current_side_window(&self) -> Window {
        self.current_side().window()
    }

    /// Window of the focused context.
    pub fn current_window(&self) -> Window {
        self.current().window()
    }

    pub fn contains_kind(&self, kind: ContextKind) -> bool {
        self.inner.read().stack.iter().any(|k| k.kind() == kind)
    }

    pub fn contains_window(&self, window: Window) -> bool {
        self.inner.read().stack.iter().any(|k| k.window() == window)
    }

    pub fn contains(&self, key: ContextKey) -> bool {
        self.inner.read().stack.contains(&key)
    }

    /// Copy of the stack, bottom first.
    pub fn stack(&self) -> Vec<ContextKey> {
        self.inner.read().stack.clone()
    }

    pub fn parent_of(&self, key: ContextKey) -> Option<ContextKey> {
        self.inner.read().state(key).parent
    }

    /// The list context shown in a side window: the topmost stacked context
    /// for that window, else the window's own side context.
    pub fn context_for_window(&self, window: Window) -> Option<ContextKey> {
        let inner = self.inner.read();
        inner
            .stack
            .iter()
            .rev()
            .copied()
            .find(|k| k.window() == window && k.is_list())
            .or_else(|| ContextKey::for_side_window(window))
    }

    /// Cycle the side slot forward.
    pub fn next_side(&self) -> ContextKey {
        self.step_side(1)
    }

    /// Cycle the side slot backward.
    pub fn prev_side(&self) -> ContextKey {
        self.step_side(ContextKey::SIDE.len() - 1)
    }

    fn step_side(&self, step: usize) -> ContextKey {
        let mut inner = self.inner.write();
        let key = cycle_side(inner.current_side(), step);
        inner.replace_side(key);
        key
    }

    /// Run `f` against a context's list under the shared lock.
    pub fn with_list<R>(&self, key: ContextKey, f: impl FnOnce(&ListState) -> R) -> R {
        f(&self.inner.read().state(key).list)
    }

    pub fn selected_item(&self, key: ContextKey) -> Option<ListItem> {
        self.with_list(key, |l| l.selected_item().cloned())
    }

    pub fn selected_item_id(&self, key: ContextKey) -> Option<String> {
        self.with_list(key, |l| l.selected_item().map(|i| i.id.clone()))
    }

    pub fn set_items(&self, key: ContextKey, items: Vec<ListItem>) {
        self.inner.write().state_mut(key).list.set_items(items);
    }

    pub fn select(&self, key: ContextKey, idx: usize) -> bool {
        self.inner.write().state_mut(key).list.select(idx)
    }

    pub fn move_selection(&self, key: ContextKey, delta: isize) -> bool {
        self.inner.write().state_mut(key).list.move_by(delta)
    }
}

fn cycle_side(current: ContextKey, step: usize) -> ContextKey {
    let side = ContextKey::SIDE;
    let idx = side.iter().position(|k| *k == current).unwrap_or(0);
    side[(idx + step) % side.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(ids: &[&str]) -> Vec<ListItem> {
        ids.iter().map(|id| ListItem::new(*id, *id)).collect()
    }

    #[test]
    fn test_descriptor_table() {
        assert_eq!(ContextKey::Files.kind(), ContextKind::Side);
        assert_eq!(ContextKey::SubCommits.window(), Window::Branches);
        assert_eq!(ContextKey::CommitFiles.kind(), ContextKind::SubList);
        assert_eq!(ContextKey::Secondary.window(), Window::Secondary);
        assert_eq!(ContextKey::Menu.kind(), ContextKind::Popup);
        assert_eq!(ContextKey::for_side_window(Window::Stash), Some(ContextKey::Stash));
        assert_eq!(ContextKey::for_side_window(Window::Main), None);
        for (i, key) in ContextKey::ALL.iter().enumerate() {
            assert_eq!(key.index(), i);
        }
    }

    #[test]
    fn test_initial_state() {
        let manager = ContextManager::default();
        assert_eq!(manager.stack(), vec![ContextKey::Files]);
        assert_eq!(manager.current_side_window(), Window::Files);

        let manager = ContextManager::new(ContextKey::Menu);
        assert_eq!(manager.current(), ContextKey::Files);
    }

    #[test]
    fn test_pop_last_side_context_is_noop() {
        let manager = ContextManager::default();
        assert_eq!(manager.pop(), None);
        assert_eq!(manager.stack(), vec![ContextKey::Files]);
    }

    #[test]
    fn test_push_then_pop_restores_focus_and_selection() {
        let manager = ContextManager::default();
        manager.set_items(ContextKey::Files, items(&["a", "b", "c"]));
        manager.select(ContextKey::Files, 2);

        manager.push(ContextKey::SubCommits, Some(ContextKey::Files));
        assert_eq!(manager.current(), ContextKey::SubCommits);
        assert_eq!(manager.parent_of(ContextKey::SubCommits), Some(ContextKey::Files));
        manager.set_items(ContextKey::SubCommits, items(&["x"]));

        assert_eq!(manager.pop(), Some(ContextKey::SubCommits));
        assert_eq!(manager.current(), ContextKey::Files);
        assert_eq!(manager.selected_item_id(ContextKey::Files).as_deref(), Some("c"));
    }

    #[test]
    fn test_pushing_side_context_replaces_side_slot() {
        let manager = ContextManager::default();
        manager.push(ContextKey::Commits, Some(ContextKey::Files));
        assert_eq!(manager.stack(), vec![ContextKey::Commits]);
        assert_eq!(manager.pop(), None);
    }

    #[test]
    fn test_replace_side_drops_contexts_above() {
        let manager = ContextManager::new(ContextKey::Branches);
        manager.push(ContextKey::SubCommits, Some(ContextKey::Branches));
        manager.push(ContextKey::CommitFiles, Some(ContextKey::SubCommits));

        let dropped = manager.replace_side(ContextKey::Stash);
        assert_eq!(dropped, vec![ContextKey::CommitFiles, ContextKey::SubCommits]);
        assert_eq!(manager.stack(), vec![ContextKey::Stash]);
        assert!(manager.replace_side(ContextKey::Main).is_empty());
        assert_eq!(manager.stack(), vec![ContextKey::Stash]);
    }

    #[test]
    fn test_concurrent_side_cycling_loses_no_steps() {
        let manager = std::sync::Arc::new(ContextManager::new(ContextKey::Status));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let manager = std::sync::Arc::clone(&manager);
                std::thread::spawn(move || {
                    for _ in 0..251 {
                        manager.next_side();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        // 1004 steps over five side contexts land four past the start
        assert_eq!(manager.current_side(), ContextKey::Stash);
        assert_eq!(manager.stack().len(), 1);
    }

    #[test]
    fn test_repushing_moves_to_top() {
        let manager = ContextManager::default();
        manager.push(ContextKey::Main, Some(ContextKey::Files));
        manager.push(ContextKey::Secondary, Some(ContextKey::Main));
        manager.push(ContextKey::Main, Some(ContextKey::Files));
        assert_eq!(
            manager.stack(),
            vec![ContextKey::Files, ContextKey::Secondary, ContextKey::Main]
        );
    }

    #[test]
    fn test_reads() {
        let manager = ContextManager::new(ContextKey::Branches);
        manager.push(ContextKey::SubCommits, Some(ContextKey::Branches));
        manager.push(ContextKey::Main, Some(ContextKey::SubCommits));

        assert_eq!(manager.current_window(), Window::Main);
        assert_eq!(manager.current_side(), ContextKey::Branches);
        assert!(manager.contains_kind(ContextKind::SubList));
        assert!(!manager.contains_kind(ContextKind::Popup));
        assert!(manager.contains_window(Window::Branches));
        assert!(!manager.contains_window(Window::Stash));
        assert_eq!(
            manager.context_for_window(Window::Branches),
            Some(ContextKey::SubCommits)
        );
        assert_eq!(
            manager.context_for_window(Window::Commits),
            Some(ContextKey::Commits)
        );
    }

    #[test]
    fn test_side_cycling() {
        let manager = ContextManager::new(ContextKey::Stash);
        assert_eq!(manager.next_side(), ContextKey::Status);
        assert_eq!(manager.next_side(), ContextKey::Files);
        assert_eq!(manager.prev_side(), ContextKey::Status);
        assert_eq!(manager.prev_side(), ContextKey::Stash);
        assert_eq!(manager.stack(), vec![ContextKey::Stash]);
    }

    #[test]
    fn test_list_selection_clamps() {
        let mut list = ListState::default();
        assert!(!list.move_by(1));
        assert!(list.selected_item().is_none());

        list.set_items(items(&["a", "b", "c", "d"]));
        assert!(list.move_by(10));
        assert_eq!(list.selected(), 3);
        assert!(list.move_by(-2));
        assert_eq!(list.selected(), 1);
        assert!(list.move_by(-5));
        assert_eq!(list.selected(), 0);

        list.select(3);
        list.set_items(items(&["a"]));
        assert_eq!(list.selected(), 0);
        assert_eq!(list.selected_item().map(|i| i.id.as_str()), Some("a"));
    }
}
