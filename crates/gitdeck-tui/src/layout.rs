//! Box layout engine.
//!
//! A layout is a tree of [`LayoutBox`]es. Each box splits its area among its
//! children along its [`Direction`]: fixed-size children are served first,
//! the remainder is shared by weight. Leaves name a window and record the
//! rectangle they end up with.
//!
//! ```
//! use gitdeck_tui::layout::{arrange, LayoutBox};
//! use ratatui::layout::Rect;
//!
//! let root = LayoutBox::row(vec![
//!     LayoutBox::window("left").weight(1),
//!     LayoutBox::window("right").weight(3),
//! ]);
//! let rects = arrange(&root, Rect::new(0, 0, 40, 10));
//! assert_eq!(rects["left"], Rect::new(0, 0, 10, 10));
//! assert_eq!(rects["right"], Rect::new(10, 0, 30, 10));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use ratatui::layout::Rect;

use crate::view::Window;

/// Axis along which a box splits its area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Children are placed left to right
    #[default]
    Row,
    /// Children are stacked top to bottom
    Column,
}

/// Produces children from the width and height a box was allotted.
///
/// Must be pure: the engine may call it on every layout pass.
pub type ChildrenFn<W> = Arc<dyn Fn(u16, u16) -> Vec<LayoutBox<W>> + Send + Sync>;

/// What a box contains.
pub enum BoxContent<W> {
    /// A leaf naming the window that receives this box's rectangle
    Window(W),
    /// Fixed children
    Children(Vec<LayoutBox<W>>),
    /// Children computed from the allotted size
    Conditional(ChildrenFn<W>),
}

/// A node in the layout tree.
pub struct LayoutBox<W = Window> {
    pub direction: Direction,
    /// Share of the space left after fixed-size siblings
    pub weight: u16,
    /// Fixed extent along the parent's axis; takes precedence over `weight`
    pub size: Option<u16>,
    pub content: BoxContent<W>,
}

impl<W> LayoutBox<W> {
    fn with_content(direction: Direction, content: BoxContent<W>) -> Self {
        Self {
            direction,
            weight: 0,
            size: None,
            content,
        }
    }

    /// A leaf for `window`.
    pub fn window(window: W) -> Self {
        Self::with_content(Direction::default(), BoxContent::Window(window))
    }

    /// A box placing `children` left to right.
    pub fn row(children: Vec<LayoutBox<W>>) -> Self {
        Self::with_content(Direction::Row, BoxContent::Children(children))
    }

    /// A box stacking `children` top to bottom.
    pub fn column(children: Vec<LayoutBox<W>>) -> Self {
        Self::with_content(Direction::Column, BoxContent::Children(children))
    }

    /// A box whose children depend on the space it receives.
    pub fn conditional<F>(direction: Direction, children: F) -> Self
    where
        F: Fn(u16, u16) -> Vec<LayoutBox<W>> + Send + Sync + 'static,
    {
        Self::with_content(direction, BoxContent::Conditional(Arc::new(children)))
    }

    pub fn weight(mut self, weight: u16) -> Self {
        self.weight = weight;
        self
    }

    pub fn size(mut self, size: u16) -> Self {
        self.size = Some(size);
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

impl<W: fmt::Debug> fmt::Debug for LayoutBox<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("LayoutBox");
        s.field("direction", &self.direction)
            .field("weight", &self.weight)
            .field("size", &self.size);
        match &self.content {
            BoxContent::Window(w) => s.field("window", w),
            BoxContent::Children(c) => s.field("children", c),
            BoxContent::Conditional(_) => s.field("children", &"<conditional>"),
        };
        s.finish()
    }
}

/// Sizing of one child along the split axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub size: Option<u16>,
    pub weight: u16,
}

/// Split `total` among children.
///
/// Fixed sizes are granted in order, each clamped to what is left. The rest
/// is divided by weight with floor rounding; the last weighted child takes
/// the rounding remainder. Without any weighted child the last child takes
/// whatever is unassigned, so the result always sums to `total` when there
/// is at least one child.
pub fn distribute(extents: &[Extent], total: u16) -> Vec<u16> {
    let mut out = vec![0u16; extents.len()];
    let mut remaining = total;

    for (slot, extent) in out.iter_mut().zip(extents) {
        if let Some(size) = extent.size {
            *slot = size.min(remaining);
            remaining -= *slot;
        }
    }

    let weighted = || {
        extents
            .iter()
            .enumerate()
            .filter(|(_, e)| e.size.is_none() && e.weight > 0)
    };
    let total_weight: u32 = weighted().map(|(_, e)| u32::from(e.weight)).sum();

    if total_weight > 0 {
        let mut assigned = 0u16;
        let mut last = 0;
        for (i, e) in weighted() {
            let share = u32::from(remaining) * u32::from(e.weight) / total_weight;
            // share <= remaining, so it fits
            out[i] = share as u16;
            assigned += out[i];
            last = i;
        }
        out[last] += remaining - assigned;
    } else if let Some(last) = out.last_mut() {
        *last += remaining;
    }

    out
}

/// Compute the rectangle of every window in the tree rooted at `root`.
pub fn arrange<W: Copy + Eq + Hash>(root: &LayoutBox<W>, area: Rect) -> HashMap<W, Rect> {
    let mut out = HashMap::new();
    arrange_into(root, area, &mut out);
    out
}

fn arrange_into<W: Copy + Eq + Hash>(node: &LayoutBox<W>, area: Rect, out: &mut HashMap<W, Rect>) {
    match &node.content {
        BoxContent::Window(window) => {
            out.insert(*window, area);
        }
        BoxContent::Children(children) => split(node.direction, children, area, out),
        BoxContent::Conditional(produce) => {
            let children = produce(area.width, area.height);
            split(node.direction, &children, area, out);
        }
    }
}

fn split<W: Copy + Eq + Hash>(
    direction: Direction,
    children: &[LayoutBox<W>],
    area: Rect,
    out: &mut HashMap<W, Rect>,
) {
    let total = match direction {
        Direction::Row => area.width,
        Direction::Column => area.height,
    };
    let extents: Vec<Extent> = children
        .iter()
        .map(|c| Extent {
            size: c.size,
            weight: c.weight,
        })
        .collect();

    let mut offset = 0u16;
    for (child, len) in children.iter().zip(distribute(&extents, total)) {
        let rect = match direction {
            Direction::Row => Rect::new(area.x.saturating_add(offset), area.y, len, area.height),
            Direction::Column => Rect::new(area.x, area.y.saturating_add(offset), area.width, len),
        };
        arrange_into(child, rect, out);
        offset += len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(size: u16) -> Extent {
        Extent {
            size: Some(size),
            weight: 0,
        }
    }

    fn weighted(weight: u16) -> Extent {
        Extent { size: None, weight }
    }

    #[test]
    fn test_weights_one_to_three() {
        let root = LayoutBox::row(vec![
            LayoutBox::window(1).weight(1),
            LayoutBox::window(2).weight(3),
        ]);
        let rects = arrange(&root, Rect::new(0, 0, 40, 10));
        assert_eq!(rects[&1], Rect::new(0, 0, 10, 10));
        assert_eq!(rects[&2], Rect::new(10, 0, 30, 10));
    }

    #[test]
    fn test_rounding_remainder_goes_to_last_weighted_child() {
        assert_eq!(distribute(&[weighted(1), weighted(1), weighted(1)], 10), [3, 3, 4]);
        // A trailing fixed child does not receive the remainder
        assert_eq!(
            distribute(&[weighted(1), weighted(1), fixed(2)], 11),
            [4, 5, 2]
        );
    }

    #[test]
    fn test_fixed_sizes_are_subtracted_first() {
        assert_eq!(distribute(&[fixed(3), weighted(1), weighted(1)], 23), [3, 10, 10]);
    }

    #[test]
    fn test_fixed_sizes_clamp_to_parent() {
        assert_eq!(distribute(&[fixed(8), fixed(8), weighted(1)], 10), [8, 2, 0]);
    }

    #[test]
    fn test_size_takes_precedence_over_weight() {
        let extents = [Extent { size: Some(2), weight: 5 }, weighted(1)];
        assert_eq!(distribute(&extents, 10), [2, 8]);
    }

    #[test]
    fn test_unweighted_leftover_goes_to_last_child() {
        assert_eq!(distribute(&[fixed(1), weighted(0), weighted(0)], 10), [1, 0, 9]);
        assert_eq!(distribute(&[], 10), Vec::<u16>::new());
    }

    #[test]
    fn test_zero_extent_boxes_keep_their_slot() {
        let root = LayoutBox::column(vec![
            LayoutBox::window('a').size(0),
            LayoutBox::window('b').weight(1),
            LayoutBox::window('c').size(0),
        ]);
        let rects = arrange(&root, Rect::new(0, 0, 20, 12));
        assert_eq!(rects.len(), 3);
        assert_eq!(rects[&'a'], Rect::new(0, 0, 20, 0));
        assert_eq!(rects[&'b'], Rect::new(0, 0, 20, 12));
        assert_eq!(rects[&'c'], Rect::new(0, 12, 20, 0));
    }

    #[test]
    fn test_nested_boxes_and_origin() {
        let root = LayoutBox::column(vec![
            LayoutBox::row(vec![
                LayoutBox::window("side").weight(1),
                LayoutBox::window("main").weight(2),
            ])
            .weight(1),
            LayoutBox::window("info").size(1),
        ]);
        let rects = arrange(&root, Rect::new(5, 2, 30, 11));
        assert_eq!(rects["side"], Rect::new(5, 2, 10, 10));
        assert_eq!(rects["main"], Rect::new(15, 2, 20, 10));
        assert_eq!(rects["info"], Rect::new(5, 12, 30, 1));
    }

    #[test]
    fn test_conditional_children_see_allotted_size() {
        let root = LayoutBox::row(vec![
            LayoutBox::window("fixed").size(10),
            LayoutBox::conditional(Direction::Column, |width, height| {
                if height >= 10 {
                    vec![
                        LayoutBox::window("top").weight(1),
                        LayoutBox::window("bottom").weight(1),
                    ]
                } else {
                    assert_eq!(width, 30);
                    vec![LayoutBox::window("top").weight(1)]
                }
            })
            .weight(1),
        ]);

        let tall = arrange(&root, Rect::new(0, 0, 40, 20));
        assert_eq!(tall["top"], Rect::new(10, 0, 30, 10));
        assert_eq!(tall["bottom"], Rect::new(10, 10, 30, 10));

        let short = arrange(&root, Rect::new(0, 0, 40, 6));
        assert_eq!(short["top"], Rect::new(10, 0, 30, 6));
        assert!(!short.contains_key("bottom"));
    }

    #[test]
    fn test_zero_area() {
        let root = LayoutBox::row(vec![
            LayoutBox::window(0).weight(1),
            LayoutBox::window(1).size(4),
        ]);
        let rects = arrange(&root, Rect::new(0, 0, 0, 0));
        assert_eq!(rects[&0], Rect::new(0, 0, 0, 0));
        assert_eq!(rects[&1], Rect::new(0, 0, 0, 0));
    }
}
