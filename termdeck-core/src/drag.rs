//! Tab drag and drop
//!
//! A drag runs through `DragSession`: `Idle → Dragging → Resolved | Cancelled`.
//! Where the pointer is gets classified by a `HitTest`; on release the target
//! resolves to a `DropAction` which is applied to the layout all-or-nothing.

use serde::Serialize;

use crate::handle::TerminalHandle;
use crate::layout::{LayoutError, PaneId, PaneLayout, Side};

pub const DEFAULT_EDGE_ZONE_RATIO: f64 = 0.25;
pub const DEFAULT_TAB_BAR_HEIGHT: f64 = 1.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.x + self.width && p.y >= self.y && p.y < self.y + self.height
    }
}

/// What the pointer is over
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DropTarget {
    /// Left or right margin of a pane, below its tab strip
    Edge { pane: PaneId, side: Side },
    /// Anywhere else inside a pane
    PaneBody { pane: PaneId },
    /// A tab in some pane's tab strip
    Tab {
        pane: PaneId,
        handle: TerminalHandle,
        index: usize,
    },
}

/// Classifies a pointer position
pub trait HitTest {
    fn hit(&self, point: Point) -> Option<DropTarget>;
}

impl<F> HitTest for F
where
    F: Fn(Point) -> Option<DropTarget>,
{
    fn hit(&self, point: Point) -> Option<DropTarget> {
        self(point)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TabRect {
    pub handle: TerminalHandle,
    pub index: usize,
    pub x: f64,
    pub width: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaneRect {
    pub pane: PaneId,
    pub bounds: Rect,
    pub tabs: Vec<TabRect>,
}

/// Rectangle-based hit test over the on-screen pane row
#[derive(Clone, Debug, PartialEq)]
pub struct PaneGeometry {
    pub panes: Vec<PaneRect>,
    pub edge_zone_ratio: f64,
    pub tab_bar_height: f64,
}

impl Default for PaneGeometry {
    fn default() -> Self {
        Self::new(DEFAULT_EDGE_ZONE_RATIO, DEFAULT_TAB_BAR_HEIGHT)
    }
}

impl PaneGeometry {
    pub fn new(edge_zone_ratio: f64, tab_bar_height: f64) -> Self {
        Self {
            panes: Vec::new(),
            edge_zone_ratio: edge_zone_ratio.clamp(0.0, 0.5),
            tab_bar_height: tab_bar_height.max(0.0),
        }
    }

    /// Lay the panes out left to right inside `area`, widths proportional to
    /// the layout's, tabs packed from each pane's left edge.
    pub fn from_layout<W>(mut self, layout: &PaneLayout, area: Rect, tab_width: W) -> Self
    where
        W: Fn(&TerminalHandle) -> f64,
    {
        let total = layout.total_width();
        let mut x = area.x;
        self.panes.clear();

        for (i, pane) in layout.panes().iter().enumerate() {
            let width = if i + 1 == layout.len() {
                area.x + area.width - x
            } else if total > 0.0 {
                area.width * pane.width / total
            } else {
                area.width / layout.len() as f64
            };

            let mut tab_x = x;
            let tabs = pane
                .terminals
                .iter()
                .enumerate()
                .map(|(index, handle)| {
                    let w = tab_width(handle);
                    let tab = TabRect {
                        handle: handle.clone(),
                        index,
                        x: tab_x,
                        width: w,
                    };
                    tab_x += w;
                    tab
                })
                .collect();

            self.panes.push(PaneRect {
                pane: pane.id,
                bounds: Rect::new(x, area.y, width, area.height),
                tabs,
            });
            x += width;
        }
        self
    }

    pub fn pane_rect(&self, pane: PaneId) -> Option<&PaneRect> {
        self.panes.iter().find(|r| r.pane == pane)
    }

    /// Tab under the pointer, regardless of drag state
    pub fn tab_at(&self, point: Point) -> Option<(PaneId, TerminalHandle)> {
        match self.hit(point)? {
            DropTarget::Tab { pane, handle, .. } => Some((pane, handle)),
            _ => None,
        }
    }
}

impl HitTest for PaneGeometry {
    fn hit(&self, point: Point) -> Option<DropTarget> {
        let rect = self.panes.iter().find(|r| r.bounds.contains(point))?;
        let bounds = rect.bounds;

        if point.y < bounds.y + self.tab_bar_height {
            let tab = rect
                .tabs
                .iter()
                .find(|t| point.x >= t.x && point.x < t.x + t.width);
            return Some(match tab {
                Some(tab) => DropTarget::Tab {
                    pane: rect.pane,
                    handle: tab.handle.clone(),
                    index: tab.index,
                },
                None => DropTarget::PaneBody { pane: rect.pane },
            });
        }

        let edge = bounds.width * self.edge_zone_ratio;
        let rel_x = point.x - bounds.x;
        if rel_x < edge {
            Some(DropTarget::Edge {
                pane: rect.pane,
                side: Side::Left,
            })
        } else if rel_x >= bounds.width - edge {
            Some(DropTarget::Edge {
                pane: rect.pane,
                side: Side::Right,
            })
        } else {
            Some(DropTarget::PaneBody { pane: rect.pane })
        }
    }
}

/// Layout change a completed drop performs
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DropAction {
    /// Open a pane beside `pane` and move the tab into it
    SplitAndMove {
        handle: TerminalHandle,
        pane: PaneId,
        side: Side,
    },
    /// Append the tab to another pane
    Move { handle: TerminalHandle, pane: PaneId },
    /// Move the tab to another pane at a given position
    MoveAndReorder {
        handle: TerminalHandle,
        pane: PaneId,
        index: usize,
    },
    /// Reposition the tab inside its own pane
    Reorder {
        handle: TerminalHandle,
        pane: PaneId,
        index: usize,
    },
}

impl DropAction {
    /// Decide what dropping `handle` (dragged out of `source`) onto `target`
    /// means. `None` means the drop does nothing.
    pub fn resolve(
        layout: &PaneLayout,
        handle: &TerminalHandle,
        source: PaneId,
        target: &DropTarget,
    ) -> Option<DropAction> {
        if layout.pane_of(handle) != Some(source) {
            return None;
        }

        match target {
            DropTarget::Edge { pane, side } => {
                layout.pane(*pane)?;
                Some(DropAction::SplitAndMove {
                    handle: handle.clone(),
                    pane: *pane,
                    side: *side,
                })
            }
            DropTarget::PaneBody { pane } if *pane != source => {
                layout.pane(*pane)?;
                Some(DropAction::Move {
                    handle: handle.clone(),
                    pane: *pane,
                })
            }
            DropTarget::PaneBody { .. } => None,
            DropTarget::Tab {
                pane,
                handle: over,
                index,
            } => {
                let index = layout.pane(*pane)?.index_of(over).unwrap_or(*index);
                if *pane != source {
                    Some(DropAction::MoveAndReorder {
                        handle: handle.clone(),
                        pane: *pane,
                        index,
                    })
                } else if over != handle {
                    Some(DropAction::Reorder {
                        handle: handle.clone(),
                        pane: *pane,
                        index,
                    })
                } else {
                    None
                }
            }
        }
    }

    /// Apply to `layout`. On error the layout is restored to how it was.
    pub fn apply(&self, layout: &mut PaneLayout) -> Result<(), LayoutError> {
        let before = layout.clone();
        let result = self.apply_steps(layout);
        if let Err(e) = &result {
            tracing::debug!(error = %e, action = ?self, "drop failed, rolling back");
            *layout = before;
        }
        result
    }

    fn apply_steps(&self, layout: &mut PaneLayout) -> Result<(), LayoutError> {
        match self {
            DropAction::SplitAndMove { handle, pane, side } => {
                let created = layout.split(*side, *pane)?;
                layout.move_terminal(handle, created)
            }
            DropAction::Move { handle, pane } => layout.move_terminal(handle, *pane),
            DropAction::MoveAndReorder {
                handle,
                pane,
                index,
            } => {
                layout.move_terminal(handle, *pane)?;
                layout.reorder(*pane, handle, *index).map(|_| ())
            }
            DropAction::Reorder {
                handle,
                pane,
                index,
            } => layout.reorder(*pane, handle, *index).map(|_| ()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        handle: TerminalHandle,
        source: PaneId,
        over: Option<DropTarget>,
    },
    Resolved(DropAction),
    Cancelled,
}

/// One pointer gesture at a time
#[derive(Clone, Debug, Default)]
pub struct DragSession {
    state: DragState,
}

impl DragSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// Current target while dragging
    pub fn hovered(&self) -> Option<&DropTarget> {
        match &self.state {
            DragState::Dragging { over, .. } => over.as_ref(),
            _ => None,
        }
    }

    /// Start dragging a tab; any gesture still in progress is dropped
    pub fn begin(&mut self, handle: TerminalHandle, source: PaneId) {
        tracing::debug!(%handle, %source, "drag started");
        self.state = DragState::Dragging {
            handle,
            source,
            over: None,
        };
    }

    pub fn update(&mut self, target: Option<DropTarget>) {
        if let DragState::Dragging { over, .. } = &mut self.state {
            *over = target;
        }
    }

    pub fn update_at(&mut self, hit_test: &dyn HitTest, point: Point) {
        if self.is_dragging() {
            self.update(hit_test.hit(point));
        }
    }

    pub fn cancel(&mut self) {
        if self.is_dragging() {
            tracing::debug!("drag cancelled");
            self.state = DragState::Cancelled;
        }
    }

    /// Finish the gesture. Returns the action to apply, or `None` when the
    /// drop was outside any target or meaningless; that cancels silently.
    pub fn release(&mut self, layout: &PaneLayout) -> Option<DropAction> {
        if !self.is_dragging() {
            return None;
        }
        let DragState::Dragging {
            handle,
            source,
            over,
        } = std::mem::take(&mut self.state)
        else {
            return None;
        };

        let action = over
            .as_ref()
            .and_then(|target| DropAction::resolve(layout, &handle, source, target));
        match &action {
            Some(action) => {
                tracing::debug!(?action, "drop resolved");
                self.state = DragState::Resolved(action.clone());
            }
            None => {
                tracing::debug!(%handle, target = ?over, "drop ignored");
                self.state = DragState::Cancelled;
            }
        }
        action
    }

    /// Back to idle after a resolved or cancelled gesture
    pub fn reset(&mut self) {
        self.state = DragState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn h(id: &str) -> TerminalHandle {
        TerminalHandle::service(id)
    }

    /// root: [a, b]   right: [c]
    fn two_panes() -> (PaneLayout, PaneId) {
        let mut layout = PaneLayout::default();
        layout.move_terminal(&h("a"), PaneId::ROOT).unwrap();
        layout.move_terminal(&h("b"), PaneId::ROOT).unwrap();
        let right = layout.split(Side::Right, PaneId::ROOT).unwrap();
        layout.move_terminal(&h("c"), right).unwrap();
        (layout, right)
    }

    fn geometry(layout: &PaneLayout) -> PaneGeometry {
        PaneGeometry::default().from_layout(layout, Rect::new(0.0, 0.0, 100.0, 20.0), |_| 10.0)
    }

    #[test]
    fn test_hit_test_zones() {
        let (layout, right) = two_panes();
        let geo = geometry(&layout);

        // tab strip
        assert_eq!(
            geo.hit(Point::new(12.0, 0.0)),
            Some(DropTarget::Tab {
                pane: PaneId::ROOT,
                handle: h("b"),
                index: 1
            })
        );
        // tab strip past the last tab
        assert_eq!(
            geo.hit(Point::new(40.0, 0.5)),
            Some(DropTarget::PaneBody { pane: PaneId::ROOT })
        );
        // body edges and centre
        assert_eq!(
            geo.hit(Point::new(2.0, 5.0)),
            Some(DropTarget::Edge {
                pane: PaneId::ROOT,
                side: Side::Left
            })
        );
        assert_eq!(
            geo.hit(Point::new(45.0, 5.0)),
            Some(DropTarget::Edge {
                pane: PaneId::ROOT,
                side: Side::Right
            })
        );
        assert_eq!(geo.hit(Point::new(75.0, 5.0)), Some(DropTarget::PaneBody { pane: right }));
        assert_eq!(geo.hit(Point::new(75.0, 25.0)), None);
    }

    #[test]
    fn test_tab_strip_beats_edge_zone() {
        let (layout, _) = two_panes();
        let geo = geometry(&layout);
        // x=2 is inside the left edge band but y=0 is the tab strip
        assert!(matches!(geo.hit(Point::new(2.0, 0.0)), Some(DropTarget::Tab { .. })));
    }

    #[test]
    fn test_edge_drop_splits_and_moves() {
        let (mut layout, right) = two_panes();
        let mut drag = DragSession::new();
        drag.begin(h("a"), PaneId::ROOT);
        drag.update(Some(DropTarget::Edge {
            pane: right,
            side: Side::Right,
        }));

        let action = drag.release(&layout).unwrap();
        action.apply(&mut layout).unwrap();

        assert_eq!(layout.len(), 3);
        let last = &layout.panes()[2];
        assert_eq!(last.terminals, vec![h("a")]);
        assert_eq!(layout.focused(), last.id);
        assert!(matches!(drag.state(), DragState::Resolved(_)));
    }

    #[test]
    fn test_body_drop_on_other_pane_moves() {
        let (mut layout, right) = two_panes();
        let action = DropAction::resolve(&layout, &h("b"), PaneId::ROOT, &DropTarget::PaneBody { pane: right });
        assert_eq!(
            action,
            Some(DropAction::Move {
                handle: h("b"),
                pane: right
            })
        );
        action.unwrap().apply(&mut layout).unwrap();
        assert_eq!(layout.pane(right).unwrap().terminals, vec![h("c"), h("b")]);
        assert_eq!(layout.pane(right).unwrap().active, Some(h("b")));
    }

    #[test]
    fn test_body_drop_on_own_pane_is_noop() {
        let (layout, _) = two_panes();
        let target = DropTarget::PaneBody { pane: PaneId::ROOT };
        assert_eq!(DropAction::resolve(&layout, &h("a"), PaneId::ROOT, &target), None);
    }

    #[test]
    fn test_tab_drop_in_other_pane_moves_to_index() {
        let (mut layout, right) = two_panes();
        let target = DropTarget::Tab {
            pane: right,
            handle: h("c"),
            index: 0,
        };
        let action = DropAction::resolve(&layout, &h("a"), PaneId::ROOT, &target).unwrap();
        action.apply(&mut layout).unwrap();
        assert_eq!(layout.pane(right).unwrap().terminals, vec![h("a"), h("c")]);
        assert_eq!(layout.pane(PaneId::ROOT).unwrap().terminals, vec![h("b")]);
    }

    #[test]
    fn test_tab_drop_in_same_pane_reorders() {
        let (mut layout, _) = two_panes();
        let target = DropTarget::Tab {
            pane: PaneId::ROOT,
            handle: h("a"),
            index: 0,
        };
        let action = DropAction::resolve(&layout, &h("b"), PaneId::ROOT, &target).unwrap();
        assert!(matches!(action, DropAction::Reorder { index: 0, .. }));
        action.apply(&mut layout).unwrap();
        assert_eq!(layout.pane(PaneId::ROOT).unwrap().terminals, vec![h("b"), h("a")]);
    }

    #[test]
    fn test_drop_on_itself_or_nowhere_cancels() {
        let (layout, _) = two_panes();
        let mut drag = DragSession::new();
        drag.begin(h("a"), PaneId::ROOT);
        drag.update(Some(DropTarget::Tab {
            pane: PaneId::ROOT,
            handle: h("a"),
            index: 0,
        }));
        assert_eq!(drag.release(&layout), None);
        assert_eq!(drag.state(), &DragState::Cancelled);

        drag.begin(h("a"), PaneId::ROOT);
        drag.update(None);
        assert_eq!(drag.release(&layout), None);
    }

    #[test]
    fn test_stale_source_or_unknown_handle_cancels() {
        let (layout, right) = two_panes();
        let body = DropTarget::PaneBody { pane: right };
        assert_eq!(DropAction::resolve(&layout, &h("a"), right, &body), None);

        let edge = DropTarget::Edge {
            pane: right,
            side: Side::Left,
        };
        assert_eq!(DropAction::resolve(&layout, &h("zzz"), right, &edge), None);
    }

    #[test]
    fn test_cancel_leaves_layout_untouched() {
        let (layout, right) = two_panes();
        let before = layout.clone();
        let mut drag = DragSession::new();
        drag.begin(h("a"), PaneId::ROOT);
        drag.update(Some(DropTarget::PaneBody { pane: right }));
        drag.cancel();
        assert_eq!(drag.release(&layout), None);
        assert_eq!(layout, before);
        assert_eq!(drag.state(), &DragState::Cancelled);
        drag.reset();
        assert_eq!(drag.state(), &DragState::Idle);
    }

    #[test]
    fn test_failed_apply_rolls_back() {
        let (mut layout, right) = two_panes();
        layout.remove(right).unwrap();
        let before = layout.clone();

        let stale = DropAction::MoveAndReorder {
            handle: h("a"),
            pane: right,
            index: 0,
        };
        assert_eq!(stale.apply(&mut layout), Err(LayoutError::UnknownPane(right)));
        assert_eq!(layout, before);
    }

    #[test]
    fn test_closure_hit_test() {
        let (layout, right) = two_panes();
        let always_right = move |_: Point| Some(DropTarget::PaneBody { pane: right });
        let mut drag = DragSession::new();
        drag.begin(h("a"), PaneId::ROOT);
        drag.update_at(&always_right, Point::new(0.0, 0.0));
        assert_eq!(drag.hovered(), Some(&DropTarget::PaneBody { pane: right }));
        assert!(drag.release(&layout).is_some());
    }
}
