//! Pane layout
//!
//! An ordered row of panes. Each pane holds terminal tabs in order, an active
//! tab and a relative width. A handle lives in at most one pane; panes left
//! empty by a move are collapsed while more than one pane exists.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::handle::TerminalHandle;

pub const DEFAULT_MIN_PANE_WIDTH: f64 = 15.0;
pub const TOTAL_WIDTH: f64 = 100.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PaneId(u64);

impl PaneId {
    /// Id of the pane every layout starts with
    pub const ROOT: PaneId = PaneId(0);

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pane-{}", self.0)
    }
}

/// Side of a reference pane
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Pane {
    pub id: PaneId,
    pub terminals: Vec<TerminalHandle>,
    pub active: Option<TerminalHandle>,
    pub width: f64,
}

impl Pane {
    fn new(id: PaneId, width: f64) -> Self {
        Self {
            id,
            terminals: Vec::new(),
            active: None,
            width,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terminals.is_empty()
    }

    pub fn contains(&self, handle: &TerminalHandle) -> bool {
        self.terminals.contains(handle)
    }

    pub fn index_of(&self, handle: &TerminalHandle) -> Option<usize> {
        self.terminals.iter().position(|h| h == handle)
    }

    /// Take a tab out, passing the active selection to its neighbour
    fn take(&mut self, handle: &TerminalHandle) -> bool {
        let Some(index) = self.index_of(handle) else {
            return false;
        };
        self.terminals.remove(index);
        if self.active.as_ref() == Some(handle) {
            self.active = self
                .terminals
                .get(index)
                .or_else(|| self.terminals.last())
                .cloned();
        }
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("unknown pane {0}")]
    UnknownPane(PaneId),
    #[error("expected {expected} pane widths, got {actual}")]
    WidthCount { expected: usize, actual: usize },
}

/// A split that can still be undone exactly by removing the pane it created
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UndoableSplit {
    pub reference: PaneId,
    pub created: PaneId,
    pub reference_width: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PaneLayout {
    panes: Vec<Pane>,
    focused: PaneId,
    next_id: u64,
    min_width: f64,
    last_split: Option<UndoableSplit>,
}

impl Default for PaneLayout {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PANE_WIDTH)
    }
}

impl PaneLayout {
    pub fn new(min_width: f64) -> Self {
        Self {
            panes: vec![Pane::new(PaneId::ROOT, TOTAL_WIDTH)],
            focused: PaneId::ROOT,
            next_id: 1,
            min_width: min_width.clamp(0.0, TOTAL_WIDTH),
            last_split: None,
        }
    }

    pub fn panes(&self) -> &[Pane] {
        &self.panes
    }

    pub fn len(&self) -> usize {
        self.panes.len()
    }

    /// Never true: a layout always has at least one pane
    pub fn is_empty(&self) -> bool {
        self.panes.is_empty()
    }

    pub fn min_width(&self) -> f64 {
        self.min_width
    }

    pub fn pane(&self, id: PaneId) -> Option<&Pane> {
        self.panes.iter().find(|p| p.id == id)
    }

    pub fn index_of(&self, id: PaneId) -> Option<usize> {
        self.panes.iter().position(|p| p.id == id)
    }

    pub fn focused(&self) -> PaneId {
        self.focused
    }

    pub fn focused_pane(&self) -> &Pane {
        self.pane(self.focused).unwrap_or(&self.panes[0])
    }

    pub fn pane_of(&self, handle: &TerminalHandle) -> Option<PaneId> {
        self.panes.iter().find(|p| p.contains(handle)).map(|p| p.id)
    }

    pub fn contains(&self, handle: &TerminalHandle) -> bool {
        self.pane_of(handle).is_some()
    }

    /// Every placed handle, pane by pane in tab order
    pub fn handles(&self) -> impl Iterator<Item = &TerminalHandle> {
        self.panes.iter().flat_map(|p| p.terminals.iter())
    }

    pub fn widths(&self) -> Vec<f64> {
        self.panes.iter().map(|p| p.width).collect()
    }

    pub fn total_width(&self) -> f64 {
        self.panes.iter().map(|p| p.width).sum()
    }

    pub fn last_split(&self) -> Option<UndoableSplit> {
        self.last_split
    }

    fn require(&self, id: PaneId) -> Result<usize, LayoutError> {
        self.index_of(id).ok_or(LayoutError::UnknownPane(id))
    }

    fn alloc_id(&mut self) -> PaneId {
        let id = PaneId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn focus(&mut self, id: PaneId) -> Result<(), LayoutError> {
        self.require(id)?;
        self.focused = id;
        Ok(())
    }

    /// Cycle focus through panes; `forward` moves right
    pub fn focus_next(&mut self, forward: bool) {
        let len = self.panes.len();
        let idx = self.index_of(self.focused).unwrap_or(0);
        let next = if forward { (idx + 1) % len } else { (idx + len - 1) % len };
        self.focused = self.panes[next].id;
    }

    /// Make `handle` the active tab of `pane`. Returns false if it is not there.
    pub fn select(&mut self, pane: PaneId, handle: &TerminalHandle) -> Result<bool, LayoutError> {
        let idx = self.require(pane)?;
        let pane = &mut self.panes[idx];
        if !pane.contains(handle) {
            return Ok(false);
        }
        pane.active = Some(handle.clone());
        Ok(true)
    }

    /// Open an empty pane beside `reference`, taking half its width. The
    /// minimum width only binds `resize`; halving a narrow pane may leave
    /// both halves below it.
    pub fn split(&mut self, side: Side, reference: PaneId) -> Result<PaneId, LayoutError> {
        let idx = self.require(reference)?;
        let id = self.alloc_id();

        let reference_width = self.panes[idx].width;
        let half = reference_width / 2.0;
        self.panes[idx].width = half;

        let at = match side {
            Side::Left => idx,
            Side::Right => idx + 1,
        };
        self.panes.insert(at, Pane::new(id, half));
        self.focused = id;
        self.last_split = Some(UndoableSplit {
            reference,
            created: id,
            reference_width,
        });

        tracing::debug!(%reference, new = %id, ?side, "split pane");
        Ok(id)
    }

    /// Remove a pane, handing its tabs to a neighbour. The last pane is never
    /// removed; returns whether anything changed.
    pub fn remove(&mut self, id: PaneId) -> Result<bool, LayoutError> {
        let idx = self.require(id)?;
        if self.panes.len() == 1 {
            return Ok(false);
        }

        let undo = self.last_split.take().filter(|s| s.created == id);
        if let Some(split) = undo {
            if self.panes[idx].is_empty() {
                if let Some(ref_idx) = self.index_of(split.reference) {
                    self.panes[ref_idx].width = split.reference_width;
                    self.panes.remove(idx);
                    if self.focused == id {
                        self.focused = split.reference;
                    }
                    tracing::debug!(pane = %id, "undid split");
                    return Ok(true);
                }
            }
        }

        self.remove_at(idx);
        Ok(true)
    }

    fn remove_at(&mut self, idx: usize) {
        let removed = self.panes.remove(idx);
        let target_idx = idx.saturating_sub(1);

        let target = &mut self.panes[target_idx];
        for handle in removed.terminals {
            if !target.contains(&handle) {
                target.terminals.push(handle);
            }
        }
        if target.active.is_none() {
            target.active = removed.active;
        }

        let survivors: f64 = self.panes.iter().map(|p| p.width).sum();
        if survivors > 0.0 {
            for pane in &mut self.panes {
                pane.width += removed.width * pane.width / survivors;
            }
        }
        self.renormalize();

        if self.focused == removed.id {
            let focus_idx = idx.min(self.panes.len() - 1);
            self.focused = self.panes[focus_idx].id;
        }

        tracing::debug!(pane = %removed.id, into = %self.panes[target_idx].id, "removed pane");
    }

    fn renormalize(&mut self) {
        let total = self.total_width();
        if total <= 0.0 || !total.is_finite() {
            let even = TOTAL_WIDTH / self.panes.len() as f64;
            for pane in &mut self.panes {
                pane.width = even;
            }
            return;
        }
        let scale = TOTAL_WIDTH / total;
        for pane in &mut self.panes {
            pane.width *= scale;
        }
    }

    /// Collapse `id` if it is empty and not the last pane
    fn collapse_if_empty(&mut self, id: PaneId) {
        if self.panes.len() > 1 {
            if let Some(idx) = self.index_of(id) {
                if self.panes[idx].is_empty() {
                    self.remove_at(idx);
                }
            }
        }
    }

    /// Take `handle` out of whichever pane holds it. Returns that pane.
    pub fn detach(&mut self, handle: &TerminalHandle) -> Option<PaneId> {
        let source = self.pane_of(handle)?;
        self.last_split = None;
        if let Some(idx) = self.index_of(source) {
            self.panes[idx].take(handle);
        }
        self.collapse_if_empty(source);
        Some(source)
    }

    /// Move `handle` to the end of `target`'s tabs and make it active there
    pub fn move_terminal(
        &mut self,
        handle: &TerminalHandle,
        target: PaneId,
    ) -> Result<(), LayoutError> {
        self.require(target)?;
        self.last_split = None;

        let source = self.pane_of(handle);
        if let Some(source_idx) = source.and_then(|s| self.index_of(s)) {
            self.panes[source_idx].take(handle);
        }

        let idx = self.require(target)?;
        let pane = &mut self.panes[idx];
        pane.terminals.push(handle.clone());
        pane.active = Some(handle.clone());
        self.focused = target;

        if let Some(source) = source.filter(|s| *s != target) {
            self.collapse_if_empty(source);
        }

        tracing::debug!(%handle, from = ?source, to = %target, "moved terminal");
        Ok(())
    }

    /// Append `handle` to `pane` unless it is already placed somewhere. It only
    /// becomes the active tab when the pane has none.
    pub fn insert(&mut self, handle: &TerminalHandle, pane: PaneId) -> Result<bool, LayoutError> {
        let idx = self.require(pane)?;
        if self.contains(handle) {
            return Ok(false);
        }
        self.last_split = None;

        let pane = &mut self.panes[idx];
        pane.terminals.push(handle.clone());
        if pane.active.is_none() {
            pane.active = Some(handle.clone());
        }
        Ok(true)
    }

    /// Remove empty panes while more than one remains. Returns how many went.
    pub fn collapse_empty(&mut self) -> usize {
        let mut removed = 0;
        while self.panes.len() > 1 {
            let Some(idx) = self.panes.iter().position(Pane::is_empty) else {
                break;
            };
            self.last_split = None;
            self.remove_at(idx);
            removed += 1;
        }
        removed
    }

    /// Move a tab within its pane. Returns false if the handle is not in `pane`.
    pub fn reorder(
        &mut self,
        pane: PaneId,
        handle: &TerminalHandle,
        new_index: usize,
    ) -> Result<bool, LayoutError> {
        let idx = self.require(pane)?;
        let Some(from) = self.panes[idx].index_of(handle) else {
            return Ok(false);
        };
        self.last_split = None;

        let tabs = &mut self.panes[idx].terminals;
        let tab = tabs.remove(from);
        let to = new_index.min(tabs.len());
        tabs.insert(to, tab);
        Ok(true)
    }

    /// Apply a full width vector. Values below the floor are raised to it and
    /// the shortfall is taken from panes with room above the floor.
    pub fn resize(&mut self, widths: &[f64]) -> Result<(), LayoutError> {
        if widths.len() != self.panes.len() {
            return Err(LayoutError::WidthCount {
                expected: self.panes.len(),
                actual: widths.len(),
            });
        }
        self.last_split = None;

        let min = self.min_width;
        let mut out: Vec<f64> = widths
            .iter()
            .map(|w| if w.is_finite() { *w } else { min })
            .collect();

        let mut deficit = 0.0;
        let mut raised = vec![false; out.len()];
        for (w, r) in out.iter_mut().zip(raised.iter_mut()) {
            if *w < min {
                deficit += min - *w;
                *w = min;
                *r = true;
            }
        }

        if deficit > 0.0 {
            let slack: f64 = out
                .iter()
                .zip(&raised)
                .filter(|(_, r)| !**r)
                .map(|(w, _)| *w - min)
                .sum();
            if slack > 0.0 {
                let take = deficit.min(slack);
                for (w, r) in out.iter_mut().zip(&raised) {
                    if !*r {
                        *w -= take * (*w - min) / slack;
                    }
                }
            }
        }

        for (pane, w) in self.panes.iter_mut().zip(out) {
            pane.width = w.max(min);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn h(id: &str) -> TerminalHandle {
        TerminalHandle::service(id)
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_initial_layout() {
        let layout = PaneLayout::default();
        assert_eq!(layout.len(), 1);
        assert_eq!(layout.focused(), PaneId::ROOT);
        assert_close(layout.panes()[0].width, 100.0);
        assert!(layout.panes()[0].is_empty());
    }

    #[test]
    fn test_split_halves_reference_and_focuses_new() {
        let mut layout = PaneLayout::default();
        let right = layout.split(Side::Right, PaneId::ROOT).unwrap();
        let left = layout.split(Side::Left, PaneId::ROOT).unwrap();

        let ids: Vec<_> = layout.panes().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![left, PaneId::ROOT, right]);
        assert_eq!(layout.widths(), vec![25.0, 25.0, 50.0]);
        assert_eq!(layout.focused(), left);
    }

    #[test]
    fn test_split_of_narrow_pane_is_not_clamped() {
        let mut layout = PaneLayout::default();
        layout.split(Side::Right, PaneId::ROOT).unwrap();
        layout.resize(&[80.0, 20.0]).unwrap();
        let narrow = layout.panes()[1].id;

        layout.split(Side::Right, narrow).unwrap();
        assert_eq!(layout.widths(), vec![80.0, 10.0, 10.0]);

        // the next resize applies the floor again
        layout.resize(&[80.0, 10.0, 10.0]).unwrap();
        assert!(layout.widths().iter().all(|w| *w >= layout.min_width()));
    }

    #[test]
    fn test_split_then_remove_round_trips() {
        let mut layout = PaneLayout::default();
        let b = layout.split(Side::Right, PaneId::ROOT).unwrap();
        layout.move_terminal(&h("a"), PaneId::ROOT).unwrap();
        layout.move_terminal(&h("b"), b).unwrap();
        layout.resize(&[70.0, 30.0]).unwrap();
        let before = layout.clone();

        let c = layout.split(Side::Left, b).unwrap();
        assert!(layout.remove(c).unwrap());

        assert_eq!(layout.widths(), before.widths());
        let handles: Vec<_> = layout.handles().cloned().collect();
        assert_eq!(handles, vec![h("a"), h("b")]);
    }

    #[test]
    fn test_remove_last_pane_is_noop() {
        let mut layout = PaneLayout::default();
        assert!(!layout.remove(PaneId::ROOT).unwrap());
        assert_eq!(layout.len(), 1);
    }

    #[test]
    fn test_remove_unknown_pane_errors() {
        let mut layout = PaneLayout::default();
        assert_eq!(layout.remove(PaneId(99)), Err(LayoutError::UnknownPane(PaneId(99))));
    }

    #[test]
    fn test_remove_transfers_tabs_to_previous() {
        let mut layout = PaneLayout::default();
        layout.move_terminal(&h("a"), PaneId::ROOT).unwrap();
        let b = layout.split(Side::Right, PaneId::ROOT).unwrap();
        layout.move_terminal(&h("b"), b).unwrap();
        layout.move_terminal(&h("c"), b).unwrap();

        layout.remove(b).unwrap();

        let root = layout.pane(PaneId::ROOT).unwrap();
        assert_eq!(root.terminals, vec![h("a"), h("b"), h("c")]);
        assert_eq!(root.active, Some(h("a")));
        assert_close(root.width, 100.0);
        assert_eq!(layout.focused(), PaneId::ROOT);
    }

    #[test]
    fn test_remove_first_pane_goes_to_next() {
        let mut layout = PaneLayout::default();
        let left = layout.split(Side::Left, PaneId::ROOT).unwrap();
        layout.move_terminal(&h("x"), left).unwrap();
        layout.move_terminal(&h("y"), PaneId::ROOT).unwrap();

        layout.remove(left).unwrap();
        assert_eq!(layout.pane(PaneId::ROOT).unwrap().terminals, vec![h("y"), h("x")]);
        assert_eq!(layout.pane(PaneId::ROOT).unwrap().active, Some(h("y")));
    }

    #[test]
    fn test_proportional_redistribution() {
        let mut layout = PaneLayout::default();
        let b = layout.split(Side::Right, PaneId::ROOT).unwrap();
        let c = layout.split(Side::Right, b).unwrap();
        for (handle, pane) in [("a", PaneId::ROOT), ("b", b), ("c", c)] {
            layout.move_terminal(&h(handle), pane).unwrap();
        }
        layout.resize(&[60.0, 20.0, 20.0]).unwrap();

        layout.remove(c).unwrap();
        assert_close(layout.widths()[0], 75.0);
        assert_close(layout.widths()[1], 25.0);
    }

    #[test]
    fn test_focus_moves_to_same_or_lower_index() {
        let mut layout = PaneLayout::default();
        let b = layout.split(Side::Right, PaneId::ROOT).unwrap();
        let c = layout.split(Side::Right, b).unwrap();
        for (handle, pane) in [("a", PaneId::ROOT), ("b", b), ("c", c)] {
            layout.move_terminal(&h(handle), pane).unwrap();
        }

        layout.focus(b).unwrap();
        layout.remove(b).unwrap();
        assert_eq!(layout.focused(), c);

        layout.remove(c).unwrap();
        assert_eq!(layout.focused(), PaneId::ROOT);
    }

    #[test]
    fn test_move_collapses_empty_source() {
        let mut layout = PaneLayout::default();
        layout.move_terminal(&h("a"), PaneId::ROOT).unwrap();
        let b = layout.split(Side::Right, PaneId::ROOT).unwrap();
        layout.move_terminal(&h("b"), b).unwrap();

        layout.move_terminal(&h("b"), PaneId::ROOT).unwrap();
        assert_eq!(layout.len(), 1);
        let root = layout.pane(PaneId::ROOT).unwrap();
        assert_eq!(root.terminals, vec![h("a"), h("b")]);
        assert_eq!(root.active, Some(h("b")));
        assert_close(root.width, 100.0);
    }

    #[test]
    fn test_move_to_unknown_pane_changes_nothing() {
        let mut layout = PaneLayout::default();
        layout.move_terminal(&h("a"), PaneId::ROOT).unwrap();
        let before = layout.clone();
        assert!(layout.move_terminal(&h("a"), PaneId(7)).is_err());
        assert_eq!(layout, before);
    }

    #[test]
    fn test_detach_passes_active_to_neighbour() {
        let mut layout = PaneLayout::default();
        for id in ["a", "b", "c"] {
            layout.move_terminal(&h(id), PaneId::ROOT).unwrap();
        }
        layout.select(PaneId::ROOT, &h("b")).unwrap();

        assert_eq!(layout.detach(&h("b")), Some(PaneId::ROOT));
        assert_eq!(layout.pane(PaneId::ROOT).unwrap().active, Some(h("c")));
        assert_eq!(layout.detach(&h("b")), None);
    }

    #[test]
    fn test_last_pane_may_stay_empty() {
        let mut layout = PaneLayout::default();
        layout.move_terminal(&h("a"), PaneId::ROOT).unwrap();
        layout.detach(&h("a"));
        assert_eq!(layout.len(), 1);
        assert!(layout.panes()[0].is_empty());
        assert_eq!(layout.panes()[0].active, None);
    }

    #[test]
    fn test_reorder_within_pane() {
        let mut layout = PaneLayout::default();
        for id in ["a", "b", "c"] {
            layout.move_terminal(&h(id), PaneId::ROOT).unwrap();
        }
        assert!(layout.reorder(PaneId::ROOT, &h("c"), 0).unwrap());
        assert_eq!(layout.panes()[0].terminals, vec![h("c"), h("a"), h("b")]);

        assert!(layout.reorder(PaneId::ROOT, &h("c"), 10).unwrap());
        assert_eq!(layout.panes()[0].terminals, vec![h("a"), h("b"), h("c")]);

        let other = layout.split(Side::Right, PaneId::ROOT).unwrap();
        assert!(!layout.reorder(other, &h("a"), 0).unwrap());
    }

    #[test]
    fn test_insert_keeps_existing_active() {
        let mut layout = PaneLayout::default();
        assert!(layout.insert(&h("a"), PaneId::ROOT).unwrap());
        assert!(layout.insert(&h("b"), PaneId::ROOT).unwrap());
        assert!(!layout.insert(&h("a"), PaneId::ROOT).unwrap());

        let root = layout.pane(PaneId::ROOT).unwrap();
        assert_eq!(root.terminals, vec![h("a"), h("b")]);
        assert_eq!(root.active, Some(h("a")));
    }

    #[test]
    fn test_collapse_empty_keeps_last_pane() {
        let mut layout = PaneLayout::default();
        let b = layout.split(Side::Right, PaneId::ROOT).unwrap();
        layout.split(Side::Right, b).unwrap();
        layout.move_terminal(&h("a"), b).unwrap();

        assert_eq!(layout.collapse_empty(), 2);
        assert_eq!(layout.len(), 1);
        assert_eq!(layout.panes()[0].terminals, vec![h("a")]);
        assert_close(layout.total_width(), 100.0);

        layout.detach(&h("a"));
        assert_eq!(layout.collapse_empty(), 0);
    }

    #[test]
    fn test_resize_clamps_one_side_of_two() {
        let mut layout = PaneLayout::default();
        layout.split(Side::Right, PaneId::ROOT).unwrap();

        layout.resize(&[5.0, 95.0]).unwrap();
        assert_eq!(layout.widths(), vec![15.0, 85.0]);

        layout.resize(&[97.0, 3.0]).unwrap();
        assert_eq!(layout.widths(), vec![85.0, 15.0]);
    }

    #[test]
    fn test_resize_rejects_wrong_length() {
        let mut layout = PaneLayout::default();
        assert_eq!(
            layout.resize(&[50.0, 50.0]),
            Err(LayoutError::WidthCount {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn test_resize_does_not_renormalize() {
        let mut layout = PaneLayout::default();
        layout.split(Side::Right, PaneId::ROOT).unwrap();
        layout.resize(&[40.0, 40.0]).unwrap();
        assert_close(layout.total_width(), 80.0);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Split(bool, usize),
        Remove(usize),
        Move(usize, usize),
        Reorder(usize, usize, usize),
        Detach(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (any::<bool>(), 0usize..6).prop_map(|(l, p)| Op::Split(l, p)),
            (0usize..6).prop_map(Op::Remove),
            (0usize..8, 0usize..6).prop_map(|(t, p)| Op::Move(t, p)),
            (0usize..6, 0usize..8, 0usize..8).prop_map(|(p, t, i)| Op::Reorder(p, t, i)),
            (0usize..8).prop_map(Op::Detach),
        ]
    }

    proptest! {
        #[test]
        fn test_handles_stay_unique_and_widths_sum(ops in prop::collection::vec(op(), 0..60)) {
            let mut layout = PaneLayout::default();
            let handles: Vec<_> = (0..8).map(|i| h(&format!("t{i}"))).collect();

            for op in ops {
                let pick = |i: usize| layout.panes()[i % layout.len()].id;
                match op {
                    Op::Split(left, p) => {
                        let side = if left { Side::Left } else { Side::Right };
                        let target = pick(p);
                        layout.split(side, target).unwrap();
                    }
                    Op::Remove(p) => {
                        let target = pick(p);
                        layout.remove(target).unwrap();
                    }
                    Op::Move(t, p) => {
                        let target = pick(p);
                        layout.move_terminal(&handles[t], target).unwrap();
                    }
                    Op::Reorder(p, t, i) => {
                        let target = pick(p);
                        layout.reorder(target, &handles[t], i).unwrap();
                    }
                    Op::Detach(t) => {
                        layout.detach(&handles[t]);
                    }
                }

                for handle in &handles {
                    let count = layout.panes().iter().filter(|p| p.contains(handle)).count();
                    prop_assert!(count <= 1, "{handle} placed {count} times");
                }
                for pane in layout.panes() {
                    let mut seen = pane.terminals.clone();
                    seen.sort();
                    seen.dedup();
                    prop_assert_eq!(seen.len(), pane.terminals.len());
                    if let Some(active) = &pane.active {
                        prop_assert!(pane.contains(active));
                    }
                }
                prop_assert!(layout.pane(layout.focused()).is_some());
                prop_assert!((layout.total_width() - 100.0).abs() < 1e-6);
            }
        }

        #[test]
        fn test_resize_respects_floor(widths in prop::collection::vec(-50.0f64..150.0, 1..6)) {
            let mut layout = PaneLayout::default();
            while layout.len() < widths.len() {
                let last = layout.panes()[layout.len() - 1].id;
                layout.split(Side::Right, last).unwrap();
            }
            layout.resize(&widths).unwrap();
            for w in layout.widths() {
                prop_assert!(w >= 15.0 - 1e-9);
            }
        }
    }
}
