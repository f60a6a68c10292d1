//! Visibility and lifecycle
//!
//! `Workspace` is what a front end talks to. It owns the runtime registry, the
//! pane layout, the hidden/closed sets, the content processor and the drag
//! session, and keeps them consistent:
//!
//! - an active handle that is neither hidden nor closed sits in exactly one pane
//! - a hidden handle sits in no pane
//! - a closed handle has no registry record and stays out until a fresh run
//!
//! Observers registered with `observe` hear about every change.

use std::collections::BTreeSet;

use crate::config::EngineConfig;
use crate::content::{ContentCache, ContentProcessor};
use crate::drag::{DragSession, DragState, DropAction, DropTarget, HitTest, PaneGeometry, Point, Rect};
use crate::event::{EventEnvelope, ProcessEvent};
use crate::handle::TerminalHandle;
use crate::layout::{LayoutError, Pane, PaneId, PaneLayout, Side};
use crate::registry::RuntimeRegistry;

pub type ObserverId = u64;

type Observer = Box<dyn FnMut(&WorkspaceChange) + Send>;

/// What just changed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkspaceChange {
    /// Status, logs or exit result of a handle
    Runtime(TerminalHandle),
    /// A port was detected for the current run
    PortDetected { handle: TerminalHandle, port: u16 },
    /// Panes, tabs, widths or focus
    Layout,
    /// Hidden or closed sets
    Visibility(TerminalHandle),
}

/// Where a handle currently stands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Visible(PaneId),
    Hidden,
    Closed,
    /// Known or not, but nothing to show
    Inactive,
}

pub struct Workspace {
    registry: RuntimeRegistry,
    layout: PaneLayout,
    hidden: BTreeSet<TerminalHandle>,
    closed: BTreeSet<TerminalHandle>,
    content: ContentProcessor,
    drag: DragSession,
    engine: EngineConfig,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: ObserverId,
    last_event_id: u64,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("registry", &self.registry)
            .field("layout", &self.layout)
            .field("hidden", &self.hidden)
            .field("closed", &self.closed)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Workspace {
    pub fn new(engine: &EngineConfig) -> Self {
        Self {
            registry: RuntimeRegistry::new(engine.log_capacity),
            layout: PaneLayout::new(engine.min_pane_width),
            hidden: BTreeSet::new(),
            closed: BTreeSet::new(),
            content: ContentProcessor::with_cache(ContentCache::new(
                engine.render_cache_capacity,
                engine.render_cache_evict,
            )),
            drag: DragSession::new(),
            engine: engine.clone(),
            observers: Vec::new(),
            next_observer: 1,
            last_event_id: 0,
        }
    }

    // ---- observers ----

    pub fn observe<F>(&mut self, callback: F) -> ObserverId
    where
        F: FnMut(&WorkspaceChange) + Send + 'static,
    {
        let id = self.next_observer;
        self.next_observer += 1;
        self.observers.push((id, Box::new(callback)));
        id
    }

    /// Returns false if `id` was not registered (or already removed)
    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    fn notify(&mut self, change: WorkspaceChange) {
        for (_, observer) in &mut self.observers {
            observer(&change);
        }
    }

    // ---- queries ----

    pub fn registry(&self) -> &RuntimeRegistry {
        &self.registry
    }

    pub fn layout(&self) -> &PaneLayout {
        &self.layout
    }

    pub fn panes(&self) -> &[Pane] {
        self.layout.panes()
    }

    pub fn hidden(&self) -> &BTreeSet<TerminalHandle> {
        &self.hidden
    }

    pub fn closed(&self) -> &BTreeSet<TerminalHandle> {
        &self.closed
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn last_event_id(&self) -> u64 {
        self.last_event_id
    }

    pub fn visibility(&self, handle: &TerminalHandle) -> Visibility {
        if self.closed.contains(handle) {
            Visibility::Closed
        } else if let Some(pane) = self.layout.pane_of(handle) {
            Visibility::Visible(pane)
        } else if self.hidden.contains(handle) && self.registry.is_active(handle) {
            Visibility::Hidden
        } else {
            Visibility::Inactive
        }
    }

    /// Active handles the user has hidden
    pub fn hidden_active(&self) -> Vec<TerminalHandle> {
        self.hidden
            .iter()
            .filter(|h| self.registry.is_active(h))
            .cloned()
            .collect()
    }

    /// Active tab of the focused pane
    pub fn focused_terminal(&self) -> Option<&TerminalHandle> {
        self.layout.focused_pane().active.as_ref()
    }

    // ---- supervisor events ----

    /// Fold one supervisor event into the registry and place the handle if it
    /// just became active. Events for a closed handle are dropped unless they
    /// start a new run.
    pub fn apply(&mut self, env: &EventEnvelope) {
        self.last_event_id = env.id;
        let handle = env.event.handle().clone();

        if self.closed.contains(&handle) {
            if !env.event.starts_run() {
                tracing::debug!(%handle, "dropping event for closed terminal");
                return;
            }
            self.closed.remove(&handle);
            self.notify(WorkspaceChange::Visibility(handle.clone()));
        }

        match &env.event {
            ProcessEvent::Log { .. } => {
                if let Some(entry) = env.event.log_entry(env.at) {
                    if let Some(port) = self.registry.append_log(&handle, entry) {
                        self.notify(WorkspaceChange::PortDetected {
                            handle: handle.clone(),
                            port,
                        });
                    }
                }
            }
            ProcessEvent::Status { status, pid, .. } => {
                let extra = env.event.status_extra();
                if !self.registry.upsert_status(&handle, *status, *pid, extra) {
                    return;
                }
            }
            ProcessEvent::Exit {
                exit_code, success, ..
            } => {
                self.registry.set_exit_result(&handle, *exit_code, *success);
            }
        }
        self.notify(WorkspaceChange::Runtime(handle.clone()));

        self.place(&handle);
    }

    /// Convenience for callers without an envelope
    pub fn apply_event(&mut self, event: ProcessEvent) {
        let env = EventEnvelope::now(self.last_event_id + 1, event);
        self.apply(&env);
    }

    /// Put an active, visible, unplaced handle into the focused pane
    fn place(&mut self, handle: &TerminalHandle) {
        if !self.registry.is_active(handle)
            || self.hidden.contains(handle)
            || self.closed.contains(handle)
        {
            return;
        }
        let focused = self.layout.focused();
        if let Ok(true) = self.layout.insert(handle, focused) {
            tracing::debug!(%handle, pane = %focused, "placed terminal");
            self.notify(WorkspaceChange::Layout);
        }
    }

    /// A start or run request succeeded: show the handle in the focused pane
    /// as its active tab. Already placed handles stay put and get selected.
    pub fn on_start_succeeded(&mut self, handle: &TerminalHandle, pid: Option<u32>) {
        tracing::debug!(%handle, ?pid, "start succeeded");
        let was_hidden = self.hidden.remove(handle);
        let was_closed = self.closed.remove(handle);
        if was_hidden || was_closed {
            self.notify(WorkspaceChange::Visibility(handle.clone()));
        }

        self.bring_forward(handle);
        self.notify(WorkspaceChange::Layout);
    }

    /// Select `handle` where it already sits, or move it into the focused pane
    fn bring_forward(&mut self, handle: &TerminalHandle) {
        let result = match self.layout.pane_of(handle) {
            Some(pane) => self
                .layout
                .select(pane, handle)
                .and_then(|_| self.layout.focus(pane)),
            None => {
                let focused = self.layout.focused();
                self.layout.move_terminal(handle, focused)
            }
        };
        if let Err(e) = result {
            tracing::warn!(%handle, error = %e, "could not bring terminal forward");
        }
    }

    // ---- visibility ----

    /// Bring a hidden handle back. Closed handles need a fresh run instead.
    pub fn show(&mut self, handle: &TerminalHandle) -> bool {
        if self.closed.contains(handle) || !self.registry.contains(handle) {
            return false;
        }
        if self.hidden.remove(handle) {
            self.notify(WorkspaceChange::Visibility(handle.clone()));
        }

        self.bring_forward(handle);
        self.notify(WorkspaceChange::Layout);
        true
    }

    /// Take the tab away but keep the record; output keeps accumulating
    pub fn hide(&mut self, handle: &TerminalHandle) -> bool {
        if self.closed.contains(handle) {
            return false;
        }
        let inserted = self.hidden.insert(handle.clone());
        let detached = self.layout.detach(handle).is_some();
        if inserted {
            self.notify(WorkspaceChange::Visibility(handle.clone()));
        }
        if detached {
            self.notify(WorkspaceChange::Layout);
        }
        inserted || detached
    }

    /// Forget the handle entirely. Only a fresh run brings it back.
    pub fn close(&mut self, handle: &TerminalHandle) -> bool {
        let forgot = self.registry.forget(handle).is_some();
        let detached = self.layout.detach(handle).is_some();
        self.hidden.remove(handle);
        let newly_closed = self.closed.insert(handle.clone());

        tracing::debug!(%handle, forgot, detached, "closed terminal");
        self.notify(WorkspaceChange::Visibility(handle.clone()));
        if forgot {
            self.notify(WorkspaceChange::Runtime(handle.clone()));
        }
        if detached {
            self.notify(WorkspaceChange::Layout);
        }
        forgot || detached || newly_closed
    }

    pub fn clear_logs(&mut self, handle: &TerminalHandle) {
        if self.closed.contains(handle) || !self.registry.contains(handle) {
            return;
        }
        self.registry.clear_logs(handle);
        self.notify(WorkspaceChange::Runtime(handle.clone()));
    }

    /// Re-establish every placement rule from scratch
    pub fn reconcile(&mut self) {
        let mut changed = false;

        let misplaced: Vec<TerminalHandle> = self
            .layout
            .handles()
            .filter(|h| self.hidden.contains(*h) || self.closed.contains(*h))
            .cloned()
            .collect();
        for handle in &misplaced {
            self.layout.detach(handle);
            changed = true;
        }

        let leaked: Vec<TerminalHandle> = self
            .closed
            .iter()
            .filter(|h| self.registry.contains(h))
            .cloned()
            .collect();
        for handle in &leaked {
            self.registry.forget(handle);
        }

        let unplaced: Vec<TerminalHandle> = self
            .registry
            .iter()
            .filter(|(h, rec)| {
                rec.is_active()
                    && !self.hidden.contains(*h)
                    && !self.closed.contains(*h)
                    && !self.layout.contains(h)
            })
            .map(|(h, _)| h.clone())
            .collect();
        let focused = self.layout.focused();
        for handle in &unplaced {
            if let Ok(true) = self.layout.insert(handle, focused) {
                changed = true;
            }
        }

        if self.layout.collapse_empty() > 0 {
            changed = true;
        }
        if changed {
            self.notify(WorkspaceChange::Layout);
        }
    }

    // ---- layout ----

    pub fn focus_pane(&mut self, pane: PaneId) -> Result<(), LayoutError> {
        self.layout.focus(pane)?;
        self.notify(WorkspaceChange::Layout);
        Ok(())
    }

    pub fn focus_next_pane(&mut self, forward: bool) {
        self.layout.focus_next(forward);
        self.notify(WorkspaceChange::Layout);
    }

    pub fn select_tab(&mut self, pane: PaneId, handle: &TerminalHandle) -> Result<bool, LayoutError> {
        let selected = self.layout.select(pane, handle)?;
        if selected {
            self.notify(WorkspaceChange::Layout);
        }
        Ok(selected)
    }

    /// Step the focused pane's active tab left or right
    pub fn cycle_tab(&mut self, forward: bool) {
        let pane = self.layout.focused_pane();
        let len = pane.terminals.len();
        if len == 0 {
            return;
        }
        let current = pane
            .active
            .as_ref()
            .and_then(|a| pane.index_of(a))
            .unwrap_or(0);
        let next = if forward { (current + 1) % len } else { (current + len - 1) % len };
        let (id, handle) = (pane.id, pane.terminals[next].clone());
        if let Err(e) = self.select_tab(id, &handle) {
            tracing::warn!(%handle, pane = %id, error = %e, "could not cycle tab");
        }
    }

    pub fn split(&mut self, side: Side, reference: PaneId) -> Result<PaneId, LayoutError> {
        let id = self.layout.split(side, reference)?;
        self.notify(WorkspaceChange::Layout);
        Ok(id)
    }

    /// Split the focused pane and move its active tab into the new pane,
    /// the keyboard equivalent of dropping a tab on an edge
    pub fn split_focused(&mut self, side: Side) -> Result<Option<PaneId>, LayoutError> {
        let pane = self.layout.focused_pane();
        let Some(handle) = pane.active.clone() else {
            return Ok(None);
        };
        let action = DropAction::SplitAndMove {
            handle,
            pane: pane.id,
            side,
        };
        action.apply(&mut self.layout)?;
        self.notify(WorkspaceChange::Layout);
        Ok(Some(self.layout.focused()))
    }

    pub fn remove_pane(&mut self, pane: PaneId) -> Result<bool, LayoutError> {
        let removed = self.layout.remove(pane)?;
        if removed {
            self.notify(WorkspaceChange::Layout);
        }
        Ok(removed)
    }

    pub fn move_terminal(&mut self, handle: &TerminalHandle, target: PaneId) -> Result<(), LayoutError> {
        if self.hidden.contains(handle) || self.closed.contains(handle) {
            return Ok(());
        }
        self.layout.move_terminal(handle, target)?;
        self.notify(WorkspaceChange::Layout);
        Ok(())
    }

    pub fn reorder(&mut self, pane: PaneId, handle: &TerminalHandle, index: usize) -> Result<bool, LayoutError> {
        let moved = self.layout.reorder(pane, handle, index)?;
        if moved {
            self.notify(WorkspaceChange::Layout);
        }
        Ok(moved)
    }

    pub fn resize(&mut self, widths: &[f64]) -> Result<(), LayoutError> {
        self.layout.resize(widths)?;
        self.notify(WorkspaceChange::Layout);
        Ok(())
    }

    /// Grow (or shrink, with a negative `delta`) the focused pane, taking the
    /// difference from its right neighbour, or its left one for the last pane.
    pub fn resize_focused(&mut self, delta: f64) -> Result<(), LayoutError> {
        let Some(idx) = self.layout.index_of(self.layout.focused()) else {
            return Ok(());
        };
        if self.layout.len() < 2 {
            return Ok(());
        }
        let neighbour = if idx + 1 < self.layout.len() { idx + 1 } else { idx - 1 };
        let mut widths = self.layout.widths();
        let min = self.layout.min_width();
        let delta = delta
            .min(widths[neighbour] - min)
            .max(min - widths[idx]);
        widths[idx] += delta;
        widths[neighbour] -= delta;
        self.resize(&widths)
    }

    // ---- drag and drop ----

    /// Geometry for hit testing, using the configured edge zone and tab strip
    pub fn geometry<W>(&self, area: Rect, tab_width: W) -> PaneGeometry
    where
        W: Fn(&TerminalHandle) -> f64,
    {
        PaneGeometry::new(self.engine.edge_zone_ratio, self.engine.tab_bar_height)
            .from_layout(&self.layout, area, tab_width)
    }

    pub fn drag_state(&self) -> &DragState {
        self.drag.state()
    }

    pub fn begin_drag(&mut self, handle: TerminalHandle, source: PaneId) {
        self.drag.begin(handle, source);
    }

    pub fn update_drag(&mut self, target: Option<DropTarget>) {
        self.drag.update(target);
    }

    pub fn update_drag_at(&mut self, hit_test: &dyn HitTest, point: Point) {
        self.drag.update_at(hit_test, point);
    }

    pub fn cancel_drag(&mut self) {
        self.drag.cancel();
        self.drag.reset();
    }

    /// Finish the drag and apply its action. A failed action leaves the
    /// layout as it was.
    pub fn release_drag(&mut self) -> Option<DropAction> {
        let action = self.drag.release(&self.layout);
        self.drag.reset();
        let action = action?;
        match action.apply(&mut self.layout) {
            Ok(()) => {
                self.notify(WorkspaceChange::Layout);
                Some(action)
            }
            Err(e) => {
                tracing::debug!(error = %e, "drop could not be applied");
                None
            }
        }
    }

    // ---- rendering ----

    /// Markup for each log line of `handle`, oldest first
    pub fn render(&mut self, handle: &TerminalHandle) -> Vec<String> {
        let Some(record) = self.registry.get(handle) else {
            return Vec::new();
        };
        let content = &mut self.content;
        record.logs.iter().map(|e| content.process(&e.content)).collect()
    }

    /// Markup for one chunk through the shared cache
    pub fn render_chunk(&mut self, raw: &str) -> String {
        self.content.process(raw)
    }

    pub fn content(&self) -> &ContentProcessor {
        &self.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LogStream, ScriptStatus, ServiceStatus};
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    fn api() -> TerminalHandle {
        TerminalHandle::service("api")
    }

    fn log(handle: &TerminalHandle, text: &str) -> ProcessEvent {
        ProcessEvent::log(handle.clone(), LogStream::Stdout, text)
    }

    #[test]
    fn test_first_output_places_handle_in_focused_pane() {
        let mut ws = Workspace::default();
        ws.apply_event(log(&api(), "booting"));
        assert_eq!(ws.visibility(&api()), Visibility::Visible(PaneId::ROOT));
        assert_eq!(ws.focused_terminal(), Some(&api()));
    }

    #[test]
    fn test_resting_status_alone_does_not_place() {
        let mut ws = Workspace::default();
        ws.apply_event(ProcessEvent::status(api(), ServiceStatus::Stopped, None));
        assert!(ws.registry().contains(&api()));
        assert_eq!(ws.visibility(&api()), Visibility::Inactive);
        assert!(ws.panes()[0].is_empty());
    }

    #[test]
    fn test_hidden_handle_keeps_collecting_output() {
        let mut ws = Workspace::default();
        ws.apply_event(log(&api(), "one"));
        assert!(ws.hide(&api()));
        ws.apply_event(log(&api(), "two"));

        assert_eq!(ws.visibility(&api()), Visibility::Hidden);
        assert_eq!(ws.registry().get(&api()).unwrap().logs.len(), 2);
        assert_eq!(ws.hidden_active(), vec![api()]);

        assert!(ws.show(&api()));
        assert_eq!(ws.visibility(&api()), Visibility::Visible(PaneId::ROOT));
    }

    #[test]
    fn test_closed_handle_ignores_stale_events() {
        let mut ws = Workspace::default();
        ws.apply_event(log(&api(), "hi"));
        assert!(ws.close(&api()));

        ws.apply_event(log(&api(), "late line"));
        ws.apply_event(ProcessEvent::status(api(), ServiceStatus::Stopped, None));
        assert!(!ws.registry().contains(&api()));
        assert_eq!(ws.visibility(&api()), Visibility::Closed);
        assert!(!ws.show(&api()));

        ws.apply_event(ProcessEvent::status(api(), ServiceStatus::Starting, None));
        assert!(ws.registry().contains(&api()));
        assert_eq!(ws.visibility(&api()), Visibility::Visible(PaneId::ROOT));
    }

    #[test]
    fn test_start_succeeded_focuses_and_activates() {
        let mut ws = Workspace::default();
        let web = TerminalHandle::service("web");
        ws.apply_event(log(&api(), "a"));
        ws.apply_event(log(&web, "b"));
        assert_eq!(ws.focused_terminal(), Some(&api()));

        ws.on_start_succeeded(&web, Some(10));
        assert_eq!(ws.focused_terminal(), Some(&web));
    }

    #[test]
    fn test_start_succeeded_selects_tab_where_it_sits() {
        let mut ws = Workspace::default();
        let web = TerminalHandle::service("web");
        ws.apply_event(log(&api(), "a"));
        ws.apply_event(log(&web, "b"));
        ws.select_tab(PaneId::ROOT, &web).unwrap();
        let right = ws.split_focused(Side::Right).unwrap().unwrap();
        ws.focus_pane(PaneId::ROOT).unwrap();

        ws.on_start_succeeded(&web, None);
        assert_eq!(ws.layout().focused(), right);
        assert_eq!(ws.layout().pane_of(&web), Some(right));
        assert_eq!(ws.panes().len(), 2);

        ws.cycle_tab(true);
        assert_eq!(ws.focused_terminal(), Some(&web));
    }

    #[test]
    fn test_start_succeeded_reopens_hidden() {
        let mut ws = Workspace::default();
        ws.apply_event(log(&api(), "a"));
        ws.hide(&api());
        ws.on_start_succeeded(&api(), None);
        assert!(ws.hidden().is_empty());
        assert_eq!(ws.visibility(&api()), Visibility::Visible(PaneId::ROOT));
    }

    #[test]
    fn test_hide_collapses_single_tab_pane() {
        let mut ws = Workspace::default();
        let web = TerminalHandle::service("web");
        ws.apply_event(log(&api(), "a"));
        ws.apply_event(log(&web, "b"));
        ws.select_tab(PaneId::ROOT, &web).unwrap();
        let right = ws.split_focused(Side::Right).unwrap().unwrap();
        assert_eq!(ws.panes().len(), 2);
        assert_eq!(ws.layout().pane_of(&web), Some(right));

        ws.hide(&web);
        assert_eq!(ws.panes().len(), 1);
        assert!((ws.panes()[0].width - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_script_exit_recorded() {
        let mut ws = Workspace::default();
        let job = TerminalHandle::script("migrate");
        ws.apply_event(ProcessEvent::status(job.clone(), ScriptStatus::Running, Some(3)));
        ws.apply_event(ProcessEvent::status(job.clone(), ScriptStatus::Completed, None));
        ws.apply_event(ProcessEvent::exit(job.clone(), Some(0), Some(true)));

        let rec = ws.registry().get(&job).unwrap();
        assert_eq!(rec.last_success, Some(true));
        assert_eq!(ws.visibility(&job), Visibility::Visible(PaneId::ROOT));
    }

    #[test]
    fn test_reconcile_repairs_state() {
        let mut ws = Workspace::default();
        ws.apply_event(log(&api(), "a"));
        ws.layout.detach(&api());
        ws.hidden.insert(TerminalHandle::script("ghost"));
        ws.layout.insert(&TerminalHandle::script("ghost"), PaneId::ROOT).unwrap();

        ws.reconcile();
        assert_eq!(ws.visibility(&api()), Visibility::Visible(PaneId::ROOT));
        assert!(!ws.layout().contains(&TerminalHandle::script("ghost")));
    }

    #[test]
    fn test_observers_are_notified_and_removable() {
        let mut ws = Workspace::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = ws.observe(move |c| sink.lock().unwrap().push(c.clone()));

        ws.apply_event(log(&api(), "listening on port 8080"));
        {
            let seen = seen.lock().unwrap();
            assert!(seen.contains(&WorkspaceChange::PortDetected {
                handle: api(),
                port: 8080
            }));
            assert!(seen.contains(&WorkspaceChange::Runtime(api())));
            assert!(seen.contains(&WorkspaceChange::Layout));
        }

        assert!(ws.unobserve(id));
        assert!(!ws.unobserve(id));
        let count = seen.lock().unwrap().len();
        ws.apply_event(log(&api(), "more"));
        assert_eq!(seen.lock().unwrap().len(), count);
    }

    #[test]
    fn test_drag_between_panes() {
        let mut ws = Workspace::default();
        let web = TerminalHandle::service("web");
        ws.apply_event(log(&api(), "a"));
        ws.apply_event(log(&web, "b"));

        ws.begin_drag(web.clone(), PaneId::ROOT);
        ws.update_drag(Some(DropTarget::Edge {
            pane: PaneId::ROOT,
            side: Side::Left,
        }));
        let action = ws.release_drag();
        assert!(matches!(action, Some(DropAction::SplitAndMove { .. })));
        assert_eq!(ws.panes().len(), 2);
        assert_eq!(ws.panes()[0].terminals, vec![web.clone()]);
        assert_eq!(ws.drag_state(), &DragState::Idle);
    }

    #[test]
    fn test_cancelled_drag_changes_nothing() {
        let mut ws = Workspace::default();
        ws.apply_event(log(&api(), "a"));
        let before = ws.layout().clone();
        ws.begin_drag(api(), PaneId::ROOT);
        ws.update_drag(Some(DropTarget::Edge {
            pane: PaneId::ROOT,
            side: Side::Right,
        }));
        ws.cancel_drag();
        assert_eq!(ws.release_drag(), None);
        assert_eq!(ws.layout(), &before);
    }

    #[test]
    fn test_render_uses_shared_cache() {
        let mut ws = Workspace::default();
        ws.apply_event(log(&api(), "\x1b[32mok\x1b[0m"));
        ws.apply_event(log(&api(), "\x1b[32mok\x1b[0m"));
        let lines = ws.render(&api());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], lines[1]);
        assert_eq!(ws.content().cache().len(), 1);
        assert!(ws.render(&TerminalHandle::script("none")).is_empty());
    }

    #[test]
    fn test_resize_focused_respects_floor() {
        let mut ws = Workspace::default();
        let web = TerminalHandle::service("web");
        ws.apply_event(log(&api(), "a"));
        ws.apply_event(log(&web, "b"));
        ws.select_tab(PaneId::ROOT, &web).unwrap();
        ws.split_focused(Side::Right).unwrap();

        ws.resize_focused(100.0).unwrap();
        assert_eq!(ws.layout().widths(), vec![15.0, 85.0]);
        ws.resize_focused(-100.0).unwrap();
        assert_eq!(ws.layout().widths(), vec![85.0, 15.0]);
    }
}
