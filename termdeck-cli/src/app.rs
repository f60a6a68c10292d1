use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{
    self, Event as CEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent,
    MouseEventKind,
};
use ratatui::Terminal;
use ratatui::backend::Backend;
use tokio::sync::mpsc;

use termdeck_core::config::WorkspaceConfig;
use termdeck_core::drag::{DragState, PaneGeometry, Point};
use termdeck_core::event::{EventEnvelope, EventSubscription};
use termdeck_core::supervisor::{Supervisor, SupervisorError};
use termdeck_core::{PaneId, Side, TerminalHandle, Visibility, Workspace, wire};

use crate::ui;

/// Width step for `+`/`-`, in percent
const RESIZE_STEP: f64 = 5.0;

/// Result of a supervisor call made off the UI loop
#[derive(Debug)]
pub enum Outcome {
    Started {
        handle: TerminalHandle,
        result: Result<Option<u32>, SupervisorError>,
    },
    Stopped {
        handle: TerminalHandle,
        result: Result<(), SupervisorError>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub is_error: bool,
}

/// Scroll position of one pane's log view
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaneScroll {
    /// Terminal the position belongs to; a different active tab starts over
    pub handle: Option<TerminalHandle>,
    /// First visible log line
    pub top: usize,
    /// Stick to the newest output
    pub follow: bool,
}

impl Default for PaneScroll {
    fn default() -> Self {
        Self {
            handle: None,
            top: 0,
            follow: true,
        }
    }
}

impl PaneScroll {
    /// First visible line for `len` log lines in a body `height` rows tall
    pub fn window(&mut self, active: Option<&TerminalHandle>, len: usize, height: usize) -> usize {
        if self.handle.as_ref() != active {
            *self = Self {
                handle: active.cloned(),
                ..Self::default()
            };
        }
        let max = len.saturating_sub(height);
        self.top = if self.follow { max } else { self.top.min(max) };
        self.top
    }

    pub fn up(&mut self, lines: usize) {
        self.follow = false;
        self.top = self.top.saturating_sub(lines);
    }

    /// Reaching the bottom resumes following
    pub fn down(&mut self, lines: usize, max: usize) {
        self.top = (self.top + lines).min(max);
        if self.top == max {
            self.follow = true;
        }
    }

    pub fn to_top(&mut self) {
        self.follow = false;
        self.top = 0;
    }

    pub fn to_bottom(&mut self, max: usize) {
        self.follow = true;
        self.top = max;
    }

    pub fn toggle_follow(&mut self, max: usize) {
        if self.follow {
            self.follow = false;
        } else {
            self.to_bottom(max);
        }
    }
}

/// Appends every applied event to a JSON-lines file `replay` can read back
pub struct Recorder {
    out: BufWriter<File>,
}

impl Recorder {
    pub fn create(path: &std::path::Path) -> io::Result<Self> {
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
        })
    }

    fn record(&mut self, env: &EventEnvelope) {
        let line = wire::encode(&env.event);
        if let Err(e) = writeln!(self.out, "{line}").and_then(|_| self.out.flush()) {
            tracing::warn!(error = %e, "failed to record event");
        }
    }
}

pub struct App {
    pub workspace: Workspace,
    pub config: WorkspaceConfig,
    pub project_name: String,
    pub supervisor_name: &'static str,
    /// Sidebar entries, in config order
    pub entries: Vec<TerminalHandle>,
    pub selected: usize,
    pub status: Option<StatusLine>,
    /// Terminals whose output blew up while drawing
    pub broken: BTreeSet<TerminalHandle>,
    /// Pane geometry of the last frame, for mouse hit tests
    pub geometry: Option<PaneGeometry>,
    pub scroll: BTreeMap<PaneId, PaneScroll>,
    /// Log rows each pane showed in the last frame
    pub viewport: BTreeMap<PaneId, usize>,
    supervisor: Arc<dyn Supervisor>,
    outcome_tx: mpsc::Sender<Outcome>,
    recorder: Option<Recorder>,
    quit: bool,
}

impl App {
    pub fn new(
        config: WorkspaceConfig,
        supervisor: Arc<dyn Supervisor>,
        outcome_tx: mpsc::Sender<Outcome>,
        recorder: Option<Recorder>,
    ) -> Self {
        let workspace = Workspace::new(&config.engine);
        let entries = config.handles();
        let project_name = config.name.clone().unwrap_or_else(|| "termdeck".into());
        Self {
            workspace,
            project_name,
            supervisor_name: supervisor.name(),
            entries,
            selected: 0,
            status: None,
            broken: BTreeSet::new(),
            geometry: None,
            scroll: BTreeMap::new(),
            viewport: BTreeMap::new(),
            config,
            supervisor,
            outcome_tx,
            recorder,
            quit: false,
        }
    }

    pub fn selected_entry(&self) -> Option<&TerminalHandle> {
        self.entries.get(self.selected)
    }

    fn info(&mut self, text: impl Into<String>) {
        self.status = Some(StatusLine {
            text: text.into(),
            is_error: false,
        });
    }

    fn error(&mut self, text: impl Into<String>) {
        self.status = Some(StatusLine {
            text: text.into(),
            is_error: true,
        });
    }

    pub fn apply(&mut self, env: &EventEnvelope) {
        if let Some(rec) = &mut self.recorder {
            rec.record(env);
        }
        self.workspace.apply(env);
    }

    // ---- supervisor calls ----

    /// Ask the supervisor to start `handle`. The workspace only changes once
    /// the start resolves.
    pub fn start(&mut self, handle: &TerminalHandle) {
        let request = match self.config.start_request(handle, None, None) {
            Ok(r) => r,
            Err(e) => return self.error(e.to_string()),
        };
        let supervisor = self.supervisor.clone();
        let tx = self.outcome_tx.clone();
        let handle = handle.clone();
        self.info(format!("starting {}", self.config.display_name(&handle)));
        tokio::spawn(async move {
            let result = supervisor.start(request).await;
            let _ = tx.send(Outcome::Started { handle, result }).await;
        });
    }

    pub fn stop(&mut self, handle: &TerminalHandle) {
        let supervisor = self.supervisor.clone();
        let tx = self.outcome_tx.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            let result = supervisor.stop(&handle).await;
            let _ = tx.send(Outcome::Stopped { handle, result }).await;
        });
    }

    pub fn on_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Started { handle, result } => match result {
                Ok(pid) => {
                    self.broken.remove(&handle);
                    self.workspace.on_start_succeeded(&handle, pid);
                    let pid = pid.map(|p| format!(" (pid {p})")).unwrap_or_default();
                    self.info(format!("{} started{pid}", self.config.display_name(&handle)));
                }
                Err(e) => self.error(e.to_string()),
            },
            Outcome::Stopped { handle, result } => match result {
                Ok(()) => self.info(format!("{} stopped", self.config.display_name(&handle))),
                Err(e) => self.error(e.to_string()),
            },
        }
    }

    // ---- input ----

    pub fn on_input(&mut self, ev: CEvent) {
        match ev {
            CEvent::Key(key) if key.kind != KeyEventKind::Release => self.on_key(key),
            CEvent::Mouse(mouse) => self.on_mouse(mouse),
            _ => {}
        }
    }

    fn focused_terminal(&self) -> Option<TerminalHandle> {
        self.workspace.focused_terminal().cloned()
    }

    fn on_key(&mut self, KeyEvent { code, modifiers, .. }: KeyEvent) {
        if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
            self.quit = true;
            return;
        }

        let focused = self.workspace.layout().focused();
        match code {
            KeyCode::Char('q') => self.quit = true,
            KeyCode::Esc => {
                if matches!(self.workspace.drag_state(), DragState::Dragging { .. }) {
                    self.workspace.cancel_drag();
                } else {
                    self.status = None;
                }
            }

            KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.entries.len() {
                    self.selected += 1;
                }
            }

            KeyCode::Char('s') => {
                if let Some(h) = self.selected_entry().cloned() {
                    self.start(&h);
                }
            }
            KeyCode::Char('x') => {
                if let Some(h) = self.selected_entry().cloned() {
                    self.stop(&h);
                }
            }
            KeyCode::Char('o') | KeyCode::Enter => {
                if let Some(h) = self.selected_entry().cloned() {
                    if !self.workspace.show(&h) {
                        self.error(format!("{} has no output to show", self.config.display_name(&h)));
                    }
                }
            }
            KeyCode::Char('h') => {
                if let Some(h) = self.focused_terminal() {
                    self.workspace.hide(&h);
                }
            }
            KeyCode::Char('c') => {
                if let Some(h) = self.focused_terminal() {
                    if self.supervisor.is_running(&h) {
                        self.error(format!("stop {} before closing it", self.config.display_name(&h)));
                    } else {
                        self.broken.remove(&h);
                        self.workspace.close(&h);
                    }
                }
            }
            KeyCode::Char('l') => {
                if let Some(h) = self.focused_terminal() {
                    self.broken.remove(&h);
                    self.workspace.clear_logs(&h);
                    self.scroll_focused(|s, max| s.to_bottom(max));
                }
            }

            KeyCode::PageUp => {
                let page = self.focused_page();
                self.scroll_focused(|s, _| s.up(page));
            }
            KeyCode::PageDown => {
                let page = self.focused_page();
                self.scroll_focused(|s, max| s.down(page, max));
            }
            KeyCode::Home => self.scroll_focused(|s, _| s.to_top()),
            KeyCode::End => self.scroll_focused(|s, max| s.to_bottom(max)),
            KeyCode::Char('f') => self.scroll_focused(|s, max| s.toggle_follow(max)),

            KeyCode::Char('|') => self.split(Side::Right),
            KeyCode::Char('\\') => self.split(Side::Left),
            KeyCode::Char('w') => match self.workspace.remove_pane(focused) {
                Ok(false) => self.error("the last pane cannot be closed"),
                Ok(true) => {}
                Err(e) => self.error(e.to_string()),
            },
            KeyCode::Char('m') => {
                if let Some(h) = self.focused_terminal() {
                    let panes = self.workspace.panes();
                    let idx = self.workspace.layout().index_of(focused).unwrap_or(0);
                    let target = panes[(idx + 1) % panes.len()].id;
                    if target != focused {
                        if let Err(e) = self.workspace.move_terminal(&h, target) {
                            self.error(e.to_string());
                        }
                    }
                }
            }
            KeyCode::Char('[') | KeyCode::Char(']') => {
                if let Some(h) = self.focused_terminal() {
                    let pane = self.workspace.layout().focused_pane();
                    let idx = pane.index_of(&h).unwrap_or(0);
                    let to = if code == KeyCode::Char('[') { idx.saturating_sub(1) } else { idx + 1 };
                    let _ = self.workspace.reorder(focused, &h, to);
                }
            }
            KeyCode::Char('+') | KeyCode::Char('=') => self.resize(RESIZE_STEP),
            KeyCode::Char('-') => self.resize(-RESIZE_STEP),
            KeyCode::Tab => self.workspace.focus_next_pane(true),
            KeyCode::BackTab => self.workspace.focus_next_pane(false),
            KeyCode::Left => self.workspace.cycle_tab(false),
            KeyCode::Right => self.workspace.cycle_tab(true),
            _ => {}
        }
    }

    fn focused_page(&self) -> usize {
        let pane = self.workspace.layout().focused();
        self.viewport.get(&pane).copied().unwrap_or(1).max(1)
    }

    /// Adjust the focused pane's scroll position; `f` gets the largest valid
    /// top line
    fn scroll_focused(&mut self, f: impl FnOnce(&mut PaneScroll, usize)) {
        let pane = self.workspace.layout().focused();
        let Some(handle) = self.workspace.focused_terminal().cloned() else {
            return;
        };
        let len = self.workspace.registry().get(&handle).map_or(0, |r| r.logs.len());
        let height = self.focused_page();
        let scroll = self.scroll.entry(pane).or_default();
        scroll.window(Some(&handle), len, height);
        f(scroll, len.saturating_sub(height));
    }

    fn split(&mut self, side: Side) {
        match self.workspace.split_focused(side) {
            Ok(Some(_)) => {}
            Ok(None) => self.error("nothing to split off: the focused pane is empty"),
            Err(e) => self.error(e.to_string()),
        }
    }

    fn resize(&mut self, delta: f64) {
        if let Err(e) = self.workspace.resize_focused(delta) {
            self.error(e.to_string());
        }
    }

    fn on_mouse(&mut self, mouse: MouseEvent) {
        let Some(geometry) = self.geometry.take() else {
            return;
        };
        let point = Point::new(f64::from(mouse.column) + 0.5, f64::from(mouse.row) + 0.5);

        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if let Some((pane, handle)) = geometry.tab_at(point) {
                    let _ = self.workspace.select_tab(pane, &handle);
                    let _ = self.workspace.focus_pane(pane);
                    self.workspace.begin_drag(handle, pane);
                } else if let Some(rect) = geometry.panes.iter().find(|r| r.bounds.contains(point)) {
                    let _ = self.workspace.focus_pane(rect.pane);
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                self.workspace.update_drag_at(&geometry, point);
            }
            MouseEventKind::Up(MouseButton::Left) => {
                if let Some(action) = self.workspace.release_drag() {
                    tracing::debug!(?action, "drop applied");
                }
            }
            _ => {}
        }
        self.geometry = Some(geometry);
    }

    /// Drop a terminal whose output broke the renderer back to a clean state
    pub fn mark_broken(&mut self, handle: &TerminalHandle) {
        if self.broken.insert(handle.clone()) {
            self.error(format!(
                "could not draw {}; press l to clear its output",
                self.config.display_name(handle)
            ));
        }
    }

    pub fn visibility_hint(&self, handle: &TerminalHandle) -> &'static str {
        match self.workspace.visibility(handle) {
            Visibility::Visible(_) => "",
            Visibility::Hidden => " (hidden)",
            Visibility::Closed | Visibility::Inactive => "",
        }
    }
}

/// Read terminal input on a plain thread; crossterm's reader blocks
pub fn spawn_input_reader(tx: mpsc::Sender<CEvent>) {
    std::thread::spawn(move || {
        loop {
            match event::poll(Duration::from_millis(100)) {
                Ok(true) => match event::read() {
                    Ok(ev) => {
                        if tx.blocking_send(ev).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "terminal input failed");
                        break;
                    }
                },
                Ok(false) => {
                    if tx.is_closed() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "terminal poll failed");
                    break;
                }
            }
        }
    });
}

/// Main loop: one task owns the workspace and multiplexes supervisor events,
/// start/stop results and terminal input.
pub async fn run<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    mut events: EventSubscription,
    mut outcomes: mpsc::Receiver<Outcome>,
    mut input: mpsc::Receiver<CEvent>,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        tokio::select! {
            Some(env) = events.recv() => {
                app.apply(&env);
                // batch whatever else is queued before redrawing
                while let Some(env) = events.try_recv() {
                    app.apply(&env);
                }
            }
            Some(outcome) = outcomes.recv() => app.on_outcome(outcome),
            Some(ev) = input.recv() => app.on_input(ev),
            else => break,
        }

        if app.quit {
            break;
        }
    }

    app.info("stopping processes...");
    terminal.draw(|f| ui::draw(f, app))?;
    app.supervisor.stop_all().await;
    events.unsubscribe();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisors::{DEMO_CONFIG, DemoSupervisor};
    use crossterm::event::KeyEventState;
    use termdeck_core::EventBus;
    use termdeck_core::event::ProcessEvent;
    use termdeck_core::model::LogStream;

    fn key(c: KeyCode) -> CEvent {
        CEvent::Key(KeyEvent {
            code: c,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn app() -> App {
        let config = WorkspaceConfig::from_str(DEMO_CONFIG).unwrap();
        let bus = EventBus::new(16);
        let (tx, _rx) = mpsc::channel(4);
        App::new(config, Arc::new(DemoSupervisor::new(bus)), tx, None)
    }

    #[tokio::test]
    async fn test_start_outcome_places_terminal() {
        let mut app = app();
        let api = TerminalHandle::service("api");
        app.on_outcome(Outcome::Started {
            handle: api.clone(),
            result: Ok(Some(1)),
        });
        assert_eq!(app.workspace.focused_terminal(), Some(&api));

        app.on_outcome(Outcome::Started {
            handle: TerminalHandle::service("web"),
            result: Err(SupervisorError::AlreadyRunning(TerminalHandle::service("web"))),
        });
        assert!(app.status.as_ref().unwrap().is_error);
        assert_eq!(app.workspace.panes()[0].terminals, vec![api]);
    }

    #[tokio::test]
    async fn test_scrolling_up_pauses_follow() {
        let mut app = app();
        let api = TerminalHandle::service("api");
        app.on_outcome(Outcome::Started { handle: api.clone(), result: Ok(None) });
        for i in 0..50 {
            app.workspace
                .apply_event(ProcessEvent::log(api.clone(), LogStream::Stdout, format!("line {i}")));
        }
        let pane = app.workspace.layout().focused();
        app.viewport.insert(pane, 10);

        app.on_input(key(KeyCode::PageUp));
        assert!(!app.scroll[&pane].follow);
        assert_eq!(app.scroll[&pane].top, 30);

        for i in 50..55 {
            app.workspace
                .apply_event(ProcessEvent::log(api.clone(), LogStream::Stdout, format!("line {i}")));
        }
        let top = app.scroll.get_mut(&pane).unwrap().window(Some(&api), 55, 10);
        assert_eq!(top, 30);

        app.on_input(key(KeyCode::End));
        assert!(app.scroll[&pane].follow);
        let top = app.scroll.get_mut(&pane).unwrap().window(Some(&api), 55, 10);
        assert_eq!(top, 45);
    }

    #[test]
    fn test_scroll_resets_when_tab_changes() {
        let api = TerminalHandle::service("api");
        let web = TerminalHandle::service("web");
        let mut scroll = PaneScroll::default();
        scroll.window(Some(&api), 100, 20);
        scroll.up(30);
        assert_eq!(scroll.window(Some(&api), 100, 20), 50);

        assert_eq!(scroll.window(Some(&web), 40, 20), 20);
        assert!(scroll.follow);

        scroll.up(5);
        scroll.down(10, 20);
        assert!(scroll.follow);
        assert_eq!(scroll.top, 20);
    }

    #[tokio::test]
    async fn test_split_keys() {
        let mut app = app();
        let api = TerminalHandle::service("api");
        let web = TerminalHandle::service("web");
        app.on_outcome(Outcome::Started { handle: api.clone(), result: Ok(None) });
        app.on_outcome(Outcome::Started { handle: web.clone(), result: Ok(None) });

        app.on_input(key(KeyCode::Char('|')));
        assert_eq!(app.workspace.panes().len(), 2);
        assert_eq!(app.workspace.panes()[1].terminals, vec![web.clone()]);

        app.on_input(key(KeyCode::Char('m')));
        assert_eq!(app.workspace.panes().len(), 1);

        app.on_input(key(KeyCode::Char('w')));
        assert!(app.status.as_ref().unwrap().is_error);
        app.on_input(key(KeyCode::Char('q')));
        assert!(app.quit);
    }
}
