mod theme;

use std::panic::{self, AssertUnwindSafe};

use ansi_to_tui::IntoText;

use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Layout, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

use termdeck_core::drag::{self, DragState, DropTarget};
use termdeck_core::handle::ProcessKind;
use termdeck_core::model::ProcessStatus;
use termdeck_core::registry::RuntimeRecord;
use termdeck_core::{Side, TerminalHandle};

use theme::{styles, theme};

use crate::app::App;

const SIDEBAR_WIDTH: u16 = 30;

pub fn draw(f: &mut Frame, app: &mut App) {
    let rows = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(1),
    ])
    .split(f.area());
    let cols = Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(10)]).split(rows[1]);

    draw_header(f, app, rows[0]);
    draw_sidebar(f, app, cols[0]);
    draw_panes(f, app, cols[1]);
    draw_footer(f, app, rows[2]);
}

fn status_of(app: &App, handle: &TerminalHandle) -> ProcessStatus {
    app.workspace
        .registry()
        .get(handle)
        .map(|r| r.status)
        .unwrap_or_else(|| ProcessStatus::initial(handle.kind))
}

fn port_suffix(app: &App, handle: &TerminalHandle) -> String {
    app.workspace
        .registry()
        .get(handle)
        .and_then(|r| r.detected_port)
        .map(|p| format!(" :{p}"))
        .unwrap_or_default()
}

fn tab_label(app: &App, handle: &TerminalHandle) -> String {
    format!(
        " {} {}{} ",
        status_of(app, handle).icon(),
        app.config.display_name(handle),
        port_suffix(app, handle)
    )
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let live = app
        .workspace
        .registry()
        .iter()
        .filter(|(_, r)| r.status.is_live())
        .count();
    let line = Line::from(vec![
        Span::styled(format!(" {} ", app.project_name), styles::title()),
        Span::styled(format!("[{}] ", app.supervisor_name), styles::text_muted()),
        Span::raw(format!("{live}/{} live", app.entries.len())),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn draw_sidebar(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .entries
        .iter()
        .map(|handle| {
            let status = status_of(app, handle);
            let kind = match handle.kind {
                ProcessKind::Service => "svc",
                ProcessKind::Script => "run",
                ProcessKind::GlobalScript => "glb",
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", status.icon()), styles::status(&status)),
                Span::styled(format!("{kind} "), styles::text_muted()),
                Span::raw(app.config.display_name(handle)),
                Span::styled(port_suffix(app, handle), styles::key_hint()),
                Span::styled(app.visibility_hint(handle), styles::text_muted()),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(styles::border(false))
                .title(" processes "),
        )
        .highlight_style(styles::tab(true, true));
    let mut state = ListState::default();
    state.select((!app.entries.is_empty()).then_some(app.selected));
    f.render_stateful_widget(list, area, &mut state);
}

fn to_geometry_rect(area: Rect) -> drag::Rect {
    drag::Rect::new(
        f64::from(area.x),
        f64::from(area.y),
        f64::from(area.width),
        f64::from(area.height),
    )
}

fn to_cells(bounds: drag::Rect) -> Rect {
    let x = bounds.x.round().max(0.0) as u16;
    let right = (bounds.x + bounds.width).round().max(0.0) as u16;
    let y = bounds.y.round().max(0.0) as u16;
    let bottom = (bounds.y + bounds.height).round().max(0.0) as u16;
    Rect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
}

/// Lines `top..top + height` of the record, escape codes turned into styles.
/// Output that does not parse is shown as plain text in the stream's colour.
fn log_lines(record: &RuntimeRecord, top: usize, height: usize) -> Vec<Line<'static>> {
    let t = theme();
    record
        .logs
        .iter()
        .skip(top)
        .take(height)
        .flat_map(|entry| {
            let base = t.stream_style(entry.stream);
            let content = entry.content.replace('\t', "    ");
            let parsed = content.as_bytes().into_text();
            match parsed {
                Ok(text) => text
                    .lines
                    .into_iter()
                    .map(|line| {
                        let style = base.patch(line.style);
                        line.style(style)
                    })
                    .collect(),
                Err(_) => vec![Line::styled(content, base)],
            }
        })
        .collect()
}

fn draw_panes(f: &mut Frame, app: &mut App, area: Rect) {
    let geometry = app
        .workspace
        .geometry(to_geometry_rect(area), |h| tab_label(app, h).chars().count() as f64);

    let hovered = match app.workspace.drag_state() {
        DragState::Dragging { over, .. } => over.clone(),
        _ => None,
    };
    let tab_rows = app.workspace.engine().tab_bar_height.round().max(1.0) as u16;
    let focused = app.workspace.layout().focused();
    let mut broken_now = Vec::new();
    {
        let layout = app.workspace.layout();
        app.scroll.retain(|id, _| layout.pane(*id).is_some());
        app.viewport.retain(|id, _| layout.pane(*id).is_some());
    }

    for rect in &geometry.panes {
        let Some(pane) = app.workspace.layout().pane(rect.pane) else {
            continue;
        };
        let bounds = to_cells(rect.bounds);
        let [tab_row, body] =
            Layout::vertical([Constraint::Length(tab_rows), Constraint::Min(0)]).areas(bounds);
        let is_focused = pane.id == focused;

        let tabs: Vec<Span> = rect
            .tabs
            .iter()
            .map(|tab| {
                let over_tab = matches!(
                    &hovered,
                    Some(DropTarget::Tab { pane: p, handle, .. }) if *p == pane.id && *handle == tab.handle
                );
                let style = if over_tab {
                    styles::drop_target()
                } else {
                    styles::tab(pane.active.as_ref() == Some(&tab.handle), is_focused)
                };
                Span::styled(tab_label(app, &tab.handle), style)
            })
            .collect();
        f.render_widget(Paragraph::new(Line::from(tabs)), tab_row);

        let drop_here = match &hovered {
            Some(DropTarget::Edge { pane: p, side }) if *p == pane.id => Some(Some(*side)),
            Some(DropTarget::PaneBody { pane: p }) if *p == pane.id => Some(None),
            _ => None,
        };
        let border = if drop_here.is_some() {
            styles::drop_target()
        } else {
            styles::border(is_focused)
        };

        // log rows: body minus its border
        let height = usize::from(body.height.saturating_sub(2));
        let len = pane
            .active
            .as_ref()
            .and_then(|h| app.workspace.registry().get(h))
            .map_or(0, |r| r.logs.len());
        let scroll = app.scroll.entry(pane.id).or_default();
        let top = scroll.window(pane.active.as_ref(), len, height);
        let following = scroll.follow;
        app.viewport.insert(pane.id, height);

        let title = match &pane.active {
            Some(h) => {
                let status = status_of(app, h);
                let mut spans = vec![
                    Span::raw(format!(" {} ", app.config.display_name(h))),
                    Span::styled(format!("{} ", status.label()), styles::status(&status)),
                ];
                if !following {
                    let last = (top + height).min(len);
                    spans.push(Span::styled(
                        format!("[{}-{last} of {len}, f to follow] ", top + 1),
                        styles::key_hint(),
                    ));
                }
                Line::from(spans)
            }
            None => Line::from(format!(" {} ", pane.id)),
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border)
            .title(title);
        let inner = block.inner(body);
        f.render_widget(block, body);

        match &pane.active {
            None => {
                let hint = Paragraph::new("empty pane: select a process and press s")
                    .style(styles::text_muted())
                    .alignment(Alignment::Center);
                f.render_widget(hint, inner);
            }
            Some(h) if app.broken.contains(h) => {
                let hint = Paragraph::new("output could not be drawn, press l to clear it")
                    .style(styles::error())
                    .alignment(Alignment::Center);
                f.render_widget(hint, inner);
            }
            Some(h) => match app.workspace.registry().get(h) {
                Some(record) => {
                    // a bad line must not take the whole screen down
                    match panic::catch_unwind(AssertUnwindSafe(|| log_lines(record, top, height))) {
                        Ok(lines) => f.render_widget(Paragraph::new(lines), inner),
                        Err(_) => broken_now.push(h.clone()),
                    }
                }
                None => {
                    let hint = Paragraph::new("no output yet").style(styles::text_muted());
                    f.render_widget(hint, inner);
                }
            },
        }

        if let Some(Some(side)) = drop_here {
            let (text, alignment) = match side {
                Side::Left => ("◀ split", Alignment::Left),
                Side::Right => ("split ▶", Alignment::Right),
            };
            let marker = Paragraph::new(text)
                .style(styles::drop_target())
                .alignment(alignment);
            f.render_widget(marker, Rect { height: inner.height.min(1), ..inner });
        }
    }

    for handle in broken_now {
        tracing::warn!(%handle, "render failed, showing recovery hint");
        app.mark_broken(&handle);
    }
    app.geometry = Some(geometry);
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let line = match &app.status {
        Some(status) => {
            let style = if status.is_error {
                styles::error()
            } else {
                styles::text_muted()
            };
            Line::from(Span::styled(format!(" {}", status.text), style))
        }
        None => {
            let keys = [
                ("s", "start"),
                ("x", "stop"),
                ("h", "hide"),
                ("o", "show"),
                ("c", "close"),
                ("l", "clear"),
                ("|\\", "split"),
                ("w", "close pane"),
                ("m", "move"),
                ("[]", "reorder"),
                ("+-", "resize"),
                ("PgUp/PgDn", "scroll"),
                ("f", "follow"),
                ("q", "quit"),
            ];
            let spans: Vec<Span> = keys
                .iter()
                .flat_map(|(key, what)| {
                    [
                        Span::styled(format!(" {key}"), styles::key_hint()),
                        Span::styled(format!(" {what} "), styles::text_muted()),
                    ]
                })
                .collect();
            Line::from(spans)
        }
    };
    f.render_widget(Paragraph::new(line), area);
}
