//! UI theme: palette tokens and style helpers
//!
//! Colours live in one `Palette`; widgets ask the theme for a style by meaning
//! (status, focused border, key hint) rather than by colour.

use ratatui::style::{Color, Modifier, Style};

use termdeck_core::model::{LogStream, ProcessStatus, ScriptStatus, ServiceStatus};

#[derive(Clone, Debug)]
pub struct Palette {
    /// Unfocused pane and sidebar borders
    pub panel_border: Color,
    /// Log text and titles
    pub text: Color,
    /// Inactive tabs
    pub text_dim: Color,
    /// Hints, resting statuses
    pub text_muted: Color,
    /// Focused pane border, active tab in other panes
    pub accent: Color,
    /// Drop target highlight while dragging
    pub drop_target: Color,
    /// Running, completed
    pub success: Color,
    /// Starting
    pub warn: Color,
    /// Failed, errored, stderr
    pub error: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,
    pub key_hint: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self::dark()
    }
}

impl Palette {
    /// Dark terminal background
    pub fn dark() -> Self {
        Self {
            panel_border: Color::Rgb(60, 60, 60),
            text: Color::Rgb(212, 212, 212),
            text_dim: Color::Rgb(150, 150, 150),
            text_muted: Color::Rgb(100, 100, 100),
            accent: Color::Rgb(79, 193, 255),       // Light blue
            drop_target: Color::Rgb(197, 134, 192), // Soft magenta
            success: Color::Rgb(78, 201, 176),      // Teal green
            warn: Color::Rgb(220, 180, 100),        // Amber
            error: Color::Rgb(244, 135, 113),       // Coral red
            selection_bg: Color::Rgb(38, 79, 120),  // Dark blue
            selection_fg: Color::White,
            key_hint: Color::Rgb(206, 145, 120), // Soft orange
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Theme {
    pub palette: Palette,
}

impl Theme {
    pub fn status_style(&self, status: &ProcessStatus) -> Style {
        let color = match status {
            ProcessStatus::Service(ServiceStatus::Running)
            | ProcessStatus::Script(ScriptStatus::Running | ScriptStatus::Completed) => {
                self.palette.success
            }
            ProcessStatus::Service(ServiceStatus::Starting) => self.palette.warn,
            ProcessStatus::Service(ServiceStatus::Error)
            | ProcessStatus::Script(ScriptStatus::Failed) => self.palette.error,
            ProcessStatus::Service(ServiceStatus::Stopped)
            | ProcessStatus::Script(ScriptStatus::Idle) => self.palette.text_muted,
        };
        Style::default().fg(color)
    }

    /// Style for tab labels
    pub fn tab_style(&self, active: bool, focused_pane: bool) -> Style {
        match (active, focused_pane) {
            (true, true) => Style::default()
                .bg(self.palette.selection_bg)
                .fg(self.palette.selection_fg)
                .add_modifier(Modifier::BOLD),
            (true, false) => Style::default()
                .fg(self.palette.accent)
                .add_modifier(Modifier::BOLD),
            _ => Style::default().fg(self.palette.text_dim),
        }
    }

    pub fn border_style(&self, focused: bool) -> Style {
        let color = if focused {
            self.palette.accent
        } else {
            self.palette.panel_border
        };
        Style::default().fg(color)
    }

    pub fn drop_target_style(&self) -> Style {
        Style::default()
            .fg(self.palette.drop_target)
            .add_modifier(Modifier::BOLD)
    }

    pub fn key_hint_style(&self) -> Style {
        Style::default().fg(self.palette.key_hint)
    }

    pub fn text_muted_style(&self) -> Style {
        Style::default().fg(self.palette.text_muted)
    }

    pub fn error_style(&self) -> Style {
        Style::default().fg(self.palette.error)
    }

    pub fn title_style(&self) -> Style {
        Style::default()
            .fg(self.palette.text)
            .add_modifier(Modifier::BOLD)
    }

    /// Base style of a log line; its own escape colours win over this
    pub fn stream_style(&self, stream: LogStream) -> Style {
        match stream {
            LogStream::Stdout => Style::default().fg(self.palette.text),
            LogStream::Stderr => Style::default().fg(self.palette.error),
        }
    }
}

static DEFAULT_THEME: std::sync::OnceLock<Theme> = std::sync::OnceLock::new();

pub fn theme() -> &'static Theme {
    DEFAULT_THEME.get_or_init(Theme::default)
}

/// Shorthands over the default theme
pub mod styles {
    use super::*;

    pub fn status(status: &ProcessStatus) -> Style {
        theme().status_style(status)
    }

    pub fn tab(active: bool, focused_pane: bool) -> Style {
        theme().tab_style(active, focused_pane)
    }

    pub fn border(focused: bool) -> Style {
        theme().border_style(focused)
    }

    pub fn drop_target() -> Style {
        theme().drop_target_style()
    }

    pub fn key_hint() -> Style {
        theme().key_hint_style()
    }

    pub fn text_muted() -> Style {
        theme().text_muted_style()
    }

    pub fn error() -> Style {
        theme().error_style()
    }

    pub fn title() -> Style {
        theme().title_style()
    }
}
