//! ANSI escape sequence parsing
//!
//! Streams from child processes carry SGR colour/style codes and, now and then,
//! cursor-control sequences or fragments of a sequence cut at a chunk boundary.
//! This module turns such text into styled segments, or strips it to plain text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// CSI parameter bytes longer than this are treated as garbage
const MAX_CSI_LEN: usize = 64;
/// OSC strings (titles, hyperlinks) may legitimately be long
const MAX_OSC_LEN: usize = 2048;

/// SGR fragments whose ESC byte was lost, e.g. `[32m` at the start of a chunk
static ORPHAN_SGR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\d{1,3}(?:;\d{1,3})*m").expect("valid orphan SGR pattern"));

/// A terminal colour: 0-15 are the standard and bright palette, 16-255 the
/// extended cube and greys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AnsiColor {
    Indexed(u8),
    Rgb(u8, u8, u8),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TextStyle {
    pub fg: Option<AnsiColor>,
    pub bg: Option<AnsiColor>,
    pub bold: bool,
    pub dim: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    pub inverse: bool,
}

impl TextStyle {
    pub fn is_plain(&self) -> bool {
        *self == TextStyle::default()
    }
}

/// Incremental parser that tracks the current SGR style
#[derive(Clone, Debug, Default)]
pub struct AnsiParser {
    current_style: TextStyle,
    escape_buffer: String,
    in_escape: bool,
}

impl AnsiParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_style(&self) -> TextStyle {
        self.current_style
    }

    pub fn reset(&mut self) {
        self.current_style = TextStyle::default();
        self.escape_buffer.clear();
        self.in_escape = false;
    }

    /// True while an escape sequence has started but not finished
    pub fn is_mid_sequence(&self) -> bool {
        self.in_escape
    }

    /// Feed one character. Returns the style to draw it with, or `None` when
    /// the character belongs to an escape sequence or is a non-printing control.
    pub fn parse_char(&mut self, ch: char) -> Option<TextStyle> {
        if self.in_escape {
            self.escape_buffer.push(ch);
            if self.is_escape_complete() {
                self.process_escape_sequence();
                self.escape_buffer.clear();
                self.in_escape = false;
            } else if self.is_escape_overlong() {
                self.escape_buffer.clear();
                self.in_escape = false;
            }
            None
        } else if ch == '\x1b' {
            self.in_escape = true;
            self.escape_buffer.clear();
            self.escape_buffer.push(ch);
            None
        } else if ch.is_control() && ch != '\n' && ch != '\t' {
            None
        } else {
            Some(self.current_style)
        }
    }

    fn is_escape_complete(&self) -> bool {
        let buf = &self.escape_buffer;
        if buf.len() < 2 {
            return false;
        }

        if let Some(body) = buf.strip_prefix("\x1b[") {
            // CSI final byte is in 0x40..=0x7E; the introducer itself does not count
            return body
                .chars()
                .last()
                .is_some_and(|last| ('@'..='~').contains(&last));
        }

        if buf.starts_with("\x1b]") {
            return buf.ends_with('\x07') || buf.ends_with("\x1b\\");
        }

        // charset designation takes one more byte: ESC ( B
        if buf.len() == 2 && buf.ends_with(['(', ')', '*', '+']) {
            return false;
        }

        true
    }

    fn is_escape_overlong(&self) -> bool {
        let limit = if self.escape_buffer.starts_with("\x1b]") {
            MAX_OSC_LEN
        } else {
            MAX_CSI_LEN
        };
        self.escape_buffer.len() > limit
    }

    fn process_escape_sequence(&mut self) {
        // only SGR changes style; other CSI/OSC sequences are dropped
        let Some(body) = self.escape_buffer.strip_prefix("\x1b[") else {
            return;
        };
        let Some(params) = body.strip_suffix('m') else {
            return;
        };
        let params = params.to_string();
        self.parse_sgr_params(&params);
    }

    fn parse_sgr_params(&mut self, params_str: &str) {
        if params_str.is_empty() {
            self.current_style = TextStyle::default();
            return;
        }

        let params: Vec<u16> = params_str
            .split(';')
            .map(|s| if s.is_empty() { Some(0) } else { s.parse().ok() })
            .collect::<Option<Vec<_>>>()
            .unwrap_or_default();

        let style = &mut self.current_style;
        let mut i = 0;
        while i < params.len() {
            let code = params[i];
            match code {
                0 => *style = TextStyle::default(),
                1 => style.bold = true,
                2 => style.dim = true,
                3 => style.italic = true,
                4 => style.underline = true,
                7 => style.inverse = true,
                9 => style.strikethrough = true,
                21 | 22 => {
                    style.bold = false;
                    style.dim = false;
                }
                23 => style.italic = false,
                24 => style.underline = false,
                27 => style.inverse = false,
                29 => style.strikethrough = false,
                30..=37 => style.fg = Some(AnsiColor::Indexed((code - 30) as u8)),
                38 => {
                    let (color, used) = parse_extended_color(&params[i..]);
                    if let Some(color) = color {
                        style.fg = Some(color);
                    }
                    i += used;
                }
                39 => style.fg = None,
                40..=47 => style.bg = Some(AnsiColor::Indexed((code - 40) as u8)),
                48 => {
                    let (color, used) = parse_extended_color(&params[i..]);
                    if let Some(color) = color {
                        style.bg = Some(color);
                    }
                    i += used;
                }
                49 => style.bg = None,
                90..=97 => style.fg = Some(AnsiColor::Indexed((code - 90 + 8) as u8)),
                100..=107 => style.bg = Some(AnsiColor::Indexed((code - 100 + 8) as u8)),
                _ => {}
            }
            i += 1;
        }
    }
}

/// Parse `38;5;n` / `38;2;r;g;b` (and the 48 background forms).
/// Returns the colour, if valid, and how many extra params were consumed.
fn parse_extended_color(params: &[u16]) -> (Option<AnsiColor>, usize) {
    let byte = |v: u16| u8::try_from(v).ok();
    match params.get(1) {
        Some(5) => match params.get(2) {
            Some(&n) => (byte(n).map(AnsiColor::Indexed), 2),
            None => (None, 1),
        },
        Some(2) if params.len() >= 5 => {
            let rgb = byte(params[2])
                .zip(byte(params[3]))
                .zip(byte(params[4]))
                .map(|((r, g), b)| AnsiColor::Rgb(r, g, b));
            (rgb, 4)
        }
        Some(_) => (None, 1),
        None => (None, 0),
    }
}

pub fn contains_ansi_codes(text: &str) -> bool {
    text.contains('\x1b') || ORPHAN_SGR.is_match(text)
}

/// Remove SGR fragments that lost their ESC byte
pub fn strip_orphaned_sgr(text: &str) -> String {
    ORPHAN_SGR.replace_all(text, "").into_owned()
}

/// Strip escape sequences, orphaned SGR fragments and non-printing controls
pub fn strip_ansi_codes(text: &str) -> String {
    if !contains_ansi_codes(text) && !text.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
        return text.to_string();
    }

    let mut result = String::with_capacity(text.len());
    let mut parser = AnsiParser::new();
    for ch in text.chars() {
        if parser.parse_char(ch).is_some() {
            result.push(ch);
        }
    }

    strip_orphaned_sgr(&result)
}

/// Split text into runs of identical style. Escape sequences are consumed,
/// orphaned fragments removed; adjacent runs never share a style.
pub fn parse_ansi_string(text: &str) -> Vec<(String, TextStyle)> {
    let mut segments: Vec<(String, TextStyle)> = Vec::new();
    let mut parser = AnsiParser::new();

    for ch in text.chars() {
        let Some(style) = parser.parse_char(ch) else {
            continue;
        };
        match segments.last_mut() {
            Some((run, run_style)) if *run_style == style => run.push(ch),
            _ => segments.push((ch.to_string(), style)),
        }
    }

    segments
        .into_iter()
        .map(|(run, style)| (strip_orphaned_sgr(&run), style))
        .filter(|(run, _)| !run.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_basic_sgr() {
        assert_eq!(strip_ansi_codes("\x1b[31mred\x1b[0m plain"), "red plain");
    }

    #[test]
    fn test_strip_cursor_control_and_osc() {
        assert_eq!(strip_ansi_codes("\x1b[2K\x1b[1Gdone"), "done");
        assert_eq!(strip_ansi_codes("\x1b]0;title\x07body"), "body");
    }

    #[test]
    fn test_strip_orphans_and_dangling_escape() {
        assert_eq!(strip_ansi_codes("[32mready[0m"), "ready");
        assert_eq!(strip_ansi_codes("tail\x1b["), "tail");
        assert_eq!(strip_ansi_codes("array[0] stays"), "array[0] stays");
    }

    #[test]
    fn test_strip_carriage_return() {
        assert_eq!(strip_ansi_codes("50%\r100%"), "50%100%");
    }

    #[test]
    fn test_parse_segments() {
        let segs = parse_ansi_string("a\x1b[1;32mb\x1b[0mc");
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].0, "a");
        assert!(segs[0].1.is_plain());
        assert_eq!(segs[1].0, "b");
        assert!(segs[1].1.bold);
        assert_eq!(segs[1].1.fg, Some(AnsiColor::Indexed(2)));
        assert!(segs[2].1.is_plain());
    }

    #[test]
    fn test_extended_colors() {
        let segs = parse_ansi_string("\x1b[38;5;208mo\x1b[48;2;1;2;3mx");
        assert_eq!(segs[0].1.fg, Some(AnsiColor::Indexed(208)));
        assert_eq!(segs[1].1.bg, Some(AnsiColor::Rgb(1, 2, 3)));
    }

    #[test]
    fn test_bright_colors_map_to_upper_palette() {
        let segs = parse_ansi_string("\x1b[91mx");
        assert_eq!(segs[0].1.fg, Some(AnsiColor::Indexed(9)));
    }

    #[test]
    fn test_empty_param_resets() {
        let segs = parse_ansi_string("\x1b[1mA\x1b[mB");
        assert!(segs[0].1.bold);
        assert!(segs[1].1.is_plain());
    }
}
