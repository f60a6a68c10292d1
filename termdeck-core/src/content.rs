//! Output rendering
//!
//! `ContentProcessor` turns one raw chunk of process output into an HTML
//! fragment: SGR styles become `<span>`s, URLs become clickable link spans and
//! everything else is escaped. Results are memoised in a bounded `ContentCache`
//! keyed by the exact raw text.

use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ansi::{AnsiColor, TextStyle, parse_ansi_string, strip_ansi_codes};

pub const DEFAULT_CACHE_CAPACITY: usize = 2000;
pub const DEFAULT_CACHE_EVICT: usize = 500;

/// Private-use code points delimit URL placeholders
const PLACEHOLDER_OPEN: char = '\u{E000}';
const PLACEHOLDER_CLOSE: char = '\u{E001}';

/// URLs may contain escape sequences (a colourised port, for instance); they
/// are matched on the raw text and cleaned afterwards. A URL only continues
/// past an escape sequence into a port, path, query or fragment character, so
/// `http://a.com\x1b[0m,next` ends at `a.com` and keeps its reset.
static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bhttps?://[^\s<>"'`\x1b]+(?:(?:\x1b\[[0-9;]*m)+[0-9/:?#][^\s<>"'`\x1b]*)*"#)
        .expect("valid url pattern")
});

/// Trailing SGR sequence at the end of a URL match
static TRAILING_SGR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\x1b\[[0-9;]*m|\[\d{1,3}(?:;\d{1,3})*m)$").expect("valid sgr pattern"));

/// Why a chunk could not be rendered with styles and links
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ContentError {
    #[error("input already contains placeholder sentinels")]
    SentinelInInput,
    #[error("placeholder {0} lost during style conversion")]
    PlaceholderLost(usize),
    #[error("unknown placeholder index {0}")]
    UnknownPlaceholder(usize),
}

/// Bounded raw-text → markup cache with insertion-order eviction.
///
/// When full, the `evict_batch` oldest insertions are dropped in one go before
/// the new entry goes in.
#[derive(Clone, Debug)]
pub struct ContentCache {
    capacity: usize,
    evict_batch: usize,
    entries: HashMap<String, String>,
    order: VecDeque<String>,
}

impl ContentCache {
    pub fn new(capacity: usize, evict_batch: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            evict_batch: evict_batch.clamp(1, capacity),
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn get(&self, raw: &str) -> Option<&str> {
        self.entries.get(raw).map(String::as_str)
    }

    pub fn insert(&mut self, raw: String, markup: String) {
        if let Some(existing) = self.entries.get_mut(&raw) {
            *existing = markup;
            return;
        }

        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }

        self.order.push_back(raw.clone());
        self.entries.insert(raw, markup);
    }

    fn evict_oldest(&mut self) {
        let n = self.evict_batch.min(self.order.len());
        for key in self.order.drain(..n) {
            self.entries.remove(&key);
        }
        tracing::debug!(evicted = n, remaining = self.entries.len(), "content cache eviction");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_EVICT)
    }
}

/// Renders output chunks to markup through an injected cache
#[derive(Clone, Debug, Default)]
pub struct ContentProcessor {
    cache: ContentCache,
}

impl ContentProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: ContentCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ContentCache {
        &mut self.cache
    }

    /// Render one raw chunk, reusing the cached markup for identical input
    pub fn process(&mut self, raw: &str) -> String {
        if let Some(hit) = self.cache.get(raw) {
            return hit.to_string();
        }

        let markup = match render_markup(raw) {
            Ok(markup) => markup,
            Err(e) => {
                tracing::debug!(error = %e, "falling back to escaped output");
                escape_html(raw)
            }
        };

        self.cache.insert(raw.to_string(), markup.clone());
        markup
    }
}

/// Full pipeline: extract URLs, convert styles, restore URLs as link spans
pub fn render_markup(raw: &str) -> Result<String, ContentError> {
    if raw.contains(PLACEHOLDER_OPEN) || raw.contains(PLACEHOLDER_CLOSE) {
        return Err(ContentError::SentinelInInput);
    }

    let (masked, urls) = extract_urls(raw);
    let styled = styles_to_markup(&masked);
    restore_urls(&styled, &urls)
}

/// Replace every URL with a placeholder token; returns the masked text and
/// the cleaned URLs in placeholder order.
fn extract_urls(raw: &str) -> (String, Vec<String>) {
    let mut masked = String::with_capacity(raw.len());
    let mut urls = Vec::new();
    let mut last = 0;

    for m in URL_PATTERN.find_iter(raw) {
        let (url_end, cleaned) = trim_url(raw, m.start(), m.end());
        if cleaned.is_empty() {
            continue;
        }
        masked.push_str(&raw[last..m.start()]);
        let _ = write!(masked, "{PLACEHOLDER_OPEN}{}{PLACEHOLDER_CLOSE}", urls.len());
        urls.push(cleaned);
        last = url_end;
    }
    masked.push_str(&raw[last..]);

    (masked, urls)
}

/// Shrink a URL match so trailing style codes and sentence punctuation stay
/// outside the link. Returns the new end offset and the style-free URL.
fn trim_url(raw: &str, start: usize, mut end: usize) -> (usize, String) {
    loop {
        let slice = &raw[start..end];
        if let Some(m) = TRAILING_SGR.find(slice) {
            end = start + m.start();
            continue;
        }
        match slice.chars().last() {
            Some(c @ ('.' | ',' | ';' | ':' | '!' | '?' | ')' | ']' | '}')) => {
                end -= c.len_utf8();
            }
            _ => break,
        }
    }

    (end, strip_ansi_codes(&raw[start..end]))
}

/// Convert SGR runs to `<span>` markup, escaping text. Placeholders pass
/// through untouched since they are printable and not HTML-special.
fn styles_to_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for (run, style) in parse_ansi_string(text) {
        let escaped = escape_html(&run);
        match style_attr(&style) {
            Some(css) => {
                let _ = write!(out, "<span style=\"{css}\">{escaped}</span>");
            }
            None => out.push_str(&escaped),
        }
    }
    out
}

fn restore_urls(markup: &str, urls: &[String]) -> Result<String, ContentError> {
    let mut out = String::with_capacity(markup.len());
    let mut restored = vec![false; urls.len()];
    let mut rest = markup;
    let lost = |restored: &[bool]| {
        ContentError::PlaceholderLost(restored.iter().position(|r| !r).unwrap_or(urls.len()))
    };

    while let Some(open) = rest.find(PLACEHOLDER_OPEN) {
        out.push_str(&rest[..open]);
        let after = &rest[open + PLACEHOLDER_OPEN.len_utf8()..];
        let close = after.find(PLACEHOLDER_CLOSE).ok_or_else(|| lost(&restored))?;
        let index: usize = after[..close].parse().map_err(|_| lost(&restored))?;
        let url = urls.get(index).ok_or(ContentError::UnknownPlaceholder(index))?;
        let url = escape_html(url);
        let _ = write!(out, "<span class=\"terminal-link\" data-url=\"{url}\">{url}</span>");
        restored[index] = true;
        rest = &after[close + PLACEHOLDER_CLOSE.len_utf8()..];
    }
    out.push_str(rest);

    match restored.iter().position(|r| !r) {
        Some(missing) => Err(ContentError::PlaceholderLost(missing)),
        None => Ok(out),
    }
}

fn style_attr(style: &TextStyle) -> Option<String> {
    if style.is_plain() {
        return None;
    }

    let (fg, bg) = if style.inverse {
        (style.bg.or(Some(AnsiColor::Indexed(0))), style.fg.or(Some(AnsiColor::Indexed(7))))
    } else {
        (style.fg, style.bg)
    };

    let mut css = Vec::new();
    if let Some(c) = fg {
        css.push(format!("color:{}", css_color(c)));
    }
    if let Some(c) = bg {
        css.push(format!("background-color:{}", css_color(c)));
    }
    if style.bold {
        css.push("font-weight:bold".to_string());
    }
    if style.dim {
        css.push("opacity:0.7".to_string());
    }
    if style.italic {
        css.push("font-style:italic".to_string());
    }
    match (style.underline, style.strikethrough) {
        (true, true) => css.push("text-decoration:underline line-through".to_string()),
        (true, false) => css.push("text-decoration:underline".to_string()),
        (false, true) => css.push("text-decoration:line-through".to_string()),
        (false, false) => {}
    }

    if css.is_empty() { None } else { Some(css.join(";")) }
}

/// xterm default palette for the 16 base colours
const BASE_PALETTE: [&str; 16] = [
    "#000000", "#cd3131", "#0dbc79", "#e5e510", "#2472c8", "#bc3fbc", "#11a8cd", "#e5e5e5",
    "#666666", "#f14c4c", "#23d18b", "#f5f543", "#3b8eea", "#d670d6", "#29b8db", "#ffffff",
];

fn css_color(color: AnsiColor) -> String {
    match color {
        AnsiColor::Indexed(n) if n < 16 => BASE_PALETTE[n as usize].to_string(),
        AnsiColor::Indexed(n) if n < 232 => {
            let n = n - 16;
            let level = |v: u8| if v == 0 { 0 } else { 55 + v * 40 };
            format!("#{:02x}{:02x}{:02x}", level(n / 36), level((n / 6) % 6), level(n % 6))
        }
        AnsiColor::Indexed(n) => {
            let grey = 8 + (n - 232) * 10;
            format!("#{grey:02x}{grey:02x}{grey:02x}")
        }
        AnsiColor::Rgb(r, g, b) => format!("#{r:02x}{g:02x}{b:02x}"),
    }
}

/// Escape the five HTML-significant characters
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
