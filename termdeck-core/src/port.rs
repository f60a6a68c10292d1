//! Listening-port detection
//!
//! Dev servers announce where they listen in many different ways. `sniff_port`
//! looks at one chunk of output and returns the most likely port, trying a
//! fixed list of patterns from most to least specific.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ansi::strip_ansi_codes;

/// Ports below this are system ports and never reported
pub const MIN_PORT: u32 = 1024;
pub const MAX_PORT: u32 = 65535;

/// Patterns in priority order. Each captures the port in group 1.
static PORT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // URL with a loopback or bind-all host
        r"(?i)\bhttps?://(?:localhost|127\.0\.0\.1|0\.0\.0\.0|\[::1?\]):(\d{1,5})\b",
        // URL with any host
        r"(?i)\bhttps?://[a-z0-9.\-_\[\]:]*?:(\d{1,5})\b",
        // bare loopback host:port
        r"(?i)\b(?:localhost|127\.0\.0\.1|0\.0\.0\.0):(\d{1,5})\b",
        // "listening on port 3000", "server started at port 8080", "bound to port 5000"
        r"(?i)\b(?:listening|started|running|available|bound|serving)\b[^\d\n]{0,40}?\bport\b\s*[:=#]?\s*(\d{1,5})\b",
        // "listening on :3000", "running at 8080"
        r"(?i)\b(?:listening|running|available|serving)\s+(?:on|at)\s+:?(\d{1,5})\b",
        // "port: 3000", "port=3000", "PORT 3000"
        r"(?i)\bport\b\s*[:=]?\s*(\d{1,5})\b",
        // trailing ":3000/", ":3000 " or ":3000" at the end
        r":(\d{4,5})(?:/|\s|$)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid port pattern"))
    .collect()
});

/// Extract a likely listening port from one chunk of process output.
///
/// Returns `None` when nothing matches or every captured number falls outside
/// `[1024, 65535]`.
pub fn sniff_port(chunk: &str) -> Option<u16> {
    if !chunk.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    let text = strip_ansi_codes(chunk);

    for pattern in PORT_PATTERNS.iter() {
        for caps in pattern.captures_iter(&text) {
            let Some(m) = caps.get(1) else { continue };
            if let Some(port) = parse_port(m.as_str()) {
                return Some(port);
            }
        }
    }

    None
}

fn parse_port(digits: &str) -> Option<u16> {
    let n: u32 = digits.parse().ok()?;
    if (MIN_PORT..=MAX_PORT).contains(&n) {
        u16::try_from(n).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_language() {
        assert_eq!(sniff_port("Server listening on port 4321"), Some(4321));
        assert_eq!(sniff_port("App started successfully on port 3000"), Some(3000));
        assert_eq!(sniff_port("bound to port 5173"), Some(5173));
        assert_eq!(sniff_port("Listening on :9000"), Some(9000));
    }

    #[test]
    fn test_urls() {
        assert_eq!(sniff_port("https://localhost:8080/app"), Some(8080));
        assert_eq!(sniff_port("  ➜  Local:   http://127.0.0.1:5173/"), Some(5173));
        assert_eq!(sniff_port("Network: http://192.168.1.4:4000"), Some(4000));
    }

    #[test]
    fn test_loopback_url_beats_earlier_lan_url() {
        let line = "Network: http://10.0.0.2:4001 Local: http://localhost:4000";
        assert_eq!(sniff_port(line), Some(4000));
    }

    #[test]
    fn test_out_of_range_and_no_digits() {
        assert_eq!(sniff_port("port 80"), None);
        assert_eq!(sniff_port("port 70000"), None);
        assert_eq!(sniff_port("compiling crates..."), None);
        assert_eq!(sniff_port(""), None);
    }

    #[test]
    fn test_generic_port_phrase() {
        assert_eq!(sniff_port("PORT=8081"), Some(8081));
        assert_eq!(sniff_port("config { port: 6006 }"), Some(6006));
    }

    #[test]
    fn test_trailing_colon_port() {
        assert_eq!(sniff_port("ready on myhost:3001"), Some(3001));
        assert_eq!(sniff_port("proxy -> backend:8443/api"), Some(8443));
        assert_eq!(sniff_port("took 12:30 minutes"), None);
    }

    #[test]
    fn test_ansi_is_stripped_before_matching() {
        let line = "\x1b[32mLocal:\x1b[0m http://localhost:\x1b[1m5173\x1b[22m/";
        assert_eq!(sniff_port(line), Some(5173));
    }

    #[test]
    fn test_orphaned_sequence_from_chunk_boundary() {
        assert_eq!(sniff_port("[1mlistening on port[22m 7000"), Some(7000));
    }
}
