//! Terminal handles
//!
//! A `TerminalHandle` names one tracked process and its output stream. It is the
//! only key shared by the registry, the pane layout and the drag/drop layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The family a tracked process belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessKind {
    /// Long-running project service (dev server, worker, ...)
    Service,
    /// One-shot project script
    Script,
    /// Script not tied to a project
    GlobalScript,
}

impl ProcessKind {
    pub fn label(&self) -> &'static str {
        match self {
            ProcessKind::Service => "service",
            ProcessKind::Script => "script",
            ProcessKind::GlobalScript => "global-script",
        }
    }

    /// Scripts and global scripts share the idle/running/completed/failed lifecycle
    pub fn is_script(&self) -> bool {
        matches!(self, ProcessKind::Script | ProcessKind::GlobalScript)
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Composite identity `(kind, raw_id)` of a terminal session
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalHandle {
    pub kind: ProcessKind,
    pub raw_id: String,
}

impl TerminalHandle {
    pub fn new(kind: ProcessKind, raw_id: impl Into<String>) -> Self {
        Self {
            kind,
            raw_id: raw_id.into(),
        }
    }

    pub fn service(raw_id: impl Into<String>) -> Self {
        Self::new(ProcessKind::Service, raw_id)
    }

    pub fn script(raw_id: impl Into<String>) -> Self {
        Self::new(ProcessKind::Script, raw_id)
    }

    pub fn global_script(raw_id: impl Into<String>) -> Self {
        Self::new(ProcessKind::GlobalScript, raw_id)
    }
}

impl fmt::Display for TerminalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.raw_id)
    }
}

/// Error returned when a `kind:id` argument cannot be parsed
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HandleParseError {
    #[error("expected <kind>:<id>, got '{0}'")]
    MissingSeparator(String),
    #[error("unknown process kind '{0}' (expected service, script or global-script)")]
    UnknownKind(String),
    #[error("empty id in '{0}'")]
    EmptyId(String),
}

/// Parses the `kind:id` form used on the command line. Only the first colon
/// separates, so ids may themselves contain colons.
impl FromStr for TerminalHandle {
    type Err = HandleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, raw_id) = s
            .split_once(':')
            .ok_or_else(|| HandleParseError::MissingSeparator(s.to_string()))?;
        let kind = match kind {
            "service" | "svc" => ProcessKind::Service,
            "script" => ProcessKind::Script,
            "global-script" | "global" => ProcessKind::GlobalScript,
            other => return Err(HandleParseError::UnknownKind(other.to_string())),
        };
        if raw_id.is_empty() {
            return Err(HandleParseError::EmptyId(s.to_string()));
        }
        Ok(TerminalHandle::new(kind, raw_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let h = TerminalHandle::global_script("cleanup");
        assert_eq!(h.to_string(), "global-script:cleanup");
        assert_eq!("global-script:cleanup".parse::<TerminalHandle>().unwrap(), h);
    }

    #[test]
    fn test_parse_keeps_colons_in_id() {
        let h: TerminalHandle = "service:web:dev".parse().unwrap();
        assert_eq!(h.kind, ProcessKind::Service);
        assert_eq!(h.raw_id, "web:dev");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "api".parse::<TerminalHandle>(),
            Err(HandleParseError::MissingSeparator(_))
        ));
        assert!(matches!(
            "daemon:api".parse::<TerminalHandle>(),
            Err(HandleParseError::UnknownKind(_))
        ));
        assert!(matches!(
            "script:".parse::<TerminalHandle>(),
            Err(HandleParseError::EmptyId(_))
        ));
    }

    #[test]
    fn test_same_raw_id_different_kind_are_distinct() {
        assert_ne!(TerminalHandle::service("build"), TerminalHandle::script("build"));
    }
}
