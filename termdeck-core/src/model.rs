use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::handle::ProcessKind;

/// Lifecycle of a long-running service
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Error,
}

/// Lifecycle of a one-shot script run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

/// Status of any tracked process. The variant must match the handle's kind:
/// services carry `Service`, scripts and global scripts carry `Script`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcessStatus {
    Service(ServiceStatus),
    Script(ScriptStatus),
}

impl ProcessStatus {
    /// Resting status of a freshly materialised record
    pub fn initial(kind: ProcessKind) -> Self {
        if kind.is_script() {
            ProcessStatus::Script(ScriptStatus::Idle)
        } else {
            ProcessStatus::Service(ServiceStatus::Stopped)
        }
    }

    pub fn matches_kind(&self, kind: ProcessKind) -> bool {
        match self {
            ProcessStatus::Service(_) => !kind.is_script(),
            ProcessStatus::Script(_) => kind.is_script(),
        }
    }

    /// Idle or stopped
    pub fn is_resting(&self) -> bool {
        matches!(
            self,
            ProcessStatus::Service(ServiceStatus::Stopped) | ProcessStatus::Script(ScriptStatus::Idle)
        )
    }

    /// Starting or running: a pid is plausible
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ProcessStatus::Service(ServiceStatus::Starting | ServiceStatus::Running)
                | ProcessStatus::Script(ScriptStatus::Running)
        )
    }

    /// Parse a lowercase status name in the family of `kind`
    pub fn parse(kind: ProcessKind, name: &str) -> Option<Self> {
        let status = if kind.is_script() {
            ProcessStatus::Script(match name {
                "idle" => ScriptStatus::Idle,
                "running" => ScriptStatus::Running,
                "completed" => ScriptStatus::Completed,
                "failed" => ScriptStatus::Failed,
                _ => return None,
            })
        } else {
            ProcessStatus::Service(match name {
                "stopped" => ServiceStatus::Stopped,
                "starting" => ServiceStatus::Starting,
                "running" => ServiceStatus::Running,
                "error" => ServiceStatus::Error,
                _ => return None,
            })
        };
        Some(status)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProcessStatus::Service(ServiceStatus::Stopped) => "stopped",
            ProcessStatus::Service(ServiceStatus::Starting) => "starting",
            ProcessStatus::Service(ServiceStatus::Running) => "running",
            ProcessStatus::Service(ServiceStatus::Error) => "error",
            ProcessStatus::Script(ScriptStatus::Idle) => "idle",
            ProcessStatus::Script(ScriptStatus::Running) => "running",
            ProcessStatus::Script(ScriptStatus::Completed) => "completed",
            ProcessStatus::Script(ScriptStatus::Failed) => "failed",
        }
    }

    pub fn icon(&self) -> &'static str {
        use ProcessStatus::{Script, Service};
        match self {
            Service(ServiceStatus::Stopped) | Script(ScriptStatus::Idle) => "○",
            Service(ServiceStatus::Starting) => "◐",
            Service(ServiceStatus::Running) | Script(ScriptStatus::Running) => "●",
            Script(ScriptStatus::Completed) => "✓",
            Service(ServiceStatus::Error) | Script(ScriptStatus::Failed) => "✗",
        }
    }
}

impl From<ServiceStatus> for ProcessStatus {
    fn from(status: ServiceStatus) -> Self {
        ProcessStatus::Service(status)
    }
}

impl From<ScriptStatus> for ProcessStatus {
    fn from(status: ScriptStatus) -> Self {
        ProcessStatus::Script(status)
    }
}

/// Which output stream a log line came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub stream: LogStream,
    pub content: String,
}

impl LogEntry {
    pub fn new(stream: LogStream, content: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            stream,
            content: content.into(),
        }
    }

    pub fn stdout(content: impl Into<String>) -> Self {
        Self::new(LogStream::Stdout, content)
    }

    pub fn stderr(content: impl Into<String>) -> Self {
        Self::new(LogStream::Stderr, content)
    }
}

/// Launch variant reported alongside a service status
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusExtra {
    #[serde(default)]
    pub active_mode: Option<String>,
    #[serde(default)]
    pub active_arg_preset: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uses_kind_family() {
        assert_eq!(
            ProcessStatus::parse(ProcessKind::Script, "running"),
            Some(ProcessStatus::Script(ScriptStatus::Running))
        );
        assert_eq!(
            ProcessStatus::parse(ProcessKind::Service, "running"),
            Some(ProcessStatus::Service(ServiceStatus::Running))
        );
        assert_eq!(ProcessStatus::parse(ProcessKind::Service, "completed"), None);
    }

    #[test]
    fn test_resting_and_live() {
        let stopped = ProcessStatus::initial(ProcessKind::Service);
        assert!(stopped.is_resting());
        assert!(!stopped.is_live());

        let failed = ProcessStatus::Script(ScriptStatus::Failed);
        assert!(!failed.is_resting());
        assert!(!failed.is_live());
        assert!(failed.matches_kind(ProcessKind::GlobalScript));
        assert!(!failed.matches_kind(ProcessKind::Service));
    }
}
