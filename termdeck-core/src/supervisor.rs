use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::handle::TerminalHandle;

/// Everything a supervisor needs to launch one process
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StartRequest {
    pub handle: Option<TerminalHandle>,
    /// Shell command line, already resolved from mode, extra args and preset
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub mode: Option<String>,
    pub arg_preset: Option<String>,
}

impl StartRequest {
    pub fn new(handle: TerminalHandle, command: impl Into<String>) -> Self {
        Self {
            handle: Some(handle),
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_mode(mut self, mode: Option<String>, arg_preset: Option<String>) -> Self {
        self.mode = mode;
        self.arg_preset = arg_preset;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SupervisorError {
    #[error("{0} is not configured")]
    NotFound(TerminalHandle),
    #[error("start request has no handle")]
    MissingHandle,
    #[error("{0} is already running")]
    AlreadyRunning(TerminalHandle),
    #[error("{0} is not running")]
    NotRunning(TerminalHandle),
    #[error("failed to spawn {handle}: {message}")]
    SpawnFailed {
        handle: TerminalHandle,
        message: String,
    },
    #[error("failed to stop {handle}: {message}")]
    StopFailed {
        handle: TerminalHandle,
        message: String,
    },
}

/// Owner of real processes. Reports what happens to them as `ProcessEvent`s on
/// its event bus; the workspace only ever sees those events.
///
/// `start` resolves with the pid once the process is spawned (`None` when the
/// backend has no pid to give). Implementations must emit `starting` before
/// and `running` after a successful spawn.
#[async_trait]
pub trait Supervisor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn start(&self, request: StartRequest) -> Result<Option<u32>, SupervisorError>;

    async fn stop(&self, handle: &TerminalHandle) -> Result<(), SupervisorError>;

    /// Stop everything; used on shutdown
    async fn stop_all(&self);

    fn is_running(&self, handle: &TerminalHandle) -> bool;
}
