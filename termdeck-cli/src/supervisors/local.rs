use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use termdeck_core::EventBus;
use termdeck_core::event::ProcessEvent;
use termdeck_core::handle::TerminalHandle;
use termdeck_core::model::{LogStream, ProcessStatus, ScriptStatus, ServiceStatus};
use termdeck_core::supervisor::{StartRequest, Supervisor, SupervisorError};

const DEFAULT_GRACE: Duration = Duration::from_millis(1500);
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

struct ProcessHandle {
    pgid: i32,
    stopping: Arc<AtomicBool>,
    exited: watch::Receiver<bool>,
}

type ProcessTable = Arc<Mutex<BTreeMap<TerminalHandle, ProcessHandle>>>;

/// Runs commands through `sh -c` on this machine, one session per process so
/// the whole tree can be signalled.
pub struct LocalSupervisor {
    bus: EventBus,
    processes: ProcessTable,
    grace: Duration,
}

impl LocalSupervisor {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            processes: Arc::new(Mutex::new(BTreeMap::new())),
            grace: DEFAULT_GRACE,
        }
    }

    #[allow(dead_code)]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn table(&self) -> std::sync::MutexGuard<'_, BTreeMap<TerminalHandle, ProcessHandle>> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_status(&self, request: &StartRequest, handle: &TerminalHandle, status: ProcessStatus, pid: Option<u32>) {
        self.bus.publish(ProcessEvent::Status {
            handle: handle.clone(),
            status,
            pid,
            active_mode: request.mode.clone(),
            active_arg_preset: request.arg_preset.clone(),
        });
    }
}

fn live_status(handle: &TerminalHandle, starting: bool) -> ProcessStatus {
    match (handle.kind.is_script(), starting) {
        (true, _) => ScriptStatus::Running.into(),
        (false, true) => ServiceStatus::Starting.into(),
        (false, false) => ServiceStatus::Running.into(),
    }
}

fn failed_status(handle: &TerminalHandle) -> ProcessStatus {
    if handle.kind.is_script() {
        ScriptStatus::Failed.into()
    } else {
        ServiceStatus::Error.into()
    }
}

/// Final status once the process is gone. Scripts that were stopped count as
/// failed; services always come to rest as stopped.
fn exit_status(handle: &TerminalHandle, success: bool, stopped: bool) -> ProcessStatus {
    if !handle.kind.is_script() {
        ServiceStatus::Stopped.into()
    } else if success && !stopped {
        ScriptStatus::Completed.into()
    } else {
        ScriptStatus::Failed.into()
    }
}

fn spawn_reader<R>(bus: EventBus, handle: TerminalHandle, stream: LogStream, pipe: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    bus.publish(ProcessEvent::log(handle.clone(), stream, line));
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(%handle, error = %e, "output stream closed");
                    break;
                }
            }
        }
    })
}

fn signal_group(pgid: i32, signal: i32) {
    if pgid > 0 {
        // SAFETY: plain syscall on a process group id we created with setsid
        unsafe {
            libc::killpg(pgid, signal);
        }
    }
}

#[async_trait]
impl Supervisor for LocalSupervisor {
    fn name(&self) -> &'static str {
        "local-process"
    }

    async fn start(&self, request: StartRequest) -> Result<Option<u32>, SupervisorError> {
        let handle = request.handle.clone().ok_or(SupervisorError::MissingHandle)?;
        if self.is_running(&handle) {
            return Err(SupervisorError::AlreadyRunning(handle));
        }
        if request.command.trim().is_empty() {
            return Err(SupervisorError::SpawnFailed {
                handle,
                message: "empty command".into(),
            });
        }

        self.publish_status(&request, &handle, live_status(&handle, true), None);

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&request.command);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &request.env {
            cmd.env(k, v);
        }

        // own session, so stop can signal the whole tree
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(%handle, error = %message, "spawn failed");
                self.bus.publish(ProcessEvent::log(
                    handle.clone(),
                    LogStream::Stderr,
                    format!("failed to start: {message}"),
                ));
                self.publish_status(&request, &handle, failed_status(&handle), None);
                return Err(SupervisorError::SpawnFailed { handle, message });
            }
        };

        let pid = child.id();
        let pgid = pid.map(|p| p as i32).unwrap_or(-1);

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(self.bus.clone(), handle.clone(), LogStream::Stdout, stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(self.bus.clone(), handle.clone(), LogStream::Stderr, stderr));
        }

        let stopping = Arc::new(AtomicBool::new(false));
        let (exited_tx, exited_rx) = watch::channel(false);
        self.table().insert(
            handle.clone(),
            ProcessHandle {
                pgid,
                stopping: stopping.clone(),
                exited: exited_rx,
            },
        );

        tracing::info!(%handle, ?pid, command = %request.command, "process started");
        self.publish_status(&request, &handle, live_status(&handle, false), pid);

        let bus = self.bus.clone();
        let table = self.processes.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            for reader in readers {
                let _ = tokio::time::timeout(DRAIN_TIMEOUT, reader).await;
            }
            table
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&handle);

            let stopped = stopping.load(Ordering::SeqCst);
            let (code, success) = match status {
                Ok(status) => (status.code(), status.success()),
                Err(e) => {
                    tracing::warn!(%handle, error = %e, "wait failed");
                    (None, false)
                }
            };
            tracing::info!(%handle, ?code, stopped, "process exited");

            bus.publish(ProcessEvent::status(
                handle.clone(),
                exit_status(&handle, success, stopped),
                None,
            ));
            let success = handle.kind.is_script().then_some(success && !stopped);
            bus.publish(ProcessEvent::exit(handle, code, success));
            let _ = exited_tx.send(true);
        });

        Ok(pid)
    }

    async fn stop(&self, handle: &TerminalHandle) -> Result<(), SupervisorError> {
        let (pgid, mut exited) = {
            let table = self.table();
            let process = table
                .get(handle)
                .ok_or_else(|| SupervisorError::NotRunning(handle.clone()))?;
            process.stopping.store(true, Ordering::SeqCst);
            (process.pgid, process.exited.clone())
        };

        if pgid <= 0 {
            return Err(SupervisorError::StopFailed {
                handle: handle.clone(),
                message: "no process group".into(),
            });
        }

        tracing::debug!(%handle, pgid, "sending SIGTERM");
        signal_group(pgid, libc::SIGTERM);

        let graceful = tokio::time::timeout(self.grace, exited.wait_for(|done| *done))
            .await
            .is_ok();
        if !graceful {
            tracing::debug!(%handle, pgid, "grace period over, sending SIGKILL");
            signal_group(pgid, libc::SIGKILL);
            let _ = tokio::time::timeout(self.grace, exited.wait_for(|done| *done)).await;
        }
        Ok(())
    }

    async fn stop_all(&self) {
        let handles: Vec<TerminalHandle> = self.table().keys().cloned().collect();
        for handle in handles {
            if let Err(e) = self.stop(&handle).await {
                tracing::warn!(%handle, error = %e, "stop failed during shutdown");
            }
        }
    }

    fn is_running(&self, handle: &TerminalHandle) -> bool {
        self.table().contains_key(handle)
    }
}
