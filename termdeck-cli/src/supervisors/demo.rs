use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use termdeck_core::EventBus;
use termdeck_core::event::ProcessEvent;
use termdeck_core::handle::TerminalHandle;
use termdeck_core::model::{LogStream, ProcessStatus, ScriptStatus, ServiceStatus};
use termdeck_core::supervisor::{StartRequest, Supervisor, SupervisorError};

/// Config the TUI falls back to when no termdeck.yaml is found
pub const DEMO_CONFIG: &str = r#"
name: demo
services:
  api:
    command: "cargo run --bin api"
    modes:
      release: "cargo run --release --bin api"
    autostart: true
  web:
    command: "npm run dev"
    autostart: true
  worker:
    command: "python worker.py"
scripts:
  migrate:
    command: "./scripts/migrate.sh"
  lint:
    command: "cargo clippy"
global_scripts:
  cleanup:
    command: "rm -rf tmp"
"#;

/// Pretends to run processes: emits canned output on a timer, no real
/// children involved
pub struct DemoSupervisor {
    bus: EventBus,
    tasks: Mutex<BTreeMap<TerminalHandle, JoinHandle<()>>>,
    tick_interval: Duration,
}

impl DemoSupervisor {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            tasks: Mutex::new(BTreeMap::new()),
            tick_interval: Duration::from_millis(600),
        }
    }

    #[allow(dead_code)]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, BTreeMap<TerminalHandle, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn service_line(id: &str, tick: u64) -> String {
    match id {
        "api" => match tick {
            1 => "\x1b[1mlistening on port\x1b[22m 8080".into(),
            t if t % 12 == 7 => {
                format!("\x1b[31merror\x1b[0m session store unreachable, retry {}", t / 12 + 1)
            }
            t if t % 8 == 3 => format!("\x1b[33mwarn\x1b[0m slow query on deck_panes ({}ms)", 300 + t % 7 * 40),
            t => {
                let calls = ["GET /decks 200", "PUT /decks/1/panes 204", "GET /terminals?live=1 200", "POST /runs 202"];
                format!("\x1b[32minfo\x1b[0m {} in {}ms", calls[(t as usize) % calls.len()], 3 + t % 9)
            }
        },
        "web" => {
            if tick == 1 {
                "  \x1b[32m➜\x1b[0m  Local:   \x1b[36mhttp://localhost:\x1b[1m5173\x1b[22m/\x1b[39m".into()
            } else {
                format!("\x1b[2m[vite]\x1b[0m page reload src/panes/Deck.tsx (x{tick})")
            }
        }
        "worker" => {
            if tick % 10 == 5 {
                format!("\x1b[31mfailed\x1b[0m snapshot export #{tick}: disk quota exceeded")
            } else {
                format!("exported deck snapshot #{tick}")
            }
        }
        _ => format!("tick {tick}"),
    }
}

async fn run_service(bus: EventBus, request: StartRequest, handle: TerminalHandle, pid: u32, interval: Duration) {
    tokio::time::sleep(Duration::from_millis(300)).await;
    bus.publish(ProcessEvent::Status {
        handle: handle.clone(),
        status: ServiceStatus::Running.into(),
        pid: Some(pid),
        active_mode: request.mode.clone(),
        active_arg_preset: request.arg_preset.clone(),
    });
    bus.publish(ProcessEvent::log(handle.clone(), LogStream::Stdout, format!("$ {}", request.command)));

    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut n = 0u64;
    loop {
        tick.tick().await;
        n += 1;
        let stream = if n % 12 == 7 { LogStream::Stderr } else { LogStream::Stdout };
        bus.publish(ProcessEvent::log(handle.clone(), stream, service_line(&handle.raw_id, n)));
    }
}

async fn run_script(bus: EventBus, request: StartRequest, handle: TerminalHandle, interval: Duration) {
    bus.publish(ProcessEvent::log(handle.clone(), LogStream::Stdout, format!("$ {}", request.command)));
    for step in 1..=5 {
        tokio::time::sleep(interval).await;
        bus.publish(ProcessEvent::log(
            handle.clone(),
            LogStream::Stdout,
            format!("\x1b[36mstep {step}/5\x1b[0m done"),
        ));
    }
    bus.publish(ProcessEvent::log(
        handle.clone(),
        LogStream::Stdout,
        "see https://example.com/docs for details",
    ));
    bus.publish(ProcessEvent::status(handle.clone(), ScriptStatus::Completed, None));
    bus.publish(ProcessEvent::exit(handle, Some(0), Some(true)));
}

#[async_trait]
impl Supervisor for DemoSupervisor {
    fn name(&self) -> &'static str {
        "demo"
    }

    async fn start(&self, request: StartRequest) -> Result<Option<u32>, SupervisorError> {
        let handle = request.handle.clone().ok_or(SupervisorError::MissingHandle)?;
        if self.is_running(&handle) {
            return Err(SupervisorError::AlreadyRunning(handle));
        }

        let pid = 10_000 + handle.raw_id.len() as u32 * 100;
        let status: ProcessStatus = if handle.kind.is_script() {
            ScriptStatus::Running.into()
        } else {
            ServiceStatus::Starting.into()
        };
        self.bus.publish(ProcessEvent::Status {
            handle: handle.clone(),
            status,
            pid: handle.kind.is_script().then_some(pid),
            active_mode: request.mode.clone(),
            active_arg_preset: request.arg_preset.clone(),
        });

        let bus = self.bus.clone();
        let interval = self.tick_interval;
        let task = if handle.kind.is_script() {
            tokio::spawn(run_script(bus, request, handle.clone(), interval))
        } else {
            tokio::spawn(run_service(bus, request, handle.clone(), pid, interval))
        };
        self.tasks().insert(handle, task);
        Ok(Some(pid))
    }

    async fn stop(&self, handle: &TerminalHandle) -> Result<(), SupervisorError> {
        let task = self
            .tasks()
            .remove(handle)
            .filter(|t| !t.is_finished())
            .ok_or_else(|| SupervisorError::NotRunning(handle.clone()))?;
        task.abort();

        let status: ProcessStatus = if handle.kind.is_script() {
            ScriptStatus::Failed.into()
        } else {
            ServiceStatus::Stopped.into()
        };
        self.bus.publish(ProcessEvent::status(handle.clone(), status, None));
        let success = handle.kind.is_script().then_some(false);
        self.bus.publish(ProcessEvent::exit(handle.clone(), Some(143), success));
        Ok(())
    }

    async fn stop_all(&self) {
        let tasks = std::mem::take(&mut *self.tasks());
        for (handle, task) in tasks {
            tracing::debug!(%handle, "stopping demo task");
            task.abort();
        }
    }

    fn is_running(&self, handle: &TerminalHandle) -> bool {
        self.tasks().get(handle).is_some_and(|t| !t.is_finished())
    }
}
