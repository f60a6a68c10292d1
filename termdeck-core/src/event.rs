use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::handle::TerminalHandle;
use crate::model::{LogEntry, LogStream, ProcessStatus, StatusExtra};

/// What a process supervisor reports about one handle
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProcessEvent {
    Log {
        handle: TerminalHandle,
        stream: LogStream,
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    Status {
        handle: TerminalHandle,
        status: ProcessStatus,
        pid: Option<u32>,
        active_mode: Option<String>,
        active_arg_preset: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Exit {
        handle: TerminalHandle,
        exit_code: Option<i32>,
        success: Option<bool>,
    },
}

impl ProcessEvent {
    pub fn log(handle: TerminalHandle, stream: LogStream, content: impl Into<String>) -> Self {
        ProcessEvent::Log {
            handle,
            stream,
            content: content.into(),
        }
    }

    pub fn status(handle: TerminalHandle, status: impl Into<ProcessStatus>, pid: Option<u32>) -> Self {
        ProcessEvent::Status {
            handle,
            status: status.into(),
            pid,
            active_mode: None,
            active_arg_preset: None,
        }
    }

    pub fn exit(handle: TerminalHandle, exit_code: Option<i32>, success: Option<bool>) -> Self {
        ProcessEvent::Exit {
            handle,
            exit_code,
            success,
        }
    }

    pub fn handle(&self) -> &TerminalHandle {
        match self {
            ProcessEvent::Log { handle, .. }
            | ProcessEvent::Status { handle, .. }
            | ProcessEvent::Exit { handle, .. } => handle,
        }
    }

    /// A status that begins a new run
    pub fn starts_run(&self) -> bool {
        matches!(self, ProcessEvent::Status { status, .. } if status.is_live())
    }

    pub(crate) fn status_extra(&self) -> Option<StatusExtra> {
        match self {
            ProcessEvent::Status {
                active_mode,
                active_arg_preset,
                ..
            } if active_mode.is_some() || active_arg_preset.is_some() => Some(StatusExtra {
                active_mode: active_mode.clone(),
                active_arg_preset: active_arg_preset.clone(),
            }),
            _ => None,
        }
    }

    pub(crate) fn log_entry(&self, at: SystemTime) -> Option<LogEntry> {
        match self {
            ProcessEvent::Log {
                stream, content, ..
            } => Some(LogEntry {
                timestamp: at,
                stream: *stream,
                content: content.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventEnvelope {
    pub id: u64,
    pub at: SystemTime,
    pub event: ProcessEvent,
}

impl EventEnvelope {
    /// Envelope stamped now, for callers outside a bus
    pub fn now(id: u64, event: ProcessEvent) -> Self {
        Self {
            id,
            at: SystemTime::now(),
            event,
        }
    }
}

/// Fan-out of process events to any number of subscribers
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Stamp and send. Returns the envelope id; events with no subscriber are dropped.
    pub fn publish(&self, event: ProcessEvent) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(EventEnvelope::now(id, event));
        id
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: Some(self.tx.subscribe()),
        }
    }

    pub fn sender(&self) -> broadcast::Sender<EventEnvelope> {
        self.tx.clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Receiving end of the bus. Dropping it or calling `unsubscribe` stops delivery.
#[derive(Debug)]
pub struct EventSubscription {
    rx: Option<broadcast::Receiver<EventEnvelope>>,
}

impl EventSubscription {
    pub fn from_receiver(rx: broadcast::Receiver<EventEnvelope>) -> Self {
        Self { rx: Some(rx) }
    }

    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }

    /// Safe to call any number of times
    pub fn unsubscribe(&mut self) {
        if self.rx.take().is_some() {
            tracing::debug!("event subscription closed");
        }
    }

    /// Next event, or `None` once unsubscribed or the bus is gone. Lagging
    /// skips the lost events with a warning.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        loop {
            let rx = self.rx.as_mut()?;
            match rx.recv().await {
                Ok(env) => return Some(env),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    /// Non-blocking variant of `recv`
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        loop {
            let rx = self.rx.as_mut()?;
            match rx.try_recv() {
                Ok(env) => return Some(env),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event subscriber lagged");
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }
}
