//! Runtime registry
//!
//! One `RuntimeRecord` per tracked process, keyed by `TerminalHandle`. Records
//! are materialised lazily on the first status or log line and only removed by
//! an explicit `forget`.

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use crate::handle::TerminalHandle;
use crate::model::{LogEntry, ProcessStatus, ServiceStatus, StatusExtra};
use crate::port::sniff_port;

pub const DEFAULT_LOG_CAPACITY: usize = 1000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeRecord {
    pub status: ProcessStatus,
    pub pid: Option<u32>,
    pub logs: VecDeque<LogEntry>,
    pub detected_port: Option<u16>,
    pub active_mode: Option<String>,
    pub active_arg_preset: Option<String>,
    pub last_exit_code: Option<i32>,
    pub last_success: Option<bool>,
}

impl RuntimeRecord {
    fn new(status: ProcessStatus) -> Self {
        Self {
            status,
            pid: None,
            logs: VecDeque::new(),
            detected_port: None,
            active_mode: None,
            active_arg_preset: None,
            last_exit_code: None,
            last_success: None,
        }
    }

    /// Has output, or a status other than idle/stopped
    pub fn is_active(&self) -> bool {
        !self.logs.is_empty() || !self.status.is_resting()
    }
}

#[derive(Clone, Debug)]
pub struct RuntimeRegistry {
    log_capacity: usize,
    records: BTreeMap<TerminalHandle, RuntimeRecord>,
}

impl Default for RuntimeRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl RuntimeRegistry {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            log_capacity: log_capacity.max(1),
            records: BTreeMap::new(),
        }
    }

    pub fn log_capacity(&self) -> usize {
        self.log_capacity
    }

    fn entry(&mut self, handle: &TerminalHandle) -> &mut RuntimeRecord {
        self.records
            .entry(handle.clone())
            .or_insert_with(|| RuntimeRecord::new(ProcessStatus::initial(handle.kind)))
    }

    /// Record a status transition. Returns false when the status family does
    /// not fit the handle kind; such updates are dropped.
    pub fn upsert_status(
        &mut self,
        handle: &TerminalHandle,
        status: ProcessStatus,
        pid: Option<u32>,
        extra: Option<StatusExtra>,
    ) -> bool {
        if !status.matches_kind(handle.kind) {
            tracing::warn!(%handle, status = status.label(), "ignoring status for wrong process kind");
            return false;
        }

        let record = self.entry(handle);
        let was_live = record.status.is_live();
        record.status = status;

        if status.is_live() {
            if !was_live {
                // fresh run
                record.detected_port = None;
                record.last_exit_code = None;
                record.last_success = None;
            }
            if pid.is_some() {
                record.pid = pid;
            }
            if let Some(extra) = extra {
                if !handle.kind.is_script() {
                    record.active_mode = extra.active_mode;
                    record.active_arg_preset = extra.active_arg_preset;
                }
            }
        } else {
            record.pid = None;
        }

        if status == ProcessStatus::Service(ServiceStatus::Stopped) {
            record.detected_port = None;
            record.active_mode = None;
            record.active_arg_preset = None;
        }

        true
    }

    /// Append a log entry, keeping only the newest `log_capacity` entries.
    /// Returns the port if this entry is the one that revealed it.
    pub fn append_log(&mut self, handle: &TerminalHandle, entry: LogEntry) -> Option<u16> {
        let capacity = self.log_capacity;
        let record = self.entry(handle);

        let sniffed = match record.detected_port {
            None => sniff_port(&entry.content),
            Some(_) => None,
        };
        if let Some(port) = sniffed {
            tracing::debug!(%handle, port, "detected listening port");
            record.detected_port = Some(port);
        }

        record.logs.push_back(entry);
        while record.logs.len() > capacity {
            record.logs.pop_front();
        }

        sniffed
    }

    pub fn clear_logs(&mut self, handle: &TerminalHandle) {
        self.entry(handle).logs.clear();
    }

    pub fn set_exit_result(
        &mut self,
        handle: &TerminalHandle,
        exit_code: Option<i32>,
        success: Option<bool>,
    ) {
        let record = self.entry(handle);
        record.last_exit_code = exit_code;
        record.last_success = success;
    }

    /// Drop the record entirely
    pub fn forget(&mut self, handle: &TerminalHandle) -> Option<RuntimeRecord> {
        self.records.remove(handle)
    }

    pub fn get(&self, handle: &TerminalHandle) -> Option<&RuntimeRecord> {
        self.records.get(handle)
    }

    pub fn contains(&self, handle: &TerminalHandle) -> bool {
        self.records.contains_key(handle)
    }

    pub fn is_active(&self, handle: &TerminalHandle) -> bool {
        self.records.get(handle).is_some_and(RuntimeRecord::is_active)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TerminalHandle, &RuntimeRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Owned copy for readers that outlive the next mutation
    pub fn snapshot(&self) -> RuntimeRegistry {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScriptStatus;
    use proptest::prelude::*;

    fn api() -> TerminalHandle {
        TerminalHandle::service("api")
    }

    fn running(pid: u32, mode: &str) -> (ProcessStatus, Option<u32>, Option<StatusExtra>) {
        (
            ServiceStatus::Running.into(),
            Some(pid),
            Some(StatusExtra {
                active_mode: Some(mode.to_string()),
                active_arg_preset: None,
            }),
        )
    }

    #[test]
    fn test_lazy_materialisation() {
        let mut reg = RuntimeRegistry::default();
        reg.append_log(&api(), LogEntry::stdout("hello"));
        let rec = reg.get(&api()).unwrap();
        assert_eq!(rec.status, ProcessStatus::Service(ServiceStatus::Stopped));
        assert_eq!(rec.logs.len(), 1);
        assert!(rec.is_active());

        reg.clear_logs(&TerminalHandle::script("fresh"));
        let rec = reg.get(&TerminalHandle::script("fresh")).unwrap();
        assert_eq!(rec.status, ProcessStatus::Script(ScriptStatus::Idle));
        assert!(!rec.is_active());
    }

    #[test]
    fn test_stop_clears_run_state_but_keeps_logs() {
        let mut reg = RuntimeRegistry::default();
        let (status, pid, extra) = running(42, "dev");
        reg.upsert_status(&api(), status, pid, extra);
        reg.append_log(&api(), LogEntry::stdout("listening on port 3000"));

        let rec = reg.get(&api()).unwrap();
        assert_eq!(rec.pid, Some(42));
        assert_eq!(rec.detected_port, Some(3000));
        assert_eq!(rec.active_mode.as_deref(), Some("dev"));

        reg.upsert_status(&api(), ServiceStatus::Stopped.into(), None, None);
        let rec = reg.get(&api()).unwrap();
        assert_eq!(rec.pid, None);
        assert_eq!(rec.detected_port, None);
        assert_eq!(rec.active_mode, None);
        assert_eq!(rec.logs.len(), 1);
    }

    #[test]
    fn test_port_is_sticky_within_a_run() {
        let mut reg = RuntimeRegistry::default();
        reg.upsert_status(&api(), ServiceStatus::Running.into(), Some(1), None);
        assert_eq!(reg.append_log(&api(), LogEntry::stdout("port 3000")), Some(3000));
        assert_eq!(reg.append_log(&api(), LogEntry::stdout("port 4000")), None);
        assert_eq!(reg.get(&api()).unwrap().detected_port, Some(3000));
    }

    #[test]
    fn test_pid_survives_running_update_without_pid() {
        let mut reg = RuntimeRegistry::default();
        reg.upsert_status(&api(), ServiceStatus::Starting.into(), Some(7), None);
        reg.upsert_status(&api(), ServiceStatus::Running.into(), None, None);
        assert_eq!(reg.get(&api()).unwrap().pid, Some(7));
    }

    #[test]
    fn test_wrong_family_is_ignored() {
        let mut reg = RuntimeRegistry::default();
        assert!(!reg.upsert_status(&api(), ScriptStatus::Running.into(), Some(1), None));
        assert!(reg.get(&api()).is_none());
    }

    #[test]
    fn test_script_exit_result_kept_until_rerun() {
        let mut reg = RuntimeRegistry::default();
        let job = TerminalHandle::script("migrate");
        reg.upsert_status(&job, ScriptStatus::Running.into(), Some(9), None);
        reg.upsert_status(&job, ScriptStatus::Failed.into(), None, None);
        reg.set_exit_result(&job, Some(2), Some(false));

        let rec = reg.get(&job).unwrap();
        assert_eq!(rec.last_exit_code, Some(2));
        assert_eq!(rec.last_success, Some(false));
        assert_eq!(rec.pid, None);

        reg.upsert_status(&job, ScriptStatus::Running.into(), Some(10), None);
        let rec = reg.get(&job).unwrap();
        assert_eq!(rec.last_exit_code, None);
        assert_eq!(rec.last_success, None);
    }

    #[test]
    fn test_forget_removes_record() {
        let mut reg = RuntimeRegistry::default();
        reg.append_log(&api(), LogEntry::stderr("boom"));
        assert!(reg.forget(&api()).is_some());
        assert!(!reg.contains(&api()));
        assert!(reg.forget(&api()).is_none());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut reg = RuntimeRegistry::default();
        reg.append_log(&api(), LogEntry::stdout("a"));
        let snap = reg.snapshot();
        reg.append_log(&api(), LogEntry::stdout("b"));
        assert_eq!(snap.get(&api()).unwrap().logs.len(), 1);
        assert_eq!(reg.get(&api()).unwrap().logs.len(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_log_buffer_is_bounded_and_fifo(count in 0usize..2_500, cap in 1usize..1_200) {
            let mut reg = RuntimeRegistry::new(cap);
            for i in 0..count {
                reg.append_log(&api(), LogEntry::stdout(format!("line {i}")));
            }
            let logs = reg.get(&api()).map(|r| r.logs.len()).unwrap_or(0);
            prop_assert_eq!(logs, count.min(cap));
            if count > 0 {
                let last = reg.get(&api()).unwrap().logs.back().unwrap().content.clone();
                prop_assert_eq!(last, format!("line {}", count - 1));
            }
        }
    }
}
