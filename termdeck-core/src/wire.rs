//! JSON event lines
//!
//! Supervisors that live in another process report events as one JSON object
//! per line: `{"event": "service-log", "payload": {"serviceId": "api", ...}}`.
//! Event names are `<kind>-<log|status|exit>` with kind `service`, `script` or
//! `global-script`; services are keyed by `serviceId`, scripts by `scriptId`.

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::event::ProcessEvent;
use crate::handle::{ProcessKind, TerminalHandle};
use crate::model::{LogStream, ProcessStatus};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("{event}: missing field '{field}'")]
    MissingField { event: String, field: &'static str },
    #[error("{event}: unknown status '{status}'")]
    UnknownStatus { event: String, status: String },
}

#[derive(Deserialize)]
struct WireMessage {
    event: String,
    #[serde(default)]
    payload: Payload,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    service_id: Option<String>,
    script_id: Option<String>,
    stream: Option<LogStream>,
    content: Option<String>,
    status: Option<String>,
    pid: Option<u32>,
    active_mode: Option<String>,
    active_arg_preset: Option<String>,
    exit_code: Option<i32>,
    success: Option<bool>,
}

#[derive(Clone, Copy)]
enum Stage {
    Log,
    Status,
    Exit,
}

fn split_event_name(name: &str) -> Option<(ProcessKind, Stage)> {
    let (kind, stage) = name.rsplit_once('-')?;
    let kind = match kind {
        "service" => ProcessKind::Service,
        "script" => ProcessKind::Script,
        "global-script" => ProcessKind::GlobalScript,
        _ => return None,
    };
    let stage = match stage {
        "log" => Stage::Log,
        "status" => Stage::Status,
        "exit" => Stage::Exit,
        _ => return None,
    };
    Some((kind, stage))
}

/// Decode one line into an event
pub fn decode_line(line: &str) -> Result<ProcessEvent, WireError> {
    let msg: WireMessage = serde_json::from_str(line)?;
    let (kind, stage) =
        split_event_name(&msg.event).ok_or_else(|| WireError::UnknownEvent(msg.event.clone()))?;

    let p = msg.payload;
    let missing = |field| WireError::MissingField {
        event: msg.event.clone(),
        field,
    };

    let (id, id_field) = match kind {
        ProcessKind::Service => (p.service_id, "serviceId"),
        ProcessKind::Script | ProcessKind::GlobalScript => (p.script_id, "scriptId"),
    };
    let handle = TerminalHandle::new(kind, id.ok_or_else(|| missing(id_field))?);

    let event = match stage {
        Stage::Log => ProcessEvent::Log {
            handle,
            stream: p.stream.ok_or_else(|| missing("stream"))?,
            content: p.content.ok_or_else(|| missing("content"))?,
        },
        Stage::Status => {
            let name = p.status.ok_or_else(|| missing("status"))?;
            let status =
                ProcessStatus::parse(kind, &name).ok_or_else(|| WireError::UnknownStatus {
                    event: msg.event.clone(),
                    status: name.clone(),
                })?;
            ProcessEvent::Status {
                handle,
                status,
                pid: p.pid,
                active_mode: p.active_mode,
                active_arg_preset: p.active_arg_preset,
            }
        }
        Stage::Exit => ProcessEvent::Exit {
            handle,
            exit_code: p.exit_code,
            success: p.success,
        },
    };
    Ok(event)
}

/// Decode every non-blank line, keeping errors in place with their line number
pub fn decode_lines(text: &str) -> Vec<(usize, Result<ProcessEvent, WireError>)> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| (i + 1, decode_line(line)))
        .collect()
}

/// Encode an event in the same line format
pub fn encode(event: &ProcessEvent) -> Value {
    let handle = event.handle();
    let stage = match event {
        ProcessEvent::Log { .. } => "log",
        ProcessEvent::Status { .. } => "status",
        ProcessEvent::Exit { .. } => "exit",
    };

    let mut payload = Map::new();
    let id_field = if handle.kind.is_script() { "scriptId" } else { "serviceId" };
    payload.insert(id_field.into(), json!(handle.raw_id));

    match event {
        ProcessEvent::Log {
            stream, content, ..
        } => {
            payload.insert("stream".into(), json!(stream));
            payload.insert("content".into(), json!(content));
        }
        ProcessEvent::Status {
            status,
            pid,
            active_mode,
            active_arg_preset,
            ..
        } => {
            payload.insert("status".into(), json!(status.label()));
            payload.insert("pid".into(), json!(pid));
            if !handle.kind.is_script() {
                payload.insert("activeMode".into(), json!(active_mode));
                payload.insert("activeArgPreset".into(), json!(active_arg_preset));
            }
        }
        ProcessEvent::Exit {
            exit_code, success, ..
        } => {
            payload.insert("exitCode".into(), json!(exit_code));
            if handle.kind.is_script() {
                payload.insert("success".into(), json!(success.unwrap_or(false)));
            }
        }
    }

    json!({
        "event": format!("{}-{}", handle.kind.label(), stage),
        "payload": payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ScriptStatus, ServiceStatus};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_service_status() {
        let line = r#"{"event":"service-status","payload":{"serviceId":"api","status":"running","pid":42,"activeMode":"dev","activeArgPreset":null}}"#;
        assert_eq!(
            decode_line(line).unwrap(),
            ProcessEvent::Status {
                handle: TerminalHandle::service("api"),
                status: ServiceStatus::Running.into(),
                pid: Some(42),
                active_mode: Some("dev".into()),
                active_arg_preset: None,
            }
        );
    }

    #[test]
    fn test_decode_global_script_events() {
        let log = r#"{"event":"global-script-log","payload":{"scriptId":"clean","stream":"stderr","content":"rm: denied"}}"#;
        assert_eq!(
            decode_line(log).unwrap(),
            ProcessEvent::log(TerminalHandle::global_script("clean"), LogStream::Stderr, "rm: denied")
        );

        let status = r#"{"event":"global-script-status","payload":{"scriptId":"clean","status":"running","pid":null}}"#;
        assert_eq!(
            decode_line(status).unwrap(),
            ProcessEvent::status(TerminalHandle::global_script("clean"), ScriptStatus::Running, None)
        );

        let exit = r#"{"event":"global-script-exit","payload":{"scriptId":"clean","exitCode":1,"success":false}}"#;
        assert_eq!(
            decode_line(exit).unwrap(),
            ProcessEvent::exit(TerminalHandle::global_script("clean"), Some(1), Some(false))
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode_line("nope"), Err(WireError::Json(_))));
        assert!(matches!(
            decode_line(r#"{"event":"service-restart","payload":{}}"#),
            Err(WireError::UnknownEvent(_))
        ));
        assert!(matches!(
            decode_line(r#"{"event":"script-log","payload":{"serviceId":"x","stream":"stdout","content":""}}"#),
            Err(WireError::MissingField { field: "scriptId", .. })
        ));
        assert!(matches!(
            decode_line(r#"{"event":"service-status","payload":{"serviceId":"x","status":"completed"}}"#),
            Err(WireError::UnknownStatus { .. })
        ));
    }

    #[test]
    fn test_encode_matches_decode() {
        let event = ProcessEvent::exit(TerminalHandle::script("migrate"), Some(0), Some(true));
        let line = encode(&event).to_string();
        assert!(line.contains(r#""event":"script-exit""#));
        assert_eq!(decode_line(&line).unwrap(), event);
    }

    #[test]
    fn test_decode_lines_reports_line_numbers() {
        let text = "\n{\"event\":\"service-exit\",\"payload\":{\"serviceId\":\"a\",\"exitCode\":0}}\nbad\n";
        let decoded = decode_lines(text);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].0, 2);
        assert!(decoded[0].1.is_ok());
        assert_eq!(decoded[1].0, 3);
        assert!(decoded[1].1.is_err());
    }
}
