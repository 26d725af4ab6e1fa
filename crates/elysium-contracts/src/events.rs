use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Session event log: one compact JSON object per line.
///
/// Every line carries `type`, `session_id` and `ts`; payload keys are merged
/// last. A server holds one root writer and hands each connection a
/// [`EventWriter::scoped`] copy tagged with that connection's session id.
/// Scoped copies share the sink lock, so lines from concurrent sessions are
/// never torn and each session's own events stay in emit order.
#[derive(Debug, Clone)]
pub struct EventWriter {
    sink: Arc<EventSink>,
    session_id: String,
}

#[derive(Debug)]
struct EventSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            sink: Arc::new(EventSink {
                path: path.into(),
                lock: Mutex::new(()),
            }),
            session_id: session_id.into(),
        }
    }

    pub fn scoped(&self, session_id: impl Into<String>) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            session_id: session_id.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.sink.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(event_type.to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.session_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            event.insert(key, value);
        }

        if let Some(parent) = self.sink.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        let _guard = self
            .sink
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.sink.path)?;
        file.write_all(line.as_bytes())?;

        Ok(Value::Object(event))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
