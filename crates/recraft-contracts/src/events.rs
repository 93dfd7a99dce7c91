use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type EventDetails = Map<String, Value>;

/// One line of the event log.
///
/// `details` is flattened into the top-level object, so a line looks like
/// `{"type":"operation_finished","session":"…","node":"RecraftInpainter","ts":"…","url":"…"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub session: String,
    pub node: String,
    pub ts: String,
    #[serde(flatten)]
    pub details: EventDetails,
}

/// Append-only JSONL log shared by every node run in a session.
#[derive(Debug, Clone)]
pub struct EventLog {
    inner: Arc<EventLogInner>,
}

#[derive(Debug)]
struct EventLogInner {
    path: PathBuf,
    session: String,
    lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, session: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventLogInner {
                path: path.into(),
                session: session.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session(&self) -> &str {
        &self.inner.session
    }

    pub fn record(&self, kind: &str, node: &str, details: EventDetails) -> anyhow::Result<NodeEvent> {
        let event = NodeEvent {
            kind: kind.to_string(),
            session: self.inner.session.clone(),
            node: node.to_string(),
            ts: now_utc_iso(),
            details,
        };

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(event)
    }

    /// Reads every event back, skipping blank lines.
    pub fn read_all(path: &Path) -> anyhow::Result<Vec<NodeEvent>> {
        let raw = std::fs::read_to_string(path)?;
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(anyhow::Error::from))
            .collect()
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
