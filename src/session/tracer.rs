//! Append-only structured event log keyed by run/span IDs.
//!
//! Grounded 1:1 on the original `tracer.py`: a single mutex guards
//! appends to `trace.jsonl`, `new_run_id` mints a short hex identifier,
//! `emit` stamps every line with `{ts, event, run_id, ...payload}`.

use rand::Rng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct Tracer {
    path: PathBuf,
    lock: Mutex<()>,
    run_id: Mutex<Option<String>>,
}

impl Tracer {
    pub fn new(trace_path: impl Into<PathBuf>) -> Self {
        Tracer {
            path: trace_path.into(),
            lock: Mutex::new(()),
            run_id: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A short hex identifier, distinct enough to correlate one run's or
    /// one sub-agent span's events without needing a full UUID.
    pub fn new_run_id() -> String {
        let mut rng = rand::thread_rng();
        let bytes: [u8; 4] = rng.gen();
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn set_run_id(&self, run_id: impl Into<String>) {
        *self.run_id.lock().unwrap() = Some(run_id.into());
    }

    pub fn run_id(&self) -> Option<String> {
        self.run_id.lock().unwrap().clone()
    }

    /// Write one JSON line: `{ts, event, run_id, ...payload}`.
    pub fn emit(&self, event_type: &str, payload: serde_json::Value) {
        #[derive(Serialize)]
        struct Line {
            ts: f64,
            event: String,
            run_id: Option<String>,
            #[serde(flatten)]
            payload: serde_json::Value,
        }

        let line = Line {
            ts: now_secs(),
            event: event_type.to_string(),
            run_id: self.run_id(),
            payload,
        };

        let Ok(serialized) = serde_json::to_string(&line) else {
            tracing::warn!(event = event_type, "failed to serialize trace event");
            return;
        };

        let _guard = self.lock.lock().unwrap();
        if let Some(parent) = self.path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                tracing::warn!(path = %self.path.display(), "failed to create trace directory");
                return;
            }
        }
        use std::io::Write;
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        {
            Ok(mut f) => {
                if let Err(e) = writeln!(f, "{serialized}") {
                    tracing::warn!(error = %e, "failed to append trace event");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to open trace log"),
        }
    }
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn emit_writes_one_json_line_per_call() {
        let tmp = TempDir::new().unwrap();
        let tracer = Tracer::new(tmp.path().join("trace.jsonl"));
        tracer.set_run_id("abc12345");
        tracer.emit("run.start", serde_json::json!({"prompt": "hi"}));
        tracer.emit("run.end", serde_json::json!({"turns": 1}));

        let contents = std::fs::read_to_string(tmp.path().join("trace.jsonl")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "run.start");
        assert_eq!(first["run_id"], "abc12345");
        assert_eq!(first["prompt"], "hi");
    }

    #[test]
    fn new_run_id_is_eight_hex_chars() {
        let id = Tracer::new_run_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
