//! Debug tracing for tool calls and Analytics API traffic.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::truncate_message;

const MAX_JSON_LEN: usize = 1000;
const MAX_BODY_LEN: usize = 500;

/// Debug logger: mirrors records to `tracing` and, when enabled, to a trace file.
pub struct DebugLogger {
    enabled: bool,
    trace_file: Option<Mutex<File>>,
    trace_path: Option<PathBuf>,
}

impl DebugLogger {
    /// Logger writing to a fresh trace file under the temp dir when `enabled`.
    pub fn new(enabled: bool) -> Self {
        let (trace_file, trace_path) = if enabled {
            let timestamp = Local::now().format("%Y%m%d_%H%M%S");
            let path =
                std::env::temp_dir().join(format!("ga4_reports_mcp_trace_{}.log", timestamp));
            match OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)
            {
                Ok(file) => (Some(Mutex::new(file)), Some(path)),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create trace file");
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        Self {
            enabled,
            trace_file,
            trace_path,
        }
    }

    /// A logger that records nothing.
    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn trace_path(&self) -> Option<&PathBuf> {
        self.trace_path.as_ref()
    }

    /// Free-form startup and lifecycle notes.
    pub fn log(&self, message: &str) {
        self.record("note", message);
    }

    pub fn log_tool_call(&self, tool_name: &str, params: &serde_json::Value) {
        self.record(
            "call",
            &format!("{} {}", tool_name, truncate_json(params, MAX_JSON_LEN)),
        );
    }

    pub fn log_tool_result(&self, tool_name: &str, result: &serde_json::Value) {
        self.record(
            "result",
            &format!("{} {}", tool_name, truncate_json(result, MAX_JSON_LEN)),
        );
    }

    pub fn log_error(&self, context: &str, error: &str) {
        self.record("error", &format!("{} {}", context, error));
    }

    /// Outgoing Data API request; GET requests have no body.
    pub fn log_api_request(&self, method: &str, url: &str, body: Option<&serde_json::Value>) {
        let detail = match body {
            Some(body) => format!("{} {} {}", method, url, truncate_json(body, MAX_JSON_LEN)),
            None => format!("{} {}", method, url),
        };
        self.record("request", &detail);
    }

    pub fn log_api_response(&self, status: u16, body: &str) {
        self.record(
            "response",
            &format!("{} {}", status, truncate_message(body, MAX_BODY_LEN)),
        );
    }

    fn record(&self, kind: &str, detail: &str) {
        if !self.enabled {
            return;
        }

        tracing::debug!(kind, "{}", detail);

        let Some(file) = self.trace_file.as_ref() else {
            return;
        };
        if let Ok(mut f) = file.lock() {
            let timestamp = Local::now().format("%H:%M:%S%.3f");
            let _ = writeln!(f, "{} {:<8} {}", timestamp, kind, detail);
            let _ = f.flush();
        }
    }
}

impl std::fmt::Debug for DebugLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugLogger")
            .field("enabled", &self.enabled)
            .field("trace", &self.trace_path)
            .finish()
    }
}

fn truncate_json(value: &serde_json::Value, max_len: usize) -> String {
    truncate_message(&value.to_string(), max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_disabled_logger_has_no_trace_file() {
        let logger = DebugLogger::disabled();
        assert!(logger.trace_path().is_none());
        logger.log_tool_call("top_pages", &json!({"limit": 5}));
    }

    #[test]
    fn test_enabled_logger_writes_trace_file() {
        let logger = DebugLogger::new(true);
        let Some(path) = logger.trace_path().cloned() else {
            return;
        };
        logger.log_tool_result("top_pages", &json!({"rows": []}));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("result"));
        assert!(content.contains("top_pages {\"rows\":[]}"));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_truncate_json() {
        let value = json!({"text": "a".repeat(50)});
        let out = truncate_json(&value, 10);
        assert!(out.ends_with("…(truncated)"));
    }
}
