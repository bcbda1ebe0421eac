use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;

// ─── Log sink ────────────────────────────────────────────────────

/// Structured error/warning/exception records.
///
/// Every record goes to the console through `tracing`; when a log
/// directory is configured, it is also appended as one JSON object per
/// line to `<dir>/vtsaggregator.log` so operational problems survive
/// process restarts.
pub struct LogSink {
    dir: Option<PathBuf>,
    argv: Vec<String>,
}

#[derive(Serialize)]
struct LogRecord<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    time: String,
    argv: &'a [String],
    msg: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    exc: Option<String>,
}

impl LogSink {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            argv: std::env::args().collect(),
        }
    }

    pub fn warning(&self, msg: &str) {
        tracing::warn!("{msg}");
        self.write("warning", msg, None);
    }

    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
        self.write("error", msg, None);
    }

    /// Record an error together with its source chain.
    pub fn exception(&self, error: &dyn std::error::Error, msg: &str) {
        tracing::error!(error = %error, "{msg}");
        self.write("exception", msg, Some(error_chain(error)));
    }

    fn write(&self, kind: &str, msg: &str, exc: Option<String>) {
        let Some(dir) = &self.dir else {
            return;
        };
        let record = LogRecord {
            kind,
            time: chrono::Utc::now().to_rfc3339(),
            argv: &self.argv,
            msg,
            exc,
        };
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(_) => return,
        };
        let path = dir.join("vtsaggregator.log");
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(e) = result {
            tracing::error!("Unable to open or write a log entry: {e}");
        }
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str("\ncaused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

// ─── Tests ───────────────────────────────────────────────────────
