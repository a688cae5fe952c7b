//! Job-scoped logging collaborator.
//!
//! The runner builds one [`JobLogger`] per job and passes it to every stage,
//! so each line carries the file identifier. Where the lines end up is decided
//! by the injected [`LogSink`]: the `log` facade in production, a recorder in
//! tests.

use std::sync::Arc;

use log::Level;
use parking_lot::Mutex;

const JOB_TARGET: &str = "nimbus_preview::job";

pub trait LogSink: Send + Sync {
    fn emit(&self, level: Level, file_id: &str, message: &str);
}

/// Forwards to the `log` facade (backed by env_logger in the binary).
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn emit(&self, level: Level, file_id: &str, message: &str) {
        log::log!(target: JOB_TARGET, level, "[{}] {}", file_id, message);
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<(Level, String, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<(Level, String, String)> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.lines
            .lock()
            .iter()
            .any(|(l, _, m)| *l == level && m.contains(needle))
    }
}

impl LogSink for RecordingSink {
    fn emit(&self, level: Level, file_id: &str, message: &str) {
        self.lines
            .lock()
            .push((level, file_id.to_string(), message.to_string()));
    }
}

#[derive(Clone)]
pub struct JobLogger {
    sink: Arc<dyn LogSink>,
    file_id: Arc<str>,
}

impl JobLogger {
    pub fn new(sink: Arc<dyn LogSink>, file_id: &str) -> Self {
        Self {
            sink,
            file_id: Arc::from(file_id),
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.sink.emit(Level::Debug, &self.file_id, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.sink.emit(Level::Info, &self.file_id, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.sink.emit(Level::Warn, &self.file_id, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.sink.emit(Level::Error, &self.file_id, message.as_ref());
    }
}

impl std::fmt::Debug for JobLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobLogger")
            .field("file_id", &self.file_id)
            .finish_non_exhaustive()
    }
}

/// Install env_logger for the binary. `RUST_LOG` overrides the default filter.
pub fn init_env_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}
