//! Structured test logging.
//!
//! Test binaries install one subscriber that mirrors every record as JSON
//! into `<target>/test-logs/aph-tests.jsonl` and as compact lines into the
//! captured test output:
//!
//! ```ignore
//! #[ctor::ctor]
//! fn setup() {
//!     aph_common::testing::init_global_test_logging();
//! }
//! ```
//!
//! [`TestLogger`] adds per-test phase markers on top.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, Once};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPhase {
    Setup,
    Execute,
    Verify,
}

impl TestPhase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Execute => "execute",
            Self::Verify => "verify",
        }
    }
}

static INIT: Once = Once::new();

/// Install the shared test subscriber once per process.
///
/// `APH_TEST_LOG_LEVEL` sets the level for the APH crates (default `info`);
/// `APH_TEST_LOG_FILE` moves the JSON log.
pub fn init_global_test_logging() {
    INIT.call_once(|| {
        let level = std::env::var("APH_TEST_LOG_LEVEL").unwrap_or_else(|_| "info".into());
        let filter = tracing_subscriber::EnvFilter::try_new(format!(
            "aph={level},aphd={level},aph_common={level},test={level}"
        ))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        let json_layer = open_log_file().map(|file| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(Mutex::new(file))
                .with_thread_names(true)
        });
        let console_layer = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .compact();

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .with(console_layer)
            .try_init();
    });
}

fn open_log_file() -> Option<std::fs::File> {
    let path = std::env::var_os("APH_TEST_LOG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|| log_dir().join("aph-tests.jsonl"));
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).ok()?;
    }
    std::fs::File::create(path).ok()
}

/// `$CARGO_TARGET_DIR/test-logs`, else `target/test-logs` next to the
/// workspace manifest.
fn log_dir() -> PathBuf {
    let target = std::env::var_os("CARGO_TARGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../target"));
    target.join("test-logs")
}

/// One line of a per-test log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestLogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub test: String,
    pub phase: TestPhase,
    pub message: String,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Phase-tagged log for a single test, also written to
/// `<target>/test-logs/<test>.jsonl`.
pub struct TestLogger {
    test: String,
    started: Instant,
    entries: Mutex<Vec<TestLogEntry>>,
    file: Option<Mutex<std::fs::File>>,
}

impl TestLogger {
    pub fn for_test(test: &str) -> Self {
        let dir = log_dir();
        let file_name = format!("{}.jsonl", test.replace("::", "-").replace('/', "_"));
        let file = std::fs::create_dir_all(&dir)
            .and_then(|()| std::fs::File::create(dir.join(file_name)))
            .ok()
            .map(Mutex::new);

        let logger = Self {
            test: test.to_string(),
            started: Instant::now(),
            entries: Mutex::new(Vec::new()),
            file,
        };
        logger.log(TestPhase::Setup, "start");
        logger
    }

    pub fn log(&self, phase: TestPhase, message: impl Into<String>) {
        self.record(phase, message.into(), None);
    }

    pub fn log_with_data(
        &self,
        phase: TestPhase,
        message: impl Into<String>,
        data: serde_json::Value,
    ) {
        self.record(phase, message.into(), Some(data));
    }

    fn record(&self, phase: TestPhase, message: String, data: Option<serde_json::Value>) {
        let entry = TestLogEntry {
            timestamp: chrono::Utc::now(),
            test: self.test.clone(),
            phase,
            message,
            elapsed_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            data,
        };
        tracing::info!(
            target: "test",
            test = %entry.test,
            phase = entry.phase.as_str(),
            elapsed_ms = entry.elapsed_ms,
            "{}",
            entry.message
        );
        if let Some(file) = &self.file
            && let Ok(mut file) = file.lock()
            && let Ok(line) = serde_json::to_string(&entry)
        {
            let _ = writeln!(file, "{line}");
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    pub fn entries(&self) -> Vec<TestLogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn pass(self) {
        self.log(TestPhase::Verify, "pass");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_records_phases_and_data() {
        init_global_test_logging();
        let logger = TestLogger::for_test("testing::log::phases");
        logger.log_with_data(TestPhase::Execute, "dispatch", serde_json::json!({"window": 3}));

        let entries = logger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].phase, TestPhase::Setup);
        assert_eq!(entries[1].data.as_ref().unwrap()["window"], 3);

        let json = serde_json::to_value(&entries[0]).unwrap();
        assert_eq!(json["phase"], "setup");
        assert!(json.get("data").is_none());
        logger.pass();
    }
}
