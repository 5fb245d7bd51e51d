//! Run identifiers

use std::path::{Path, PathBuf};

/// Source of run ids; injected so runs are reproducible under test.
pub trait RunIdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// Local wall-clock time formatted as `YYYYMMDD-HHMMSS`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampRunIds;

impl RunIdSource for TimestampRunIds {
    fn next_id(&self) -> String {
        chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
    }
}

/// Always hands out the same id.
#[derive(Debug, Clone)]
pub struct FixedRunId(pub String);

impl RunIdSource for FixedRunId {
    fn next_id(&self) -> String {
        self.0.clone()
    }
}

/// `<outputs_dir>/run-<id>`
pub fn default_workspace(outputs_dir: &Path, run_id: &str) -> PathBuf {
    outputs_dir.join(format!("run-{}", run_id))
}
