//! Runtime for driving external reconstruction stages
//!
//! - [`invoker`]: runs one external program per stage and reports its exit
//! - [`graph`]: orders stages by the files they consume and produce, and
//!   checks those files around every stage
//! - [`workspace`]: the on-disk layout owned by one run
//! - [`run_id`]: run identifiers

pub mod graph;
pub mod invoker;
pub mod run_id;
pub mod workspace;

pub use graph::{NodeId, StageDependency, StageGraph, StageNode};
pub use invoker::{CommandRunner, ProcessRunner, StageCommand};
pub use run_id::{default_workspace, FixedRunId, RunIdSource, TimestampRunIds};
pub use workspace::WorkspaceLayout;

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("stage '{stage}' failed ({}): {command}", status_text(.status))]
    StageFailed {
        stage: String,
        command: String,
        status: Option<i32>,
    },

    #[error("stage '{stage}' could not start `{command}`: {source}")]
    Spawn {
        stage: String,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stage '{stage}' is missing its input {}", .path.display())]
    MissingInput { stage: String, path: PathBuf },

    #[error("stage '{stage}' finished without producing {}", .path.display())]
    MissingOutput { stage: String, path: PathBuf },

    #[error("stage graph contains a cycle involving: {0}")]
    Cycle(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Exit status of a failed external stage, if it exited normally.
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            Self::StageFailed { status, .. } => *status,
            _ => None,
        }
    }

    /// Name of the stage the error is attributed to.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::StageFailed { stage, .. }
            | Self::Spawn { stage, .. }
            | Self::MissingInput { stage, .. }
            | Self::MissingOutput { stage, .. } => Some(stage),
            Self::Cycle(_) | Self::Io(_) => None,
        }
    }
}

fn status_text(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
