//! Stage invoker
//!
//! One external program per stage, run to completion with the caller's
//! stdout/stderr so the tool's own progress output reaches the console.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};

/// Program plus arguments, kept as data so it can be logged, recorded and
/// fingerprinted before it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl StageCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// `--flag <path>` pair.
    pub fn path_arg(self, flag: &str, path: &Path) -> Self {
        self.arg(flag).arg(path.display().to_string())
    }
}

fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s.chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | '$' | '`' | '(' | ')' | ','))
}

impl fmt::Display for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in std::iter::once(&self.program).chain(&self.args) {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            if needs_quotes(part) {
                write!(f, "\"{}\"", part.replace('\\', "\\\\").replace('"', "\\\""))?;
            } else {
                f.write_str(part)?;
            }
        }
        Ok(())
    }
}

/// Executes stage commands.
pub trait CommandRunner: Send + Sync {
    /// Run `command` for `stage` and block until it exits. Success means
    /// exit status 0.
    fn run(&self, stage: &str, command: &StageCommand) -> Result<()>;
}

/// Runs commands as child processes with inherited stdout/stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, stage: &str, command: &StageCommand) -> Result<()> {
        tracing::info!(stage, "[cmd] {}", command);

        let status = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| Error::Spawn {
                stage: stage.to_string(),
                command: command.to_string(),
                source,
            })?;

        if status.success() {
            tracing::debug!(stage, "stage finished");
            Ok(())
        } else {
            Err(Error::StageFailed {
                stage: stage.to_string(),
                command: command.to_string(),
                status: status.code(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_only_when_needed() {
        let cmd = StageCommand::new("ffmpeg")
            .arg("-vf")
            .arg("fps=2,scale='if(gt(iw,ih),2048,-2)'")
            .path_arg("-i", Path::new("/tmp/in.mp4"));
        assert_eq!(
            cmd.to_string(),
            "ffmpeg -vf \"fps=2,scale='if(gt(iw,ih),2048,-2)'\" -i /tmp/in.mp4"
        );

        let cmd = StageCommand::new("colmap").args(["mapper", "--output_path", "my dir"]);
        assert_eq!(cmd.to_string(), "colmap mapper --output_path \"my dir\"");
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let cmd = StageCommand::new("recon-definitely-not-a-real-program");
        let err = ProcessRunner.run("missing_tool", &cmd).unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_is_reported() {
        let ok = StageCommand::new("sh").args(["-c", "exit 0"]);
        assert!(ProcessRunner.run("ok", &ok).is_ok());

        let failing = StageCommand::new("sh").args(["-c", "exit 3"]);
        match ProcessRunner.run("failing", &failing) {
            Err(Error::StageFailed { stage, status, .. }) => {
                assert_eq!(stage, "failing");
                assert_eq!(status, Some(3));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
