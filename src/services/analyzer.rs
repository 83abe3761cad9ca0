//! Client for the external analysis tools.
//!
//! Two command-line tools sit behind this seam: the source separator
//! (splits an upload into vocals/drums/bass/other stems) and the chord
//! extractor (produces a `chords.json` timeline from stem audio). Both
//! are opaque processes; the exit code is the only failure signal, there
//! is no structured error channel.

use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::upload::Stem;

/// Tool invocation errors.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The configured tool binary could not be spawned.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// The tool exited non-zero. `detail` carries the tail of stderr for
    /// the log; callers treat the failure as opaque.
    #[error("`{command}` exited with {code:?}: {detail}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        detail: String,
    },
}

/// Handle on the configured analysis tool commands.
#[derive(Clone, Debug)]
pub struct Analyzer {
    separator_cmd: String,
    chord_cmd: String,
}

impl Analyzer {
    pub fn new(separator_cmd: impl Into<String>, chord_cmd: impl Into<String>) -> Self {
        Self {
            separator_cmd: separator_cmd.into(),
            chord_cmd: chord_cmd.into(),
        }
    }

    /// Run the separation tool: `separator <input> <output_dir> <upload_id>`.
    ///
    /// Blocks the calling task until the tool exits; the processing
    /// pipeline runs this on a detached task so HTTP callers never wait.
    pub async fn separate(
        &self,
        input: &Path,
        output_dir: &Path,
        upload_id: Uuid,
    ) -> Result<(), ToolError> {
        self.run(
            &self.separator_cmd,
            &[
                &input.display().to_string(),
                &output_dir.display().to_string(),
                &upload_id.to_string(),
            ],
        )
        .await
    }

    /// Run the chord extractor: `chord_cmd <processed_dir> <stem> <output>`.
    ///
    /// The tool resolves the stem audio inside `processed_dir` and writes
    /// the timeline JSON to `output`; the coordinator renames that file
    /// into place afterwards.
    pub async fn extract_chords(
        &self,
        processed_dir: &Path,
        stem: Stem,
        output: &Path,
    ) -> Result<(), ToolError> {
        self.run(
            &self.chord_cmd,
            &[
                &processed_dir.display().to_string(),
                stem.as_str(),
                &output.display().to_string(),
            ],
        )
        .await
    }

    async fn run(&self, command: &str, args: &[&str]) -> Result<(), ToolError> {
        debug!("invoking `{}` {:?}", command, args);

        let output = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                command: command.to_string(),
                source,
            })?;

        if output.status.success() {
            debug!("`{}` completed", command);
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let detail = lines[lines.len().saturating_sub(5)..].join(" | ");
        warn!(
            "`{}` exited with {:?}: {}",
            command,
            output.status.code(),
            detail
        );

        Err(ToolError::NonZeroExit {
            command: command.to_string(),
            code: output.status.code(),
            detail,
        })
    }
}
