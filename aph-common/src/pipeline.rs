//! The save pipeline: format, check, build, test.
//!
//! Each stage runs one external tool as `TOOL <path-relative-to-root>
//! [ARGS...]` in the project root, with stdout and stderr interleaved into
//! the project's error sink. The first tool that fails ends the run.
//!
//! The formatter rewrites the file in place. When it changes the file, the
//! window is brought back in line with the disk while keeping the user's
//! selection, and is marked clean.

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{AphConfig, RewriteStrategy, StageConfig};
use crate::errors::{Coded, ErrorCode};
use crate::types::tag_has_token;
use crate::util::relative_to_root;
use crate::window::{SessionError, Window};

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Format,
    Check,
    Build,
    Test,
}

impl Stage {
    /// Execution order.
    pub const ORDER: [Stage; 4] = [Stage::Format, Stage::Check, Stage::Build, Stage::Test];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Format => "format",
            Self::Check => "check",
            Self::Build => "build",
            Self::Test => "test",
        }
    }

    /// Suffix of the `APH_*` variable that overrides the stage's command.
    pub fn env_name(&self) -> &'static str {
        match self {
            Self::Format => "FORMAT",
            Self::Check => "CHECK",
            Self::Build => "BUILD",
            Self::Test => "TEST",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors from one pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} failed: {command} exited with {}", exit_label(.exit_code))]
    StageFailed {
        stage: Stage,
        command: String,
        exit_code: Option<i32>,
    },

    #[error("{stage}: cannot run {command}: {source}")]
    Spawn {
        stage: Stage,
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("format: cannot read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Control(#[from] SessionError),

    #[error("{stage}: writing tool output: {source}")]
    Output {
        stage: Stage,
        #[source]
        source: io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

impl PipelineError {
    /// The stage the error belongs to, when it came from a tool.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::StageFailed { stage, .. }
            | Self::Spawn { stage, .. }
            | Self::Output { stage, .. } => Some(*stage),
            Self::ReadFile { .. } => Some(Stage::Format),
            Self::Control(_) => None,
        }
    }
}

impl Coded for PipelineError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::StageFailed { .. } => ErrorCode::StageFailed,
            Self::Spawn { .. } => ErrorCode::StageSpawnFailed,
            Self::ReadFile { .. } => ErrorCode::FormatFileUnreadable,
            Self::Control(e) => e.code(),
            Self::Output { .. } => ErrorCode::LogWindowFailed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Passed,
    Failed,
    /// Disabled, or not applicable to the file's extension.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
}

/// What happened during one run.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Stages in the order they were considered.
    pub stages: Vec<StageRecord>,
    /// The window's tag carried the ignore marker; nothing ran.
    pub ignored: bool,
    /// The formatter changed the file and the window was refreshed.
    pub rewrote: bool,
    pub error: Option<PipelineError>,
}

impl PipelineReport {
    /// Stages whose tool was started.
    pub fn ran(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|r| r.status != StageStatus::Skipped)
            .map(|r| r.stage)
            .collect()
    }

    pub fn failed(&self) -> Option<Stage> {
        self.stages
            .iter()
            .find(|r| r.status == StageStatus::Failed)
            .map(|r| r.stage)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Turn a failed run into its error.
    pub fn into_result(mut self) -> Result<Self, PipelineError> {
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }

    fn record(&mut self, stage: Stage, status: StageStatus) {
        self.stages.push(StageRecord { stage, status });
    }
}

/// Runs the configured stages for one saved file.
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    stages: Vec<(Stage, StageConfig)>,
    ignore_marker: String,
    rewrite: RewriteStrategy,
}

impl PipelineExecutor {
    /// An executor with no stages.
    pub fn new(ignore_marker: impl Into<String>, rewrite: RewriteStrategy) -> Self {
        Self {
            stages: Vec::new(),
            ignore_marker: ignore_marker.into(),
            rewrite,
        }
    }

    pub fn from_config(config: &AphConfig) -> Self {
        let mut executor = Self::new(config.watch.ignore_marker.clone(), config.watch.rewrite);
        for stage in Stage::ORDER {
            executor = executor.with_stage(stage, config.stages.get(stage).clone());
        }
        executor
    }

    /// Set the tool for `stage`. Stages always run in [`Stage::ORDER`].
    pub fn with_stage(mut self, stage: Stage, config: StageConfig) -> Self {
        self.stages.retain(|(s, _)| *s != stage);
        self.stages.push((stage, config));
        self.stages.sort_by_key(|(s, _)| Stage::ORDER.iter().position(|o| o == s));
        self
    }

    pub fn rewrite(&self) -> RewriteStrategy {
        self.rewrite
    }

    /// Run the pipeline for `file`, shown in `win`, inside project `root`.
    ///
    /// Never retries; the first failure is recorded in the report and ends
    /// the run.
    pub fn run(
        &self,
        win: &mut dyn Window,
        file: &Path,
        root: &Path,
        sink: &mut dyn Write,
    ) -> PipelineReport {
        let mut report = PipelineReport::default();
        if tag_has_token(win.tag(), &self.ignore_marker) {
            debug!(
                "Window {} carries {}; skipping pipeline",
                win.id(),
                self.ignore_marker
            );
            report.ignored = true;
            return report;
        }

        let rel = relative_to_root(root, file);
        for (stage, config) in &self.stages {
            let stage = *stage;
            if !config.enabled || !config.applies_to(file) {
                debug!("Skipping {} for {:?}", stage, file);
                report.record(stage, StageStatus::Skipped);
                continue;
            }

            info!(
                window = %win.id(),
                stage = %stage,
                "Running {} {} in {:?}",
                config.command,
                rel.display(),
                root
            );
            let result = match stage {
                Stage::Format => self
                    .format(win, config, file, &rel, root, sink)
                    .map(|rewrote| report.rewrote = rewrote),
                _ => run_tool(stage, config, &rel, root, sink),
            };
            match result {
                Ok(()) => report.record(stage, StageStatus::Passed),
                Err(e) => {
                    error!(window = %win.id(), stage = %stage, "{}", e);
                    report.record(stage, StageStatus::Failed);
                    report.error = Some(e);
                    break;
                }
            }
        }
        report
    }

    /// Run the formatter and refresh the window if the file changed.
    /// Returns whether it did.
    fn format(
        &self,
        win: &mut dyn Window,
        config: &StageConfig,
        file: &Path,
        rel: &Path,
        root: &Path,
        sink: &mut dyn Write,
    ) -> Result<bool, PipelineError> {
        let read = |path: &Path| {
            std::fs::read(path).map_err(|source| PipelineError::ReadFile {
                path: path.to_path_buf(),
                source,
            })
        };

        let before = read(file)?;
        run_tool(Stage::Format, config, rel, root, sink)?;
        let after = read(file)?;
        if before == after {
            debug!("Formatter left {:?} unchanged", file);
            return Ok(false);
        }

        let dot = win.read_selection()?;
        match self.rewrite {
            RewriteStrategy::Reload => win.get()?,
            RewriteStrategy::Replace => {
                win.nomark()?;
                win.write_body(None, &after)?;
                win.mark()?;
            }
        }

        let dot = dot.clamp_to(String::from_utf8_lossy(&after).chars().count());
        if let Err(e) = win
            .set_selection(dot)
            .and_then(|()| win.show_selection())
        {
            warn!("Could not restore selection {} in window {}: {}", dot, win.id(), e);
        }

        win.set_clean()?;
        info!("Reformatted {:?} in window {}", file, win.id());
        Ok(true)
    }
}

/// Run one tool, copying its combined output into `sink`.
fn run_tool(
    stage: Stage,
    config: &StageConfig,
    rel: &Path,
    root: &Path,
    sink: &mut dyn Write,
) -> Result<(), PipelineError> {
    let spawn_err = |source| PipelineError::Spawn {
        stage,
        command: config.command.clone(),
        source,
    };

    let (mut reader, writer) = io::pipe().map_err(spawn_err)?;
    let stderr = writer.try_clone().map_err(spawn_err)?;
    let mut cmd = Command::new(&config.command);
    cmd.arg(rel)
        .args(&config.args)
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(writer)
        .stderr(stderr);
    let mut child = cmd.spawn().map_err(spawn_err)?;
    // Release our copies of the write end so the read sees EOF.
    drop(cmd);

    let copied = io::copy(&mut reader, sink).and_then(|_| sink.flush());
    if let Err(e) = &copied {
        warn!("{}: output lost: {}", stage, e);
        let _ = io::copy(&mut reader, &mut io::sink());
    }
    let status = child.wait().map_err(spawn_err)?;

    if !status.success() {
        return Err(PipelineError::StageFailed {
            stage,
            command: config.command.clone(),
            exit_code: status.code(),
        });
    }
    copied.map_err(|source| PipelineError::Output { stage, source })?;
    Ok(())
}
