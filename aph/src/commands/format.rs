//! `aph format -- CMD ARGS...`: run a filter formatter over the window's
//! file and replace the body with its output.
//!
//! `CMD ARGS... <file>` must print the formatted file on stdout. The body is
//! only touched when the output differs from the file on disk; the
//! replacement is a single undo step, the window is put, and the selection
//! is put back where it was.

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use aph_common::window::{BodyAccess, SelectionControl, Window, WindowAttrs, WindowControl};
use aph_common::{Acme, PipelineError, Session, Stage};
use tracing::{debug, info};

use super::env::EditorEnv;

pub fn run(acme: &Acme, env: &EditorEnv, command: &[String]) -> Result<bool> {
    let Some((program, args)) = command.split_first() else {
        bail!("no formatter command given");
    };
    let conn = acme.connect().context("connecting to acme")?;
    let mut session = Session::open(&conn, env.winid)?;
    let name = env.file_name(&session);
    let rewrote = filter_format(&mut session, Path::new(&name), program, args)?;
    session.close();
    Ok(rewrote)
}

/// Format `file` through `program args... file` and sync the window.
/// Returns whether the body was replaced.
pub fn filter_format(
    win: &mut dyn Window,
    file: &Path,
    program: &str,
    args: &[String],
) -> Result<bool, PipelineError> {
    let before = std::fs::read(file).map_err(|source| PipelineError::ReadFile {
        path: file.to_path_buf(),
        source,
    })?;

    let output = Command::new(program)
        .args(args)
        .arg(file)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|source| PipelineError::Spawn {
            stage: Stage::Format,
            command: program.to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(PipelineError::StageFailed {
            stage: Stage::Format,
            command: program.to_string(),
            exit_code: output.status.code(),
        });
    }

    let dot = win.read_selection()?;
    if output.stdout == before {
        debug!("{} left {:?} unchanged", program, file);
        return Ok(false);
    }

    win.nomark()?;
    let written = win.write_body(None, &output.stdout);
    let marked = win.mark();
    written?;
    marked?;

    let dot = dot.clamp_to(String::from_utf8_lossy(&output.stdout).chars().count());
    win.set_selection(dot)?;
    win.show_selection()?;
    win.put()?;
    info!("Reformatted {:?} in window {}", file, win.id());
    Ok(true)
}
