//! `aph do`: save the current window, then run the pipeline on it.

use anyhow::{Context, Result};
use aph_common::window::WindowControl;
use aph_common::{Acme, AphConfig, PipelineReport, SaveHandler, Session};
use tracing::info;

use super::env::EditorEnv;

pub fn run(acme: &Acme, config: &AphConfig, env: &EditorEnv) -> Result<PipelineReport> {
    let conn = acme.connect().context("connecting to acme")?;
    let mut session = Session::open(&conn, env.winid)?;
    let name = env.file_name(&session);
    session.put()?;
    session.close();

    let report = SaveHandler::from_config(acme.clone(), config).handle(env.winid, &name)?;
    if report.ignored {
        info!("{} is marked {}; nothing to do", name, config.watch.ignore_marker);
    }
    Ok(report)
}
