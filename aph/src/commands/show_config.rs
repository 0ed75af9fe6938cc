//! `aph config`: print the effective configuration.

use anyhow::{Context, Result};
use aph_common::LoadedConfig;
use serde_json::json;

/// TOML with a trailing comment block naming each explicitly set key's
/// source.
pub fn render_toml(loaded: &LoadedConfig) -> Result<String> {
    let mut out = toml::to_string_pretty(&loaded.config).context("serializing configuration")?;
    out.push_str("\n# Loaded from: ");
    match &loaded.path {
        Some(path) => out.push_str(&path.display().to_string()),
        None => out.push_str("built-in defaults"),
    }
    out.push('\n');
    for (key, source) in &loaded.sources {
        out.push_str(&format!("# {key} = {source}\n"));
    }
    Ok(out)
}

pub fn render_json(loaded: &LoadedConfig) -> Result<String> {
    let value = json!({
        "path": loaded.path,
        "config": loaded.config,
        "sources": loaded.sources,
    });
    serde_json::to_string_pretty(&value).context("serializing configuration")
}
