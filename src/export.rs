// src/export.rs

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tempfile::NamedTempFile;

use crate::collector::ChatMessage;

pub fn default_output_path() -> PathBuf {
    PathBuf::from(format!(
        "weverse_chat_{}.json",
        Utc::now().format("%Y%m%d_%H%M%S")
    ))
}

/// Writes the collected messages as pretty-printed JSON. The file is staged
/// next to the destination and renamed into place, so a crash mid-write
/// never leaves a truncated export behind.
pub fn write_json(path: &Path, messages: &[ChatMessage]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    serde_json::to_writer_pretty(&mut staged, messages)?;
    staged.write_all(b"\n")?;
    staged
        .persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
