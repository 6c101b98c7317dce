//! Rendering persisted snapshots for `inspect`.

use std::path::Path;

use anyhow::{Context, Result};
use fusion_engine::{read_snapshot, render_block};

/// Symbol shown when none is given and the path does not suggest one.
pub const FALLBACK_SYMBOL: &str = "SNAPSHOT";

/// Render the snapshot at `path` as a dashboard block.
///
/// Without an explicit `symbol`, the name of the directory holding the
/// artifact is used (artifacts are written under a per-instrument directory).
pub async fn render_snapshot(path: &Path, symbol: Option<&str>) -> Result<String> {
    let snapshot = read_snapshot(path)
        .await
        .with_context(|| format!("cannot inspect {}", path.display()))?;

    let symbol = symbol
        .map(str::to_string)
        .unwrap_or_else(|| symbol_from_path(path));

    Ok(render_block(&symbol, &snapshot, &[], Some(path)))
}

fn symbol_from_path(path: &Path) -> String {
    path.parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_SYMBOL.to_string())
}
