//! Rewrites the `sources` of bundler-generated source maps.
//!
//! The bundler records every source relative to where `app.js` is written
//! rather than relative to the deployed root. Each path goes through two
//! rewrites:
//!
//! 1. A leading run of `../` is replaced by [`prefix_for_depth`], with the
//!    depth being the number of markers minus one.
//! 2. A loader prefix (`text!templates/a.html`) moves into the file name
//!    (`templates/text__a.html`).

use crate::error::{Error, Result};
use crate::types::SourceMap;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

const ANCESTOR: &str = "../";

const ARROW: &str = "→";

/// Replacement for a run of `depth + 1` leading `../` markers.
///
/// Only depth 0 has a prefix; every deeper run is stripped. Nobody knows
/// what the deeper cases should map to, so they stay empty.
pub fn prefix_for_depth(depth: usize) -> &'static str {
    match depth {
        0 => "build/",
        _ => "",
    }
}

/// Rewrite a single source path. Pure: the result depends on `path` only.
pub fn rewrite_source(path: &str) -> String {
    let adjusted = strip_ancestors(path);
    relocate_plugin(&adjusted)
}

fn strip_ancestors(path: &str) -> String {
    let mut rest = path;
    let mut count = 0;
    while let Some(stripped) = rest.strip_prefix(ANCESTOR) {
        rest = stripped;
        count += 1;
    }

    if count == 0 {
        return path.to_string();
    }
    format!("{}{}", prefix_for_depth(count - 1), rest)
}

/// `plugin!dir/file` becomes `dir/plugin__file`. The plugin is everything
/// before the last `!` and must be non-empty.
fn relocate_plugin(path: &str) -> String {
    let Some(bang) = path.rfind('!').filter(|&i| i > 0) else {
        return path.to_string();
    };

    let plugin = &path[..bang];
    let mut parts: Vec<&str> = path[bang + 1..].split('/').collect();
    let file = parts.pop().unwrap_or_default();
    let renamed = format!("{}__{}", plugin, file);
    parts.push(&renamed);
    parts.join("/")
}

/// Result of fixing one source-map file
#[derive(Debug, Clone)]
pub struct FixedMap {
    pub path: PathBuf,
    /// `(original, rewritten)` for every entry, in `sources` order
    pub rewrites: Vec<(String, String)>,
}

/// Fix every source-map in `paths`, in order.
///
/// An empty set is a warning, not an error, and leaves the filesystem
/// untouched.
pub fn fix_sourcemaps<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<FixedMap>> {
    if paths.is_empty() {
        warn!("No sourcemap files found.");
        return Ok(Vec::new());
    }

    paths.iter().map(|p| fix_sourcemap(p.as_ref())).collect()
}

/// Read a source map, rewrite its `sources`, log the rewrite table and
/// overwrite the file in full.
pub fn fix_sourcemap(path: &Path) -> Result<FixedMap> {
    let content = fs::read_to_string(path)?;
    let mut map: SourceMap = serde_json::from_str(&content).map_err(|e| {
        Error::InvalidData(format!("Malformed source map {}: {}", path.display(), e))
    })?;

    let sources = map.sources().ok_or_else(|| {
        Error::InvalidData(format!("Source map {} has no list of sources", path.display()))
    })?;
    let rewrites: Vec<(String, String)> = sources
        .into_iter()
        .map(|source| {
            let rewritten = rewrite_source(&source);
            (source, rewritten)
        })
        .collect();

    let rows: Vec<[&str; 3]> = rewrites
        .iter()
        .map(|(from, to)| [from.as_str(), ARROW, to.as_str()])
        .collect();
    info!("Fixing {}", path.display());
    for line in format_table(&rows) {
        info!("{}", line);
    }

    map.set_sources(rewrites.iter().map(|(_, to)| to.clone()).collect());
    fs::write(path, serde_json::to_string(&map)?)?;

    Ok(FixedMap {
        path: path.to_path_buf(),
        rewrites,
    })
}

/// Left-align every column to its widest cell plus one.
/// Widths are counted in characters so the arrow column lines up.
pub fn format_table(rows: &[[&str; 3]]) -> Vec<String> {
    let mut widths = [0usize; 3];
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count() + 1);
        }
    }

    rows.iter()
        .map(|row| {
            let line: String = row
                .iter()
                .zip(widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = width))
                .collect();
            line.trim_end().to_string()
        })
        .collect()
}
