//! File-glob expansion shared by the copy, image and source-map steps.

use crate::config::CopySpec;
use crate::error::Result;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;
use wax::{Glob, Pattern};

/// A compiled list of globs, matched against paths relative to some base.
#[derive(Debug)]
pub struct PatternSet {
    globs: Vec<(PathBuf, Glob<'static>)>,
}

impl PatternSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let globs = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                Ok((literal_prefix(p), Glob::new(p)?.into_owned()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { globs })
    }

    pub fn is_match(&self, relative: &Path) -> bool {
        self.globs.iter().any(|(_, glob)| glob.is_match(relative))
    }

    /// Files under `base` matching any pattern, as sorted relative paths.
    ///
    /// A missing `base` yields no files.
    pub fn expand(&self, base: &Path) -> Result<Vec<PathBuf>> {
        let mut found = BTreeSet::new();
        if !base.exists() {
            return Ok(Vec::new());
        }

        for (prefix, glob) in &self.globs {
            let start = base.join(prefix);
            if !start.exists() {
                continue;
            }

            for entry in WalkDir::new(&start).sort_by_file_name() {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(base) else {
                    continue;
                };
                if glob.is_match(relative) {
                    found.insert(relative.to_path_buf());
                }
            }
        }

        Ok(found.into_iter().collect())
    }
}

/// Convenience wrapper for a one-off expansion
pub fn expand<S: AsRef<str>>(base: &Path, patterns: &[S]) -> Result<Vec<PathBuf>> {
    PatternSet::new(patterns)?.expand(base)
}

/// Source and destination of every file a copy spec selects.
///
/// `cwd` is resolved against `root`, `dest` against `build_dir`.
pub fn resolve_copy(
    spec: &CopySpec,
    root: &Path,
    build_dir: &Path,
) -> Result<Vec<(PathBuf, PathBuf)>> {
    let base = root.join(&spec.cwd);
    let dest = build_dir.join(&spec.dest);
    Ok(expand(&base, &spec.src)?
        .into_iter()
        .map(|rel| (base.join(&rel), dest.join(rel)))
        .collect())
}

/// Leading components of a pattern that contain no glob syntax, so a walk
/// can start there instead of at the base.
fn literal_prefix(pattern: &str) -> PathBuf {
    const META: &[char] = &['*', '?', '[', ']', '{', '}', '<', '>', '(', ')', '!', '\\'];

    Path::new(pattern)
        .components()
        .take_while(|c| match c {
            Component::Normal(s) => !s.to_string_lossy().contains(META),
            Component::CurDir => true,
            _ => false,
        })
        .collect()
}
