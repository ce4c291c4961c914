use anyhow::{Context, Result};
use log::info;
use sitekit_core::config::BuildConfig;
use sitekit_core::glob::resolve_copy;
use std::fs;
use std::path::{Path, PathBuf};

/// Copy the configured static assets into the build dir.
pub fn copy_assets(root: &Path, config: &BuildConfig) -> Result<Vec<PathBuf>> {
    let build_dir = config.build_dir(root);
    let mut written = Vec::new();

    for spec in &config.assets {
        for (src, dst) in resolve_copy(spec, root, &build_dir)? {
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&src, &dst).with_context(|| format!("Failed to copy {}", src.display()))?;
            written.push(dst);
        }
    }

    info!("Copied {} static assets", written.len());
    Ok(written)
}
