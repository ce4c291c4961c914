// Image copy, optimization and responsive variants

pub mod optimize;
pub mod responsive;

use anyhow::{Context, Result};
use log::info;
use sitekit_core::config::BuildConfig;
use sitekit_core::glob::resolve_copy;
use std::fs;
use std::path::{Path, PathBuf};

pub use optimize::optimize_images;
pub use responsive::{generate_responsive, variant_path};

/// Files written by an image step
#[derive(Debug, Default)]
pub struct ImageReport {
    pub written: Vec<PathBuf>,
    /// Files that could not be decoded and were copied as-is
    pub passthrough: Vec<PathBuf>,
}

/// Copy source images into the build dir unchanged (development builds)
pub fn copy_images(root: &Path, config: &BuildConfig) -> Result<ImageReport> {
    let build_dir = config.build_dir(root);
    let pairs = resolve_copy(&config.images.source, root, &build_dir)
        .context("Failed to expand image sources")?;

    let mut report = ImageReport::default();
    for (src, dst) in pairs {
        copy_file(&src, &dst)?;
        report.written.push(dst);
    }

    info!("Copied {} images", report.written.len());
    Ok(report)
}

pub(crate) fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::copy(src, dst).with_context(|| format!("Failed to copy {}", src.display()))?;
    Ok(())
}

pub(crate) fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod testutil {
    use image::{Rgb, RgbImage};
    use std::path::Path;

    pub fn write_image(path: &Path, width: u32, height: u32) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        img.save(path).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitekit_core::config::parse_config_str;
    use tempfile::TempDir;

    #[test]
    fn test_copy_images_mirrors_tree() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        testutil::write_image(&root.join("contents/articles/hello/cat.png"), 4, 4);
        testutil::write_image(&root.join("contents/logo.jpg"), 4, 4);
        fs::write(root.join("contents/articles/hello/index.md"), "# hi").unwrap();

        let config = parse_config_str("{}").unwrap();
        let report = copy_images(root, &config).unwrap();

        assert_eq!(report.written.len(), 2);
        assert!(root.join("build/www/articles/hello/cat.png").exists());
        assert!(root.join("build/www/logo.jpg").exists());
        assert!(!root.join("build/www/articles/hello/index.md").exists());
    }

    #[test]
    fn test_copy_images_without_contents_dir() {
        let dir = TempDir::new().unwrap();
        let config = parse_config_str("{}").unwrap();
        let report = copy_images(dir.path(), &config).unwrap();
        assert!(report.written.is_empty());
    }
}
