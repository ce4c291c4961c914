use crate::copy_file;
use anyhow::{Context, Result};
use image::imageops::FilterType;
use log::{info, warn};
use sitekit_core::config::ImageSize;
use sitekit_core::glob::expand;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// `photos/cat.jpg` + `small` → `photos/cat-small.jpg`
pub fn variant_path(path: &Path, size: &ImageSize) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let name = match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, size.name, ext.to_string_lossy()),
        None => format!("{}-{}", stem, size.name),
    };
    path.with_file_name(name)
}

/// A file is a variant only when the image it was generated from is also
/// present, so `logo-small.png` on its own is still a source.
fn is_variant(path: &Path, sizes: &[ImageSize], files: &HashSet<&Path>) -> bool {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    sizes.iter().any(|size| {
        let Some(base) = stem.strip_suffix(&format!("-{}", size.name)) else {
            return false;
        };
        let base = match path.extension() {
            Some(ext) => format!("{}.{}", base, ext.to_string_lossy()),
            None => base.to_string(),
        };
        files.contains(path.with_file_name(base).as_path())
    })
}

/// Write a resized copy of every matching image under `build_dir` for
/// each size. Existing variants are never used as sources, so the step can
/// run repeatedly over the same directory. Files that do not decode are
/// left alone, as the optimizer does.
pub fn generate_responsive(
    build_dir: &Path,
    patterns: &[String],
    sizes: &[ImageSize],
) -> Result<Vec<PathBuf>> {
    let files = expand(build_dir, patterns)?;
    let lookup: HashSet<&Path> = files.iter().map(PathBuf::as_path).collect();
    let mut written = Vec::new();

    for rel in &files {
        if is_variant(rel, sizes, &lookup) {
            continue;
        }
        let src = build_dir.join(rel);
        let img = match image::open(&src) {
            Ok(img) => img,
            Err(e) => {
                warn!("Skipping responsive variants for {}: {}", src.display(), e);
                continue;
            }
        };

        for size in sizes {
            let dst = build_dir.join(variant_path(rel, size));
            if img.width() > size.width {
                let height = (u64::from(img.height()) * u64::from(size.width)
                    / u64::from(img.width()))
                .max(1) as u32;
                img.resize_exact(size.width, height, FilterType::Lanczos3)
                    .save(&dst)
                    .with_context(|| format!("Failed to write {}", dst.display()))?;
            } else {
                // never upscale
                copy_file(&src, &dst)?;
            }
            written.push(dst);
        }
    }

    info!("Generated {} responsive images", written.len());
    Ok(written)
}
