use crate::{ImageReport, copy_file, extension};
use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageResult};
use log::{debug, info, warn};
use sitekit_core::config::BuildConfig;
use sitekit_core::glob::resolve_copy;
use std::fs;
use std::path::Path;

/// Copy source images into the build dir, re-encoding PNG and JPEG files
/// when that makes them smaller.
pub fn optimize_images(root: &Path, config: &BuildConfig) -> Result<ImageReport> {
    let build_dir = config.build_dir(root);
    let pairs = resolve_copy(&config.images.source, root, &build_dir)
        .context("Failed to expand image sources")?;

    let mut report = ImageReport::default();
    let mut saved: u64 = 0;

    for (src, dst) in pairs {
        let original = fs::read(&src).with_context(|| format!("Failed to read {}", src.display()))?;

        match reencode(&original, &extension(&src), config.images.quality) {
            Some(Ok(smaller)) if smaller.len() < original.len() => {
                saved += (original.len() - smaller.len()) as u64;
                write_bytes(&dst, &smaller)?;
            }
            Some(Ok(_)) => write_bytes(&dst, &original)?,
            Some(Err(e)) => {
                warn!("Could not optimize {}: {}", src.display(), e);
                copy_file(&src, &dst)?;
                report.passthrough.push(dst.clone());
            }
            None => {
                debug!("Copying {} unchanged", src.display());
                copy_file(&src, &dst)?;
            }
        }
        report.written.push(dst);
    }

    info!(
        "Optimized {} images (saved {} KiB)",
        report.written.len(),
        saved / 1024
    );
    Ok(report)
}

/// `None` for formats that are copied verbatim
fn reencode(bytes: &[u8], ext: &str, quality: u8) -> Option<ImageResult<Vec<u8>>> {
    match ext {
        "png" => Some(image::load_from_memory(bytes).and_then(|img| encode_png(&img))),
        "jpg" | "jpeg" => {
            Some(image::load_from_memory(bytes).and_then(|img| encode_jpeg(&img, quality)))
        }
        _ => None,
    }
}

fn encode_png(img: &DynamicImage) -> ImageResult<Vec<u8>> {
    let mut out = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
    img.write_with_encoder(encoder)?;
    Ok(out)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> ImageResult<Vec<u8>> {
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
    Ok(out)
}

fn write_bytes(dst: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(dst, bytes).with_context(|| format!("Failed to write {}", dst.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_image;
    use sitekit_core::config::parse_config_str;
    use tempfile::TempDir;

    #[test]
    fn test_optimized_image_is_never_larger() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let src = root.join("contents/photo.png");
        write_image(&src, 64, 64);

        let config = parse_config_str("{}").unwrap();
        let report = optimize_images(root, &config).unwrap();
        assert_eq!(report.written.len(), 1);

        let before = fs::metadata(&src).unwrap().len();
        let after = fs::metadata(root.join("build/www/photo.png")).unwrap().len();
        assert!(after <= before);
        assert!(image::open(root.join("build/www/photo.png")).is_ok());
    }

    #[test]
    fn test_gif_is_copied_verbatim() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("contents")).unwrap();
        fs::write(root.join("contents/anim.gif"), b"GIF89a-not-really").unwrap();

        let config = parse_config_str("{}").unwrap();
        optimize_images(root, &config).unwrap();
        assert_eq!(
            fs::read(root.join("build/www/anim.gif")).unwrap(),
            b"GIF89a-not-really"
        );
    }

    #[test]
    fn test_undecodable_png_passes_through() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("contents")).unwrap();
        fs::write(root.join("contents/broken.png"), b"nope").unwrap();

        let config = parse_config_str("{}").unwrap();
        let report = optimize_images(root, &config).unwrap();
        assert_eq!(report.passthrough.len(), 1);
        assert_eq!(fs::read(root.join("build/www/broken.png")).unwrap(), b"nope");
    }
}
