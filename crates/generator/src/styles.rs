use crate::RenderMode;
use crate::external::{Placeholders, run_tool};
use anyhow::{Context, Result, anyhow};
use grass::{Options, OutputStyle};
use log::{info, warn};
use sitekit_core::config::{BuildConfig, ExternalTool};
use std::fs;
use std::path::{Path, PathBuf};

/// Compile the Sass entry point to the build stylesheet.
///
/// No source map is written in either mode; grass cannot produce one.
pub fn compile_styles(root: &Path, config: &BuildConfig, mode: RenderMode) -> Result<PathBuf> {
    let entry = root.join(&config.styles.entry);
    let style = match mode {
        RenderMode::Dev => OutputStyle::Expanded,
        RenderMode::Prod => OutputStyle::Compressed,
    };

    let mut options = Options::default().style(style);
    if let Some(dir) = entry.parent() {
        options = options.load_path(dir);
    }

    let css = grass::from_path(&entry, &options)
        .map_err(|e| anyhow!("Failed to compile {}: {}", entry.display(), e))?;

    let out = config.stylesheet(root);
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&out, css).with_context(|| format!("Failed to write {}", out.display()))?;

    info!("Compiled {} ({:?})", config.styles.entry.display(), mode);
    Ok(out)
}

/// Add vendor prefixes to the compiled stylesheet in place.
pub fn autoprefix(root: &Path, config: &BuildConfig) -> Result<()> {
    run_on_stylesheet(root, config, config.styles.autoprefixer.as_ref(), "autoprefixer")
}

/// Further minify the compiled stylesheet in place.
pub fn minify_css(root: &Path, config: &BuildConfig) -> Result<()> {
    run_on_stylesheet(root, config, config.styles.minifier.as_ref(), "minifier")
}

fn run_on_stylesheet(
    root: &Path,
    config: &BuildConfig,
    tool: Option<&ExternalTool>,
    label: &str,
) -> Result<()> {
    let Some(tool) = tool else {
        warn!("No {} configured, skipping", label);
        return Ok(());
    };

    let css = config.stylesheet(root);
    if !css.exists() {
        return Err(anyhow!("Stylesheet not found: {}", css.display()));
    }

    let build_dir = config.build_dir(root);
    run_tool(
        tool,
        &Placeholders {
            root,
            build_dir: &build_dir,
            css: Some(&css),
        },
    )?;
    info!("Ran {} on {}", tool.program, config.styles.output.display());
    Ok(())
}
