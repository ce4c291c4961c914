use crate::external::{Placeholders, run_tool};
use anyhow::{Context, Result};
use log::{info, warn};
use sitekit_core::config::BuildConfig;
use sitekit_core::glob::expand;
use sitekit_core::sourcemap::{self, FixedMap};
use std::path::{Path, PathBuf};

/// Bundle and minify scripts with the configured bundler.
pub fn bundle_scripts(root: &Path, config: &BuildConfig) -> Result<()> {
    let Some(bundler) = &config.scripts.bundler else {
        warn!("No script bundler configured, skipping");
        return Ok(());
    };

    let build_dir = config.build_dir(root);
    std::fs::create_dir_all(&build_dir)?;
    run_tool(
        bundler,
        &Placeholders {
            root,
            build_dir: &build_dir,
            css: None,
        },
    )
    .context("Script bundling failed")?;
    info!("Bundled scripts with {}", bundler.program);
    Ok(())
}

/// Source maps matched by the configured patterns, as absolute paths
pub fn sourcemap_files(root: &Path, config: &BuildConfig) -> Result<Vec<PathBuf>> {
    let build_dir = config.build_dir(root);
    Ok(expand(&build_dir, &config.scripts.sourcemaps)?
        .into_iter()
        .map(|rel| build_dir.join(rel))
        .collect())
}

/// Rewrite the sources of every generated source map.
pub fn fix_sourcemaps(root: &Path, config: &BuildConfig) -> Result<Vec<FixedMap>> {
    let files = sourcemap_files(root, config)?;
    Ok(sourcemap::fix_sourcemaps(&files)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitekit_core::config::parse_config_str;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_fix_without_maps_changes_nothing() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("build/www")).unwrap();
        fs::write(dir.path().join("build/www/app.js"), "x").unwrap();

        let config = parse_config_str("{}").unwrap();
        let fixed = fix_sourcemaps(dir.path(), &config).unwrap();
        assert!(fixed.is_empty());

        let names: Vec<_> = fs::read_dir(dir.path().join("build/www"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec!["app.js"]);
    }

    #[test]
    fn test_fix_configured_maps() {
        let dir = TempDir::new().unwrap();
        let www = dir.path().join("build/www");
        fs::create_dir_all(&www).unwrap();
        fs::write(www.join("app.js.map"), r#"{"version":3,"sources":["../js/app.js"],"mappings":""}"#)
            .unwrap();

        let config = parse_config_str("{}").unwrap();
        let fixed = fix_sourcemaps(dir.path(), &config).unwrap();
        assert_eq!(fixed.len(), 1);
        assert_eq!(fixed[0].rewrites[0].1, "build/js/app.js");
    }

    #[cfg(unix)]
    #[test]
    fn test_bundle_runs_in_root() {
        let dir = TempDir::new().unwrap();
        let config = parse_config_str(
            r#"{ "scripts": { "bundler": { "program": "sh", "args": ["-c", "echo bundle > {buildPath}/app.js"] } } }"#,
        )
        .unwrap();
        bundle_scripts(dir.path(), &config).unwrap();
        assert!(dir.path().join("build/www/app.js").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_bundle_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = parse_config_str(
            r#"{ "scripts": { "bundler": { "program": "sh", "args": ["-c", "exit 1"] } } }"#,
        )
        .unwrap();
        assert!(bundle_scripts(dir.path(), &config).is_err());
    }
}
