//! Runs the command-line tools that some steps delegate to.

use anyhow::{Context, Result, bail};
use log::debug;
use sitekit_core::config::ExternalTool;
use std::path::Path;
use std::process::Command;

/// Values substituted into tool arguments
pub struct Placeholders<'a> {
    pub root: &'a Path,
    pub build_dir: &'a Path,
    pub css: Option<&'a Path>,
}

impl Placeholders<'_> {
    fn apply(&self, arg: &str) -> String {
        let mut out = arg
            .replace("{root}", &self.root.to_string_lossy())
            .replace("{buildPath}", &self.build_dir.to_string_lossy());
        if let Some(css) = self.css {
            out = out.replace("{css}", &css.to_string_lossy());
        }
        out
    }
}

pub fn expand_args(tool: &ExternalTool, vars: &Placeholders) -> Vec<String> {
    tool.args.iter().map(|a| vars.apply(a)).collect()
}

/// Run `tool` from the project root. A non-zero exit is an error carrying
/// the tool's stderr.
pub fn run_tool(tool: &ExternalTool, vars: &Placeholders) -> Result<()> {
    let program = which::which_in(&tool.program, std::env::var_os("PATH"), vars.root)
        .with_context(|| format!("'{}' not found, is it installed?", tool.program))?;
    let args = expand_args(tool, vars);
    debug!("Running {} {}", program.display(), args.join(" "));

    let output = Command::new(&program)
        .args(&args)
        .current_dir(vars.root)
        .output()
        .with_context(|| format!("Failed to start {}", tool.program))?;

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        debug!("[{}] {}", tool.program, line);
    }

    if !output.status.success() {
        bail!(
            "{} failed ({}): {}",
            tool.program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}
