use super::pipeline::{BuildContext, Step, Task, run_steps};
use anyhow::Result;
use log::{debug, error};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use sitekit_core::glob::PatternSet;
use sitekit_generator::RenderMode;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Quiet period after the last event before a batch runs
const DEBOUNCE: Duration = Duration::from_millis(200);

/// A group of source files and the steps that rebuild their output.
pub struct WatchTarget {
    pub name: &'static str,
    patterns: PatternSet,
    files: Vec<PathBuf>,
    pub steps: Vec<Step>,
    /// The config file is re-read before the batch runs
    reloads_config: bool,
}

impl WatchTarget {
    fn new(name: &'static str, patterns: &[&str], steps: Vec<Step>) -> Result<Self> {
        Ok(Self {
            name,
            patterns: PatternSet::new(patterns)?,
            files: Vec::new(),
            steps,
            reloads_config: false,
        })
    }

    /// `relative` is relative to the project root.
    pub fn matches(&self, relative: &Path) -> bool {
        self.files.iter().any(|f| f == relative) || self.patterns.is_match(relative)
    }
}

/// Watch targets in the order they run within a batch.
pub fn watch_targets(config_file: &Path) -> Result<Vec<WatchTarget>> {
    use Step::*;

    let mut config = WatchTarget::new("config", &[], Task::Process.steps())?;
    config.files.push(config_file.to_path_buf());
    config.reloads_config = true;

    Ok(vec![
        WatchTarget::new(
            "css",
            &["sass/**/*.scss"],
            vec![CompileStyles(RenderMode::Dev), Autoprefix],
        )?,
        WatchTarget::new("contents", &["contents/**/*.{json,md}"], Task::Process.steps())?,
        WatchTarget::new(
            "templates",
            &["templates/**/*.{hbs,html}"],
            vec![RenderTemplates(RenderMode::Dev)],
        )?,
        WatchTarget::new(
            "images",
            &["contents/**/*.{jpg,png}", "sass/assets/**"],
            vec![CopyImages, CopyAssets],
        )?,
        config,
    ])
}

/// Targets with at least one changed file, in table order.
pub fn matched_targets<'a>(
    targets: &'a [WatchTarget],
    changed: &BTreeSet<PathBuf>,
) -> Vec<&'a WatchTarget> {
    targets
        .iter()
        .filter(|t| changed.iter().any(|p| t.matches(p)))
        .collect()
}

/// Project-relative path of an event path, or `None` for build output,
/// hidden files and editor backups.
fn relevant_path(root: &Path, build_dir: &Path, path: &Path) -> Option<PathBuf> {
    if path.starts_with(build_dir) {
        return None;
    }
    let relative = path.strip_prefix(root).ok()?;
    let ignored = relative.components().any(|c| match c {
        Component::Normal(name) => {
            let name = name.to_string_lossy();
            name.starts_with('.') || name.ends_with('~')
        }
        _ => false,
    });
    (!ignored).then(|| relative.to_path_buf())
}

fn collect(root: &Path, build_dir: &Path, event: Event, changed: &mut BTreeSet<PathBuf>) {
    if !matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) {
        return;
    }
    changed.extend(
        event
            .paths
            .iter()
            .filter_map(|p| relevant_path(root, build_dir, p)),
    );
}

/// Watch the project and re-run the matching targets on change. Runs until
/// the process is stopped.
pub async fn watch(ctx: &BuildContext) -> Result<()> {
    let mut ctx = ctx.clone();
    let root = ctx.root.canonicalize().unwrap_or_else(|_| ctx.root.clone());
    let config_file = ctx
        .config_path
        .strip_prefix(&ctx.root)
        .unwrap_or(&ctx.config_path)
        .to_path_buf();
    let targets = watch_targets(&config_file)?;

    let (tx, mut rx) = mpsc::channel(100);
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            let _ = tx.blocking_send(event);
        }
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    println!("👀 Watching {} for changes...", root.display());

    while let Some(first) = rx.recv().await {
        let build_dir = root.join(&ctx.config.build_path);
        let mut changed = BTreeSet::new();
        collect(&root, &build_dir, first, &mut changed);
        while let Ok(Some(event)) = tokio::time::timeout(DEBOUNCE, rx.recv()).await {
            collect(&root, &build_dir, event, &mut changed);
        }

        if changed.is_empty() {
            continue;
        }
        debug!("Changed: {:?}", changed);
        run_batch(&mut ctx, &targets, &changed).await;
    }

    Ok(())
}

/// Run every matched target once. Targets sharing a sequence run it once.
/// When the config fails to reload, targets that depend on it are skipped
/// and the rest run with the previous config.
async fn run_batch(ctx: &mut BuildContext, targets: &[WatchTarget], changed: &BTreeSet<PathBuf>) {
    let matched = matched_targets(targets, changed);
    if matched.is_empty() {
        return;
    }

    let mut ok = true;
    let mut config_ok = true;
    if matched.iter().any(|t| t.reloads_config)
        && let Err(e) = ctx.reload_config()
    {
        error!("{:#}", e);
        ok = false;
        config_ok = false;
    }

    let mut ran: Vec<&[Step]> = Vec::new();
    for target in matched {
        if (target.reloads_config && !config_ok) || ran.contains(&target.steps.as_slice()) {
            continue;
        }
        println!("\n📝 {} changed", target.name);
        if let Err(e) = run_steps(&target.steps, ctx).await {
            error!("{} rebuild failed: {:#}", target.name, e);
            ok = false;
        }
        ran.push(&target.steps);
    }

    if ok {
        let _ = ctx.reload.send(());
    }
}
