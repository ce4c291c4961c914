use super::{serve, watch};
use anyhow::{Context, Result, bail};
use sitekit_core::{BuildConfig, load_config};
use sitekit_deployer::{Deployer, GitBranchDeployer};
use sitekit_generator::{
    RenderMode, copy_assets, import_contents, render_site, scripts, styles, write_document,
};
use sitekit_images::{copy_images, generate_responsive, optimize_images};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// One unit of work in a task sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ImportContent,
    CopyImages,
    CopyAssets,
    RenderTemplates(RenderMode),
    CompileStyles(RenderMode),
    Autoprefix,
    OptimizeImages,
    ResponsiveImages,
    MinifyCss,
    BundleScripts,
    FixSourceMaps,
    Publish,
    Serve,
    Watch,
}

impl Step {
    pub fn label(&self) -> &'static str {
        match self {
            Step::ImportContent => "content:import",
            Step::CopyImages => "copy:images",
            Step::CopyAssets => "copy:assets",
            Step::RenderTemplates(RenderMode::Dev) => "templates:dev",
            Step::RenderTemplates(RenderMode::Prod) => "templates:build",
            Step::CompileStyles(RenderMode::Dev) => "sass:dev",
            Step::CompileStyles(RenderMode::Prod) => "sass:build",
            Step::Autoprefix => "autoprefixer",
            Step::OptimizeImages => "images:optimize",
            Step::ResponsiveImages => "images:responsive",
            Step::MinifyCss => "css:minify",
            Step::BundleScripts => "scripts:bundle",
            Step::FixSourceMaps => "sourcemaps:fix",
            Step::Publish => "publish",
            Step::Serve => "serve",
            Step::Watch => "watch",
        }
    }
}

/// Named step sequences selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Process,
    Dev,
    Build,
    Deploy,
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::Process => "process",
            Task::Dev => "dev",
            Task::Build => "build",
            Task::Deploy => "deploy",
        }
    }

    pub fn steps(&self) -> Vec<Step> {
        use Step::*;
        match self {
            Task::Process => vec![
                ImportContent,
                CopyImages,
                CopyAssets,
                RenderTemplates(RenderMode::Dev),
                CompileStyles(RenderMode::Dev),
                Autoprefix,
            ],
            Task::Dev => [Task::Process.steps(), vec![ResponsiveImages, Serve, Watch]].concat(),
            Task::Build => vec![
                ImportContent,
                OptimizeImages,
                ResponsiveImages,
                CopyAssets,
                RenderTemplates(RenderMode::Prod),
                CompileStyles(RenderMode::Prod),
                Autoprefix,
                MinifyCss,
                BundleScripts,
                FixSourceMaps,
            ],
            Task::Deploy => [Task::Build.steps(), vec![Publish]].concat(),
        }
    }
}

/// State shared by every step of a run.
#[derive(Clone)]
pub struct BuildContext {
    pub root: PathBuf,
    /// Configuration file as given on the command line
    pub config_path: PathBuf,
    pub config: Arc<BuildConfig>,
    /// Fired after a successful rebuild; live-reload clients listen on it
    pub reload: broadcast::Sender<()>,
}

impl BuildContext {
    pub fn new(root: PathBuf, config_path: PathBuf, config: BuildConfig) -> Self {
        let (reload, _) = broadcast::channel(100);
        Self {
            root,
            config_path,
            config: Arc::new(config),
            reload,
        }
    }

    pub fn load(root: PathBuf, config_path: PathBuf) -> Result<Self> {
        let file = root.join(&config_path);
        let config = load_config(&file)
            .with_context(|| format!("Failed to load config {}", file.display()))?;
        Ok(Self::new(root, config_path, config))
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(&self.config_path)
    }

    /// Re-read the configuration file. The old config stays on failure.
    pub fn reload_config(&mut self) -> Result<()> {
        let file = self.config_file();
        let config = load_config(&file)
            .with_context(|| format!("Failed to reload config {}", file.display()))?;
        self.config = Arc::new(config);
        Ok(())
    }
}

/// Run a task to completion, stopping at the first failing step.
pub async fn run(task: Task, ctx: &BuildContext) -> Result<()> {
    println!("🔨 Running \"{}\" task", task.name());
    println!("   Root: {}", ctx.root.display());

    for step in task.steps() {
        if step == Step::Watch {
            println!("\n▶ {}", step.label());
            watch::watch(ctx).await?;
        } else {
            run_step(step, ctx).await?;
        }
    }

    println!("\n✅ Done, without errors.");
    Ok(())
}

/// Run build steps in order. Used by tasks and by watch re-runs.
pub async fn run_steps(steps: &[Step], ctx: &BuildContext) -> Result<()> {
    for step in steps {
        run_step(*step, ctx).await?;
    }
    Ok(())
}

async fn run_step(step: Step, ctx: &BuildContext) -> Result<()> {
    println!("\n▶ {}", step.label());
    execute(step, ctx)
        .await
        .with_context(|| format!("Step \"{}\" failed", step.label()))
}

async fn execute(step: Step, ctx: &BuildContext) -> Result<()> {
    let root = ctx.root.as_path();
    let config = ctx.config.as_ref();

    match step {
        Step::ImportContent => {
            let doc = import_contents(root, &config.content)?;
            write_document(&config.data_path(root), &doc)?;
            println!(
                "   ✓ {} entries, {} listing pages",
                doc.entries.len(),
                doc.pages.len()
            );
        }
        Step::CopyImages => {
            let report = copy_images(root, config)?;
            println!("   ✓ Copied {} images", report.written.len());
        }
        Step::CopyAssets => {
            let written = copy_assets(root, config)?;
            println!("   ✓ Copied {} files", written.len());
        }
        Step::RenderTemplates(mode) => {
            let written = render_site(root, config, mode)?;
            println!("   ✓ Rendered {} pages", written.len());
        }
        Step::CompileStyles(mode) => {
            let css = styles::compile_styles(root, config, mode)?;
            println!("   ✓ Wrote {}", css.display());
        }
        Step::Autoprefix => styles::autoprefix(root, config)?,
        Step::OptimizeImages => {
            let report = optimize_images(root, config)?;
            println!(
                "   ✓ Optimized {} images ({} copied as-is)",
                report.written.len(),
                report.passthrough.len()
            );
        }
        Step::ResponsiveImages => {
            let written = generate_responsive(
                &config.build_dir(root),
                &config.images.responsive,
                &config.images.sizes,
            )?;
            println!("   ✓ Generated {} variants", written.len());
        }
        Step::MinifyCss => styles::minify_css(root, config)?,
        Step::BundleScripts => scripts::bundle_scripts(root, config)?,
        Step::FixSourceMaps => {
            let fixed = scripts::fix_sourcemaps(root, config)?;
            println!("   ✓ Fixed {} source maps", fixed.len());
        }
        Step::Publish => {
            let deployer = GitBranchDeployer::from_config(&config.deploy)?;
            let result = deployer.deploy(&config.build_dir(root)).await?;
            match result.commit {
                Some(commit) => println!("   ✓ Published {} ({})", result.branch, commit),
                None => println!("   ✓ {} already up to date", result.branch),
            }
        }
        Step::Serve => {
            serve::start(ctx).await?;
        }
        Step::Watch => bail!("watch only runs at the end of a task"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitekit_core::config::parse_config_str;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const NO_TOOLS: &str = r#"{
        "styles": { "autoprefixer": null, "minifier": null },
        "scripts": { "bundler": null }
    }"#;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn project(root: &Path, articles: usize) {
        write(root, "templates/page.html", "<h1>{{ entry.meta.title }}</h1>{{ entry.content | safe }}");
        write(
            root,
            "templates/archive.html",
            "{% for post in posts %}{{ post.url | safe }};{% endfor %}",
        );
        write(root, "sass/main.scss", "$c: #333;\nbody { color: $c; }\n");
        write(root, "contents/config.json", r#"{ "title": "Blog" }"#);
        write(root, "contents/index.md", "+++\ntitle = \"Home\"\n+++\nWelcome");
        for i in 1..=articles {
            write(
                root,
                &format!("contents/articles/post-{}.md", i),
                &format!("+++\ntitle = \"Post {}\"\ndate = \"2014-01-{:02}\"\n+++\nBody {}", i, i, i),
            );
        }
    }

    fn context(root: &Path) -> BuildContext {
        let config = parse_config_str(NO_TOOLS).unwrap();
        BuildContext::new(root.to_path_buf(), PathBuf::from("config-dev.json"), config)
    }

    #[test]
    fn test_task_sequences() {
        assert_eq!(Task::Process.steps().len(), 6);
        assert_eq!(
            &Task::Dev.steps()[6..],
            &[Step::ResponsiveImages, Step::Serve, Step::Watch]
        );
        assert_eq!(Task::Build.steps().last(), Some(&Step::FixSourceMaps));
        assert_eq!(Task::Deploy.steps().last(), Some(&Step::Publish));
        assert!(!Task::Build.steps().contains(&Step::Serve));
    }

    #[test]
    fn test_dev_and_prod_labels_differ() {
        assert_eq!(Step::CompileStyles(RenderMode::Dev).label(), "sass:dev");
        assert_eq!(Step::CompileStyles(RenderMode::Prod).label(), "sass:build");
    }

    #[tokio::test]
    async fn test_process_renders_every_entry() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        project(root, 5);

        let ctx = context(root);
        run(Task::Process, &ctx).await.unwrap();

        let www = root.join("build/www");
        assert!(root.join("build/data.json").exists());
        assert!(www.join("index.html").exists());
        for i in 1..=5 {
            let html = fs::read_to_string(www.join(format!("articles/post-{}/index.html", i))).unwrap();
            assert!(html.starts_with(&format!("<h1>Post {}</h1>", i)));
        }
        // 5 posts at 4 per page
        assert!(www.join("articles/index.html").exists());
        assert!(www.join("articles/page/2/index.html").exists());

        let css = fs::read_to_string(www.join("css/main.css")).unwrap();
        assert!(css.contains("color: #333"));
    }

    #[tokio::test]
    async fn test_build_without_tools() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        project(root, 2);

        let ctx = context(root);
        run(Task::Build, &ctx).await.unwrap();

        let css = fs::read_to_string(root.join("build/www/css/main.css")).unwrap();
        assert!(!css.contains('\n'));
        assert!(root.join("build/www/articles/post-2/index.html").exists());
    }

    #[tokio::test]
    async fn test_build_passes_undecodable_image_through() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        project(root, 1);
        write(root, "contents/broken.png", "nope");

        let ctx = context(root);
        run(Task::Build, &ctx).await.unwrap();

        assert_eq!(fs::read(root.join("build/www/broken.png")).unwrap(), b"nope");
        assert!(!root.join("build/www/broken-small.png").exists());
        assert!(root.join("build/www/articles/post-1/index.html").exists());
    }

    #[tokio::test]
    async fn test_first_failure_stops_task() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        project(root, 1);
        fs::remove_file(root.join("templates/page.html")).unwrap();

        let ctx = context(root);
        let err = run(Task::Process, &ctx).await.unwrap_err();
        assert!(format!("{:#}", err).contains("templates:dev"));
        // steps after the failure never ran
        assert!(!root.join("build/www/css/main.css").exists());
    }

    #[tokio::test]
    async fn test_publish_requires_repo() {
        let dir = TempDir::new().unwrap();
        project(dir.path(), 1);
        let ctx = context(dir.path());
        assert!(run_steps(&[Step::Publish], &ctx).await.is_err());
    }

    #[test]
    fn test_reload_config() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "config-dev.json", r#"{ "port": 9000 }"#);
        let mut ctx = BuildContext::load(dir.path().to_path_buf(), "config-dev.json".into()).unwrap();
        assert_eq!(ctx.config.port, 9000);

        write(dir.path(), "config-dev.json", r#"{ "port": 9001 }"#);
        ctx.reload_config().unwrap();
        assert_eq!(ctx.config.port, 9001);

        write(dir.path(), "config-dev.json", "{ broken");
        assert!(ctx.reload_config().is_err());
        assert_eq!(ctx.config.port, 9001);
    }

    #[test]
    fn test_missing_config_is_fatal() {
        let dir = TempDir::new().unwrap();
        assert!(BuildContext::load(dir.path().to_path_buf(), "config-dev.json".into()).is_err());
    }
}
