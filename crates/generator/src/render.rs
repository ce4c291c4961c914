use crate::RenderMode;
use crate::content::read_document;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate};
use log::info;
use minijinja::{Environment, ErrorKind, context, path_loader};
use sitekit_core::config::BuildConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// Loader root; partials live in `partials/`, helper macros in `helpers/`.
pub const TEMPLATE_DIR: &str = "templates";

const DEFAULT_DATE_FORMAT: &str = "%B %-d, %Y";

const DEFAULT_EXCERPT_WORDS: usize = 50;

/// Template environment over a template directory
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    pub fn new(template_dir: &Path) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(template_dir));
        env.add_filter("date", format_date);
        env.add_filter("excerpt", excerpt);
        Self { env }
    }

    /// Render `templates/<name>.html`
    pub fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self
            .env
            .get_template(&format!("{}.html", name))
            .with_context(|| format!("Failed to load template '{}'", name))?;
        template
            .render(ctx)
            .with_context(|| format!("Failed to render template '{}'", name))
    }
}

/// Render every entry and listing page of the content document into the
/// build directory. Returns the written files.
pub fn render_site(root: &Path, config: &BuildConfig, mode: RenderMode) -> Result<Vec<PathBuf>> {
    let doc = read_document(&config.data_path(root))?;
    let renderer = Renderer::new(&root.join(TEMPLATE_DIR));
    let build_dir = config.build_dir(root);

    let dev = mode == RenderMode::Dev;
    let livereload = dev.then_some(config.livereload);
    let mut written = Vec::new();

    for entry in &doc.entries {
        let ctx = context! {
            site => &doc.site,
            entry => entry,
            entries => &doc.entries,
            pages => &doc.pages,
            dev => dev,
            livereload => livereload,
        };
        let html = renderer
            .render(&entry.template, ctx)
            .with_context(|| format!("while rendering {}", entry.source))?;
        written.push(write_html(&build_dir, &entry.output, &html)?);
    }

    for page in &doc.pages {
        let posts: Vec<_> = page.entries.iter().filter_map(|p| doc.entry(p)).collect();
        let ctx = context! {
            site => &doc.site,
            page => page,
            posts => posts,
            entries => &doc.entries,
            dev => dev,
            livereload => livereload,
        };
        let html = renderer
            .render(&page.template, ctx)
            .with_context(|| format!("while rendering page {} of '{}'", page.number, page.dir))?;
        written.push(write_html(&build_dir, &page.output, &html)?);
    }

    info!("Rendered {} pages ({:?})", written.len(), mode);
    Ok(written)
}

fn write_html(build_dir: &Path, output: &str, html: &str) -> Result<PathBuf> {
    let path = build_dir.join(output);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, html).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// `{{ entry.date | date("%Y") }}`
fn format_date(value: String, format: Option<String>) -> Result<String, minijinja::Error> {
    let date = NaiveDate::parse_from_str(&value, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(&value).map(|dt| dt.date_naive()))
        .map_err(|e| {
            minijinja::Error::new(
                ErrorKind::InvalidOperation,
                format!("cannot parse '{}' as a date: {}", value, e),
            )
        })?;
    let format = format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT);
    Ok(date.format(format).to_string())
}

/// First `words` words of an HTML fragment, tags removed.
fn excerpt(value: String, words: Option<usize>) -> String {
    let limit = words.unwrap_or(DEFAULT_EXCERPT_WORDS);

    let mut text = String::with_capacity(value.len());
    let mut in_tag = false;
    for c in value.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let all: Vec<&str> = text.split_whitespace().collect();
    if all.len() <= limit {
        all.join(" ")
    } else {
        format!("{}…", all[..limit].join(" "))
    }
}
