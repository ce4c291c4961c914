//! Imports markdown and JSON content into a single [`ContentDocument`].

use crate::markdown::{render_markdown, split_front_matter};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate};
use log::{debug, info};
use serde_json::{Map, Value};
use sitekit_core::config::{ContentConfig, Paginate};
use sitekit_core::glob::expand;
use sitekit_core::types::{ContentDocument, ContentEntry, Page};
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path};

const CONTENT_PATTERNS: &[&str] = &["**/*.{md,json}"];

/// Read every content file below `config.base_dir` into one document.
pub fn import_contents(root: &Path, config: &ContentConfig) -> Result<ContentDocument> {
    let base = root.join(&config.base_dir);
    if !base.is_dir() {
        bail!("Content directory does not exist: {}", base.display());
    }

    let site = load_site(&base.join(&config.config))?;

    let mut entries = Vec::new();
    for rel in expand(&base, CONTENT_PATTERNS)? {
        if rel == Path::new(&config.config) {
            continue;
        }
        let entry = load_entry(&base, &rel, config)
            .with_context(|| format!("Failed to import {}", base.join(&rel).display()))?;
        debug!("Imported {} \"{}\" -> {}", entry.source, entry.title(), entry.output);
        entries.push(entry);
    }

    let pages = config
        .paginate
        .iter()
        .flat_map(|group| paginate(&entries, group))
        .collect::<Vec<_>>();

    check_collisions(&entries, &pages)?;

    info!(
        "Imported {} entries ({} listing pages)",
        entries.len(),
        pages.len()
    );

    Ok(ContentDocument {
        site,
        entries,
        pages,
    })
}

/// Write the document as the intermediate data artifact
pub fn write_document(path: &Path, document: &ContentDocument) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(document)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn read_document(path: &Path) -> Result<ContentDocument> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read content data {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Malformed content data {}", path.display()))
}

fn load_site(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json).with_context(|| format!("Malformed site config {}", path.display()))
}

fn load_entry(base: &Path, rel: &Path, config: &ContentConfig) -> Result<ContentEntry> {
    let raw = fs::read_to_string(base.join(rel))?;
    let is_markdown = rel.extension().is_some_and(|e| e == "md");

    let (mut meta, body) = if is_markdown {
        let (front, body) = split_front_matter(&raw);
        let meta = match front {
            Some(front) => parse_front_matter(front)?,
            None => Map::new(),
        };
        (meta, body.to_string())
    } else {
        let mut meta = match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => map,
            _ => bail!("JSON content must be an object"),
        };
        let body = match meta.shift_remove("content") {
            Some(Value::String(body)) => body,
            Some(other) => {
                meta.insert("content".to_string(), other);
                String::new()
            }
            None => String::new(),
        };
        (meta, body)
    };

    let source = slash_path(rel);
    let path = source
        .rsplit_once('.')
        .map(|(stem, _)| stem.to_string())
        .unwrap_or_else(|| source.clone());
    let (output, url) = output_for(&path);

    let template = match meta.get("template") {
        Some(Value::String(name)) => template_name(name),
        Some(_) => bail!("'template' must be a string"),
        None => config.default_template.clone(),
    };

    let date = match meta.get("date") {
        Some(Value::String(raw)) => Some(parse_date(raw)?),
        Some(_) => bail!("'date' must be a string"),
        None => None,
    };
    if let Some(date) = date {
        meta.insert("date".to_string(), Value::String(date.to_string()));
    }

    Ok(ContentEntry {
        path,
        source,
        output,
        url,
        template,
        date,
        meta,
        content: render_markdown(&body, &config.markdown),
    })
}

/// `articles/index` → `articles/index.html`, `articles/hello` →
/// `articles/hello/index.html`
fn output_for(path: &str) -> (String, String) {
    let dir = match path.rsplit_once('/') {
        Some((dir, "index")) => dir.to_string(),
        None if path == "index" => String::new(),
        _ => path.to_string(),
    };
    dir_output(&dir)
}

fn dir_output(dir: &str) -> (String, String) {
    if dir.is_empty() {
        ("index.html".to_string(), "/".to_string())
    } else {
        (format!("{}/index.html", dir), format!("/{}/", dir))
    }
}

/// Template references may carry an extension; the loader adds its own.
fn template_name(name: &str) -> String {
    name.strip_suffix(".html")
        .or_else(|| name.strip_suffix(".hbs"))
        .unwrap_or(name)
        .to_string()
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD or RFC 3339", raw))
}

fn parse_front_matter(front: &str) -> Result<Map<String, Value>> {
    let table: toml::Table = toml::from_str(front).context("Malformed front matter")?;
    Ok(table
        .into_iter()
        .map(|(k, v)| (k, toml_to_json(v)))
        .collect())
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Newest first; undated entries last, then by path.
fn paginate(entries: &[ContentEntry], group: &Paginate) -> Vec<Page> {
    let prefix = format!("{}/", group.dir);
    let own_index = format!("{}/index", group.dir);

    let mut members: Vec<&ContentEntry> = entries
        .iter()
        .filter(|e| e.path.starts_with(&prefix) && e.path != own_index)
        .collect();
    members.sort_by(|a, b| {
        b.date
            .is_some()
            .cmp(&a.date.is_some())
            .then(b.date.cmp(&a.date))
            .then(a.path.cmp(&b.path))
    });

    let chunks: Vec<&[&ContentEntry]> = if members.is_empty() {
        vec![members.as_slice()]
    } else {
        members.chunks(group.post_per_page).collect()
    };
    let total = chunks.len();

    let location = |number: usize| {
        if number == 1 {
            dir_output(&group.dir)
        } else {
            dir_output(&format!("{}/page/{}", group.dir, number))
        }
    };

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let number = i + 1;
            let (output, url) = location(number);
            Page {
                dir: group.dir.clone(),
                title: group.title.clone(),
                template: template_name(&group.template),
                number,
                total,
                output,
                url,
                entries: chunk.iter().map(|e| e.path.clone()).collect(),
                prev: (number > 1).then(|| location(number - 1).1),
                next: (number < total).then(|| location(number + 1).1),
            }
        })
        .collect()
}

fn check_collisions(entries: &[ContentEntry], pages: &[Page]) -> Result<()> {
    let mut seen: HashMap<&str, String> = HashMap::new();
    let claims = entries
        .iter()
        .map(|e| (e.output.as_str(), e.source.clone()))
        .chain(
            pages
                .iter()
                .map(|p| (p.output.as_str(), format!("page {} of '{}'", p.number, p.dir))),
        );

    for (output, owner) in claims {
        if let Some(previous) = seen.insert(output, owner.clone()) {
            bail!(
                "Output collision: {} and {} both render to {}",
                previous,
                owner,
                output
            );
        }
    }
    Ok(())
}
