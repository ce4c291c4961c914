use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Aggregated content, written by the importer and read by the renderer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentDocument {
    /// Site-wide data from the content directory's config file
    #[serde(default)]
    pub site: Value,
    pub entries: Vec<ContentEntry>,
    #[serde(default)]
    pub pages: Vec<Page>,
}

impl ContentDocument {
    pub fn entry(&self, path: &str) -> Option<&ContentEntry> {
        self.entries.iter().find(|e| e.path == path)
    }
}

/// One markdown or JSON content file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEntry {
    /// Source path relative to the content dir, without extension
    pub path: String,
    /// Source path relative to the content dir
    pub source: String,
    /// Output file relative to the build dir
    pub output: String,
    pub url: String,
    pub template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub meta: Map<String, Value>,
    /// Rendered HTML body
    pub content: String,
}

impl ContentEntry {
    /// Title from metadata, falling back to the last path segment
    pub fn title(&self) -> &str {
        self.meta
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_else(|| self.path.rsplit('/').next().unwrap_or(&self.path))
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub dir: String,
    pub title: String,
    pub template: String,
    /// 1-based page number
    pub number: usize,
    pub total: usize,
    pub output: String,
    pub url: String,
    /// Paths of the entries on this page, newest first
    pub entries: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// A source-map file. Only `sources` is interpreted; every other field is
/// carried through untouched, in its original position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceMap {
    fields: Map<String, Value>,
}

impl SourceMap {
    /// `None` unless `sources` is a list of strings.
    pub fn sources(&self) -> Option<Vec<String>> {
        self.fields
            .get("sources")?
            .as_array()?
            .iter()
            .map(|s| s.as_str().map(str::to_string))
            .collect()
    }

    /// Replaces the value in place, so the key keeps its position.
    pub fn set_sources(&mut self, sources: Vec<String>) {
        let list = sources.into_iter().map(Value::String).collect();
        self.fields.insert("sources".to_string(), Value::Array(list));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}
