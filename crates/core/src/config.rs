use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Port used by the live-reload server when the config leaves it falsy.
pub const DEFAULT_LIVERELOAD_PORT: u16 = 35729;

pub const DEFAULT_PORT: u16 = 8000;

pub const DEFAULT_BUILD_PATH: &str = "build/www";

/// Raw JSON configuration structure.
/// This matches the config file exactly; the three top-level keys are kept
/// loosely typed so that falsy values can be normalized.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(default)]
    port: Option<Value>,
    #[serde(default)]
    build_path: Option<String>,
    #[serde(default)]
    livereload: Option<Value>,
    #[serde(default)]
    content: ContentConfig,
    #[serde(default)]
    images: ImageConfig,
    #[serde(default)]
    styles: StyleConfig,
    #[serde(default)]
    scripts: ScriptConfig,
    #[serde(default = "default_assets")]
    assets: Vec<CopySpec>,
    #[serde(default)]
    deploy: DeployConfig,
}

/// Complete build configuration, loaded once per invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    pub port: u16,
    pub build_path: PathBuf,
    pub livereload: u16,
    pub content: ContentConfig,
    pub images: ImageConfig,
    pub styles: StyleConfig,
    pub scripts: ScriptConfig,
    pub assets: Vec<CopySpec>,
    pub deploy: DeployConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            build_path: PathBuf::from(DEFAULT_BUILD_PATH),
            livereload: DEFAULT_LIVERELOAD_PORT,
            content: ContentConfig::default(),
            images: ImageConfig::default(),
            styles: StyleConfig::default(),
            scripts: ScriptConfig::default(),
            assets: default_assets(),
            deploy: DeployConfig::default(),
        }
    }
}

impl BuildConfig {
    /// Output directory resolved against the project root
    pub fn build_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.build_path)
    }

    /// Location of the aggregated content document
    pub fn data_path(&self, root: &Path) -> PathBuf {
        root.join(&self.content.data_path)
    }

    /// Compiled stylesheet location
    pub fn stylesheet(&self, root: &Path) -> PathBuf {
        self.build_dir(root).join(&self.styles.output)
    }
}

/// Content import settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentConfig {
    pub base_dir: PathBuf,
    /// Site-wide data file inside `base_dir`
    pub config: String,
    pub data_path: PathBuf,
    pub default_template: String,
    pub markdown: MarkdownOptions,
    pub paginate: Vec<Paginate>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("contents"),
            config: "config.json".to_string(),
            data_path: PathBuf::from("build/data.json"),
            default_template: "page".to_string(),
            markdown: MarkdownOptions::default(),
            paginate: vec![Paginate {
                dir: "articles".to_string(),
                post_per_page: 4,
                template: "archive".to_string(),
                title: "Articles".to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkdownOptions {
    /// Render single newlines as `<br />`
    pub breaks: bool,
    /// Typographic quotes and dashes
    pub smartypants: bool,
    /// Class prefix for fenced code blocks
    pub lang_prefix: String,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            breaks: true,
            smartypants: true,
            lang_prefix: "language-".to_string(),
        }
    }
}

/// A paginated listing of the entries below one content directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginate {
    pub dir: String,
    pub post_per_page: usize,
    pub template: String,
    pub title: String,
}

/// Image pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageConfig {
    /// Source images, copied (dev) or optimized (prod) into the build dir
    pub source: CopySpec,
    /// Patterns, relative to the build dir, that get responsive variants
    pub responsive: Vec<String>,
    pub sizes: Vec<ImageSize>,
    /// JPEG re-encoding quality used by the optimizer
    pub quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            source: CopySpec {
                cwd: PathBuf::from("contents"),
                src: vec!["**/*.{jpg,png,gif}".to_string()],
                dest: String::new(),
            },
            responsive: vec!["**/*.{jpg,png}".to_string()],
            sizes: vec![
                ImageSize {
                    name: "small".to_string(),
                    width: 500,
                },
                ImageSize {
                    name: "medium".to_string(),
                    width: 800,
                },
            ],
            quality: 85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub name: String,
    pub width: u32,
}

/// Stylesheet settings. A tool set to `null` disables its step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleConfig {
    pub entry: PathBuf,
    /// Output path relative to the build dir
    pub output: PathBuf,
    pub autoprefixer: Option<ExternalTool>,
    pub minifier: Option<ExternalTool>,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            entry: PathBuf::from("sass/main.scss"),
            output: PathBuf::from("css/main.css"),
            autoprefixer: Some(ExternalTool::new(
                "postcss",
                &["{css}", "--use", "autoprefixer", "--replace"],
            )),
            minifier: Some(ExternalTool::new("csso", &["{css}", "--output", "{css}"])),
        }
    }
}

/// Script bundling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptConfig {
    pub bundler: Option<ExternalTool>,
    /// Source-map globs relative to the build dir
    pub sourcemaps: Vec<String>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            bundler: Some(ExternalTool::new(
                "r.js",
                &[
                    "-o",
                    "baseUrl=.",
                    "mainConfigFile=js/config.js",
                    "name=components/almond/almond",
                    "insertRequire=js/app",
                    "out={buildPath}/app.js",
                    "optimize=uglify2",
                    "generateSourceMaps=true",
                    "preserveLicenseComments=false",
                ],
            )),
            sourcemaps: vec!["app.js.map".to_string()],
        }
    }
}

/// An external program invoked by a pipeline step.
///
/// Arguments may contain `{buildPath}`, `{root}` and `{css}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTool {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ExternalTool {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Grunt-style expanded copy: every file under `cwd` matching one of the
/// `src` globs lands at `<buildPath>/<dest>/<relative path>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CopySpec {
    pub cwd: PathBuf,
    pub src: Vec<String>,
    pub dest: String,
}

impl Default for CopySpec {
    fn default() -> Self {
        Self {
            cwd: PathBuf::from("."),
            src: Vec::new(),
            dest: String::new(),
        }
    }
}

fn default_assets() -> Vec<CopySpec> {
    vec![
        CopySpec {
            cwd: PathBuf::from("."),
            src: vec!["CNAME".to_string()],
            dest: String::new(),
        },
        CopySpec {
            cwd: PathBuf::from("components"),
            src: vec!["fancybox/source/**/*".to_string()],
            dest: "components".to_string(),
        },
        CopySpec {
            cwd: PathBuf::from("sass"),
            src: vec!["assets/**/*".to_string()],
            dest: "css".to_string(),
        },
    ]
}

/// Publishing target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub repo: Option<String>,
    pub branch: String,
    pub message: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            repo: None,
            branch: "master".to_string(),
            message: "Updates".to_string(),
        }
    }
}

/// Parse the build configuration from a file path
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BuildConfig> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse the build configuration from a string (useful for testing)
pub fn parse_config_str(content: &str) -> Result<BuildConfig> {
    let raw: RawConfig =
        serde_json::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))?;

    let port = match raw.port {
        Some(value) if is_falsy(&value) => DEFAULT_PORT,
        Some(value) => parse_port(&value, "port")?,
        None => DEFAULT_PORT,
    };

    let livereload = match raw.livereload {
        Some(value) if is_falsy(&value) => DEFAULT_LIVERELOAD_PORT,
        Some(value) => parse_port(&value, "livereload")?,
        None => DEFAULT_LIVERELOAD_PORT,
    };

    let build_path = match raw.build_path {
        Some(path) if path.trim().is_empty() => {
            return Err(Error::ConfigParse("Empty path in 'buildPath' field".to_string()));
        }
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(DEFAULT_BUILD_PATH),
    };

    for (i, spec) in raw.assets.iter().enumerate() {
        validate_dest(&spec.dest, &format!("assets[{}].dest", i))?;
    }
    validate_dest(&raw.images.source.dest, "images.source.dest")?;
    validate_path(&raw.styles.output.to_string_lossy(), "styles.output")?;

    for group in &raw.content.paginate {
        if group.post_per_page == 0 {
            return Err(Error::ConfigParse(format!(
                "postPerPage must be at least 1 for '{}'",
                group.dir
            )));
        }
    }

    for size in &raw.images.sizes {
        if size.width == 0 || size.name.trim().is_empty() {
            return Err(Error::ConfigParse(format!(
                "Invalid responsive size '{}' ({}px)",
                size.name, size.width
            )));
        }
    }

    Ok(BuildConfig {
        port,
        build_path,
        livereload,
        content: raw.content,
        images: raw.images,
        styles: raw.styles,
        scripts: raw.scripts,
        assets: raw.assets,
        deploy: raw.deploy,
    })
}

/// JavaScript truthiness, as the config format was written against it
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn parse_port(value: &Value, field_name: &str) -> Result<u16> {
    let port = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    port.and_then(|p| u16::try_from(p).ok())
        .ok_or_else(|| Error::ConfigParse(format!("Invalid port in '{}': {}", field_name, value)))
}

/// An empty destination means the build root itself.
fn validate_dest(dest: &str, field_name: &str) -> Result<()> {
    if dest.is_empty() || dest == "." {
        return Ok(());
    }
    validate_path(dest, field_name).map(|_| ())
}

/// Validate and convert a path string to PathBuf.
///
/// Destinations inside the build directory must stay inside it, so this
/// rejects:
/// - Absolute paths (starting with `/` or Windows drive letters)
/// - Paths containing parent directory references (`..`)
///
/// # Examples
///
/// ```text
/// validate_path("css", "assets[2].dest")  → Ok(PathBuf)
/// validate_path("/etc", "assets[0].dest")  → Err("Absolute paths not allowed...")
/// validate_path("../www", "styles.output")  → Err("Parent directory references...")
/// ```
pub fn validate_path(path_str: &str, field_name: &str) -> Result<PathBuf> {
    let path = Path::new(path_str);

    if path.is_absolute() {
        return Err(Error::ConfigParse(format!(
            "Absolute paths not allowed in '{}': '{}'. Use relative paths only.",
            field_name, path_str
        )));
    }

    for component in path.components() {
        if component == std::path::Component::ParentDir {
            return Err(Error::ConfigParse(format!(
                "Parent directory references (..) not allowed in '{}': '{}'",
                field_name, path_str
            )));
        }
    }

    if path_str.trim().is_empty() {
        return Err(Error::ConfigParse(format!(
            "Empty path in '{}' field",
            field_name
        )));
    }

    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = parse_config_str(
            r#"{ "port": 4000, "buildPath": "build/www", "livereload": 35730 }"#,
        )
        .unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.build_path, PathBuf::from("build/www"));
        assert_eq!(config.livereload, 35730);
        assert_eq!(config.deploy.branch, "master");
        assert_eq!(config.scripts.sourcemaps, vec!["app.js.map"]);
        assert_eq!(config.assets.len(), 3);
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = parse_config_str("{}").unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.build_path, PathBuf::from(DEFAULT_BUILD_PATH));
        assert_eq!(config.livereload, DEFAULT_LIVERELOAD_PORT);
        assert_eq!(config.content.paginate[0].post_per_page, 4);
        assert_eq!(config.images.sizes.len(), 2);
    }

    #[test]
    fn test_falsy_livereload_falls_back() {
        for raw in ["0", "null", "false", "\"\""] {
            let config = parse_config_str(&format!(r#"{{ "livereload": {} }}"#, raw)).unwrap();
            assert_eq!(config.livereload, DEFAULT_LIVERELOAD_PORT, "livereload = {}", raw);
        }
    }

    #[test]
    fn test_port_accepts_numeric_string() {
        let config = parse_config_str(r#"{ "port": "9001" }"#).unwrap();
        assert_eq!(config.port, 9001);
    }

    #[test]
    fn test_port_out_of_range() {
        let result = parse_config_str(r#"{ "port": 70000 }"#);
        assert!(result.unwrap_err().to_string().contains("Invalid port in 'port'"));
    }

    #[test]
    fn test_rejects_empty_build_path() {
        let result = parse_config_str(r#"{ "buildPath": "  " }"#);
        assert!(result.unwrap_err().to_string().contains("buildPath"));
    }

    #[test]
    fn test_null_tool_disables_step() {
        let config =
            parse_config_str(r#"{ "styles": { "autoprefixer": null, "minifier": null } }"#)
                .unwrap();
        assert!(config.styles.autoprefixer.is_none());
        assert!(config.styles.minifier.is_none());
        assert_eq!(config.styles.entry, PathBuf::from("sass/main.scss"));
    }

    #[test]
    fn test_rejects_zero_post_per_page() {
        let result = parse_config_str(
            r#"{ "content": { "paginate": [
                { "dir": "articles", "postPerPage": 0, "template": "archive", "title": "A" }
            ] } }"#,
        );
        assert!(result.unwrap_err().to_string().contains("postPerPage"));
    }

    #[test]
    fn test_malformed_json() {
        let result = parse_config_str("{ port: 4000 ");
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[test]
    fn test_validate_path_valid_relative() {
        assert!(validate_path("css", "dest").is_ok());
        assert!(validate_path("components/fancybox", "dest").is_ok());
        assert!(validate_path("css/main.css", "styles.output").is_ok());
    }

    #[test]
    fn test_validate_path_rejects_absolute_unix() {
        let result = validate_path("/etc/passwd", "dest");
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Absolute paths not allowed")
        );
    }

    #[test]
    fn test_validate_path_rejects_parent_dir() {
        let result = validate_path("../www", "dest");
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Parent directory references")
        );

        assert!(validate_path("css/../../secret", "dest").is_err());
    }

    #[test]
    fn test_validate_path_field_name_in_error() {
        let result = validate_path("/srv", "assets[1].dest");
        assert!(result.unwrap_err().to_string().contains("assets[1].dest"));
    }

    #[test]
    fn test_asset_dest_traversal_rejected() {
        let result = parse_config_str(
            r#"{ "assets": [ { "cwd": ".", "src": ["CNAME"], "dest": "../outside" } ] }"#,
        );
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("assets[0].dest")
        );
    }

    #[test]
    fn test_empty_asset_dest_is_build_root() {
        let config =
            parse_config_str(r#"{ "assets": [ { "src": ["CNAME"] } ] }"#).unwrap();
        assert_eq!(config.assets[0].dest, "");
        assert_eq!(config.assets[0].cwd, PathBuf::from("."));
    }
}
