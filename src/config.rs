//! Project configuration module.
//!
//! Handles loading, validating, and resolving `sitepipe.toml`. The file is
//! optional: every key has a stock default, and a user file only needs the
//! values it wants to override.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [paths.src]
//! templates = "templates"        # Page templates (every *.html is a page)
//! layouts = "static/layouts"     # Layout wrappers, selected by front matter
//! partials = "static/partials"   # Partials, included with {{> name}}
//! scss = "static/scss"           # Style sources (watched)
//! js = "static/app"              # Script sources (watched, bundle entry lives here)
//! fonts = "static/fonts"
//! img = "static/img"
//!
//! [paths.dist]
//! base = "static/dist"           # Removed by `clean`; HTML lands here
//! css = "static/dist/css"
//! js = "static/dist/js"
//! fonts = "static/dist/fonts"
//! img = "static/dist/img"
//!
//! [styles]
//! entry = "static/scss/main.scss"
//! output = "main.css"
//! command = "sass"
//! args = ["--style=expanded", "--source-map", "--embed-sources",
//!         "--load-path=node_modules", "{input}", "{output}"]
//! browsers = ["last 2 versions"]
//! minify = true
//! source_map = true
//!
//! [scripts]
//! entry = "main.js"              # Relative to paths.src.js
//! output = "bundle.js"
//! command = "esbuild"
//! args = ["{input}", "--bundle", "--target=es2015", "--outfile={output}"]
//!
//! [vendor]
//! css = ["node_modules/simplebar/dist/simplebar.min.css", "...", "static/vendor/css/*"]
//! css_output = "app.css"
//! js = ["static/js/*"]
//! js_output = "app.js"
//!
//! [images]
//! quality = 80                   # JPEG re-encoding quality (1-100)
//! cache = true                   # Reuse optimized images across builds
//!
//! [processing]
//! max_processes = 4              # Max parallel image workers (omit for auto)
//!
//! [server]
//! host = "127.0.0.1"
//! port = 5000
//! live_reload = true
//!
//! [watch]
//! debounce_ms = 100
//!
//! [setup]
//! source = "node_modules/bulma"
//! dest = "static/sass"
//! pattern = "**/*.sass"
//! ```
//!
//! Unknown keys are rejected to catch typos early. All paths are relative to
//! the project root and resolved once, at load time, into [`ResolvedPaths`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file looked up in the project root.
pub const CONFIG_FILENAME: &str = "sitepipe.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Project configuration loaded from `sitepipe.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Source and destination directories per asset category.
    pub paths: PathsConfig,
    /// SCSS compilation and vendor prefixing.
    pub styles: StylesConfig,
    /// JavaScript bundling.
    pub scripts: ScriptsConfig,
    /// Ordered vendor CSS/JS concatenation inputs.
    pub vendor: VendorConfig,
    /// Image optimization settings.
    pub images: ImagesConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// Development server.
    pub server: ServerConfig,
    /// File watcher.
    pub watch: WatchConfig,
    /// One-time style library scaffolding.
    pub setup: SetupConfig,
}

/// Source/destination mapping for every asset category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub src: SourcePaths,
    pub dist: DistPaths,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcePaths {
    pub templates: String,
    pub layouts: String,
    pub partials: String,
    pub scss: String,
    pub js: String,
    pub fonts: String,
    pub img: String,
}

impl Default for SourcePaths {
    fn default() -> Self {
        Self {
            templates: "templates".to_string(),
            layouts: "static/layouts".to_string(),
            partials: "static/partials".to_string(),
            scss: "static/scss".to_string(),
            js: "static/app".to_string(),
            fonts: "static/fonts".to_string(),
            img: "static/img".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DistPaths {
    pub base: String,
    pub css: String,
    pub js: String,
    pub fonts: String,
    pub img: String,
}

impl Default for DistPaths {
    fn default() -> Self {
        Self {
            base: "static/dist".to_string(),
            css: "static/dist/css".to_string(),
            js: "static/dist/js".to_string(),
            fonts: "static/dist/fonts".to_string(),
            img: "static/dist/img".to_string(),
        }
    }
}

/// Style compilation settings.
///
/// `command` is the external SCSS compiler. `{input}` and `{output}` inside
/// `args` are replaced with the entry stylesheet and the intermediate CSS path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StylesConfig {
    pub entry: String,
    pub output: String,
    pub command: String,
    pub args: Vec<String>,
    /// Browserslist queries used for vendor prefixing.
    pub browsers: Vec<String>,
    pub minify: bool,
    pub source_map: bool,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            entry: "static/scss/main.scss".to_string(),
            output: "main.css".to_string(),
            command: "sass".to_string(),
            args: vec![
                "--style=expanded".to_string(),
                "--source-map".to_string(),
                "--embed-sources".to_string(),
                "--load-path=node_modules".to_string(),
                "{input}".to_string(),
                "{output}".to_string(),
            ],
            browsers: vec!["last 2 versions".to_string()],
            minify: true,
            source_map: true,
        }
    }
}

/// Script bundling settings. Same placeholder rules as [`StylesConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptsConfig {
    /// Entry script, relative to `paths.src.js`.
    pub entry: String,
    pub output: String,
    pub command: String,
    pub args: Vec<String>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            entry: "main.js".to_string(),
            output: "bundle.js".to_string(),
            command: "esbuild".to_string(),
            args: vec![
                "{input}".to_string(),
                "--bundle".to_string(),
                "--target=es2015".to_string(),
                "--outfile={output}".to_string(),
            ],
        }
    }
}

/// Vendor concatenation inputs. Entries are literal paths or globs, kept in
/// the listed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VendorConfig {
    pub css: Vec<String>,
    pub css_output: String,
    pub js: Vec<String>,
    pub js_output: String,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            css: vec![
                "node_modules/simplebar/dist/simplebar.min.css".to_string(),
                "node_modules/plyr/dist/plyr.css".to_string(),
                "node_modules/codemirror/lib/codemirror.css".to_string(),
                "node_modules/codemirror/theme/shadowfox.css".to_string(),
                "static/vendor/css/*".to_string(),
            ],
            css_output: "app.css".to_string(),
            js: vec!["static/js/*".to_string()],
            js_output: "app.js".to_string(),
        }
    }
}

/// Image optimization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// JPEG re-encoding quality (1 = worst, 100 = best).
    pub quality: u32,
    /// Reuse previously optimized images when source and settings match.
    pub cache: bool,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            quality: 80,
            cache: true,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Inject the reload script into served HTML.
    pub live_reload: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            live_reload: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Quiet period before a burst of file events is dispatched.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SetupConfig {
    pub source: String,
    pub dest: String,
    pub pattern: String,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            source: "node_modules/bulma".to_string(),
            dest: "static/sass".to_string(),
            pattern: "**/*.sass".to_string(),
        }
    }
}

impl SiteConfig {
    /// Validate config values and the path mapping invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let src = &self.paths.src;
        let dist = &self.paths.dist;
        let named = [
            ("paths.src.templates", &src.templates),
            ("paths.src.layouts", &src.layouts),
            ("paths.src.partials", &src.partials),
            ("paths.src.scss", &src.scss),
            ("paths.src.js", &src.js),
            ("paths.src.fonts", &src.fonts),
            ("paths.src.img", &src.img),
            ("paths.dist.base", &dist.base),
            ("paths.dist.css", &dist.css),
            ("paths.dist.js", &dist.js),
            ("paths.dist.fonts", &dist.fonts),
            ("paths.dist.img", &dist.img),
            ("styles.entry", &self.styles.entry),
            ("styles.output", &self.styles.output),
            ("styles.command", &self.styles.command),
            ("scripts.entry", &self.scripts.entry),
            ("scripts.output", &self.scripts.output),
            ("scripts.command", &self.scripts.command),
            ("vendor.css_output", &self.vendor.css_output),
            ("vendor.js_output", &self.vendor.js_output),
        ];
        for (key, value) in named {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }

        for (key, value) in named.iter().filter(|(key, _)| !key.ends_with(".command")) {
            check_contained(key, value)?;
        }
        for (key, value) in [("setup.dest", &self.setup.dest)] {
            check_contained(key, value)?;
        }

        let base = normalize(Path::new(&dist.base));
        for (key, value) in [
            ("paths.dist.css", &dist.css),
            ("paths.dist.js", &dist.js),
            ("paths.dist.fonts", &dist.fonts),
            ("paths.dist.img", &dist.img),
        ] {
            let dir = normalize(Path::new(value));
            if dir == base || !dir.starts_with(&base) {
                return Err(ConfigError::Validation(format!(
                    "{key} ({value}) must be a subdirectory of paths.dist.base ({})",
                    dist.base
                )));
            }
        }

        for (key, value) in [
            ("paths.src.templates", &src.templates),
            ("paths.src.layouts", &src.layouts),
            ("paths.src.partials", &src.partials),
            ("paths.src.scss", &src.scss),
            ("paths.src.js", &src.js),
            ("paths.src.fonts", &src.fonts),
            ("paths.src.img", &src.img),
        ] {
            let dir = normalize(Path::new(value));
            if dir.starts_with(&base) {
                return Err(ConfigError::Validation(format!(
                    "{key} ({value}) must not live inside paths.dist.base ({})",
                    dist.base
                )));
            }
        }

        if self.images.quality == 0 || self.images.quality > 100 {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port must be non-zero".into()));
        }
        if self.watch.debounce_ms > 10_000 {
            return Err(ConfigError::Validation(
                "watch.debounce_ms must be at most 10000".into(),
            ));
        }
        Ok(())
    }

    /// Resolve every configured path against the project root.
    pub fn resolve(&self, root: &Path) -> ResolvedPaths {
        let src = &self.paths.src;
        let dist = &self.paths.dist;
        ResolvedPaths {
            root: root.to_path_buf(),
            templates: root.join(&src.templates),
            layouts: root.join(&src.layouts),
            partials: root.join(&src.partials),
            scss: root.join(&src.scss),
            js: root.join(&src.js),
            fonts: root.join(&src.fonts),
            img: root.join(&src.img),
            dist_base: root.join(&dist.base),
            dist_css: root.join(&dist.css),
            dist_js: root.join(&dist.js),
            dist_fonts: root.join(&dist.fonts),
            dist_img: root.join(&dist.img),
            style_entry: root.join(&self.styles.entry),
            script_entry: root.join(&src.js).join(&self.scripts.entry),
            cache_dir: root.join(".sitepipe-cache"),
        }
    }
}

/// Absolute paths for every asset category, computed once at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub root: PathBuf,
    pub templates: PathBuf,
    pub layouts: PathBuf,
    pub partials: PathBuf,
    pub scss: PathBuf,
    pub js: PathBuf,
    pub fonts: PathBuf,
    pub img: PathBuf,
    pub dist_base: PathBuf,
    pub dist_css: PathBuf,
    pub dist_js: PathBuf,
    pub dist_fonts: PathBuf,
    pub dist_img: PathBuf,
    pub style_entry: PathBuf,
    pub script_entry: PathBuf,
    pub cache_dir: PathBuf,
}

impl ResolvedPaths {
    /// URL path under which a file in the distribution directory is served.
    ///
    /// Returns `None` when `path` is outside `dist_base`.
    pub fn url_for(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.dist_base).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(format!("/{}", parts.join("/")))
    }
}

/// Reject paths that could resolve outside the project root.
///
/// `clean` removes `paths.dist.base` wholesale, so every configured path must
/// stay below the root for the source/dist checks to mean anything.
fn check_contained(key: &str, value: &str) -> Result<(), ConfigError> {
    let path = Path::new(value);
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(ConfigError::Validation(format!(
            "{key} ({value}) must be a relative path inside the project root"
        )));
    }
    Ok(())
}

/// Lexically normalize a relative path: drop `.` and empty components.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(SiteConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely, arrays included.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Load config from an explicit file path, merged over stock defaults.
pub fn load_config_file(path: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match load_raw_config(path)? {
        Some(overlay) => merge_toml(base, overlay),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `sitepipe.toml` in the given project root.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    load_config_file(&root.join(CONFIG_FILENAME))
}

/// Returns a fully-commented stock `sitepipe.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# sitepipe configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Paths are relative to the project root.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Source directories
# ---------------------------------------------------------------------------
[paths.src]
# Every *.html under this directory is a page.
templates = "templates"
# Layout wrappers; a page picks one with `layout: name` front matter.
layouts = "static/layouts"
# Partials, included from pages and layouts with {{> name}}.
partials = "static/partials"
scss = "static/scss"
# Script sources; the bundle entry is resolved inside this directory.
js = "static/app"
fonts = "static/fonts"
img = "static/img"

# ---------------------------------------------------------------------------
# Distribution directories (all must live inside `base`)
# ---------------------------------------------------------------------------
[paths.dist]
base = "static/dist"
css = "static/dist/css"
js = "static/dist/js"
fonts = "static/dist/fonts"
img = "static/dist/img"

# ---------------------------------------------------------------------------
# Styles: external SCSS compiler, then vendor prefixing + minification
# ---------------------------------------------------------------------------
[styles]
entry = "static/scss/main.scss"
output = "main.css"
command = "sass"
# {input} and {output} are replaced with the entry and the compiled CSS path.
args = ["--style=expanded", "--source-map", "--embed-sources", "--load-path=node_modules", "{input}", "{output}"]
browsers = ["last 2 versions"]
minify = true
source_map = true

# ---------------------------------------------------------------------------
# Scripts: external bundler over a single entry
# ---------------------------------------------------------------------------
[scripts]
entry = "main.js"
output = "bundle.js"
command = "esbuild"
args = ["{input}", "--bundle", "--target=es2015", "--outfile={output}"]

# ---------------------------------------------------------------------------
# Vendor concatenation (order is preserved; globs expand sorted)
# ---------------------------------------------------------------------------
[vendor]
css = [
    "node_modules/simplebar/dist/simplebar.min.css",
    "node_modules/plyr/dist/plyr.css",
    "node_modules/codemirror/lib/codemirror.css",
    "node_modules/codemirror/theme/shadowfox.css",
    "static/vendor/css/*",
]
css_output = "app.css"
js = ["static/js/*"]
js_output = "app.js"

# ---------------------------------------------------------------------------
# Images (optimized on `build`, copied as-is on `develop`)
# ---------------------------------------------------------------------------
[images]
# JPEG re-encoding quality (1 = worst, 100 = best).
quality = 80
# Reuse optimized images from .sitepipe-cache/ when nothing changed.
cache = true

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Development server
# ---------------------------------------------------------------------------
[server]
host = "127.0.0.1"
port = 5000
live_reload = true

# ---------------------------------------------------------------------------
# File watcher
# ---------------------------------------------------------------------------
[watch]
debounce_ms = 100

# ---------------------------------------------------------------------------
# `sitepipe setup`: copy a style library into the local style tree
# ---------------------------------------------------------------------------
[setup]
source = "node_modules/bulma"
dest = "static/sass"
pattern = "**/*.sass"
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        SiteConfig::default().validate().unwrap();
    }

    #[test]
    fn default_paths_match_category_layout() {
        let config = SiteConfig::default();
        assert_eq!(config.paths.src.templates, "templates");
        assert_eq!(config.paths.dist.base, "static/dist");
        assert_eq!(config.paths.dist.img, "static/dist/img");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.styles.browsers, vec!["last 2 versions"]);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[server]
port = 8080
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 8080);
        // Defaults preserved
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.scripts.output, "bundle.js");
    }

    #[test]
    fn stock_config_parses_to_defaults() {
        let config: SiteConfig = toml::from_str(stock_config_toml()).unwrap();
        let defaults = SiteConfig::default();
        assert_eq!(config.styles.args, defaults.styles.args);
        assert_eq!(config.vendor.css, defaults.vendor.css);
        assert_eq!(config.paths.src.js, defaults.paths.src.js);
        assert_eq!(config.processing.max_processes, None);
    }

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.paths.dist.base, "static/dist");
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILENAME),
            r#"
[vendor]
js = ["lib/a.js", "lib/b.js"]

[images]
quality = 60
"#,
        )
        .unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.vendor.js, vec!["lib/a.js", "lib/b.js"]);
        assert_eq!(config.images.quality, 60);
        assert_eq!(config.vendor.js_output, "app.js");
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILENAME), "this is not valid toml [[[").unwrap();
        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn unknown_key_rejected() {
        let toml_str = r#"
[server]
prot = 5000
"#;
        let result: Result<SiteConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn dist_category_outside_base_rejected() {
        let mut config = SiteConfig::default();
        config.paths.dist.css = "public/css".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("paths.dist.css"));
    }

    #[test]
    fn dist_category_equal_to_base_rejected() {
        let mut config = SiteConfig::default();
        config.paths.dist.img = "./static/dist".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn source_inside_dist_rejected() {
        let mut config = SiteConfig::default();
        config.paths.src.img = "static/dist/raw".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("paths.src.img"));
    }

    #[test]
    fn dist_base_in_parent_dir_rejected() {
        let mut config = SiteConfig::default();
        config.paths.dist.base = "..".to_string();
        config.paths.dist.css = "../css".to_string();
        config.paths.dist.js = "../js".to_string();
        config.paths.dist.fonts = "../fonts".to_string();
        config.paths.dist.img = "../img".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("paths.dist.base"));
    }

    #[test]
    fn absolute_dist_base_rejected() {
        let mut config = SiteConfig::default();
        config.paths.dist.base = "/".to_string();
        config.paths.dist.css = "/css".to_string();
        config.paths.dist.js = "/js".to_string();
        config.paths.dist.fonts = "/fonts".to_string();
        config.paths.dist.img = "/img".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("paths.dist.base"));
    }

    #[test]
    fn parent_dir_inside_path_rejected() {
        let mut config = SiteConfig::default();
        config.paths.dist.img = "static/dist/../../img".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("paths.dist.img"));

        let mut config = SiteConfig::default();
        config.paths.src.templates = "../templates".to_string();
        assert!(config.validate().is_err());

        let mut config = SiteConfig::default();
        config.styles.output = "../../escape.css".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_path_rejected() {
        let mut config = SiteConfig::default();
        config.paths.src.fonts = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("paths.src.fonts"));
    }

    #[test]
    fn quality_out_of_range_rejected() {
        let mut config = SiteConfig::default();
        config.images.quality = 0;
        assert!(config.validate().is_err());
        config.images.quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolve_joins_against_root() {
        let config = SiteConfig::default();
        let paths = config.resolve(Path::new("/site"));
        assert_eq!(paths.templates, PathBuf::from("/site/templates"));
        assert_eq!(paths.script_entry, PathBuf::from("/site/static/app/main.js"));
        assert_eq!(paths.dist_css, PathBuf::from("/site/static/dist/css"));
    }

    #[test]
    fn url_for_maps_dist_files() {
        let paths = SiteConfig::default().resolve(Path::new("/site"));
        assert_eq!(
            paths.url_for(Path::new("/site/static/dist/css/main.css")),
            Some("/css/main.css".to_string())
        );
        assert_eq!(paths.url_for(Path::new("/elsewhere/main.css")), None);
    }

    // =========================================================================
    // Processing config tests
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig {
            max_processes: None,
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str(
            r#"
[server]
host = "127.0.0.1"
port = 5000
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[server]
port = 3000
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let server = merged.get("server").unwrap();
        assert_eq!(server.get("port").unwrap().as_integer(), Some(3000));
        assert_eq!(server.get("host").unwrap().as_str(), Some("127.0.0.1"));
    }

    #[test]
    fn merge_toml_replaces_arrays_wholesale() {
        let base: toml::Value = toml::from_str(r#"js = ["a.js", "b.js"]"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"js = ["c.js"]"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("js").unwrap().as_array().unwrap().len(), 1);
    }
}
