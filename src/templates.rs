//! Flat-file HTML templating: pages, layouts, and partials.
//!
//! Every `*.html` file under the templates directory is a page. A page may
//! open with a YAML front matter block:
//!
//! ```text
//! ---
//! title: About
//! layout: default
//! ---
//! <h1>{{ title }}</h1>
//! {{> team-list}}
//! ```
//!
//! The rendered page is wrapped in its layout (`layouts/<name>.html`, default
//! `default`, or no layout at all with `layout: none`), which places the page
//! with `{{> body}}`. Partials live in the partials directory and are named by
//! file stem.
//!
//! ## Tags
//!
//! | Tag | Meaning |
//! |-----|---------|
//! | `{{ a.b }}` | Front matter value, HTML-escaped; missing keys render empty |
//! | `{{{ a }}}` / `{{& a }}` | Same, unescaped |
//! | `{{> name }}` | Partial include |
//! | `{{! ... }}` / `{{!-- ... --}}` | Comment, dropped |
//!
//! Block helpers (`{{#...}}`, `{{/...}}`, `{{^...}}`, `{{else}}`) are not
//! supported and fail at parse time rather than rendering garbage.
//!
//! Besides front matter, every page sees `page` (file stem), `root` (relative
//! prefix back to the output root, e.g. `../`), and `layout`.
//!
//! ## Caching
//!
//! Parsed templates are memoized in a [`TemplateCache`] keyed by path, so a
//! rebuild only re-reads files after [`TemplateCompiler::invalidate`]. The
//! watcher resets the cache before every HTML rebuild.

use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use walkdir::WalkDir;

/// Partials nested deeper than this are assumed to include themselves.
const MAX_PARTIAL_DEPTH: usize = 32;

const DEFAULT_LAYOUT: &str = "default";
const NO_LAYOUT: &str = "none";

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\{\{\{\s*([^}]*?)\s*\}\}\}|\{\{!--[\s\S]*?--\}\}|\{\{![\s\S]*?\}\}|\{\{\s*([^}]*?)\s*\}\}",
    )
    .expect("tag pattern is valid")
});

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Templates directory not found: {}", .0.display())]
    MissingRoot(PathBuf),
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}: invalid front matter: {source}", .path.display())]
    FrontMatter {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("{}: front matter must be a mapping", .0.display())]
    FrontMatterShape(PathBuf),
    #[error("{}: unsupported block tag '{tag}'", .path.display())]
    Unsupported { path: PathBuf, tag: String },
    #[error("{}: empty tag", .0.display())]
    EmptyTag(PathBuf),
    #[error("Layout '{layout}' not found for {}", .page.display())]
    MissingLayout { layout: String, page: PathBuf },
    #[error("Partial '{name}' not found (included from {})", .from.display())]
    MissingPartial { name: String, from: PathBuf },
    #[error("Partial '{0}' nests too deeply (does it include itself?)")]
    PartialCycle(String),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Value { path: Vec<String>, raw: bool },
    Partial(String),
}

/// A parsed template file.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    data: Mapping,
    nodes: Vec<Node>,
}

impl Template {
    /// Parse `source`; `path` is only used for error messages.
    pub fn parse(source: &str, path: &Path) -> Result<Self, TemplateError> {
        let (front, body) = split_front_matter(source);
        let data = match front {
            None => Mapping::new(),
            Some(yaml) => match serde_yaml::from_str::<Value>(yaml).map_err(|source| {
                TemplateError::FrontMatter {
                    path: path.to_path_buf(),
                    source,
                }
            })? {
                Value::Null => Mapping::new(),
                Value::Mapping(map) => map,
                _ => return Err(TemplateError::FrontMatterShape(path.to_path_buf())),
            },
        };
        Ok(Self {
            data,
            nodes: parse_nodes(body, path)?,
        })
    }

    fn layout(&self) -> String {
        match self.data.get("layout") {
            Some(Value::String(name)) => name.clone(),
            _ => DEFAULT_LAYOUT.to_string(),
        }
    }
}

/// Split a leading `---` fenced block from the body.
fn split_front_matter(source: &str) -> (Option<&str>, &str) {
    let Some(rest) = source.strip_prefix("---") else {
        return (None, source);
    };
    let Some(rest) = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')) else {
        return (None, source);
    };
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return (Some(&rest[..offset]), &rest[offset + line.len()..]);
        }
        offset += line.len();
    }
    (None, source)
}

fn parse_nodes(body: &str, path: &Path) -> Result<Vec<Node>, TemplateError> {
    let mut nodes = Vec::new();
    let mut last = 0;
    for caps in TAG.captures_iter(body) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            nodes.push(Node::Text(body[last..whole.start()].to_string()));
        }
        last = whole.end();

        if let Some(raw) = caps.get(1) {
            nodes.push(value_node(raw.as_str().trim(), true, path)?);
        } else if let Some(expr) = caps.get(2) {
            nodes.push(expression(expr.as_str().trim(), path)?);
        }
        // Neither group: a comment.
    }
    if last < body.len() {
        nodes.push(Node::Text(body[last..].to_string()));
    }
    Ok(nodes)
}

fn expression(expr: &str, path: &Path) -> Result<Node, TemplateError> {
    if let Some(name) = expr.strip_prefix('>') {
        return match name.split_whitespace().next() {
            Some(name) => Ok(Node::Partial(name.to_string())),
            None => Err(TemplateError::EmptyTag(path.to_path_buf())),
        };
    }
    if let Some(raw) = expr.strip_prefix('&') {
        return value_node(raw.trim(), true, path);
    }
    if expr.starts_with(['#', '/', '^']) || expr == "else" {
        return Err(TemplateError::Unsupported {
            path: path.to_path_buf(),
            tag: expr.to_string(),
        });
    }
    value_node(expr, false, path)
}

fn value_node(expr: &str, raw: bool, path: &Path) -> Result<Node, TemplateError> {
    if expr.is_empty() {
        return Err(TemplateError::EmptyTag(path.to_path_buf()));
    }
    Ok(Node::Value {
        path: expr.split('.').map(str::to_string).collect(),
        raw,
    })
}

/// Escape text for HTML element and attribute content.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '`' => out.push_str("&#x60;"),
            '=' => out.push_str("&#x3D;"),
            c => out.push(c),
        }
    }
    out
}

fn lookup<'v>(context: &'v Mapping, path: &[String]) -> Option<&'v Value> {
    let (first, rest) = path.split_first()?;
    let mut value = context.get(first.as_str())?;
    for key in rest {
        value = value.get(key.as_str())?;
    }
    Some(value)
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Tagged(tagged) => display(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => String::new(),
    }
}

/// Parsed templates keyed by path.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: Mutex<HashMap<PathBuf, Arc<Template>>>,
}

impl TemplateCache {
    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<Template>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached parse of `path`, reading and parsing it on a miss.
    pub fn load(&self, path: &Path) -> Result<Arc<Template>, TemplateError> {
        let cached = self.lock().get(path).cloned();
        if let Some(template) = cached {
            return Ok(template);
        }
        let source = fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let template = Arc::new(Template::parse(&source, path)?);
        Ok(Arc::clone(
            self.lock()
                .entry(path.to_path_buf())
                .or_insert(template),
        ))
    }

    pub fn invalidate(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Partial name to file.
#[derive(Debug, Default)]
struct PartialIndex(HashMap<String, PathBuf>);

impl PartialIndex {
    fn scan(dir: &Path) -> Result<Self, TemplateError> {
        let mut index = HashMap::new();
        if !dir.is_dir() {
            return Ok(Self(index));
        }
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            let is_partial = entry.file_type().is_file()
                && matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("html" | "hbs")
                );
            if !is_partial {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(existing) = index.get(name) {
                tracing::warn!(
                    partial = name,
                    kept = %Path::display(existing),
                    ignored = %path.display(),
                    "duplicate partial name"
                );
                continue;
            }
            index.insert(name.to_string(), path.to_path_buf());
        }
        Ok(Self(index))
    }
}

struct Render<'a> {
    cache: &'a TemplateCache,
    partials: &'a PartialIndex,
    context: &'a Mapping,
    body: Option<&'a str>,
}

impl Render<'_> {
    fn nodes(
        &self,
        nodes: &[Node],
        from: &Path,
        depth: usize,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Value { path, raw } => {
                    let text = lookup(self.context, path).map(display).unwrap_or_default();
                    if *raw {
                        out.push_str(&text);
                    } else {
                        out.push_str(&escape_html(&text));
                    }
                }
                Node::Partial(name) => match (name.as_str(), self.body) {
                    ("body", Some(body)) => out.push_str(body),
                    _ => {
                        if depth >= MAX_PARTIAL_DEPTH {
                            return Err(TemplateError::PartialCycle(name.clone()));
                        }
                        let path = self.partials.0.get(name).ok_or_else(|| {
                            TemplateError::MissingPartial {
                                name: name.clone(),
                                from: from.to_path_buf(),
                            }
                        })?;
                        let partial = self.cache.load(path)?;
                        self.nodes(&partial.nodes, path, depth + 1, out)?;
                    }
                },
            }
        }
        Ok(())
    }
}

/// Renders every page under `root` into a distribution directory.
#[derive(Debug)]
pub struct TemplateCompiler {
    root: PathBuf,
    layouts: PathBuf,
    partials: PathBuf,
    cache: TemplateCache,
}

impl TemplateCompiler {
    pub fn new(root: impl Into<PathBuf>, layouts: impl Into<PathBuf>, partials: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            layouts: layouts.into(),
            partials: partials.into(),
            cache: TemplateCache::default(),
        }
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    /// Forget every parsed template so the next render re-reads from disk.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Every page, sorted, as absolute paths.
    pub fn pages(&self) -> Result<Vec<PathBuf>, TemplateError> {
        if !self.root.is_dir() {
            return Err(TemplateError::MissingRoot(self.root.clone()));
        }
        let mut pages = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|e| e.to_str()) == Some("html")
            {
                pages.push(entry.into_path());
            }
        }
        Ok(pages)
    }

    /// Where each page lands under `dist`.
    pub fn output_paths(&self, dist: &Path) -> Result<Vec<PathBuf>, TemplateError> {
        Ok(self
            .pages()?
            .iter()
            .map(|page| dist.join(self.relative(page)))
            .collect())
    }

    fn relative<'p>(&self, page: &'p Path) -> &'p Path {
        page.strip_prefix(&self.root).unwrap_or(page)
    }

    /// Render a single page with its layout.
    pub fn render_page(&self, page: &Path) -> Result<String, TemplateError> {
        let partials = PartialIndex::scan(&self.partials)?;
        self.render_with(page, &partials)
    }

    fn render_with(&self, page: &Path, partials: &PartialIndex) -> Result<String, TemplateError> {
        let template = self.cache.load(page)?;
        let layout_name = template.layout();
        let layout = if layout_name == NO_LAYOUT {
            None
        } else {
            let path = self.layouts.join(format!("{layout_name}.html"));
            if !path.is_file() {
                return Err(TemplateError::MissingLayout {
                    layout: layout_name,
                    page: page.to_path_buf(),
                });
            }
            Some((self.cache.load(&path)?, path))
        };

        let mut context = Mapping::new();
        if let Some((layout, _)) = &layout {
            context.extend(layout.data.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        context.extend(template.data.iter().map(|(k, v)| (k.clone(), v.clone())));
        let rel = self.relative(page);
        let depth = rel.components().count().saturating_sub(1);
        let stem = page.file_stem().map(|s| s.to_string_lossy().into_owned());
        context.insert("page".into(), stem.unwrap_or_default().into());
        context.insert("root".into(), "../".repeat(depth).into());
        context.insert("layout".into(), layout_name.into());

        let mut body = String::new();
        Render {
            cache: &self.cache,
            partials,
            context: &context,
            body: None,
        }
        .nodes(&template.nodes, page, 0, &mut body)?;

        let Some((layout, layout_path)) = layout else {
            return Ok(body);
        };
        let mut out = String::new();
        Render {
            cache: &self.cache,
            partials,
            context: &context,
            body: Some(&body),
        }
        .nodes(&layout.nodes, &layout_path, 0, &mut out)?;
        Ok(out)
    }

    /// Render every page into `dist`, preserving relative paths.
    ///
    /// Returns the written files.
    pub fn compile_all(&self, dist: &Path) -> Result<Vec<PathBuf>, TemplateError> {
        let pages = self.pages()?;
        let partials = PartialIndex::scan(&self.partials)?;
        let mut written = Vec::with_capacity(pages.len());
        for page in &pages {
            let html = self.render_with(page, &partials)?;
            let out = dist.join(self.relative(page));
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&out, html)?;
            tracing::debug!(page = %self.relative(page).display(), "rendered");
            written.push(out);
        }
        Ok(written)
    }
}
