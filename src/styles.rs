//! Stylesheet compilation.
//!
//! Two stages:
//!
//! 1. The configured compiler (Sass by default) turns the entry file into
//!    plain CSS, written to a scratch directory together with its map.
//! 2. Lightning CSS parses the result, adds vendor prefixes for the
//!    configured browser targets, optionally minifies, and prints the final
//!    stylesheet. When source maps are on, the printer's map is composed with
//!    the compiler's so the final map points back at the original sources.
//!    Source paths in the written map are relative to the output directory.

use crate::tools::{ToolCommand, ToolError};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StyleError {
    #[error("Style entry not found: {}", .0.display())]
    MissingEntry(PathBuf),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("Compiler produced no output at {}", .0.display())]
    NoOutput(PathBuf),
    #[error("Invalid browser targets: {0}")]
    Browsers(String),
    #[error("CSS parse error: {0}")]
    Parse(String),
    #[error("CSS minify error: {0}")]
    Minify(String),
    #[error("CSS print error: {0}")]
    Print(String),
    #[error("Source map error: {0}")]
    SourceMap(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Post-processing options for compiled CSS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostProcess {
    pub browsers: Vec<String>,
    pub minify: bool,
    pub source_map: bool,
}

/// Final stylesheet text and, when requested, its source map as JSON.
#[derive(Debug, Clone)]
pub struct ProcessedCss {
    pub code: String,
    pub map: Option<String>,
}

/// Paths written by [`compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStyle {
    pub css: PathBuf,
    pub map: Option<PathBuf>,
}

/// Drop `sourceMappingURL` comments left by the compiler; the final file gets its own.
fn strip_map_reference(css: &str) -> String {
    css.lines()
        .filter(|line| !line.trim_start().starts_with("/*# sourceMappingURL="))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prefix, minify, and print `css`.
///
/// `input_map` is the JSON map of the compiler that produced `css`, if any.
/// Absolute source paths in the result are made relative to `map_root`.
pub fn process_css(
    css: &str,
    filename: &str,
    options: &PostProcess,
    input_map: Option<&str>,
    map_root: &Path,
) -> Result<ProcessedCss, StyleError> {
    let browsers = Browsers::from_browserslist(options.browsers.iter())
        .map_err(|e| StyleError::Browsers(e.to_string()))?;
    let targets = Targets {
        browsers,
        ..Targets::default()
    };

    let mut sheet = StyleSheet::parse(
        css,
        ParserOptions {
            filename: filename.to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|e| StyleError::Parse(e.to_string()))?;

    sheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| StyleError::Minify(e.to_string()))?;

    let mut source_map = if options.source_map {
        let mut map = SourceMap::new(&map_root.to_string_lossy());
        let index = map.add_source(filename);
        map.set_source_content(index as usize, css)
            .map_err(|e| StyleError::SourceMap(format!("{e:?}")))?;
        Some(map)
    } else {
        None
    };

    let printed = sheet
        .to_css(PrinterOptions {
            minify: options.minify,
            targets,
            source_map: source_map.as_mut(),
            ..PrinterOptions::default()
        })
        .map_err(|e| StyleError::Print(e.to_string()))?;

    let map = match source_map.as_mut() {
        Some(map) => {
            if let Some(input) = input_map {
                let mut original = SourceMap::from_json(&map_root.to_string_lossy(), input)
                    .map_err(|e| StyleError::SourceMap(format!("{e:?}")))?;
                map.extends(&mut original)
                    .map_err(|e| StyleError::SourceMap(format!("{e:?}")))?;
            }
            let json = map
                .to_json(None)
                .map_err(|e| StyleError::SourceMap(format!("{e:?}")))?;
            Some(rewrite_sources(&json, |source| {
                let path = Path::new(source);
                if path.is_absolute() {
                    pathdiff::diff_paths(path, map_root)
                        .map(|rel| slash_path(&rel))
                        .unwrap_or_else(|| source.to_string())
                } else {
                    source.to_string()
                }
            })?)
        }
        None => None,
    };

    Ok(ProcessedCss {
        code: printed.code,
        map,
    })
}

/// Apply `rewrite` to every entry of a JSON source map's `sources`.
fn rewrite_sources(map: &str, rewrite: impl Fn(&str) -> String) -> Result<String, StyleError> {
    let mut value: serde_json::Value =
        serde_json::from_str(map).map_err(|e| StyleError::SourceMap(e.to_string()))?;
    if let Some(sources) = value.get_mut("sources").and_then(|s| s.as_array_mut()) {
        for source in sources.iter_mut() {
            if let Some(text) = source.as_str() {
                *source = serde_json::Value::String(rewrite(text));
            }
        }
    }
    serde_json::to_string(&value).map_err(|e| StyleError::SourceMap(e.to_string()))
}

/// Resolve the compiler's sources, which are URLs or paths relative to the
/// directory it wrote into, to absolute paths.
fn absolute_sources(map: &str, written_in: &Path) -> Result<String, StyleError> {
    rewrite_sources(map, |source| {
        let path = source.strip_prefix("file://").unwrap_or(source);
        slash_path(&fold_parents(&written_in.join(path)))
    })
}

/// Lexically resolve `.` and `..` components.
fn fold_parents(path: &Path) -> PathBuf {
    let mut folded = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                folded.pop();
            }
            other => folded.push(other),
        }
    }
    folded
}

fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Everything [`compile`] needs to know.
#[derive(Debug, Clone)]
pub struct StyleJob<'a> {
    pub entry: &'a Path,
    pub out_dir: &'a Path,
    pub output_name: &'a str,
    pub compiler: &'a ToolCommand,
    pub options: &'a PostProcess,
    /// Working directory for the compiler, normally the project root.
    pub cwd: &'a Path,
}

/// Compile the entry stylesheet into `out_dir/output_name`.
pub fn compile(job: &StyleJob<'_>) -> Result<CompiledStyle, StyleError> {
    if !job.entry.is_file() {
        return Err(StyleError::MissingEntry(job.entry.to_path_buf()));
    }

    let scratch = tempfile::tempdir()?;
    let intermediate = scratch.path().join(job.output_name);
    job.compiler.run(job.cwd, job.entry, &intermediate)?;

    let raw = fs::read_to_string(&intermediate)
        .map_err(|_| StyleError::NoOutput(intermediate.clone()))?;
    let input_map = if job.options.source_map {
        fs::read_to_string(scratch.path().join(format!("{}.map", job.output_name)))
            .ok()
            .map(|map| absolute_sources(&map, scratch.path()))
            .transpose()?
    } else {
        None
    };

    let filename = job.entry.to_string_lossy();
    let processed = process_css(
        &strip_map_reference(&raw),
        &filename,
        job.options,
        input_map.as_deref(),
        job.out_dir,
    )?;

    fs::create_dir_all(job.out_dir)?;
    let css_path = job.out_dir.join(job.output_name);
    let map_name = format!("{}.map", job.output_name);
    let map_path = match &processed.map {
        Some(map) => {
            let path = job.out_dir.join(&map_name);
            fs::write(&path, map)?;
            fs::write(
                &css_path,
                format!("{}\n/*# sourceMappingURL={map_name} */\n", processed.code),
            )?;
            Some(path)
        }
        None => {
            fs::write(&css_path, &processed.code)?;
            None
        }
    };

    tracing::debug!(output = %css_path.display(), "compiled styles");
    Ok(CompiledStyle {
        css: css_path,
        map: map_path,
    })
}
