//! Ordered concatenation of vendor stylesheets and scripts.
//!
//! Inputs are a list of literal paths and glob patterns, relative to the
//! project root. Order is significant: entries are expanded in the order they
//! are listed, glob matches in sorted order, and a file already included by an
//! earlier entry is skipped. A literal path that does not exist is an error;
//! a glob that matches nothing is not.

use parcel_sourcemap::{OriginalLocation, SourceMap};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConcatError {
    #[error("Input not found: {}", .0.display())]
    MissingInput(PathBuf),
    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("Glob error: {0}")]
    Glob(#[from] glob::GlobError),
    #[error("Path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Source map error: {0}")]
    SourceMap(String),
}

/// Which comment syntax the trailing source map reference uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    Css,
    Js,
}

impl BundleKind {
    fn map_reference(self, map_name: &str) -> String {
        match self {
            BundleKind::Css => format!("/*# sourceMappingURL={map_name} */"),
            BundleKind::Js => format!("//# sourceMappingURL={map_name}"),
        }
    }
}

/// What a concatenation wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub output: PathBuf,
    pub map: PathBuf,
    /// Inputs in concatenation order, relative to the project root.
    pub inputs: Vec<PathBuf>,
}

fn is_glob(entry: &str) -> bool {
    entry.contains(['*', '?', '['])
}

/// Expand `entries` against `root` into an ordered, duplicate-free file list.
pub fn resolve_inputs(root: &Path, entries: &[String]) -> Result<Vec<PathBuf>, ConcatError> {
    let root_str = root
        .to_str()
        .ok_or_else(|| ConcatError::NonUtf8Path(root.to_path_buf()))?;
    let escaped_root = glob::Pattern::escape(root_str);

    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for entry in entries {
        let matched: Vec<PathBuf> = if is_glob(entry) {
            let pattern = format!("{escaped_root}/{entry}");
            let mut hits = Vec::new();
            for path in glob::glob(&pattern).map_err(|source| ConcatError::Pattern {
                pattern: entry.clone(),
                source,
            })? {
                let path = path?;
                if path.is_file() {
                    hits.push(path);
                }
            }
            hits.sort();
            hits
        } else {
            let path = root.join(entry);
            if !path.is_file() {
                return Err(ConcatError::MissingInput(path));
            }
            vec![path]
        };

        for path in matched {
            if seen.insert(path.clone()) {
                files.push(path);
            }
        }
    }
    Ok(files)
}

/// Concatenate `entries` into `output`, writing `output.map` alongside.
pub fn concat_files(
    root: &Path,
    entries: &[String],
    output: &Path,
    kind: BundleKind,
) -> Result<Bundle, ConcatError> {
    let inputs = resolve_inputs(root, entries)?;
    let file_name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let map_name = format!("{file_name}.map");

    // Concatenation never rewrites content, so each generated line maps to
    // column zero of exactly one source line.
    let mut map = SourceMap::new(&root.to_string_lossy());
    let mut generated_line = 0u32;
    let mut parts = Vec::with_capacity(inputs.len());
    let mut relative = Vec::with_capacity(inputs.len());
    for path in &inputs {
        let content = fs::read_to_string(path)?;
        let rel = path.strip_prefix(root).unwrap_or(path).to_path_buf();
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let source = map.add_source(&name);
        map.set_source_content(source as usize, &content)
            .map_err(source_map_error)?;
        for line in 0..content.split('\n').count() as u32 {
            map.add_mapping(
                generated_line,
                0,
                Some(OriginalLocation::new(line, 0, source, None)),
            );
            generated_line += 1;
        }
        parts.push(content);
        relative.push(rel);
    }

    let mut body = parts.join("\n");
    body.push('\n');
    body.push_str(&kind.map_reference(&map_name));
    body.push('\n');

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    let map_path = output.with_file_name(&map_name);
    fs::write(output, body)?;
    fs::write(&map_path, map.to_json(None).map_err(source_map_error)?)?;

    tracing::debug!(output = %output.display(), files = inputs.len(), "concatenated");
    Ok(Bundle {
        output: output.to_path_buf(),
        map: map_path,
        inputs: relative,
    })
}

fn source_map_error(e: parcel_sourcemap::SourceMapError) -> ConcatError {
    ConcatError::SourceMap(format!("{e:?}"))
}
