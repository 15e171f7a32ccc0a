//! File watching and incremental rebuilds.
//!
//! A [`WatchBinding`] ties a set of source roots and glob patterns to the
//! pipeline that rebuilds them and to the reload the browser needs afterwards.
//!
//! Change handling:
//!
//! 1. The debouncer delivers batches of changed paths, one per quiet period.
//! 2. Every batch already queued is drained and merged, so a burst of saves
//!    produces one rebuild rather than a queue of them.
//! 3. [`plan_rebuilds`] picks the bindings whose patterns match, each at most
//!    once, in declaration order.
//! 4. The planned pipelines run one after another. A success triggers the
//!    binding's reload; a failure is reported and the watcher keeps going.

use crate::server::{ReloadAction, ReloadHub};
use crate::task::{Pipeline, Reporter, RunEvent};
use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, channel};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to start file watcher: {0}")]
    Init(#[source] notify::Error),
    #[error("Failed to watch {}: {source}", .path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("Invalid watch pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("No watch roots exist")]
    NoRoots,
    #[error("File watcher stopped unexpectedly")]
    Disconnected,
}

const MATCH_OPTIONS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Source roots and patterns mapped to a rebuild pipeline.
#[derive(Debug)]
pub struct WatchBinding {
    pub name: String,
    pub roots: Vec<PathBuf>,
    pub patterns: Vec<glob::Pattern>,
    pub pipeline: Arc<Pipeline>,
    pub reload: ReloadAction,
}

impl WatchBinding {
    pub fn new(name: impl Into<String>, pipeline: Pipeline, reload: ReloadAction) -> Self {
        Self {
            name: name.into(),
            roots: Vec::new(),
            patterns: Vec::new(),
            pipeline: Arc::new(pipeline),
            reload,
        }
    }

    pub fn root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.roots.push(dir.into());
        self
    }

    /// Add a glob matched against paths relative to each root.
    pub fn pattern(mut self, pattern: &str) -> Result<Self, WatchError> {
        self.patterns.push(glob::Pattern::new(pattern)?);
        Ok(self)
    }

    /// Whether `path` lies under a root and matches a pattern.
    pub fn matches(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| {
            path.strip_prefix(root).is_ok_and(|rel| {
                self.patterns
                    .iter()
                    .any(|p| p.matches_path_with(rel, MATCH_OPTIONS))
            })
        })
    }

    /// Resolve roots through symlinks so they compare equal to event paths.
    fn canonicalize_roots(&mut self) {
        for root in &mut self.roots {
            if let Ok(canonical) = root.canonicalize() {
                *root = canonical;
            }
        }
    }
}

/// Indices of bindings triggered by `paths`, each once, in declaration order.
pub fn plan_rebuilds(bindings: &[WatchBinding], paths: &[PathBuf]) -> Vec<usize> {
    bindings
        .iter()
        .enumerate()
        .filter(|(_, binding)| paths.iter().any(|p| binding.matches(p)))
        .map(|(i, _)| i)
        .collect()
}

/// Run the planned bindings serially, reloading browsers after each success.
///
/// Returns how many rebuilds failed.
pub fn dispatch(
    bindings: &[WatchBinding],
    planned: &[usize],
    paths: &[PathBuf],
    hub: &ReloadHub,
    reporter: &Reporter,
) -> usize {
    let mut failures = 0;
    for binding in planned.iter().filter_map(|&i| bindings.get(i)) {
        let matched: Vec<PathBuf> = paths
            .iter()
            .filter(|p| binding.matches(p))
            .cloned()
            .collect();
        reporter.emit(RunEvent::Changed {
            binding: binding.name.clone(),
            paths: matched,
        });

        match binding.pipeline.run(reporter) {
            Ok(()) => {
                let clients = hub.broadcast(&binding.reload);
                reporter.emit(RunEvent::Reloaded {
                    action: binding.reload.clone(),
                    clients,
                });
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(binding = %binding.name, "rebuild failed: {e}");
            }
        }
    }
    failures
}

/// Collect every batch already waiting behind `first`.
fn drain_batches(
    first: DebounceEventResult,
    rx: &Receiver<DebounceEventResult>,
    reporter: &Reporter,
) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut batches = vec![first];
    while let Ok(more) = rx.try_recv() {
        batches.push(more);
    }
    for batch in batches {
        match batch {
            Ok(events) => paths.extend(events.into_iter().map(|e| e.path)),
            Err(error) => {
                tracing::warn!("watch error: {error}");
                reporter.emit(RunEvent::WatchError {
                    message: error.to_string(),
                });
            }
        }
    }
    paths.sort();
    paths.dedup();
    paths
}

/// Watch every binding's roots and rebuild on change. Blocks forever.
pub fn watch(
    mut bindings: Vec<WatchBinding>,
    debounce: Duration,
    hub: Arc<ReloadHub>,
    reporter: Reporter,
) -> Result<(), WatchError> {
    for binding in &mut bindings {
        binding.canonicalize_roots();
    }
    let mut roots: Vec<PathBuf> = bindings
        .iter()
        .flat_map(|b| b.roots.iter().cloned())
        .filter(|root| root.is_dir())
        .collect();
    roots.sort();
    roots.dedup();
    // A root nested in another is already covered recursively.
    let roots: Vec<PathBuf> = roots
        .iter()
        .filter(|root| !roots.iter().any(|other| other != *root && root.starts_with(other)))
        .cloned()
        .collect();
    if roots.is_empty() {
        return Err(WatchError::NoRoots);
    }

    let (tx, rx) = channel::<DebounceEventResult>();
    let mut debouncer = new_debouncer(debounce, tx).map_err(WatchError::Init)?;
    for root in &roots {
        debouncer
            .watcher()
            .watch(root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::Path {
                path: root.clone(),
                source,
            })?;
    }
    reporter.emit(RunEvent::Watching {
        roots: roots.clone(),
    });

    loop {
        let first = rx.recv().map_err(|_| WatchError::Disconnected)?;
        let paths = drain_batches(first, &rx, &reporter);
        let planned = plan_rebuilds(&bindings, &paths);
        if planned.is_empty() {
            continue;
        }
        tracing::debug!(changed = paths.len(), rebuilds = planned.len(), "change batch");
        dispatch(&bindings, &planned, &paths, &hub, &reporter);
    }
}
