//! Tasks, pipelines, and the runner that executes them.
//!
//! A [`Task`] is a named unit of work whose only result is a completion
//! signal: `Ok(())` or a [`TaskError`]. Tasks compose into a [`Pipeline`]
//! with two combinators:
//!
//! - [`sequence`] runs members strictly in order. The first failure aborts the
//!   remaining members and propagates.
//! - [`concurrent`] starts every member at once, each on its own scoped
//!   thread, and completes only when all of them have. Failures are collected
//!   from every member; siblings already in flight are never cancelled.
//!
//! ```text
//! sequence(clean, reset-template-cache,
//!          concurrent(copy-fonts, compile-scss, bundle-js, ...),
//!          concurrent(compile-html, optimize-images))
//! ```
//!
//! # Output claims
//!
//! Concurrent members share the distribution directory, so each task declares
//! the files and directories it writes as [`OutputClaim`]s. Before anything
//! runs, [`Pipeline::run`] checks every `Concurrent` node pairwise across its
//! members and refuses to start when two of them could write the same path.
//!
//! # Events
//!
//! The runner reports progress as [`RunEvent`]s through a [`Reporter`], an
//! optional channel sender. The CLI drains the channel on a printer thread;
//! tests use [`Reporter::silent`] or inspect the receiver directly.

use crate::concat::ConcatError;
use crate::copy::CopyError;
use crate::images::{ImageReport, ImagesError};
use crate::scripts::ScriptError;
use crate::server::{ReloadAction, ServeError};
use crate::styles::StyleError;
use crate::templates::TemplateError;
use crate::watch::WatchError;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Failure of a single task.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Copy(#[from] CopyError),
    #[error(transparent)]
    Style(#[from] StyleError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Concat(#[from] ConcatError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Images(#[from] ImagesError),
    #[error(transparent)]
    Serve(#[from] ServeError),
    #[error(transparent)]
    Watch(#[from] WatchError),
}

/// Failure of a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("task '{task}' failed: {source}")]
    Task {
        task: String,
        #[source]
        source: TaskError,
    },
    #[error("{} concurrent tasks failed", .0.len())]
    Concurrent(Vec<PipelineError>),
    #[error("tasks '{first}' and '{second}' both write {}", .path.display())]
    ConflictingOutputs {
        first: String,
        second: String,
        path: PathBuf,
    },
    #[error("'{0}' panicked")]
    Panicked(String),
}

impl PipelineError {
    /// Names of every task that failed, in report order.
    pub fn failed_tasks(&self) -> Vec<&str> {
        match self {
            PipelineError::Task { task, .. } => vec![task.as_str()],
            PipelineError::Concurrent(errors) => {
                errors.iter().flat_map(PipelineError::failed_tasks).collect()
            }
            PipelineError::ConflictingOutputs { .. } => Vec::new(),
            PipelineError::Panicked(name) => vec![name.as_str()],
        }
    }
}

/// A path a task writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputClaim {
    /// A single file.
    File(PathBuf),
    /// A directory and everything beneath it.
    Dir(PathBuf),
}

impl OutputClaim {
    pub fn path(&self) -> &Path {
        match self {
            OutputClaim::File(p) | OutputClaim::Dir(p) => p,
        }
    }

    /// The contested path when two claims can touch the same file.
    pub fn conflicts_with(&self, other: &OutputClaim) -> Option<PathBuf> {
        match (self, other) {
            (OutputClaim::File(a), OutputClaim::File(b)) => (a == b).then(|| a.clone()),
            (OutputClaim::File(file), OutputClaim::Dir(dir))
            | (OutputClaim::Dir(dir), OutputClaim::File(file)) => {
                file.starts_with(dir).then(|| file.clone())
            }
            (OutputClaim::Dir(a), OutputClaim::Dir(b)) => {
                if a.starts_with(b) {
                    Some(a.clone())
                } else if b.starts_with(a) {
                    Some(b.clone())
                } else {
                    None
                }
            }
        }
    }
}

type RunFn = dyn Fn() -> Result<(), TaskError> + Send + Sync;

/// A named unit of work.
pub struct Task {
    name: String,
    description: Option<String>,
    claims: Vec<OutputClaim>,
    run: Box<RunFn>,
}

impl Task {
    pub fn new<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn() -> Result<(), TaskError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            claims: Vec::new(),
            run: Box::new(run),
        }
    }

    /// Human-readable line printed when the task starts.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare a path this task writes.
    pub fn writes(mut self, claim: OutputClaim) -> Self {
        self.claims.push(claim);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn claims(&self) -> &[OutputClaim] {
        &self.claims
    }

    fn execute(&self, reporter: &Reporter) -> Result<(), PipelineError> {
        tracing::debug!(task = %self.name, "starting");
        reporter.emit(RunEvent::Started {
            task: self.name.clone(),
            description: self.description.clone(),
        });
        let start = Instant::now();
        match (self.run)() {
            Ok(()) => {
                let elapsed = start.elapsed();
                tracing::debug!(task = %self.name, ?elapsed, "finished");
                reporter.emit(RunEvent::Finished {
                    task: self.name.clone(),
                    elapsed,
                });
                Ok(())
            }
            Err(source) => {
                tracing::error!(task = %self.name, "{source}");
                reporter.emit(RunEvent::Failed {
                    task: self.name.clone(),
                    elapsed: start.elapsed(),
                    error: source.to_string(),
                });
                Err(PipelineError::Task {
                    task: self.name.clone(),
                    source,
                })
            }
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}

/// A composition of tasks.
#[derive(Debug)]
pub enum Pipeline {
    Task(Task),
    Sequence(Vec<Pipeline>),
    Concurrent(Vec<Pipeline>),
}

impl From<Task> for Pipeline {
    fn from(task: Task) -> Self {
        Pipeline::Task(task)
    }
}

/// Run `steps` strictly in order.
pub fn sequence(steps: impl IntoIterator<Item = Pipeline>) -> Pipeline {
    Pipeline::Sequence(steps.into_iter().collect())
}

/// Run `members` at the same time and wait for all of them.
pub fn concurrent(members: impl IntoIterator<Item = Pipeline>) -> Pipeline {
    Pipeline::Concurrent(members.into_iter().collect())
}

impl Pipeline {
    /// Check output claims, then execute.
    pub fn run(&self, reporter: &Reporter) -> Result<(), PipelineError> {
        self.check_outputs()?;
        self.execute(reporter)
    }

    /// Names of every task in declaration order.
    pub fn task_names(&self) -> Vec<&str> {
        match self {
            Pipeline::Task(task) => vec![task.name()],
            Pipeline::Sequence(members) | Pipeline::Concurrent(members) => {
                members.iter().flat_map(Pipeline::task_names).collect()
            }
        }
    }

    fn label(&self) -> String {
        self.task_names().join(", ")
    }

    fn claims(&self) -> Vec<(&str, &OutputClaim)> {
        match self {
            Pipeline::Task(task) => task.claims.iter().map(|c| (task.name(), c)).collect(),
            Pipeline::Sequence(members) | Pipeline::Concurrent(members) => {
                members.iter().flat_map(Pipeline::claims).collect()
            }
        }
    }

    /// Verify that no two members of any concurrent group write the same path.
    pub fn check_outputs(&self) -> Result<(), PipelineError> {
        match self {
            Pipeline::Task(_) => Ok(()),
            Pipeline::Sequence(members) => members.iter().try_for_each(Pipeline::check_outputs),
            Pipeline::Concurrent(members) => {
                members.iter().try_for_each(Pipeline::check_outputs)?;
                let claimed: Vec<Vec<(&str, &OutputClaim)>> =
                    members.iter().map(Pipeline::claims).collect();
                for (i, left) in claimed.iter().enumerate() {
                    for right in &claimed[i + 1..] {
                        for (first, a) in left {
                            for (second, b) in right {
                                if let Some(path) = a.conflicts_with(b) {
                                    return Err(PipelineError::ConflictingOutputs {
                                        first: first.to_string(),
                                        second: second.to_string(),
                                        path,
                                    });
                                }
                            }
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn execute(&self, reporter: &Reporter) -> Result<(), PipelineError> {
        match self {
            Pipeline::Task(task) => task.execute(reporter),
            Pipeline::Sequence(steps) => {
                for step in steps {
                    step.execute(reporter)?;
                }
                Ok(())
            }
            Pipeline::Concurrent(members) => {
                let results: Vec<Result<(), PipelineError>> = std::thread::scope(|scope| {
                    let handles: Vec<_> = members
                        .iter()
                        .map(|member| (member, scope.spawn(move || member.execute(reporter))))
                        .collect();
                    handles
                        .into_iter()
                        .map(|(member, handle)| {
                            handle
                                .join()
                                .unwrap_or_else(|_| Err(PipelineError::Panicked(member.label())))
                        })
                        .collect()
                });
                let mut failures: Vec<PipelineError> =
                    results.into_iter().filter_map(Result::err).collect();
                match failures.len() {
                    0 => Ok(()),
                    1 => Err(failures.remove(0)),
                    _ => Err(PipelineError::Concurrent(failures)),
                }
            }
        }
    }
}

/// Progress reported while pipelines, the dev server, and the watcher run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started {
        task: String,
        description: Option<String>,
    },
    Finished {
        task: String,
        elapsed: Duration,
    },
    Failed {
        task: String,
        elapsed: Duration,
        error: String,
    },
    Serving {
        url: String,
    },
    Watching {
        roots: Vec<PathBuf>,
    },
    Changed {
        binding: String,
        paths: Vec<PathBuf>,
    },
    Reloaded {
        action: ReloadAction,
        clients: usize,
    },
    WatchError {
        message: String,
    },
    /// Totals from an image stage run.
    Images {
        task: String,
        report: ImageReport,
    },
}

/// Sink for [`RunEvent`]s. Cheap to clone; silent when no channel is attached.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    tx: Option<Sender<RunEvent>>,
}

impl Reporter {
    pub fn new(tx: Sender<RunEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    /// A reporter paired with the receiving end of its channel.
    pub fn channel() -> (Self, Receiver<RunEvent>) {
        let (tx, rx) = channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is listening.
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier, Mutex};

    fn recording(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Pipeline {
        let log = Arc::clone(log);
        Task::new(name, move || {
            log.lock().unwrap().push(name);
            Ok(())
        })
        .into()
    }

    fn failing(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Pipeline {
        let log = Arc::clone(log);
        Task::new(name, move || {
            log.lock().unwrap().push(name);
            Err(TaskError::Io(std::io::Error::other(format!("{name} broke"))))
        })
        .into()
    }

    #[test]
    fn sequence_runs_in_declared_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = sequence([
            recording("a", &log),
            recording("b", &log),
            recording("c", &log),
        ]);
        pipeline.run(&Reporter::silent()).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn sequence_aborts_after_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = sequence([
            recording("a", &log),
            failing("b", &log),
            recording("c", &log),
        ]);
        let err = pipeline.run(&Reporter::silent()).unwrap_err();
        assert_eq!(err.failed_tasks(), vec!["b"]);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn concurrent_members_overlap() {
        // Both tasks wait on the same barrier: only passes if they run at the same time.
        let barrier = Arc::new(Barrier::new(2));
        let members = (0..2).map(|i| {
            let barrier = Arc::clone(&barrier);
            Pipeline::from(Task::new(format!("wait-{i}"), move || {
                barrier.wait();
                Ok(())
            }))
        });
        concurrent(members).run(&Reporter::silent()).unwrap();
    }

    #[test]
    fn concurrent_failure_does_not_stop_siblings() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = concurrent([
            failing("styles", &log),
            recording("scripts", &log),
            recording("fonts", &log),
        ]);
        let err = pipeline.run(&Reporter::silent()).unwrap_err();
        assert_eq!(err.failed_tasks(), vec!["styles"]);
        let mut ran = log.lock().unwrap().clone();
        ran.sort();
        assert_eq!(ran, vec!["fonts", "scripts", "styles"]);
    }

    #[test]
    fn concurrent_aggregates_every_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = concurrent([failing("x", &log), failing("y", &log)]);
        let err = pipeline.run(&Reporter::silent()).unwrap_err();
        assert!(matches!(err, PipelineError::Concurrent(ref errors) if errors.len() == 2));
        assert_eq!(err.failed_tasks(), vec!["x", "y"]);
    }

    #[test]
    fn failure_in_concurrent_group_aborts_enclosing_sequence() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = sequence([
            concurrent([failing("a", &log), recording("b", &log)]),
            recording("after", &log),
        ]);
        assert!(pipeline.run(&Reporter::silent()).is_err());
        assert!(!log.lock().unwrap().contains(&"after"));
    }

    #[test]
    fn claims_conflict_rules() {
        let file = OutputClaim::File(PathBuf::from("/dist/css/app.css"));
        let css = OutputClaim::Dir(PathBuf::from("/dist/css"));
        let img = OutputClaim::Dir(PathBuf::from("/dist/img"));
        let dist = OutputClaim::Dir(PathBuf::from("/dist"));

        assert_eq!(file.conflicts_with(&css), Some(PathBuf::from("/dist/css/app.css")));
        assert_eq!(css.conflicts_with(&file), Some(PathBuf::from("/dist/css/app.css")));
        assert_eq!(css.conflicts_with(&img), None);
        assert_eq!(dist.conflicts_with(&img), Some(PathBuf::from("/dist/img")));
        assert_eq!(file.conflicts_with(&file.clone()), Some(PathBuf::from("/dist/css/app.css")));
        assert_eq!(file.conflicts_with(&img), None);
    }

    #[test]
    fn overlapping_concurrent_claims_refuse_to_start() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&log);
        let second = Arc::clone(&log);
        let pipeline = sequence([
            recording("before", &log),
            concurrent([
                Task::new("fonts", move || {
                    first.lock().unwrap().push("fonts");
                    Ok(())
                })
                .writes(OutputClaim::Dir(PathBuf::from("/dist/css")))
                .into(),
                Task::new("vendor-css", move || {
                    second.lock().unwrap().push("vendor-css");
                    Ok(())
                })
                .writes(OutputClaim::File(PathBuf::from("/dist/css/app.css")))
                .into(),
            ]),
        ]);

        let err = pipeline.run(&Reporter::silent()).unwrap_err();
        match err {
            PipelineError::ConflictingOutputs { first, second, path } => {
                assert_eq!(first, "fonts");
                assert_eq!(second, "vendor-css");
                assert_eq!(path, PathBuf::from("/dist/css/app.css"));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        // Nothing ran, not even the tasks before the group.
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn sequential_claims_may_overlap() {
        let pipeline = sequence([
            Task::new("clean", || Ok(()))
                .writes(OutputClaim::Dir(PathBuf::from("/dist")))
                .into(),
            Task::new("fonts", || Ok(()))
                .writes(OutputClaim::Dir(PathBuf::from("/dist/fonts")))
                .into(),
        ]);
        pipeline.run(&Reporter::silent()).unwrap();
    }

    #[test]
    fn reporter_receives_start_and_finish_events() {
        let (reporter, rx) = Reporter::channel();
        let pipeline = sequence([
            Task::new("one", || Ok(())).describe("Doing one").into(),
            Task::new("two", || Err(TaskError::Io(std::io::Error::other("nope")))).into(),
        ]);
        let _ = pipeline.run(&reporter);
        drop(reporter);

        let events: Vec<RunEvent> = rx.iter().collect();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            RunEvent::Started {
                task: "one".into(),
                description: Some("Doing one".into())
            }
        );
        assert!(matches!(&events[1], RunEvent::Finished { task, .. } if task == "one"));
        assert!(matches!(&events[3], RunEvent::Failed { task, error, .. } if task == "two" && error.contains("nope")));
    }

    #[test]
    fn task_names_follow_declaration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = sequence([
            recording("clean", &log),
            concurrent([recording("a", &log), recording("b", &log)]),
        ]);
        assert_eq!(pipeline.task_names(), vec!["clean", "a", "b"]);
    }
}
