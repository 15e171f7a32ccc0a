//! # sitepipe
//!
//! A single-binary asset pipeline and live-reload development server for
//! static websites. One command compiles styles, bundles scripts,
//! concatenates vendor files, renders HTML pages, and optimizes images into a
//! single distribution directory; another keeps that directory fresh while
//! you edit.
//!
//! # Architecture: Tasks Composed Into Pipelines
//!
//! Every unit of build work is a [`task::Task`] with a completion signal
//! (`Ok(())` or an error). Tasks compose with two combinators,
//! [`task::sequence`] and [`task::concurrent`], into the pipelines the CLI
//! runs:
//!
//! ```text
//! build     clean → reset-template-cache
//!           → concurrent(copy-fonts, concat-vendor-css, compile-scss,
//!                        bundle-js, concat-vendor-js)
//!           → concurrent(compile-html, optimize-images)
//!
//! develop   same, copying images instead of optimizing them
//!           → concurrent(start-dev-server, start-watcher)
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`orchestrator`] | The project state and the named pipelines (`build`, `develop`, `setup`, `clean`) |
//! | [`task`] | Tasks, combinators, output claims, run events |
//! | [`config`] | `sitepipe.toml` loading, merging over stock defaults, validation, path resolution |
//! | [`templates`] | Pages, layouts, and partials with a resettable template cache |
//! | [`styles`] | External SCSS compiler, then lightningcss prefixing, minification, source maps |
//! | [`scripts`] | External bundler over a single entry |
//! | [`concat`] | Ordered concatenation of vendor files with a source map |
//! | [`images`] | Image stage: copy for development, optimize for production |
//! | [`imaging`] | Pure-Rust PNG/JPEG re-encoding behind a backend trait |
//! | [`cache`] | Content-addressed cache of optimized images |
//! | [`copy`] | Clean, flat copy, tree copy, glob-filtered copy |
//! | [`tools`] | Locating and running external programs |
//! | [`server`] | Static dev server and the live-reload hub |
//! | [`watch`] | File watcher bindings and rebuild dispatch |
//! | [`output`] | CLI output formatting for events, plans, and failures |
//!
//! # Design Decisions
//!
//! ## Disjoint Concurrent Outputs
//!
//! Concurrent tasks share the distribution directory. Each task declares the
//! files and directories it writes, and a pipeline refuses to start when two
//! members of a concurrent group could write the same path. Misconfigured
//! output paths fail loudly before anything is touched.
//!
//! ## Template Cache Reset Before Every Compile
//!
//! Parsed templates are cached, and the cache is explicit: it belongs to the
//! [`templates::TemplateCompiler`] and every full HTML compile is preceded by
//! a `reset-template-cache` task. An edited partial is never served stale.
//!
//! ## External Compilers, Native Everything Else
//!
//! Sass and the JavaScript bundler stay external programs configured in
//! `sitepipe.toml`. Post-processing, concatenation, templating, image
//! optimization, serving, and watching are all done in-process.
//!
//! ## Serial Rebuilds Per Change Batch
//!
//! File events are debounced, batches that queue up during a rebuild are
//! merged, and the affected bindings run one after another on the watcher
//! thread. A binding never overlaps with itself, and a failed rebuild leaves
//! the previous output in place without reloading browsers.

pub mod cache;
pub mod concat;
pub mod config;
pub mod copy;
pub mod images;
pub mod imaging;
pub mod orchestrator;
pub mod output;
pub mod scripts;
pub mod server;
pub mod styles;
pub mod task;
pub mod templates;
pub mod tools;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
