//! Named pipelines over a loaded project.
//!
//! A [`Project`] is everything the tasks share: the validated configuration,
//! the resolved paths, the template compiler (and with it the template
//! cache), and the reload hub the dev server and watcher talk through.
//!
//! Each leaf task is a small function returning a [`Task`] whose closure holds
//! an `Arc<Project>`. The entry points compose them:
//!
//! ```text
//! build:   clean → reset-template-cache
//!          → concurrent(copy-fonts, concat-vendor-css, compile-scss,
//!                       bundle-js, concat-vendor-js)
//!          → concurrent(compile-html, optimize-images)
//!
//! develop: same, with copy-images instead of optimize-images,
//!          → concurrent(start-dev-server, start-watcher)
//! ```
//!
//! Every leaf declares the paths it writes so overlapping concurrent
//! outputs are rejected before anything runs.

use crate::concat::{self, BundleKind};
use crate::config::{self, ConfigError, ResolvedPaths, SiteConfig};
use crate::copy;
use crate::images::{self, OptimizeOptions};
use crate::imaging::{Quality, RustBackend};
use crate::scripts;
use crate::server::{DevServer, ReloadAction, ReloadHub};
use crate::styles::{self, PostProcess, StyleJob};
use crate::task::{OutputClaim, Pipeline, Reporter, RunEvent, Task, concurrent, sequence};
use crate::templates::TemplateCompiler;
use crate::tools::ToolCommand;
use crate::watch::{self, WatchBinding, WatchError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// A loaded project: configuration plus the state tasks share.
#[derive(Debug)]
pub struct Project {
    pub config: SiteConfig,
    pub paths: ResolvedPaths,
    pub templates: TemplateCompiler,
    pub hub: Arc<ReloadHub>,
    pub reporter: Reporter,
    use_cache: bool,
}

impl Project {
    /// Load `sitepipe.toml` (or `config_file`) for the project at `root`.
    pub fn load(
        root: &Path,
        config_file: Option<&Path>,
        reporter: Reporter,
    ) -> Result<Self, ConfigError> {
        let root = root.canonicalize()?;
        let config = match config_file {
            Some(path) => config::load_config_file(path)?,
            None => config::load_config(&root)?,
        };
        Ok(Self::from_config(&root, config, reporter))
    }

    pub fn from_config(root: &Path, config: SiteConfig, reporter: Reporter) -> Self {
        let paths = config.resolve(root);
        let templates = TemplateCompiler::new(&paths.templates, &paths.layouts, &paths.partials);
        let use_cache = config.images.cache;
        Self {
            config,
            paths,
            templates,
            hub: Arc::new(ReloadHub::new()),
            reporter,
            use_cache,
        }
    }

    /// Disable the optimized-image cache for this run.
    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn uses_cache(&self) -> bool {
        self.use_cache
    }

    pub fn style_compiler(&self) -> ToolCommand {
        ToolCommand::new(&self.config.styles.command, &self.config.styles.args)
    }

    pub fn bundler(&self) -> ToolCommand {
        ToolCommand::new(&self.config.scripts.command, &self.config.scripts.args)
    }

    fn stylesheet(&self) -> PathBuf {
        self.paths.dist_css.join(&self.config.styles.output)
    }

    fn image_store(&self) -> Option<PathBuf> {
        self.use_cache.then(|| self.paths.cache_dir.join("images"))
    }
}

fn with_map(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".map");
    path.with_file_name(name)
}

// ============================================================================
// Leaf tasks
// ============================================================================

pub fn clean_task(p: &Arc<Project>) -> Task {
    let project = Arc::clone(p);
    Task::new("clean", move || {
        copy::clean(&project.paths.dist_base)?;
        Ok(())
    })
    .describe("remove the distribution directory")
    .writes(OutputClaim::Dir(p.paths.dist_base.clone()))
}

pub fn reset_template_cache_task(p: &Arc<Project>) -> Task {
    let project = Arc::clone(p);
    Task::new("reset-template-cache", move || {
        project.templates.invalidate();
        Ok(())
    })
}

pub fn copy_fonts_task(p: &Arc<Project>) -> Task {
    let project = Arc::clone(p);
    Task::new("copy-fonts", move || {
        copy::copy_flat(&project.paths.fonts, &project.paths.dist_fonts)?;
        Ok(())
    })
    .writes(OutputClaim::Dir(p.paths.dist_fonts.clone()))
}

pub fn concat_vendor_css_task(p: &Arc<Project>) -> Task {
    let project = Arc::clone(p);
    let output = p.paths.dist_css.join(&p.config.vendor.css_output);
    let out = output.clone();
    Task::new("concat-vendor-css", move || {
        concat::concat_files(
            &project.paths.root,
            &project.config.vendor.css,
            &out,
            BundleKind::Css,
        )?;
        Ok(())
    })
    .describe("concatenate vendor stylesheets")
    .writes(OutputClaim::File(with_map(&output)))
    .writes(OutputClaim::File(output))
}

pub fn concat_vendor_js_task(p: &Arc<Project>) -> Task {
    let project = Arc::clone(p);
    let output = p.paths.dist_js.join(&p.config.vendor.js_output);
    let out = output.clone();
    Task::new("concat-vendor-js", move || {
        concat::concat_files(
            &project.paths.root,
            &project.config.vendor.js,
            &out,
            BundleKind::Js,
        )?;
        Ok(())
    })
    .describe("concatenate plugin scripts")
    .writes(OutputClaim::File(with_map(&output)))
    .writes(OutputClaim::File(output))
}

pub fn compile_scss_task(p: &Arc<Project>) -> Task {
    let project = Arc::clone(p);
    let output = p.stylesheet();
    Task::new("compile-scss", move || {
        let settings = &project.config.styles;
        let compiler = project.style_compiler();
        let options = PostProcess {
            browsers: settings.browsers.clone(),
            minify: settings.minify,
            source_map: settings.source_map,
        };
        styles::compile(&StyleJob {
            entry: &project.paths.style_entry,
            out_dir: &project.paths.dist_css,
            output_name: &settings.output,
            compiler: &compiler,
            options: &options,
            cwd: &project.paths.root,
        })?;
        Ok(())
    })
    .describe(format!("compile {}", p.config.styles.entry))
    .writes(OutputClaim::File(with_map(&output)))
    .writes(OutputClaim::File(output))
}

pub fn bundle_js_task(p: &Arc<Project>) -> Task {
    let project = Arc::clone(p);
    let output = p.paths.dist_js.join(&p.config.scripts.output);
    let out = output.clone();
    Task::new("bundle-js", move || {
        scripts::bundle(
            &project.bundler(),
            &project.paths.script_entry,
            &out,
            &project.paths.root,
        )?;
        Ok(())
    })
    .writes(OutputClaim::File(output))
}

pub fn compile_html_task(p: &Arc<Project>) -> Task {
    let project = Arc::clone(p);
    // An unreadable template tree is reported when the task runs.
    let outputs = p.templates.output_paths(&p.paths.dist_base).unwrap_or_default();
    let task = Task::new("compile-html", move || {
        project.templates.compile_all(&project.paths.dist_base)?;
        Ok(())
    })
    .describe("render pages with layouts and partials");
    outputs
        .into_iter()
        .fold(task, |task, page| task.writes(OutputClaim::File(page)))
}

pub fn optimize_images_task(p: &Arc<Project>) -> Task {
    let project = Arc::clone(p);
    Task::new("optimize-images", move || {
        let options = OptimizeOptions {
            quality: Quality::new(project.config.images.quality),
            store: project.image_store(),
        };
        let report = images::optimize_images(
            &RustBackend::new(),
            &project.paths.img,
            &project.paths.dist_img,
            &options,
        )?;
        project.reporter.emit(RunEvent::Images {
            task: "optimize-images".into(),
            report,
        });
        Ok(())
    })
    .describe("re-encode PNG and JPEG files")
    .writes(OutputClaim::Dir(p.paths.dist_img.clone()))
}

pub fn copy_images_task(p: &Arc<Project>) -> Task {
    let project = Arc::clone(p);
    Task::new("copy-images", move || {
        let report = images::copy_images(&project.paths.img, &project.paths.dist_img)?;
        project.reporter.emit(RunEvent::Images {
            task: "copy-images".into(),
            report,
        });
        Ok(())
    })
    .writes(OutputClaim::Dir(p.paths.dist_img.clone()))
}

pub fn setup_style_library_task(p: &Arc<Project>) -> Task {
    let project = Arc::clone(p);
    let setup = &p.config.setup;
    let dest = p.paths.root.join(&setup.dest);
    Task::new("setup-style-library", move || {
        let setup = &project.config.setup;
        let root = &project.paths.root;
        copy::copy_matching(&root.join(&setup.source), &root.join(&setup.dest), &setup.pattern)?;
        Ok(())
    })
    .describe(format!("copy {} from {} into {}", setup.pattern, setup.source, setup.dest))
    .writes(OutputClaim::Dir(dest))
}

pub fn dev_server_task(p: &Arc<Project>) -> Task {
    let project = Arc::clone(p);
    Task::new("start-dev-server", move || {
        let server_config = &project.config.server;
        let addr = format!("{}:{}", server_config.host, server_config.port);
        let server = DevServer::bind(
            &addr,
            &project.paths.dist_base,
            Arc::clone(&project.hub),
            server_config.live_reload,
        )?;
        project.reporter.emit(RunEvent::Serving { url: server.url()? });
        server.run()?;
        Ok(())
    })
}

pub fn watcher_task(p: &Arc<Project>) -> Task {
    let project = Arc::clone(p);
    Task::new("start-watcher", move || {
        let bindings = watch_bindings(&project)?;
        watch::watch(
            bindings,
            Duration::from_millis(project.config.watch.debounce_ms),
            Arc::clone(&project.hub),
            project.reporter.clone(),
        )?;
        Ok(())
    })
}

// ============================================================================
// Watch bindings
// ============================================================================

/// One binding per asset category, in dispatch order.
pub fn watch_bindings(p: &Arc<Project>) -> Result<Vec<WatchBinding>, WatchError> {
    let paths = &p.paths;
    let css_reload = match paths.url_for(&p.stylesheet()) {
        Some(url) => ReloadAction::InjectCss(vec![url]),
        None => ReloadAction::Full,
    };

    Ok(vec![
        WatchBinding::new(
            "html",
            sequence([reset_template_cache_task(p).into(), compile_html_task(p).into()]),
            ReloadAction::Full,
        )
        .root(&paths.templates)
        .root(&paths.layouts)
        .root(&paths.partials)
        .pattern("**/*.html")?,
        WatchBinding::new("styles", compile_scss_task(p).into(), css_reload)
            .root(&paths.scss)
            .pattern("**/*")?,
        WatchBinding::new("scripts", bundle_js_task(p).into(), ReloadAction::Full)
            .root(&paths.js)
            .pattern("**/*.js")?,
        WatchBinding::new("fonts", copy_fonts_task(p).into(), ReloadAction::Full)
            .root(&paths.fonts)
            .pattern("**/*")?,
        WatchBinding::new("images", copy_images_task(p).into(), ReloadAction::Full)
            .root(&paths.img)
            .pattern("**/*")?,
    ])
}

// ============================================================================
// Pipelines
// ============================================================================

fn assets(p: &Arc<Project>) -> Pipeline {
    concurrent([
        copy_fonts_task(p).into(),
        concat_vendor_css_task(p).into(),
        compile_scss_task(p).into(),
        bundle_js_task(p).into(),
        concat_vendor_js_task(p).into(),
    ])
}

/// One-shot production build.
pub fn build(p: &Arc<Project>) -> Pipeline {
    sequence([
        clean_task(p).into(),
        reset_template_cache_task(p).into(),
        assets(p),
        concurrent([compile_html_task(p).into(), optimize_images_task(p).into()]),
    ])
}

/// Development build followed by the dev server and watcher, which never
/// return on their own.
pub fn develop(p: &Arc<Project>) -> Pipeline {
    sequence([
        develop_build(p),
        concurrent([dev_server_task(p).into(), watcher_task(p).into()]),
    ])
}

/// The build steps of [`develop`], without serving or watching.
pub fn develop_build(p: &Arc<Project>) -> Pipeline {
    sequence([
        clean_task(p).into(),
        reset_template_cache_task(p).into(),
        assets(p),
        concurrent([compile_html_task(p).into(), copy_images_task(p).into()]),
    ])
}

pub fn setup(p: &Arc<Project>) -> Pipeline {
    setup_style_library_task(p).into()
}

pub fn clean(p: &Arc<Project>) -> Pipeline {
    clean_task(p).into()
}
