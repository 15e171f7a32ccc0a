use clap::{Parser, Subcommand};
use sitepipe::config::{self, ConfigError};
use sitepipe::orchestrator::{self, Project};
use sitepipe::output;
use sitepipe::task::{Pipeline, PipelineError, Reporter, RunEvent};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::thread::JoinHandle;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Shared flags for commands that run a build.
#[derive(clap::Args, Clone)]
struct PlanArgs {
    /// Print the task plan and exit without running it
    #[arg(long)]
    plan: bool,
}

#[derive(Parser)]
#[command(name = "sitepipe")]
#[command(about = "Asset pipeline and live-reload dev server for static sites")]
#[command(long_about = "\
Asset pipeline and live-reload dev server for static sites

Compiles styles, bundles scripts, concatenates vendor files, renders HTML
pages with layouts and partials, and optimizes images into one distribution
directory. `develop` (the default) keeps a dev server and file watcher running
and reloads connected browsers after every rebuild.

Project structure (defaults, all configurable in sitepipe.toml):

  sitepipe.toml
  templates/              # Pages: every *.html, front matter optional
  static/
  ├── layouts/            # Page wrappers, {{> body}} marks the page
  ├── partials/           # Fragments, included with {{> name}}
  ├── scss/main.scss      # Style entry (compiled with sass)
  ├── app/main.js         # Script entry (bundled with esbuild)
  ├── js/                 # Plugin scripts, concatenated into app.js
  ├── vendor/css/         # Vendor styles, concatenated into app.css
  ├── fonts/              # Copied flat
  ├── img/                # Optimized on build, copied on develop
  └── dist/               # Output, removed by `clean`

Run 'sitepipe gen-config' to generate a documented sitepipe.toml.")]
#[command(version)]
struct Cli {
    /// Project root
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Config file (default: <root>/sitepipe.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show debug diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Build with copied images, then serve and rebuild on change (default)
    Develop(PlanArgs),
    /// One-shot production build with image optimization
    Build {
        /// Disable the image cache, force re-encoding of all images
        #[arg(long)]
        no_cache: bool,
        #[command(flatten)]
        plan: PlanArgs,
    },
    /// Copy the third-party style library into the local style tree
    Setup,
    /// Remove the distribution directory
    Clean,
    /// Validate config, list resolved paths and check external tools
    Check,
    /// Print a stock sitepipe.toml with all options documented
    GenConfig,
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("{0} external tool(s) missing")]
    MissingTools(usize),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Pipeline(e)) => {
            output::print_failure(&e);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{} {e}", output::ERROR);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    let command = cli.command.unwrap_or(Command::Develop(PlanArgs { plan: false }));

    if let Command::GenConfig = command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let (reporter, rx) = Reporter::channel();
    let project = Project::load(&cli.root, cli.config.as_deref(), reporter.clone())?;

    match command {
        Command::Develop(args) => {
            let project = Arc::new(project);
            init_thread_pool(&project.config.processing);
            let pipeline = orchestrator::develop(&project);
            execute(pipeline, project, args.plan, reporter, rx)
        }
        Command::Build { no_cache, plan } => {
            let project = if no_cache {
                project.without_cache()
            } else {
                project
            };
            let project = Arc::new(project);
            init_thread_pool(&project.config.processing);
            let pipeline = orchestrator::build(&project);
            execute(pipeline, project, plan.plan, reporter, rx)
        }
        Command::Setup => {
            let project = Arc::new(project);
            let pipeline = orchestrator::setup(&project);
            execute(pipeline, project, false, reporter, rx)
        }
        Command::Clean => {
            let project = Arc::new(project);
            let pipeline = orchestrator::clean(&project);
            execute(pipeline, project, false, reporter, rx)
        }
        Command::Check => check(&project),
        Command::GenConfig => Ok(()),
    }
}

/// Run `pipeline` with a printer thread draining its events.
fn execute(
    pipeline: Pipeline,
    project: Arc<Project>,
    plan_only: bool,
    reporter: Reporter,
    rx: Receiver<RunEvent>,
) -> Result<(), CliError> {
    if plan_only {
        pipeline.check_outputs()?;
        output::print_lines(&output::format_plan(&pipeline));
        return Ok(());
    }

    let printer = spawn_printer(rx);
    let result = pipeline.run(&reporter);
    // Every sender must be gone before the printer sees the channel close,
    // including the clones held by the project and its tasks.
    drop(pipeline);
    drop(project);
    drop(reporter);
    if printer.join().is_err() {
        tracing::warn!("output thread panicked");
    }
    result?;
    Ok(())
}

fn spawn_printer(rx: Receiver<RunEvent>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for event in rx {
            output::print_run_event(&event);
        }
    })
}

fn check(project: &Project) -> Result<(), CliError> {
    let root = &project.paths.root;
    println!("==> Checking {}", root.display());
    output::print_lines(&output::format_paths(&project.paths));

    let tools = [
        ("styles", project.style_compiler().locate(root)),
        ("scripts", project.bundler().locate(root)),
    ];
    let mut missing = 0;
    for (label, located) in &tools {
        println!("{}", output::format_tool_status(label, located));
        if located.is_err() {
            missing += 1;
        }
    }
    if missing > 0 {
        return Err(CliError::MissingTools(missing));
    }
    println!("==> Config is valid");
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. User can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
