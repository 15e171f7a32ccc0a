//! CLI output formatting for pipelines, the dev server, and the watcher.
//!
//! Information-first display: every line leads with the thing it is about
//! (a task, a binding, a URL), followed by the detail. Paths are shown
//! relative to the project root wherever possible.
//!
//! Format functions return `Vec<String>` for testability. `print_*` wrappers
//! write to stdout. Diagnostics that are not user-facing progress go through
//! `tracing` instead.
//!
//! ## Symbols
//!
//! The log-symbols set: `ℹ` info, `✔` success, `✖` error, `⚠` warning.
//!
//! ## Run events
//!
//! ```text
//! ℹ Starting 'compile-scss'
//! ✔ Finished 'compile-scss' after 412 ms
//! ✖ 'bundle-js' failed after 38 ms
//!     esbuild exited with exit status: 1
//! ℹ html: 2 files changed
//!     templates/index.html
//! ✔ Reloaded 3 clients (inject /css/main.css)
//! ```
//!
//! ## Plans
//!
//! ```text
//! sequence
//!     clean: remove the distribution directory
//!     concurrent
//!         copy-fonts
//!         compile-scss
//! ```

use crate::config::ResolvedPaths;
use crate::server::ReloadAction;
use crate::task::{Pipeline, PipelineError, RunEvent};
use crate::tools::ToolError;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const INFO: &str = "ℹ";
pub const SUCCESS: &str = "✔";
pub const ERROR: &str = "✖";
pub const WARNING: &str = "⚠";

// ============================================================================
// Helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human duration: milliseconds below one second, seconds above.
pub fn format_duration(elapsed: Duration) -> String {
    if elapsed.as_secs() >= 1 {
        format!("{:.2} s", elapsed.as_secs_f64())
    } else {
        format!("{} ms", elapsed.as_millis())
    }
}

/// Display `path` relative to `root` when it lives beneath it.
fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Byte count in the largest binary unit that keeps it at or above one.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

// ============================================================================
// Run events
// ============================================================================

/// Format a single run event as display lines.
pub fn format_run_event(event: &RunEvent) -> Vec<String> {
    match event {
        RunEvent::Started { task, description } => {
            let mut lines = vec![format!("{INFO} Starting '{task}'")];
            if let Some(desc) = description {
                lines.push(format!("{}{desc}", indent(1)));
            }
            lines
        }
        RunEvent::Finished { task, elapsed } => {
            vec![format!(
                "{SUCCESS} Finished '{task}' after {}",
                format_duration(*elapsed)
            )]
        }
        RunEvent::Failed {
            task,
            elapsed,
            error,
        } => {
            let mut lines = vec![format!(
                "{ERROR} '{task}' failed after {}",
                format_duration(*elapsed)
            )];
            lines.extend(error.lines().map(|l| format!("{}{l}", indent(1))));
            lines
        }
        RunEvent::Serving { url } => vec![format!("{INFO} Serving on {url}")],
        RunEvent::Watching { roots } => {
            let mut lines = vec![format!(
                "{INFO} Watching {}",
                plural(roots.len(), "directory", "directories")
            )];
            lines.extend(roots.iter().map(|r| format!("{}{}", indent(1), r.display())));
            lines
        }
        RunEvent::Changed { binding, paths } => {
            let mut lines = vec![format!(
                "{INFO} {binding}: {} changed",
                plural(paths.len(), "file", "files")
            )];
            lines.extend(paths.iter().map(|p| format!("{}{}", indent(1), p.display())));
            lines
        }
        RunEvent::Reloaded { action, clients } => match action {
            ReloadAction::None => Vec::new(),
            _ => vec![format!(
                "{SUCCESS} Reloaded {} ({action})",
                plural(*clients, "client", "clients")
            )],
        },
        RunEvent::WatchError { message } => vec![format!("{WARNING} {message}")],
        RunEvent::Images { task, report } => {
            let mut line = format!("{INFO} {task}: {}", plural(report.files, "image", "images"));
            if report.saved() > 0 {
                line.push_str(&format!(", {} saved", format_bytes(report.saved())));
            }
            if report.cache.total() > report.cache.copies {
                line.push_str(&format!(", {}", report.cache));
            }
            vec![line]
        }
    }
}

pub fn print_run_event(event: &RunEvent) {
    print_lines(&format_run_event(event));
}

// ============================================================================
// Plans
// ============================================================================

/// Format a pipeline as an indented tree of combinators and task names.
pub fn format_plan(pipeline: &Pipeline) -> Vec<String> {
    let mut lines = Vec::new();
    walk_plan(pipeline, 0, &mut lines);
    lines
}

fn walk_plan(pipeline: &Pipeline, depth: usize, lines: &mut Vec<String>) {
    match pipeline {
        Pipeline::Task(task) => match task.description() {
            Some(desc) => lines.push(format!("{}{}: {desc}", indent(depth), task.name())),
            None => lines.push(format!("{}{}", indent(depth), task.name())),
        },
        Pipeline::Sequence(members) => {
            lines.push(format!("{}sequence", indent(depth)));
            for member in members {
                walk_plan(member, depth + 1, lines);
            }
        }
        Pipeline::Concurrent(members) => {
            lines.push(format!("{}concurrent", indent(depth)));
            for member in members {
                walk_plan(member, depth + 1, lines);
            }
        }
    }
}

// ============================================================================
// Failures
// ============================================================================

/// Format a pipeline failure, one block per failed task.
///
/// Multi-line messages (tool stderr) continue indented under their task.
pub fn format_failure(err: &PipelineError) -> Vec<String> {
    let mut lines = Vec::new();
    walk_failure(err, 0, &mut lines);
    lines
}

fn walk_failure(err: &PipelineError, depth: usize, lines: &mut Vec<String>) {
    match err {
        PipelineError::Task { task, source } => {
            let message = source.to_string();
            let mut parts = message.lines();
            let first = parts.next().unwrap_or_default();
            lines.push(format!("{}{ERROR} {task}: {first}", indent(depth)));
            lines.extend(parts.map(|l| format!("{}{l}", indent(depth + 1))));
        }
        PipelineError::Concurrent(errors) => {
            lines.push(format!(
                "{}{ERROR} {} failed concurrently",
                indent(depth),
                plural(errors.len(), "task", "tasks")
            ));
            for inner in errors {
                walk_failure(inner, depth + 1, lines);
            }
        }
        PipelineError::ConflictingOutputs { .. } | PipelineError::Panicked(_) => {
            lines.push(format!("{}{ERROR} {err}", indent(depth)));
        }
    }
}

pub fn print_failure(err: &PipelineError) {
    for line in format_failure(err) {
        eprintln!("{}", line);
    }
}

// ============================================================================
// check
// ============================================================================

/// Format the resolved source and distribution directories.
///
/// Missing source directories are flagged with a warning symbol.
pub fn format_paths(paths: &ResolvedPaths) -> Vec<String> {
    let root = &paths.root;
    let sources: [(&str, &PathBuf); 7] = [
        ("templates", &paths.templates),
        ("layouts", &paths.layouts),
        ("partials", &paths.partials),
        ("scss", &paths.scss),
        ("js", &paths.js),
        ("fonts", &paths.fonts),
        ("img", &paths.img),
    ];
    let dist: [(&str, &PathBuf); 5] = [
        ("base", &paths.dist_base),
        ("css", &paths.dist_css),
        ("js", &paths.dist_js),
        ("fonts", &paths.dist_fonts),
        ("img", &paths.dist_img),
    ];

    let mut lines = vec![format!("Root: {}", root.display()), "Sources".to_string()];
    for (label, dir) in sources {
        let marker = if dir.is_dir() { " " } else { WARNING };
        lines.push(format!(
            "{}{marker} {label:<10}{}",
            indent(1),
            display_relative(dir, root)
        ));
    }
    lines.push("Distribution".to_string());
    for (label, dir) in dist {
        lines.push(format!(
            "{}  {label:<10}{}",
            indent(1),
            display_relative(dir, root)
        ));
    }
    lines
}

/// Format the lookup result for one external tool.
pub fn format_tool_status(label: &str, located: &Result<PathBuf, ToolError>) -> String {
    match located {
        Ok(path) => format!("{SUCCESS} {label}: {}", path.display()),
        Err(e) => format!("{WARNING} {label}: {e}"),
    }
}

/// Print pre-formatted lines to stdout.
pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStats;
    use crate::config::SiteConfig;
    use crate::images::ImageReport;
    use crate::task::{Task, concurrent, sequence};
    use crate::templates::TemplateError;

    #[test]
    fn duration_switches_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(412)), "412 ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50 s");
    }

    #[test]
    fn started_event_shows_description_indented() {
        let lines = format_run_event(&RunEvent::Started {
            task: "clean".into(),
            description: Some("remove the distribution directory".into()),
        });
        assert_eq!(
            lines,
            vec![
                "ℹ Starting 'clean'".to_string(),
                "    remove the distribution directory".to_string(),
            ]
        );
    }

    #[test]
    fn failed_event_indents_every_error_line() {
        let lines = format_run_event(&RunEvent::Failed {
            task: "compile-scss".into(),
            elapsed: Duration::from_millis(5),
            error: "sass exited\nline 3: expected }".into(),
        });
        assert_eq!(lines[0], "✖ 'compile-scss' failed after 5 ms");
        assert_eq!(lines[1], "    sass exited");
        assert_eq!(lines[2], "    line 3: expected }");
    }

    #[test]
    fn changed_event_counts_files() {
        let lines = format_run_event(&RunEvent::Changed {
            binding: "html".into(),
            paths: vec![PathBuf::from("templates/index.html")],
        });
        assert_eq!(lines[0], "ℹ html: 1 file changed");
        assert_eq!(lines[1], "    templates/index.html");
    }

    #[test]
    fn reload_event_names_the_action() {
        let lines = format_run_event(&RunEvent::Reloaded {
            action: ReloadAction::Full,
            clients: 2,
        });
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("✔ Reloaded 2 clients"));

        let silent = format_run_event(&RunEvent::Reloaded {
            action: ReloadAction::None,
            clients: 0,
        });
        assert!(silent.is_empty());
    }

    #[test]
    fn byte_sizes_use_binary_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MiB");
    }

    #[test]
    fn image_event_reports_savings_and_cache() {
        let mut cache = CacheStats::default();
        cache.hit();
        cache.miss();
        let lines = format_run_event(&RunEvent::Images {
            task: "optimize-images".into(),
            report: ImageReport {
                files: 2,
                bytes_before: 4096,
                bytes_after: 1024,
                cache,
            },
        });
        assert_eq!(
            lines,
            vec!["ℹ optimize-images: 2 images, 3.0 KiB saved, 1 cached, 1 encoded (2 total)".to_string()]
        );
    }

    #[test]
    fn copied_images_report_only_the_count() {
        let mut cache = CacheStats::default();
        cache.copy();
        let lines = format_run_event(&RunEvent::Images {
            task: "copy-images".into(),
            report: ImageReport {
                files: 1,
                bytes_before: 10,
                bytes_after: 10,
                cache,
            },
        });
        assert_eq!(lines, vec!["ℹ copy-images: 1 image".to_string()]);
    }

    #[test]
    fn plan_is_an_indented_tree() {
        let noop = || Ok(());
        let plan = sequence([
            Task::new("clean", noop).describe("wipe").into(),
            concurrent([Task::new("a", noop).into(), Task::new("b", noop).into()]),
        ]);
        assert_eq!(
            format_plan(&plan),
            vec![
                "sequence",
                "    clean: wipe",
                "    concurrent",
                "        a",
                "        b",
            ]
        );
    }

    #[test]
    fn failure_lists_each_concurrent_task() {
        let err = PipelineError::Concurrent(vec![
            PipelineError::Task {
                task: "compile-scss".into(),
                source: TemplateError::EmptyTag(PathBuf::from("index.html")).into(),
            },
            PipelineError::Panicked("bundle-js".into()),
        ]);
        let lines = format_failure(&err);
        assert_eq!(lines[0], "✖ 2 tasks failed concurrently");
        assert!(lines[1].starts_with("    ✖ compile-scss: "));
        assert_eq!(lines[2], "    ✖ 'bundle-js' panicked");
    }

    #[test]
    fn paths_are_shown_relative_to_root() {
        let paths = SiteConfig::default().resolve(Path::new("/site"));
        let lines = format_paths(&paths);
        assert_eq!(lines[0], "Root: /site");
        assert!(lines.iter().any(|l| l.ends_with("static/dist/css")));
        assert!(lines.iter().any(|l| l.contains("templates") && l.contains(WARNING)));
    }

    #[test]
    fn tool_status_marks_missing_tools() {
        let missing = format_tool_status("sass", &Err(ToolError::NotFound("sass".into())));
        assert!(missing.starts_with(WARNING));
        let found = format_tool_status("cp", &Ok(PathBuf::from("/bin/cp")));
        assert_eq!(found, "✔ cp: /bin/cp");
    }
}
