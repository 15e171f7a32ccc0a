//! End-to-end tests driving the compiled `sitepipe` binary.
//!
//! Each test copies `fixtures/site/` into a temp directory and writes a
//! config that swaps sass and esbuild for `cp`, so no external toolchain is
//! needed.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const HERMETIC_CONFIG: &str = r#"
[styles]
command = "cp"
args = ["{input}", "{output}"]
source_map = false

[scripts]
command = "cp"
args = ["{input}", "{output}"]

[vendor]
css = ["static/vendor/css/*"]
js = ["static/js/*"]

[images]
cache = false
"#;

fn copy_dir(src: &Path, dst: &Path) {
    for entry in fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let target = dst.join(entry.file_name());
        if entry.path().is_dir() {
            fs::create_dir_all(&target).unwrap();
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

fn site(config: &str) -> TempDir {
    let tmp = TempDir::new().unwrap();
    copy_dir(
        &Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site"),
        tmp.path(),
    );
    fs::write(tmp.path().join("sitepipe.toml"), config).unwrap();
    tmp
}

fn sitepipe(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sitepipe"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn gen_config_prints_a_parseable_stock_file() {
    let tmp = TempDir::new().unwrap();
    let out = sitepipe(tmp.path(), &["gen-config"]);
    assert!(out.status.success());
    let text = stdout(&out);
    assert!(text.contains("[paths.dist]"));
    let parsed: toml::Value = toml::from_str(&text).unwrap();
    assert_eq!(parsed["server"]["port"].as_integer(), Some(5000));
}

#[test]
fn build_writes_the_distribution_directory() {
    let tmp = site(HERMETIC_CONFIG);
    let out = sitepipe(tmp.path(), &["build"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));

    let dist = tmp.path().join("static/dist");
    for rel in ["index.html", "css/main.css", "js/bundle.js", "fonts/site.woff2", "img/logo.svg"] {
        assert!(dist.join(rel).is_file(), "missing {rel}");
    }
    assert!(stdout(&out).contains("Finished 'compile-html'"));
}

#[test]
fn build_plan_prints_without_running() {
    let tmp = site(HERMETIC_CONFIG);
    let out = sitepipe(tmp.path(), &["build", "--plan"]);
    assert!(out.status.success());

    let text = stdout(&out);
    assert!(text.starts_with("sequence\n"));
    assert!(text.contains("        optimize-images"));
    assert!(!tmp.path().join("static/dist").exists());
}

#[test]
fn failing_task_exits_nonzero() {
    let config = HERMETIC_CONFIG.replacen("command = \"cp\"", "command = \"false\"", 1);
    let tmp = site(&config);
    let out = sitepipe(tmp.path(), &["build"]);

    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("compile-scss"));
    assert!(tmp.path().join("static/dist/js/bundle.js").is_file());
}

#[test]
fn invalid_config_fails_before_any_task() {
    let tmp = site("[images]\nquality = 500\n");
    let out = sitepipe(tmp.path(), &["build"]);

    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("images.quality"));
    assert!(!tmp.path().join("static/dist").exists());
}

#[test]
fn unknown_config_key_is_rejected() {
    let tmp = site("[server]\nprot = 8080\n");
    let out = sitepipe(tmp.path(), &["check"]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn check_lists_paths_and_tools() {
    let tmp = site(HERMETIC_CONFIG);
    let out = sitepipe(tmp.path(), &["check"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));

    let text = stdout(&out);
    assert!(text.contains("static/dist/css"));
    assert!(text.contains("✔ styles"));
    assert!(text.contains("Config is valid"));
}

#[test]
fn check_fails_when_a_tool_is_missing() {
    let config = HERMETIC_CONFIG.replacen(
        "command = \"cp\"",
        "command = \"definitely-not-a-real-compiler\"",
        1,
    );
    let tmp = site(&config);
    let out = sitepipe(tmp.path(), &["check"]);

    assert_eq!(out.status.code(), Some(1));
    assert!(stdout(&out).contains("⚠ styles"));
}

#[test]
fn clean_removes_output() {
    let tmp = site(HERMETIC_CONFIG);
    assert!(sitepipe(tmp.path(), &["build"]).status.success());
    assert!(tmp.path().join("static/dist").is_dir());

    let out = sitepipe(tmp.path(), &["clean"]);
    assert!(out.status.success());
    assert!(!tmp.path().join("static/dist").exists());
}
