// tests/cli_driver.rs
//! End-to-end checks against the compiled `v` binary. Every scenario here
//! stops before the host C toolchain is needed, so the suite runs on bare
//! CI machines.

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

fn v_binary() -> &'static str {
    env!("CARGO_BIN_EXE_v")
}

/// A minimal stdlib so the driver can seed the builtin module.
fn make_stdlib(dir: &Path) {
    fs::create_dir_all(dir.join("builtin")).unwrap();
    fs::write(
        dir.join("builtin/builtin.v"),
        "module builtin\n\nfn C.printf(fmt charptr) int\n\npub fn println(s string) {\n\tC.printf('%.*s\\n', s.len, s.str)\n}\n",
    )
    .unwrap();
}

struct Project {
    _root: TempDir,
    stdlib: TempDir,
    dir: std::path::PathBuf,
}

fn project() -> Project {
    let root = TempDir::new().unwrap();
    let stdlib = TempDir::new().unwrap();
    make_stdlib(stdlib.path());
    let dir = root.path().to_path_buf();
    Project {
        _root: root,
        stdlib,
        dir,
    }
}

fn run_v(project: &Project, args: &[&str]) -> std::process::Output {
    Command::new(v_binary())
        .args(args)
        .current_dir(&project.dir)
        .env("V_STDLIB", project.stdlib.path())
        .env_remove("VFLAGS")
        .output()
        .expect("failed to run v")
}

#[test]
fn version_prints_and_exits_zero() {
    let p = project();
    let out = run_v(&p, &["version"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("v "), "unexpected output: {stdout}");
}

#[test]
fn import_cycle_fails_without_emitting_c() {
    let p = project();
    fs::create_dir_all(p.dir.join("m1")).unwrap();
    fs::write(p.dir.join("m1/m1.v"), "module m1\nimport m2\n").unwrap();
    fs::create_dir_all(p.dir.join("m2")).unwrap();
    fs::write(p.dir.join("m2/m2.v"), "module m2\nimport m1\n").unwrap();
    fs::write(p.dir.join("main.v"), "import m1\nfn main() {\n}\n").unwrap();

    let out = run_v(&p, &["."]);
    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        stdout.contains("Import cycle detected"),
        "missing cycle report: {stdout}"
    );
    assert!(stdout.contains("m1") && stdout.contains("m2"));

    // No translation unit left behind.
    let leftovers: Vec<_> = fs::read_dir(&p.dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp.c"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn missing_main_is_a_fatal_error() {
    let p = project();
    fs::write(p.dir.join("lib.v"), "fn helper() {\n}\n").unwrap();

    let out = run_v(&p, &["lib.v"]);
    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("V error:"), "missing prefix: {stdout}");
    assert!(stdout.contains("main"), "should mention main: {stdout}");
}

#[test]
fn undeclared_function_reports_file_and_line() {
    let p = project();
    fs::write(
        p.dir.join("main.v"),
        "fn main() {\n\tdoes_not_exist()\n}\n",
    )
    .unwrap();

    let out = run_v(&p, &["main.v"]);
    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("undeclared function: does_not_exist"));
    assert!(stdout.contains("main.v:2"), "missing location: {stdout}");
}

#[test]
fn unknown_subcommand_is_rejected() {
    let p = project();
    let out = run_v(&p, &["frobnicate"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("unrecognized command"));
}

#[test]
fn vflags_env_is_spliced_into_argv() {
    let p = project();
    fs::write(p.dir.join("lib.v"), "fn helper() {\n}\n").unwrap();

    // --script makes the missing main acceptable; lib.v then fails later
    // (helper is a declaration, not a statement), proving VFLAGS applied.
    let out = Command::new(v_binary())
        .args(["lib.v"])
        .current_dir(&p.dir)
        .env("V_STDLIB", p.stdlib.path())
        .env("VFLAGS", "--verbose")
        .output()
        .expect("failed to run v");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        stdout.contains("compiling"),
        "verbose from VFLAGS missing: {stdout}"
    );
}

#[test]
fn msvc_target_requires_windows_host() {
    if cfg!(windows) {
        return;
    }
    let p = project();
    fs::write(p.dir.join("main.v"), "fn main() {\n}\n").unwrap();
    let out = run_v(&p, &["--os", "msvc", "main.v"]);
    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("invalid flag"));
}
