// src/commands/common.rs
//! Shared command plumbing: turning parsed CLI flags into `Preferences`.

use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::errors::CompileError;
use crate::prefs::{BuildMode, Preferences, TargetOs};

/// Executable path for a just-built artifact: bare names need a `./`.
pub fn exe_path(out_name: &str) -> PathBuf {
    if out_name.contains('/') || out_name.contains(std::path::MAIN_SEPARATOR) {
        PathBuf::from(out_name)
    } else {
        PathBuf::from(".").join(out_name)
    }
}

fn input_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "a.out".into())
}

/// Build the immutable `Preferences` for one invocation.
pub fn make_prefs(
    cli: &Cli,
    input: &Path,
    is_test: bool,
    build_mode: BuildMode,
) -> Result<Preferences, CompileError> {
    let target_os = cli.target_os.unwrap_or_else(TargetOs::host);
    let is_so = cli.shared;
    // A shared-object rebuild of a live program is itself not live.
    let is_live = cli.live && !is_so;

    let dir = if input.is_dir() {
        input.to_path_buf()
    } else {
        match input.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    };

    let module_name = if build_mode == BuildMode::BuildModule {
        input
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "module".into())
    } else {
        "main".to_string()
    };

    let out_name = match &cli.out {
        Some(name) => {
            let mut name = name.clone();
            if target_os.is_windows_family() && !is_so && !name.ends_with(".exe") {
                name.push_str(".exe");
            }
            name
        }
        None => {
            let stem = input_stem(input);
            if is_so {
                let ext = if target_os.is_windows_family() { "dll" } else { "so" };
                format!("{stem}.{ext}")
            } else {
                Preferences::default_out_name(input, target_os)
            }
        }
    };
    let out_name_c = format!("{out_name}.tmp.c");

    let prefs = Preferences {
        build_mode,
        target_os,
        is_test,
        is_script: cli.script,
        is_live,
        is_so,
        is_prof: cli.prof,
        is_prod: cli.prod,
        is_debug: cli.debug || cli.g,
        is_verbose: cli.verbose,
        sanitize: cli.sanitize,
        obfuscate: cli.obf,
        translated: cli.translated,
        autofree: cli.autofree,
        building_self: false,
        show_c_cmd: cli.show_c_cmd,
        compress: cli.compress,
        cflags: cli.cflags.clone().unwrap_or_default(),
        c_compiler: cli.cc.clone().unwrap_or_default(),
        out_name,
        out_name_c,
        dir,
        module_name,
        stdlib_root: Preferences::locate_stdlib(),
    };
    prefs.validate()?;
    Ok(prefs)
}
