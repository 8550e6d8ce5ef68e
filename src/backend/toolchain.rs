// src/backend/toolchain.rs
//! Locating a gcc-compatible C compiler.
//!
//! Probe order: an explicit `--cc`, then `$CC`, then `cc`, `gcc`, `clang`
//! on `$PATH`. First hit wins.

use std::path::{Path, PathBuf};

use crate::errors::CompileError;
use crate::prefs::Preferences;

/// Search `$PATH` for an executable named `name`.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    // An explicit path bypasses the search.
    if name.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(name);
        return if is_executable(&path) { Some(path) } else { None };
    }
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{name}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Pick the C compiler for a gcc/clang-style target.
pub fn find_cc(prefs: &Preferences) -> Result<String, CompileError> {
    if !prefs.c_compiler.is_empty() {
        return Ok(prefs.c_compiler.clone());
    }
    if let Ok(cc) = std::env::var("CC")
        && !cc.is_empty()
    {
        return Ok(cc);
    }
    for candidate in ["cc", "gcc", "clang"] {
        if find_in_path(candidate).is_some() {
            return Ok(candidate.to_string());
        }
    }
    Err(CompileError::ToolchainNotFound {
        detail: "no cc, gcc or clang on $PATH".into(),
    })
}
