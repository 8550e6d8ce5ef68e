// src/module/filter.rs
//! Platform and suffix filtering of source files.
//!
//! A directory's build contribution is every `.v`/`.vh` file minus test
//! files (outside test mode) and files whose platform suffix does not match
//! the active target. Output is sorted by filename so builds are
//! deterministic.

use std::path::{Path, PathBuf};

use crate::errors::CompileError;
use crate::prefs::{Preferences, TargetOs};

fn has_source_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "v" || ext == "vh")
}

/// Whether `stem` (filename without extension) is active for `target`.
fn platform_matches(stem: &str, target: TargetOs) -> bool {
    if stem.ends_with("_win") {
        return target.is_windows_family();
    }
    if stem.ends_with("_lin") {
        return target == TargetOs::Linux;
    }
    if stem.ends_with("_mac") {
        return target == TargetOs::Mac;
    }
    if stem.ends_with("_nix") {
        return !target.is_windows_family() && !target.is_js();
    }
    if stem.ends_with("_js") {
        return target.is_js();
    }
    if stem.ends_with("_c") {
        return !target.is_js();
    }
    true
}

/// Whether `path` participates in a build configured by `prefs`.
pub fn is_active_source(path: &Path, prefs: &Preferences) -> bool {
    if !has_source_extension(path) {
        return false;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.ends_with("_test.v") && !prefs.is_test {
        return false;
    }
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    platform_matches(stem, prefs.target_os)
}

/// Enumerate the source files of one directory, filtered and sorted.
pub fn source_files_in(dir: &Path, prefs: &Preferences) -> Result<Vec<PathBuf>, CompileError> {
    if !dir.exists() {
        return Err(CompileError::PathNotFound {
            path: dir.to_path_buf(),
        });
    }
    if !dir.is_dir() {
        return Err(CompileError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }
    let entries = std::fs::read_dir(dir).map_err(|e| CompileError::io(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_active_source(p, prefs))
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
