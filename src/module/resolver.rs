// src/module/resolver.rs
//! Mapping a dotted module name to a filesystem directory.
//!
//! `net.http` becomes `net/http`, looked up in order next to the compilation
//! unit, in the stdlib root, then in the user module cache (`~/.vmodules`).
//! A candidate only wins if it actually contains source files.

use std::path::{Path, PathBuf};

use crate::errors::CompileError;
use crate::prefs::Preferences;

/// `~/.vmodules`, if a home directory can be determined.
pub fn vmodules_dir() -> Option<PathBuf> {
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"))?;
    Some(PathBuf::from(home).join(".vmodules"))
}

fn contains_source_files(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries
        .filter_map(|e| e.ok())
        .any(|e| e.path().extension().is_some_and(|ext| ext == "v" || ext == "vh"))
}

/// Resolve `module` (e.g. `net.http`) to an absolute directory.
pub fn resolve_module_path(module: &str, prefs: &Preferences) -> Result<PathBuf, CompileError> {
    let rel: PathBuf = module.split('.').collect();

    let mut candidates = vec![prefs.dir.join(&rel), prefs.stdlib_root.join(&rel)];
    if let Some(vmod) = vmodules_dir() {
        candidates.push(vmod.join(&rel));
    }

    for candidate in candidates {
        if candidate.is_dir() && contains_source_files(&candidate) {
            return Ok(candidate);
        }
    }
    Err(CompileError::ModuleNotFound {
        module: module.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::test_prefs;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn resolves_relative_to_compilation_unit_first() {
        let user = TempDir::new().unwrap();
        let stdlib = TempDir::new().unwrap();
        fs::create_dir_all(user.path().join("net/http")).unwrap();
        fs::write(user.path().join("net/http/client.v"), "module http\n").unwrap();
        fs::create_dir_all(stdlib.path().join("net/http")).unwrap();
        fs::write(stdlib.path().join("net/http/client.v"), "module http\n").unwrap();

        let mut prefs = test_prefs();
        prefs.dir = user.path().to_path_buf();
        prefs.stdlib_root = stdlib.path().to_path_buf();

        let resolved = resolve_module_path("net.http", &prefs).unwrap();
        assert!(resolved.starts_with(user.path()));
    }

    #[test]
    fn falls_back_to_stdlib() {
        let user = TempDir::new().unwrap();
        let stdlib = TempDir::new().unwrap();
        fs::create_dir_all(stdlib.path().join("math")).unwrap();
        fs::write(stdlib.path().join("math/math.v"), "module math\n").unwrap();

        let mut prefs = test_prefs();
        prefs.dir = user.path().to_path_buf();
        prefs.stdlib_root = stdlib.path().to_path_buf();

        let resolved = resolve_module_path("math", &prefs).unwrap();
        assert!(resolved.starts_with(stdlib.path()));
    }

    #[test]
    fn empty_directory_does_not_count() {
        let user = TempDir::new().unwrap();
        let stdlib = TempDir::new().unwrap();
        // Directory exists but holds no sources.
        fs::create_dir_all(user.path().join("math")).unwrap();
        fs::create_dir_all(stdlib.path().join("math")).unwrap();
        fs::write(stdlib.path().join("math/math.v"), "module math\n").unwrap();

        let mut prefs = test_prefs();
        prefs.dir = user.path().to_path_buf();
        prefs.stdlib_root = stdlib.path().to_path_buf();

        let resolved = resolve_module_path("math", &prefs).unwrap();
        assert!(resolved.starts_with(stdlib.path()));
    }

    #[test]
    fn unknown_module_fails() {
        let user = TempDir::new().unwrap();
        let stdlib = TempDir::new().unwrap();
        let mut prefs = test_prefs();
        prefs.dir = user.path().to_path_buf();
        prefs.stdlib_root = stdlib.path().to_path_buf();

        let res = resolve_module_path("does.not.exist", &prefs);
        assert!(matches!(res, Err(CompileError::ModuleNotFound { .. })));
    }
}
