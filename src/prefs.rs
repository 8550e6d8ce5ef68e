// src/prefs.rs
//! Build configuration, fixed at startup.
//!
//! `Preferences` is constructed once from the parsed command line and passed
//! by reference into every other component. Nothing mutates it afterwards.

use std::path::{Path, PathBuf};

use clap::ValueEnum;

use crate::errors::CompileError;

/// Compilation target. `Msvc` is Windows with the MSVC toolchain instead of
/// a gcc-compatible one; `Js` selects the JavaScript back-end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TargetOs {
    Mac,
    Linux,
    Windows,
    Freebsd,
    Openbsd,
    Netbsd,
    Dragonfly,
    Msvc,
    Js,
}

impl TargetOs {
    pub fn host() -> TargetOs {
        if cfg!(target_os = "macos") {
            TargetOs::Mac
        } else if cfg!(target_os = "windows") {
            TargetOs::Windows
        } else if cfg!(target_os = "freebsd") {
            TargetOs::Freebsd
        } else if cfg!(target_os = "openbsd") {
            TargetOs::Openbsd
        } else if cfg!(target_os = "netbsd") {
            TargetOs::Netbsd
        } else if cfg!(target_os = "dragonfly") {
            TargetOs::Dragonfly
        } else {
            TargetOs::Linux
        }
    }

    /// Windows-family targets share file suffixes and toolchain quirks.
    pub fn is_windows_family(self) -> bool {
        matches!(self, TargetOs::Windows | TargetOs::Msvc)
    }

    pub fn is_js(self) -> bool {
        matches!(self, TargetOs::Js)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BuildMode {
    /// Standard build: stdlib linked as a precompiled object where available.
    #[default]
    Default,
    /// Compile the stdlib sources into the translation unit itself.
    EmbedStdlib,
    /// `v build-module <dir>`: produce a `.o`, no executable.
    BuildModule,
}

/// Immutable build configuration.
#[derive(Clone, Debug)]
pub struct Preferences {
    pub build_mode: BuildMode,
    pub target_os: TargetOs,

    pub is_test: bool,
    pub is_script: bool,
    pub is_live: bool,
    pub is_so: bool,
    pub is_prof: bool,
    pub is_prod: bool,
    pub is_debug: bool,
    pub is_verbose: bool,
    pub sanitize: bool,
    pub obfuscate: bool,
    pub translated: bool,
    pub autofree: bool,
    pub building_self: bool,
    pub show_c_cmd: bool,
    pub compress: bool,

    pub cflags: String,
    pub c_compiler: String,
    /// Final artifact path.
    pub out_name: String,
    /// Emitted C translation unit: `<out_name>.tmp.c`.
    pub out_name_c: String,
    /// Directory of the compilation unit (module lookup anchor).
    pub dir: PathBuf,
    /// Module currently being built under `build-module`, otherwise "main".
    pub module_name: String,
    pub stdlib_root: PathBuf,
}

impl Preferences {
    /// Resolve the stdlib root: `$V_STDLIB` override, then `<exe-dir>/stdlib`,
    /// then `./stdlib` for running from a source checkout.
    pub fn locate_stdlib() -> PathBuf {
        if let Ok(env_path) = std::env::var("V_STDLIB") {
            let path = PathBuf::from(&env_path);
            if path.is_dir() {
                return path;
            }
        }
        if let Ok(exe_path) = std::env::current_exe()
            && let Some(exe_dir) = exe_path.parent()
        {
            let sibling = exe_dir.join("stdlib");
            if sibling.is_dir() {
                return sibling;
            }
        }
        PathBuf::from("stdlib")
    }

    /// Derive the default output name from the input path: strip the `.v`
    /// extension, append `.exe` for Windows-family targets.
    pub fn default_out_name(input: &Path, target_os: TargetOs) -> String {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "a.out".into());
        if target_os.is_windows_family() {
            format!("{stem}.exe")
        } else {
            stem
        }
    }

    /// Cross-check flag combinations that cannot work.
    pub fn validate(&self) -> Result<(), CompileError> {
        if self.target_os == TargetOs::Msvc && !cfg!(windows) {
            return Err(CompileError::InvalidFlag {
                message: "-os msvc requires a Windows host".into(),
            });
        }
        if self.is_test && self.is_so {
            return Err(CompileError::InvalidFlag {
                message: "cannot combine test mode with -shared".into(),
            });
        }
        Ok(())
    }

    /// Name of the emitted shared object for the `-live` bootstrap build.
    pub fn live_so_name(&self) -> String {
        let ext = if self.target_os.is_windows_family() {
            "dll"
        } else {
            "so"
        };
        format!("{}.{ext}", self.out_name)
    }
}


/// A `Preferences` filled with neutral defaults, for tests across the crate.
#[cfg(test)]
pub fn test_prefs() -> Preferences {
    Preferences {
        build_mode: BuildMode::Default,
        target_os: TargetOs::Linux,
        is_test: false,
        is_script: false,
        is_live: false,
        is_so: false,
        is_prof: false,
        is_prod: false,
        is_debug: false,
        is_verbose: false,
        sanitize: false,
        obfuscate: false,
        translated: false,
        autofree: false,
        building_self: false,
        show_c_cmd: false,
        compress: false,
        cflags: String::new(),
        c_compiler: String::new(),
        out_name: "a.out".into(),
        out_name_c: "a.out.tmp.c".into(),
        dir: PathBuf::from("."),
        module_name: "main".into(),
        stdlib_root: PathBuf::from("stdlib"),
    }
}
