// src/backend/msvc.rs
//! MSVC discovery on Windows hosts.
//!
//! Two independent lookups, both required:
//! 1. The Windows SDK, from the `Installed Roots` registry key (queried
//!    through `reg.exe`, the same subprocess boundary as vswhere).
//! 2. The VC tools, from `vswhere.exe` under `%ProgramFiles(x86)%`.
//!
//! On non-Windows hosts `MsvcInstall::find` fails deterministically.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::errors::CompileError;

const INSTALLED_ROOTS: &str = r"HKLM\SOFTWARE\Microsoft\Windows Kits\Installed Roots";
const VSWHERE_SUFFIX: &str = r"Microsoft Visual Studio\Installer\vswhere.exe";

#[derive(Clone, Debug)]
pub struct WindowsKit {
    pub um_lib_path: PathBuf,
    pub ucrt_lib_path: PathBuf,
    pub um_include_path: PathBuf,
    pub ucrt_include_path: PathBuf,
    pub shared_include_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct VsInstallation {
    /// Directory holding cl.exe (`bin\Hostx64\x64`).
    pub exe_path: PathBuf,
    pub lib_path: PathBuf,
    pub include_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct MsvcInstall {
    pub kit: WindowsKit,
    pub vs: VsInstallation,
}

fn not_found(detail: impl Into<String>) -> CompileError {
    CompileError::ToolchainNotFound {
        detail: detail.into(),
    }
}

/// Extract the data of a REG_SZ value from `reg.exe query` output.
pub(crate) fn parse_reg_sz(output: &str, value_name: &str) -> Option<String> {
    for line in output.lines() {
        let line = line.trim();
        if !line.starts_with(value_name) {
            continue;
        }
        if let Some(idx) = line.find("REG_SZ") {
            let data = line[idx + "REG_SZ".len()..].trim();
            if !data.is_empty() {
                return Some(data.to_string());
            }
        }
    }
    None
}

/// Pick the version directory whose digits form the largest integer.
pub(crate) fn highest_version(names: &[String]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| {
            let digits: String = name.chars().filter(char::is_ascii_digit).collect();
            digits.parse::<u64>().ok().map(|n| (n, name))
        })
        .max_by_key(|(n, _)| *n)
        .map(|(_, name)| name.clone())
}

fn query_kits_root(value_name: &str) -> Option<PathBuf> {
    let output = Command::new("reg.exe")
        .args(["query", INSTALLED_ROOTS, "/v", value_name])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_reg_sz(&String::from_utf8_lossy(&output.stdout), value_name).map(PathBuf::from)
}

fn subdir_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn find_windows_kit() -> Result<WindowsKit, CompileError> {
    let kit_root = query_kits_root("KitsRoot10")
        .or_else(|| query_kits_root("KitsRoot81"))
        .ok_or_else(|| not_found("no Windows SDK in the registry (KitsRoot10/KitsRoot81)"))?;

    let lib_dir = kit_root.join("Lib");
    let version = highest_version(&subdir_names(&lib_dir))
        .ok_or_else(|| not_found(format!("no SDK versions under {}", lib_dir.display())))?;

    let lib = kit_root.join("Lib").join(&version);
    let include = kit_root.join("Include").join(&version);
    Ok(WindowsKit {
        um_lib_path: lib.join("um").join("x64"),
        ucrt_lib_path: lib.join("ucrt").join("x64"),
        um_include_path: include.join("um"),
        ucrt_include_path: include.join("ucrt"),
        shared_include_path: include.join("shared"),
    })
}

fn find_vs() -> Result<VsInstallation, CompileError> {
    let program_files = std::env::var("ProgramFiles(x86)")
        .map_err(|_| not_found("%ProgramFiles(x86)% is not set"))?;
    let vswhere = Path::new(&program_files).join(VSWHERE_SUFFIX);
    if !vswhere.is_file() {
        return Err(not_found(format!("{} does not exist", vswhere.display())));
    }

    let output = Command::new(&vswhere)
        .args([
            "-latest",
            "-products",
            "*",
            "-requires",
            "Microsoft.VisualStudio.Component.VC.Tools.x86.x64",
            "-property",
            "installationPath",
        ])
        .output()
        .map_err(|e| not_found(format!("vswhere failed to run: {e}")))?;

    let install_path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if install_path.is_empty() {
        return Err(not_found("vswhere reported no VC.Tools.x86.x64 installation"));
    }
    let install = PathBuf::from(install_path);

    let version_file = install
        .join("VC")
        .join("Auxiliary")
        .join("Build")
        .join("Microsoft.VCToolsVersion.default.txt");
    let version = std::fs::read_to_string(&version_file)
        .map_err(|e| not_found(format!("cannot read {}: {e}", version_file.display())))?
        .trim()
        .to_string();

    let tools = install.join("VC").join("Tools").join("MSVC").join(version);
    Ok(VsInstallation {
        exe_path: tools.join("bin").join("Hostx64").join("x64"),
        lib_path: tools.join("lib").join("x64"),
        include_path: tools.join("include"),
    })
}

impl MsvcInstall {
    pub fn find() -> Result<MsvcInstall, CompileError> {
        if !cfg!(windows) {
            return Err(not_found("MSVC discovery requires a Windows host"));
        }
        Ok(MsvcInstall {
            kit: find_windows_kit()?,
            vs: find_vs()?,
        })
    }

    pub fn cl_exe(&self) -> PathBuf {
        self.vs.exe_path.join("cl.exe")
    }

    pub fn include_paths(&self) -> Vec<&Path> {
        vec![
            &self.vs.include_path,
            &self.kit.um_include_path,
            &self.kit.ucrt_include_path,
            &self.kit.shared_include_path,
        ]
    }

    pub fn lib_paths(&self) -> Vec<&Path> {
        vec![&self.vs.lib_path, &self.kit.um_lib_path, &self.kit.ucrt_lib_path]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reg_query_output() {
        let output = "\r\nHKEY_LOCAL_MACHINE\\SOFTWARE\\Microsoft\\Windows Kits\\Installed Roots\r\n    KitsRoot10    REG_SZ    C:\\Program Files (x86)\\Windows Kits\\10\\\r\n";
        assert_eq!(
            parse_reg_sz(output, "KitsRoot10").as_deref(),
            Some("C:\\Program Files (x86)\\Windows Kits\\10\\")
        );
        assert_eq!(parse_reg_sz(output, "KitsRoot81"), None);
    }

    #[test]
    fn highest_version_compares_numerically() {
        let names = vec![
            "10.0.17763.0".to_string(),
            "10.0.18362.0".to_string(),
            "10.0.10240.0".to_string(),
        ];
        assert_eq!(highest_version(&names).as_deref(), Some("10.0.18362.0"));
    }

    #[test]
    fn highest_version_skips_non_numeric() {
        let names = vec!["winv6.3".to_string(), "10.0.19041.0".to_string()];
        assert_eq!(highest_version(&names).as_deref(), Some("10.0.19041.0"));
    }

    #[cfg(not(windows))]
    #[test]
    fn find_fails_deterministically_off_windows() {
        assert!(matches!(
            MsvcInstall::find(),
            Err(CompileError::ToolchainNotFound { .. })
        ));
    }
}
