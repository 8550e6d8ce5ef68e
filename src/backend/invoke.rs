// src/backend/invoke.rs
//! Building and running the host C compiler command line.
//!
//! The gcc/clang path is a free-form argument list ending with `-o <out>`.
//! The MSVC path splits around a `/link` separator and rewrites the
//! gcc-flavoured `#flag` directives into cl.exe spellings.

use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::errors::CompileError;
use crate::prefs::{BuildMode, Preferences, TargetOs};

use super::flags::{CFlag, FlagKind};
use super::msvc::MsvcInstall;
use super::toolchain;

/// Default libraries every MSVC link pulls in.
const MSVC_DEFAULT_LIBS: [&str; 12] = [
    "kernel32", "user32", "gdi32", "advapi32", "shell32", "ole32", "oleaut32", "uuid", "odbc32",
    "odbccp32", "winspool", "comdlg32",
];

#[derive(Clone, Debug)]
pub struct CcInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl CcInvocation {
    /// The command as one printable line (for `--show-c-cmd`).
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(' ') && !arg.contains('"') {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

pub struct CcInvoker<'a> {
    prefs: &'a Preferences,
    flags: &'a [CFlag],
}

impl<'a> CcInvoker<'a> {
    pub fn new(prefs: &'a Preferences, flags: &'a [CFlag]) -> CcInvoker<'a> {
        CcInvoker { prefs, flags }
    }

    fn active_flags(&self) -> impl Iterator<Item = &CFlag> {
        let target = self.prefs.target_os;
        self.flags.iter().filter(move |f| f.applies_to(target))
    }

    /// Pick the toolchain for the active target and build its argv.
    pub fn invocation(&self) -> Result<CcInvocation, CompileError> {
        if self.prefs.target_os == TargetOs::Msvc {
            let msvc = MsvcInstall::find()?;
            self.msvc_invocation(&msvc)
        } else {
            let cc = toolchain::find_cc(self.prefs)?;
            self.gcc_invocation(&cc)
        }
    }

    pub fn gcc_invocation(&self, cc: &str) -> Result<CcInvocation, CompileError> {
        let prefs = self.prefs;
        let mut args: Vec<String> = vec!["-std=gnu11".into(), "-w".into()];

        if prefs.build_mode == BuildMode::BuildModule {
            args.push("-c".into());
        }
        if prefs.is_so {
            args.push("-shared".into());
            args.push("-fPIC".into());
        }
        if prefs.is_prod {
            args.push("-O2".into());
            args.push("-flto".into());
        }
        if prefs.is_debug {
            args.push("-g".into());
        }
        if prefs.is_prof {
            args.push("-pg".into());
        }
        if prefs.sanitize {
            args.push("-fsanitize=address".into());
        }

        args.push(prefs.out_name_c.clone());

        // Precompiled stdlib object, when the build does not embed the stdlib.
        if prefs.build_mode == BuildMode::Default {
            let stdlib_o = prefs.stdlib_root.join("stdlib.o");
            if stdlib_o.is_file() {
                args.push(stdlib_o.to_string_lossy().into_owned());
            }
        }

        for flag in self.active_flags() {
            match flag.kind {
                FlagKind::Lib => args.push(format!("-l{}", flag.value)),
                FlagKind::IncludeDir => {
                    args.push("-I".into());
                    args.push(flag.value.clone());
                }
                FlagKind::LibDir => {
                    args.push("-L".into());
                    args.push(flag.value.clone());
                }
                FlagKind::Raw => args.extend(flag.value.split_whitespace().map(str::to_string)),
            }
        }

        match prefs.target_os {
            TargetOs::Linux => {
                args.push("-lm".into());
                args.push("-lpthread".into());
                args.push("-ldl".into());
            }
            TargetOs::Mac => args.push("-lm".into()),
            TargetOs::Freebsd | TargetOs::Openbsd | TargetOs::Netbsd | TargetOs::Dragonfly => {
                args.push("-lm".into());
                args.push("-lpthread".into());
            }
            _ => {}
        }

        if !prefs.cflags.is_empty() {
            args.extend(prefs.cflags.split_whitespace().map(str::to_string));
        }

        args.push("-o".into());
        args.push(self.link_output());

        Ok(CcInvocation {
            program: cc.to_string(),
            args,
        })
    }

    pub fn msvc_invocation(&self, msvc: &MsvcInstall) -> Result<CcInvocation, CompileError> {
        let prefs = self.prefs;
        let mut args: Vec<String> = Vec::new();

        args.push(format!("/Fo{}.obj", prefs.out_name));
        if prefs.is_debug {
            args.push("/MDd".into());
            args.push("/Z7".into());
        } else {
            args.push("/MD".into());
        }
        if prefs.is_so {
            args.push("/LD".into());
        }

        args.push(prefs.out_name_c.clone());

        for dir in msvc.include_paths() {
            args.push("-I".into());
            args.push(format!("\"{}\"", dir.display()));
        }

        // gcc-flavoured directives rewritten for cl.exe. Libraries sit in the
        // default-lib position, before the /link separator.
        let mut lib_dirs: Vec<String> = Vec::new();
        for flag in self.active_flags() {
            match flag.kind {
                FlagKind::Lib => {
                    if flag.value.ends_with(".dll") {
                        return Err(CompileError::UnsupportedLinkDirective {
                            directive: format!("-l {}", flag.value),
                        });
                    }
                    args.push(format!("{}.lib", flag.value));
                }
                FlagKind::IncludeDir => {
                    args.push("-I".into());
                    args.push(format!("\"{}\"", flag.value));
                }
                FlagKind::LibDir => {
                    lib_dirs.push(flag.value.clone());
                }
                FlagKind::Raw => {
                    for word in flag.value.split_whitespace() {
                        args.push(rewrite_object_ext(word));
                    }
                }
            }
        }

        if !prefs.cflags.is_empty() {
            args.extend(prefs.cflags.split_whitespace().map(rewrite_object_ext));
        }

        args.push("/link".into());
        if prefs.is_debug {
            args.push("/DEBUG:FULL".into());
        } else {
            args.push("/DEBUG:NONE".into());
        }
        args.push(format!("/OUT:{}", self.link_output()));

        for dir in msvc.lib_paths() {
            args.push(format!("/LIBPATH:\"{}\"", dir.display()));
        }
        for dir in &lib_dirs {
            args.push(format!("/LIBPATH:\"{dir}\""));
            args.push(format!("/LIBPATH:\"{dir}\\msvc\""));
        }
        for lib in MSVC_DEFAULT_LIBS {
            args.push(format!("{lib}.lib"));
        }

        Ok(CcInvocation {
            program: msvc.cl_exe().to_string_lossy().into_owned(),
            args,
        })
    }

    fn link_output(&self) -> String {
        if self.prefs.build_mode == BuildMode::BuildModule {
            format!("{}.o", self.prefs.module_name.replace('.', "_"))
        } else {
            self.prefs.out_name.clone()
        }
    }

    /// Run the child compiler. On success the emitted C file is removed
    /// unless `-debug` keeps it; on failure it stays on disk for inspection.
    pub fn run(&self, inv: &CcInvocation) -> Result<(), CompileError> {
        if self.prefs.show_c_cmd || self.prefs.is_verbose {
            println!("{}", inv.command_line());
        }
        debug!(cc = %inv.program, "invoking host C compiler");

        let output = Command::new(&inv.program)
            .args(&inv.args)
            .output()
            .map_err(|e| CompileError::ToolchainNotFound {
                detail: format!("{} failed to start: {e}", inv.program),
            })?;

        if !output.status.success() {
            let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
            if text.trim().is_empty() {
                text = String::from_utf8_lossy(&output.stdout).into_owned();
            }
            return Err(CompileError::CompileFailure { output: text });
        }

        if !self.prefs.is_debug {
            let _ = std::fs::remove_file(Path::new(&self.prefs.out_name_c));
        }

        if self.prefs.compress {
            self.compress_output();
        }
        Ok(())
    }

    /// Best effort: shrink the final binary with upx when it is installed.
    fn compress_output(&self) {
        if toolchain::find_in_path("upx").is_none() {
            println!("upx is not installed, skipping compression");
            return;
        }
        let status = Command::new("upx")
            .args(["-qqq", &self.prefs.out_name])
            .status();
        if !matches!(status, Ok(s) if s.success()) {
            println!("upx failed, keeping the uncompressed binary");
        }
    }
}

/// MSVC object files are `.obj`; rewrite stray `.o` references.
fn rewrite_object_ext(word: &str) -> String {
    if let Some(stem) = word.strip_suffix(".o") {
        format!("{stem}.obj")
    } else {
        word.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::msvc::{MsvcInstall, VsInstallation, WindowsKit};
    use crate::prefs::test_prefs;
    use std::path::PathBuf;

    fn fake_msvc() -> MsvcInstall {
        let kit = PathBuf::from(r"C:\kits\10\Lib\10.0.1.0");
        let inc = PathBuf::from(r"C:\kits\10\Include\10.0.1.0");
        let vc = PathBuf::from(r"C:\vs\VC\Tools\MSVC\14.2");
        MsvcInstall {
            kit: WindowsKit {
                um_lib_path: kit.join("um/x64"),
                ucrt_lib_path: kit.join("ucrt/x64"),
                um_include_path: inc.join("um"),
                ucrt_include_path: inc.join("ucrt"),
                shared_include_path: inc.join("shared"),
            },
            vs: VsInstallation {
                exe_path: vc.join("bin/Hostx64/x64"),
                lib_path: vc.join("lib/x64"),
                include_path: vc.join("include"),
            },
        }
    }

    fn lib_flag(name: &str) -> CFlag {
        CFlag {
            os: None,
            kind: FlagKind::Lib,
            value: name.to_string(),
        }
    }

    #[test]
    fn gcc_argv_ends_with_output() {
        let prefs = test_prefs();
        let flags = [lib_flag("foo")];
        let inv = CcInvoker::new(&prefs, &flags).gcc_invocation("gcc").unwrap();
        assert_eq!(inv.args.last().unwrap(), "a.out");
        assert_eq!(&inv.args[inv.args.len() - 2], "-o");
        assert!(inv.args.iter().any(|a| a == "-lfoo"));
    }

    #[test]
    fn gcc_shared_build_adds_pic() {
        let mut prefs = test_prefs();
        prefs.is_so = true;
        let inv = CcInvoker::new(&prefs, &[]).gcc_invocation("cc").unwrap();
        assert!(inv.args.iter().any(|a| a == "-shared"));
        assert!(inv.args.iter().any(|a| a == "-fPIC"));
    }

    #[test]
    fn msvc_rewrites_lib_before_link_boundary() {
        let mut prefs = test_prefs();
        prefs.target_os = TargetOs::Msvc;
        let flags = [lib_flag("sqlite3")];
        let inv = CcInvoker::new(&prefs, &flags)
            .msvc_invocation(&fake_msvc())
            .unwrap();

        let link_pos = inv.args.iter().position(|a| a == "/link").unwrap();
        let lib_pos = inv.args.iter().position(|a| a == "sqlite3.lib").unwrap();
        assert!(lib_pos < link_pos, "library must precede /link");
        assert!(!inv.args.iter().any(|a| a.contains("-lsqlite3")));
    }

    #[test]
    fn msvc_rejects_dll_link_directive() {
        let mut prefs = test_prefs();
        prefs.target_os = TargetOs::Msvc;
        let flags = [lib_flag("sqlite3.dll")];
        let res = CcInvoker::new(&prefs, &flags).msvc_invocation(&fake_msvc());
        assert!(matches!(
            res,
            Err(CompileError::UnsupportedLinkDirective { .. })
        ));
    }

    #[test]
    fn msvc_includes_default_libs_after_link() {
        let mut prefs = test_prefs();
        prefs.target_os = TargetOs::Msvc;
        let inv = CcInvoker::new(&prefs, &[])
            .msvc_invocation(&fake_msvc())
            .unwrap();
        let link_pos = inv.args.iter().position(|a| a == "/link").unwrap();
        let k32 = inv.args.iter().position(|a| a == "kernel32.lib").unwrap();
        assert!(k32 > link_pos);
        assert!(inv.args.iter().any(|a| a.starts_with("/OUT:")));
    }

    #[test]
    fn msvc_libdir_gets_msvc_sibling() {
        let mut prefs = test_prefs();
        prefs.target_os = TargetOs::Msvc;
        let flags = [CFlag {
            os: None,
            kind: FlagKind::LibDir,
            value: r"C:\sqlite".into(),
        }];
        let inv = CcInvoker::new(&prefs, &flags)
            .msvc_invocation(&fake_msvc())
            .unwrap();
        assert!(inv.args.iter().any(|a| a == "/LIBPATH:\"C:\\sqlite\""));
        assert!(inv.args.iter().any(|a| a == "/LIBPATH:\"C:\\sqlite\\msvc\""));
    }

    #[test]
    fn object_extension_rewrite() {
        assert_eq!(rewrite_object_ext("builtin.o"), "builtin.obj");
        assert_eq!(rewrite_object_ext("-DNDEBUG"), "-DNDEBUG");
    }

    #[test]
    fn os_filtered_flags_are_skipped() {
        let mut prefs = test_prefs();
        prefs.target_os = TargetOs::Linux;
        let flags = [CFlag {
            os: Some(TargetOs::Mac),
            kind: FlagKind::Raw,
            value: "-framework Cocoa".into(),
        }];
        let inv = CcInvoker::new(&prefs, &flags).gcc_invocation("cc").unwrap();
        assert!(!inv.args.iter().any(|a| a == "-framework"));
    }
}
