// src/backend/flags.rs
//! `#flag` directives.
//!
//! Source files pass options to the C back end with
//! `#flag <os?> <kind> <value>`, where `<kind>` is `-l`, `-I`, `-L` or
//! anything else (passed through raw). A leading OS name restricts the
//! directive to that target.

use std::path::Path;

use crate::errors::CompileError;
use crate::prefs::TargetOs;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagKind {
    /// `-l name`: link a library.
    Lib,
    /// `-I dir`: an include search directory.
    IncludeDir,
    /// `-L dir`: a library search directory.
    LibDir,
    /// Passed to the compiler verbatim.
    Raw,
}

#[derive(Clone, Debug)]
pub struct CFlag {
    /// Restricts the directive to one target; `None` applies everywhere.
    pub os: Option<TargetOs>,
    pub kind: FlagKind,
    pub value: String,
}

impl CFlag {
    /// Whether this directive is active for `target`. A `windows` filter
    /// covers the MSVC target too; `msvc` is MSVC only.
    pub fn applies_to(&self, target: TargetOs) -> bool {
        match self.os {
            None => true,
            Some(TargetOs::Windows) => target.is_windows_family(),
            Some(os) => os == target,
        }
    }
}

fn parse_os_name(word: &str) -> Option<TargetOs> {
    match word {
        "linux" => Some(TargetOs::Linux),
        "darwin" | "mac" | "macos" => Some(TargetOs::Mac),
        "windows" => Some(TargetOs::Windows),
        "msvc" => Some(TargetOs::Msvc),
        "freebsd" => Some(TargetOs::Freebsd),
        "openbsd" => Some(TargetOs::Openbsd),
        "netbsd" => Some(TargetOs::Netbsd),
        "dragonfly" => Some(TargetOs::Dragonfly),
        "js" => Some(TargetOs::Js),
        _ => None,
    }
}

/// Parse the text after `#flag`.
pub fn parse_directive(rest: &str, file: &Path, line: usize) -> Result<CFlag, CompileError> {
    let mut words = rest.split_whitespace().peekable();

    let os = match words.peek() {
        Some(word) => {
            let parsed = parse_os_name(word);
            if parsed.is_some() {
                words.next();
            }
            parsed
        }
        None => None,
    };

    let Some(first) = words.next() else {
        return Err(CompileError::Parse {
            file: file.to_path_buf(),
            line,
            message: "empty #flag directive".into(),
        });
    };

    // `-lfoo` and `-l foo` are both accepted, likewise -I/-L.
    let (kind, fused) = match first {
        "-l" => (FlagKind::Lib, None),
        "-I" => (FlagKind::IncludeDir, None),
        "-L" => (FlagKind::LibDir, None),
        _ if first.starts_with("-l") => (FlagKind::Lib, Some(&first[2..])),
        _ if first.starts_with("-I") => (FlagKind::IncludeDir, Some(&first[2..])),
        _ if first.starts_with("-L") => (FlagKind::LibDir, Some(&first[2..])),
        _ => (FlagKind::Raw, None),
    };

    let value = match kind {
        FlagKind::Raw => {
            let rest: Vec<&str> = std::iter::once(first).chain(words).collect();
            rest.join(" ")
        }
        _ => match fused {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => words.next().map(str::to_string).ok_or_else(|| CompileError::Parse {
                file: file.to_path_buf(),
                line,
                message: format!("#flag {first} is missing its value"),
            })?,
        },
    };

    Ok(CFlag { os, kind, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> CFlag {
        parse_directive(s, Path::new("t.v"), 1).unwrap()
    }

    #[test]
    fn bare_lib_flag() {
        let flag = parse("-lsqlite3");
        assert_eq!(flag.kind, FlagKind::Lib);
        assert_eq!(flag.value, "sqlite3");
        assert!(flag.os.is_none());
    }

    #[test]
    fn spaced_lib_flag() {
        let flag = parse("-l sqlite3");
        assert_eq!(flag.kind, FlagKind::Lib);
        assert_eq!(flag.value, "sqlite3");
    }

    #[test]
    fn os_filtered_flag() {
        let flag = parse("linux -lpthread");
        assert_eq!(flag.os, Some(TargetOs::Linux));
        assert!(flag.applies_to(TargetOs::Linux));
        assert!(!flag.applies_to(TargetOs::Mac));
    }

    #[test]
    fn windows_filter_covers_msvc() {
        let flag = parse("windows -lws2_32");
        assert!(flag.applies_to(TargetOs::Windows));
        assert!(flag.applies_to(TargetOs::Msvc));
        assert!(!flag.applies_to(TargetOs::Linux));
    }

    #[test]
    fn raw_flag_keeps_everything() {
        let flag = parse("darwin -framework Cocoa");
        assert_eq!(flag.kind, FlagKind::Raw);
        assert_eq!(flag.value, "-framework Cocoa");
        assert_eq!(flag.os, Some(TargetOs::Mac));
    }

    #[test]
    fn include_dir_flag() {
        let flag = parse("-I thirdparty/include");
        assert_eq!(flag.kind, FlagKind::IncludeDir);
        assert_eq!(flag.value, "thirdparty/include");
    }

    #[test]
    fn missing_value_is_an_error() {
        let res = parse_directive("-l", Path::new("t.v"), 3);
        assert!(matches!(res, Err(CompileError::Parse { line: 3, .. })));
    }
}
