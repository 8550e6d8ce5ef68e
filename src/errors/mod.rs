// src/errors/mod.rs
//! Structured errors for the compiler driver.
//!
//! One enum covers every fatal condition the driver can surface. Codes are
//! stable and grouped by stage:
//! - E0xxx: user input and flag validation
//! - E1xxx: module resolution and the import graph
//! - E2xxx: parsing
//! - E3xxx: entry-point policy
//! - E4xxx: back-end and host toolchain

pub mod report;

pub use report::{render_to_string, report};

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum CompileError {
    #[error("no input files")]
    #[diagnostic(code(E0001), help("pass a .v file or a directory containing .v files"))]
    NoInputFiles,

    #[error("path does not exist: {path}")]
    #[diagnostic(code(E0002))]
    PathNotFound { path: PathBuf },

    #[error("not a directory: {path}")]
    #[diagnostic(code(E0003))]
    NotADirectory { path: PathBuf },

    #[error("invalid flag: {message}")]
    #[diagnostic(code(E0004))]
    InvalidFlag { message: String },

    #[error("cannot read {path}: {source}")]
    #[diagnostic(code(E0005))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("module not found: {module}")]
    #[diagnostic(
        code(E1001),
        help("modules are looked up next to the program, in the stdlib, then in ~/.vmodules")
    )]
    ModuleNotFound { module: String },

    #[error("Import cycle detected: {cycle}")]
    #[diagnostic(code(E1002))]
    ImportCycle { cycle: String },

    #[error("{file}:{line}: {message}")]
    #[diagnostic(code(E2001))]
    Parse {
        file: PathBuf,
        line: usize,
        message: String,
    },

    #[error("function `main` is undeclared")]
    #[diagnostic(code(E3001), help("declare `fn main` or compile with --script"))]
    MissingMain,

    #[error("tests cannot declare `fn main`")]
    #[diagnostic(code(E3002))]
    TestWithMain,

    #[error("no test functions found")]
    #[diagnostic(code(E3003), help("test functions are named `fn test_...`"))]
    NoTestFunctions,

    #[error("no C compiler found: {detail}")]
    #[diagnostic(
        code(E4001),
        help("install gcc or clang, or point $CC at a working compiler")
    )]
    ToolchainNotFound { detail: String },

    #[error("unsupported link directive: {directive}")]
    #[diagnostic(code(E4002), help("MSVC links against .lib import libraries, not .dll files"))]
    UnsupportedLinkDirective { directive: String },

    #[error("C compiler failed:\n{output}")]
    #[diagnostic(code(E4003))]
    CompileFailure { output: String },
}

impl CompileError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> CompileError {
        CompileError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_carries_location() {
        let err = CompileError::Parse {
            file: PathBuf::from("main.v"),
            line: 7,
            message: "expected `{`".into(),
        };
        assert_eq!(err.to_string(), "main.v:7: expected `{`");
    }

    #[test]
    fn codes_are_stable() {
        use miette::Diagnostic;
        let err = CompileError::NoInputFiles;
        assert_eq!(err.code().unwrap().to_string(), "E0001");
        let err = CompileError::ImportCycle {
            cycle: "a -> b -> a".into(),
        };
        assert_eq!(err.code().unwrap().to_string(), "E1002");
    }
}
