// src/gen/sink.rs
//! The append-only C output buffer.
//!
//! All parsers write into one sink. Body lines accumulate in order; side
//! buffers collect includes, typedefs, forward declarations and constants
//! that the driver stitches into their fixed positions. A single reserved
//! marker line holds the place where aggregated definitions land once the
//! decl pass has seen every file.

use std::path::Path;

use crate::errors::CompileError;
use crate::frontend::Pass;

/// The reserved line replaced once with aggregated definitions.
pub const DEFS_MARKER: &str = "// __DEFINITIONS__";

#[derive(Debug)]
pub struct CGenSink {
    /// Which pass the parsers are currently running.
    pub pass: Pass,
    lines: Vec<String>,
    includes: Vec<String>,
    pub typedefs: Vec<String>,
    /// Forward function signatures.
    pub fns: Vec<String>,
    pub consts: Vec<String>,
    /// Statements run by `init_consts` before `main`.
    pub consts_init: Vec<String>,
    /// Argument-struct definitions for spawned threads.
    pub thread_args: Vec<String>,
    /// Mangled names of `[live]` functions, bound from the shared object.
    pub so_fns: Vec<String>,
    defs_written: bool,
}

impl CGenSink {
    pub fn new() -> CGenSink {
        CGenSink {
            pass: Pass::Imports,
            lines: Vec::new(),
            includes: Vec::new(),
            typedefs: Vec::new(),
            fns: Vec::new(),
            consts: Vec::new(),
            consts_init: Vec::new(),
            thread_args: Vec::new(),
            so_fns: Vec::new(),
            defs_written: false,
        }
    }

    pub fn writeln(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Append an `#include` line, collapsing duplicates.
    pub fn include(&mut self, line: impl Into<String>) {
        let line = line.into();
        if !self.includes.contains(&line) {
            self.includes.push(line);
        }
    }

    /// Plant the definitions marker at the current body position.
    pub fn reserve_definitions(&mut self) {
        self.lines.push(DEFS_MARKER.to_string());
    }

    /// Replace the marker with `text`. Returns false if the marker was
    /// already rewritten or never reserved.
    pub fn rewrite_definitions(&mut self, text: &str) -> bool {
        if self.defs_written {
            return false;
        }
        let Some(idx) = self.lines.iter().position(|l| l == DEFS_MARKER) else {
            return false;
        };
        self.lines[idx] = text.to_string();
        self.defs_written = true;
        true
    }

    /// Assemble the final translation unit: includes, typedefs, then the
    /// body (which carries the rewritten definitions slot in place).
    pub fn finalize(&self) -> String {
        let mut out = String::new();
        for line in &self.includes {
            out.push_str(line);
            out.push('\n');
        }
        for line in &self.typedefs {
            out.push_str(line);
            out.push('\n');
        }
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Write the finalized unit as one UTF-8 file.
    pub fn save(&self, path: &Path) -> Result<(), CompileError> {
        std::fs::write(path, self.finalize()).map_err(|e| CompileError::io(path, e))
    }
}

impl Default for CGenSink {
    fn default() -> Self {
        Self::new()
    }
}
