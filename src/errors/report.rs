// src/errors/report.rs
//! Error rendering.
//!
//! Fatal errors go to standard output with a `V error:` prefix; the process
//! then exits with status 1. `render_to_string` produces the same text for
//! assertions in tests.

use miette::Diagnostic;

use super::CompileError;

/// Format an error the way the driver prints it.
pub fn render_to_string(err: &CompileError) -> String {
    match err.code() {
        Some(code) => format!("V error: [{code}] {err}"),
        None => format!("V error: {err}"),
    }
}

/// Print a fatal error to stdout. The caller is responsible for the exit.
pub fn report(err: &CompileError) {
    println!("{}", render_to_string(err));
    if let Some(help) = err.help() {
        println!("  help: {help}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_prefix_and_code() {
        let out = render_to_string(&CompileError::NoInputFiles);
        assert!(out.starts_with("V error: [E0001]"));
        assert!(out.contains("no input files"));
    }

    #[test]
    fn render_cycle_includes_path() {
        let out = render_to_string(&CompileError::ImportCycle {
            cycle: "m1 -> m2 -> m1".into(),
        });
        assert!(out.contains("Import cycle detected"));
        assert!(out.contains("m1 -> m2 -> m1"));
    }
}
