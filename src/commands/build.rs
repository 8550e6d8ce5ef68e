// src/commands/build.rs

use std::path::Path;
use std::process::ExitCode;

use crate::cli::Cli;
use crate::driver::Driver;
use crate::errors::report;
use crate::prefs::BuildMode;

use super::common::make_prefs;

/// `v build <path>` (and the bare `v <path>` shorthand).
pub fn build(cli: &Cli, path: &Path) -> ExitCode {
    let prefs = match make_prefs(cli, path, false, BuildMode::Default) {
        Ok(prefs) => prefs,
        Err(e) => {
            report(&e);
            return ExitCode::FAILURE;
        }
    };
    let mut driver = Driver::new(prefs, path);
    match driver.compile() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

/// `v build-module <dir>`: compile one module into an object file, no link.
pub fn build_module(cli: &Cli, path: &Path) -> ExitCode {
    let prefs = match make_prefs(cli, path, false, BuildMode::BuildModule) {
        Ok(prefs) => prefs,
        Err(e) => {
            report(&e);
            return ExitCode::FAILURE;
        }
    };
    let module = prefs.module_name.clone();
    let mut driver = Driver::new(prefs, path);
    match driver.compile() {
        Ok(()) => {
            println!("built module {module}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}
