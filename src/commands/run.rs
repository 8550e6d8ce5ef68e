// src/commands/run.rs

use std::path::Path;
use std::process::{Command, ExitCode};

use crate::cli::Cli;
use crate::driver::Driver;
use crate::errors::report;
use crate::prefs::BuildMode;

use super::common::{exe_path, make_prefs};

/// `v run <path> [args...]`: build, execute, forward the exit status.
pub fn run(cli: &Cli, path: &Path, args: &[String]) -> ExitCode {
    let prefs = match make_prefs(cli, path, false, BuildMode::Default) {
        Ok(prefs) => prefs,
        Err(e) => {
            report(&e);
            return ExitCode::FAILURE;
        }
    };
    let out_name = prefs.out_name.clone();
    let mut driver = Driver::new(prefs, path);
    if let Err(e) = driver.compile() {
        report(&e);
        return ExitCode::FAILURE;
    }

    let status = Command::new(exe_path(&out_name)).args(args).status();
    match status {
        Ok(status) => ExitCode::from(status.code().unwrap_or(1).clamp(0, 255) as u8),
        Err(e) => {
            eprintln!("error: could not run {out_name}: {e}");
            ExitCode::FAILURE
        }
    }
}
