// src/commands/tools.rs
//! Advisory verbs. These tools ship separately; the compiler prints a
//! notice and exits cleanly when they are invoked.

use std::process::ExitCode;

pub fn fmt() -> ExitCode {
    println!("vfmt is not bundled with this build");
    ExitCode::SUCCESS
}

pub fn install() -> ExitCode {
    println!("the module installer is not bundled with this build");
    ExitCode::SUCCESS
}

pub fn up() -> ExitCode {
    println!("self-update is not bundled with this build; pull and rebuild instead");
    ExitCode::SUCCESS
}

pub fn repl() -> ExitCode {
    println!("the REPL is not bundled with this build");
    ExitCode::SUCCESS
}

/// `v symlink`: make this executable reachable as /usr/local/bin/v.
#[cfg(unix)]
pub fn symlink() -> ExitCode {
    let Ok(exe) = std::env::current_exe() else {
        eprintln!("error: cannot determine the compiler executable path");
        return ExitCode::FAILURE;
    };
    let link = "/usr/local/bin/v";
    let _ = std::fs::remove_file(link);
    match std::os::unix::fs::symlink(&exe, link) {
        Ok(()) => {
            println!("{} -> {}", link, exe.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: failed to create {link}: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(unix))]
pub fn symlink() -> ExitCode {
    println!("symlink is only supported on Unix; add this executable to %PATH% instead");
    ExitCode::SUCCESS
}
