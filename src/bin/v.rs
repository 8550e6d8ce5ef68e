// src/bin/v.rs

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use vc::cli::{Cli, Commands};
use vc::commands::build::{build, build_module};
use vc::commands::run::run;
use vc::commands::test::test;
use vc::commands::tools;
use vc::commands::version::print_version;

fn main() -> ExitCode {
    // Tracing goes to stderr and is opt-in through V_LOG (e.g.
    // V_LOG=vc=debug); compiler output itself stays on stdout.
    if let Ok(filter) = EnvFilter::try_from_env("V_LOG") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .with_writer(std::io::stderr)
            .init();
        tracing::debug!("tracing initialized");
    }

    let cli = Cli::parse_from(args_with_vflags());

    if cli.repl {
        return tools::repl();
    }

    match &cli.command {
        Commands::Run { path, args } => run(&cli, path, args),
        Commands::Build { path } => build(&cli, path),
        Commands::BuildModule { path } => build_module(&cli, path),
        Commands::Test { path } => test(&cli, path),
        Commands::Fmt { .. } => tools::fmt(),
        Commands::Install { .. } => tools::install(),
        Commands::Up => tools::up(),
        Commands::Symlink => tools::symlink(),
        Commands::Version => print_version(),
        Commands::External(args) => handle_external(&cli, args),
    }
}

/// Prepend the whitespace-split contents of $VFLAGS to the arguments, so a
/// saved flag set applies to every invocation.
fn args_with_vflags() -> Vec<OsString> {
    let mut args: Vec<OsString> = std::env::args_os().collect();
    if let Ok(vflags) = std::env::var("VFLAGS") {
        let extra: Vec<OsString> = vflags.split_whitespace().map(OsString::from).collect();
        args.splice(1..1, extra);
    }
    args
}

/// A bare path argument is shorthand for `v build <path>`: `v hello.v`,
/// `v .`.
fn handle_external(cli: &Cli, args: &[OsString]) -> ExitCode {
    let Some(first) = args.first() else {
        eprintln!("error: expected a command or a .v file");
        return ExitCode::FAILURE;
    };
    let path = PathBuf::from(first);
    let looks_like_input =
        path.extension().is_some_and(|ext| ext == "v" || ext == "vh") || path.is_dir();
    if !looks_like_input {
        let name = first.to_string_lossy();
        eprintln!("error: unrecognized command '{name}'");
        eprintln!("tip: run 'v help' for available commands");
        return ExitCode::FAILURE;
    }
    build(cli, &path)
}
