// src/cli/args.rs

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::prefs::TargetOs;

/// V-style language compiler: emits C and links with the host toolchain
#[derive(Parser)]
#[command(name = "v")]
#[command(about = "V-style language compiler", long_about = None)]
pub struct Cli {
    /// Output name for the final artifact
    #[arg(short = 'o', long = "out", global = true, value_name = "NAME")]
    pub out: Option<String>,

    /// Target OS: mac, linux, windows, freebsd, openbsd, netbsd, dragonfly, msvc, js
    #[arg(long = "os", global = true, value_enum, value_name = "TARGET")]
    pub target_os: Option<TargetOs>,

    /// Optimized production build
    #[arg(long, global = true)]
    pub prod: bool,

    /// Debug build: keep the emitted C file, add debug info
    #[arg(long, global = true)]
    pub debug: bool,

    /// Generate debug info (shorthand for --debug)
    #[arg(short = 'g', global = true)]
    pub g: bool,

    /// Hot code reloading: watch the source and rebind [live] functions
    #[arg(long, global = true)]
    pub live: bool,

    /// Build a shared library instead of an executable
    #[arg(long, global = true)]
    pub shared: bool,

    /// Profile the produced binary (-pg)
    #[arg(long, global = true)]
    pub prof: bool,

    /// Obfuscate function names
    #[arg(long, global = true)]
    pub obf: bool,

    /// Print build progress
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Print the C compiler command line
    #[arg(long = "show-c-cmd", global = true)]
    pub show_c_cmd: bool,

    /// Free heap allocations automatically (experimental)
    #[arg(long, global = true)]
    pub autofree: bool,

    /// Compress the produced binary with upx
    #[arg(long, global = true)]
    pub compress: bool,

    /// Build with AddressSanitizer
    #[arg(long, global = true)]
    pub sanitize: bool,

    /// Extra flags passed to the C compiler verbatim
    #[arg(long, global = true, value_name = "FLAGS")]
    pub cflags: Option<String>,

    /// Allow top-level statements (script mode)
    #[arg(long, global = true)]
    pub script: bool,

    /// The input was machine-translated from C
    #[arg(long, global = true)]
    pub translated: bool,

    /// Skip the formatter step
    #[arg(long, global = true)]
    pub nofmt: bool,

    /// Start a REPL (not available in this build)
    #[arg(long, global = true)]
    pub repl: bool,

    /// C compiler to use (overrides $CC)
    #[arg(long = "cc", global = true, value_name = "COMPILER")]
    pub cc: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile and run a program, forwarding its exit status
    Run {
        /// A .v file or a directory of .v files
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Arguments passed to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
        args: Vec<String>,
    },
    /// Compile a program
    Build {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Compile a module directory into an object file
    #[command(name = "build-module")]
    BuildModule {
        #[arg(value_name = "DIR")]
        path: PathBuf,
    },
    /// Build and run tests (fn test_...)
    Test {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Format source files (advisory)
    Fmt {
        #[arg(value_name = "PATHS")]
        paths: Vec<PathBuf>,
    },
    /// Install modules (advisory)
    Install {
        #[arg(value_name = "MODULES")]
        modules: Vec<String>,
    },
    /// Update the compiler (advisory)
    Up,
    /// Symlink this executable into /usr/local/bin
    Symlink,
    /// Print the version
    Version,
    /// `v file.v` is shorthand for `v build file.v`
    #[command(external_subcommand)]
    External(Vec<OsString>),
}
