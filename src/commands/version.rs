// src/commands/version.rs

use std::process::ExitCode;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const GIT_SHA: &str = env!("VERGEN_GIT_SHA");
const GIT_DIRTY: &str = env!("VERGEN_GIT_DIRTY");
const BUILD_DATE: &str = env!("VERGEN_BUILD_DATE");

fn short_sha_with_dirty(sha: &str, dirty: &str) -> String {
    let short = if sha.len() >= 7 { &sha[..7] } else { sha };
    if dirty == "true" {
        format!("{short}+")
    } else {
        short.to_string()
    }
}

fn make_version_string() -> String {
    format!(
        "{} ({}, built {})",
        VERSION,
        short_sha_with_dirty(GIT_SHA, GIT_DIRTY),
        BUILD_DATE
    )
}

pub fn version_string() -> &'static str {
    use std::sync::OnceLock;
    static VERSION_STRING: OnceLock<String> = OnceLock::new();
    VERSION_STRING.get_or_init(make_version_string)
}

pub fn print_version() -> ExitCode {
    println!("v {}", version_string());
    ExitCode::SUCCESS
}
