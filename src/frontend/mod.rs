// src/frontend/mod.rs
//! The front end: a lexer and a per-pass parser for `.v` sources.
//!
//! Parsing is single-pass per mode. The imports pass reads only the file
//! header (plus `#` directives); the decl pass fills the symbol table; the
//! main pass emits C straight into the sink. No AST is retained.

pub mod lexer;
pub mod parser;

pub use lexer::{Tok, Token, lex};
pub use parser::Parser;

/// The three traversals the driver schedules over every file, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
    /// Populate per-file import tables; no table symbols, no output.
    Imports,
    /// Collect top-level declarations without bodies.
    Decl,
    /// Emit code for function bodies and top-level statements.
    Main,
}
