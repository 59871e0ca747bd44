//! Crate root: wires together the compilation pipeline.
//!
//! The stages are small and composable:
//! - `lexer` turns source text into a flat token stream.
//! - `parser` owns all syntactic knowledge and builds the AST.
//! - `codegen` lowers the AST into x86-64 AT&T assembly text.
//! - `error` aggregates the per-stage error types.
//!
//! Compilation is pure: source string in, assembly string (or the first
//! error) out. Nothing is shared between invocations.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod token;

pub use error::CompileError;

/// Compile a C source string into x86-64 AT&T assembly.
pub fn compile(source: &str) -> Result<String, CompileError> {
    let mut lexer = lexer::Lexer::new(source);
    let tokens = lexer.tokenize()?;
    let mut parser = parser::Parser::new(tokens);
    let unit = parser.parse()?;
    let mut codegen = codegen::CodeGen::new();
    Ok(codegen.generate(&unit)?)
}
