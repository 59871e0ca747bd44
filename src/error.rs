//! Aggregate error type for the compilation pipeline.
//!
//! Each stage owns its error; this enum lets the pipeline compose with `?`
//! and gives the driver a single type to report. The first error aborts
//! compilation, so an error value always describes exactly one failure.

use thiserror::Error;

use crate::codegen::CodegenError;
use crate::lexer::LexError;
use crate::parser::ParseError;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
}
