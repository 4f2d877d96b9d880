//! Lexical analysis module for the compiler.
//!
//! This module contains the lexer (tokenizer) that converts source code
//! into a stream of tokens for parsing. It handles:
//!
//! - Tokenization of source code using regex patterns
//! - Recognition of keywords, identifiers, literals, and operators
//! - Indentation tracking, producing `Indent`/`Dedent` tokens
//! - Token position tracking (offset and line) for error reporting

pub mod lexer;
pub mod tokens;

#[cfg(test)]
mod tests;
