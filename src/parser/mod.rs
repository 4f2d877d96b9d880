//! Parser module for building an Abstract Syntax Tree (AST).
//!
//! This module contains the parser that transforms a stream of tokens
//! into the node arena of [`crate::ast::ast::Ast`]. It uses a Pratt parser
//! for expressions with proper operator precedence and handles:
//!
//! - Statement parsing (assignments, functions, classes, structs, control flow)
//! - Indented blocks and single-line suites
//! - Expression parsing (binary ops, calls, members, literals)
//! - Desugaring of augmented assignment
//!
//! The parser uses NUD (null denotation) and LED (left denotation) functions
//! for expression parsing with binding power for precedence handling.

pub mod expr;
pub mod lookups;
pub mod parser;
pub mod stmt;

#[cfg(test)]
mod tests;
