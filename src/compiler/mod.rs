//! Lowering of the typed AST into IR.
//!
//! This module turns a resolved, pruned program into an `ir::Module`. It
//! handles:
//!
//! - Storage of globals and function locals
//! - Implicit Int to Float conversions at every store and use
//! - Retain/release bookkeeping of heap values
//! - Control flow, runtime calls and bounds checks

pub mod compiler;
pub mod expr;
pub mod refcount;
pub mod stmt;

#[cfg(test)]
mod tests;
