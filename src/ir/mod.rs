//! The intermediate representation lowering produces.
//!
//! The instruction set is a small subset of LLVM IR with opaque pointers, so
//! a module prints as text `llc` understands and translates one to one into
//! inkwell calls when the `llvm` feature is enabled.
//!
//! - `ir` - module, function and instruction types
//! - `builder` - positioned instruction builder
//! - `display` - textual form
//! - `interpreter` - runs a module against the reference runtime

pub mod builder;
pub mod display;
pub mod interpreter;
pub mod ir;

#[cfg(test)]
mod tests;
