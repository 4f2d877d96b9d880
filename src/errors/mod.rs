//! Error types and error handling for the compiler.
//!
//! This module defines the error types used throughout the compilation
//! process. It includes:
//!
//! - Error structures with source position information
//! - Specific error variants for every compilation phase
//! - A severity per variant deciding whether compilation keeps going
//! - The `Diagnostics` sink collecting user errors during resolution

pub mod diagnostics;
pub mod errors;

#[cfg(test)]
mod tests;
