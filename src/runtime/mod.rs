//! The runtime the generated code links against.
//!
//! - `abi` - names and signatures of the imported functions
//! - `heap` - reference counted blocks backing the reference implementation

pub mod abi;
pub mod heap;

#[cfg(test)]
mod tests;
