//! LLVM backend.
//!
//! Translates a finished IR module into an LLVM module through `inkwell`.
//! Runtime functions stay external and are resolved when the object is
//! linked against a native runtime.

pub mod llvm;
