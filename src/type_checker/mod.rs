//! Name resolution and lazy type inference.
//!
//! Functions carry no annotations. A definition registers a pending
//! signature; the first call that reaches it fixes the parameter types from
//! the arguments and walks the body once. Later calls only validate.
//!
//! After a successful walk the functions no call reached are pruned and
//! every remaining expression is checked to carry a concrete type.

pub mod environment;
pub mod expr;
pub mod finalize;
pub mod scope;
pub mod signature;
pub mod type_checker;

#[cfg(test)]
mod tests;
