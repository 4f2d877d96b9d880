/// AST (Abstract Syntax Tree) module
/// Contains all definitions related to the AST structure
///
/// Submodules:
/// - ast: The node arena, node kinds, scopes and binding sites
/// - expressions: Operators and builtin names used by expression nodes
/// - statements: Payloads of compound statement nodes
/// - types: The type lattice assigned by the resolver
pub mod ast;
pub mod expressions;
pub mod statements;
pub mod types;
