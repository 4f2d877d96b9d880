//! Passes run once resolution has succeeded, before lowering.

use crate::{
    ast::ast::Ast,
    errors::errors::{Error, ErrorImpl},
    internal_error,
};

use super::environment::Environment;

/// Removes every function no walked call reached, returning their keys.
///
/// Bodies of these functions were never typed, so they cannot be lowered.
pub fn prune_dead_functions(ast: &mut Ast, env: &mut Environment) -> Vec<String> {
    let dead: Vec<_> = env
        .signatures()
        .filter(|(_, signature)| signature.call_count == 0)
        .map(|(key, signature)| (key.to_string(), signature.node))
        .collect();

    for (key, node) in &dead {
        if let Some(scope) = ast
            .enclosing_scope_above(*node)
            .and_then(|scope_id| ast.scope_mut(scope_id))
        {
            scope.definitions.retain(|_, def| def != node);
        }

        if let Some(parent) = ast.parent(*node) {
            ast.detach(parent, *node);
        }

        env.remove_signature(key);
        tracing::debug!(function = %key, "pruned dead function");
    }

    dead.into_iter().map(|(key, _)| key).collect()
}

/// Fails on the first reachable expression left without a type.
pub fn check_resolved(ast: &Ast) -> Result<(), Error> {
    let mut stack = vec![ast.root()];

    while let Some(id) = stack.pop() {
        let node = &ast[id];

        if node.kind.is_expression() && !node.ty.is_resolved() {
            return Err(internal_error!(
                ErrorImpl::UnresolvedType {
                    context: format!("expression on line {}", node.line())
                },
                node.span.start.clone()
            ));
        }

        stack.extend(node.kind.children());
    }

    Ok(())
}
