//! Name resolution over the parent-linked scope tree.
//!
//! Only function, class and struct definitions own a [`Scope`]; every other
//! node delegates upward through its parent links. Class and struct scopes
//! hold fields and are never consulted when resolving a bare name.

use crate::{
    ast::{
        ast::{Ast, BindingSite, NodeId, NodeKind},
        types::Type,
    },
    errors::errors::{Error, ErrorImpl},
    internal_error,
};

use super::environment::{Declared, Environment};

/// Something a bare name can call or construct.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    /// A function, by signature key.
    Function(String),
    Class(String),
    Struct(String),
}

impl Definition {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Definition::Function(_) => "function",
            Definition::Class(_) => "class",
            Definition::Struct(_) => "struct",
        }
    }
}

fn is_function(ast: &Ast, id: NodeId) -> bool {
    matches!(ast[id].kind, NodeKind::FunctionDef(_))
}

/// Whether `name` was redeclared global by any scope at or above `at`.
pub fn is_global_override(ast: &Ast, at: NodeId, name: &str) -> bool {
    let mut current = ast.enclosing_scope(at);

    while let Some(scope_id) = current {
        if ast
            .scope(scope_id)
            .is_some_and(|scope| scope.globals.contains(name))
        {
            return true;
        }
        current = ast.enclosing_scope_above(scope_id);
    }

    false
}

/// Binds `name` in the nearest scope of `at`, or in the global table at the
/// top level and for names redeclared global.
///
/// `force` is for bindings that must be fresh; a collision then is an
/// internal error.
pub fn declare(
    ast: &mut Ast,
    env: &mut Environment,
    at: NodeId,
    name: &str,
    ty: Type,
    force: bool,
) -> Result<Declared, Error> {
    let line = ast[at].line();
    let position = ast[at].span.start.clone();
    let collision = || {
        internal_error!(
            ErrorImpl::DuplicateDeclaration {
                variable: name.to_string()
            },
            position.clone()
        )
    };

    let scope_id = match ast.enclosing_scope(at) {
        Some(scope_id) if !is_global_override(ast, at, name) => scope_id,
        _ => {
            let declared = env.declare_global(name, ty, line);
            if force && matches!(declared, Declared::Exists(..)) {
                return Err(collision());
            }
            return Ok(declared);
        }
    };

    let site = BindingSite::Local {
        scope: scope_id,
        name: name.to_string(),
    };
    let Some(scope) = ast.scope_mut(scope_id) else {
        return Err(collision());
    };

    if let Some(existing) = scope.locals.get(name) {
        if force {
            return Err(collision());
        }
        return Ok(Declared::Exists(site, existing.ty.clone()));
    }

    tracing::trace!(variable = name, ty = %ty, line, "local created");
    scope.insert_local(name, ty, line);
    Ok(Declared::Created(site))
}

/// Resolves a bare variable name seen at `at`.
///
/// Only the innermost function scope is searched for locals. Finding the
/// name in an outer function instead is a capture, which the language does
/// not have.
pub fn resolve(
    ast: &Ast,
    env: &Environment,
    at: NodeId,
    name: &str,
) -> Result<Option<(BindingSite, Type)>, Error> {
    let global = || {
        env.global(name)
            .map(|entry| (BindingSite::Global(name.to_string()), entry.ty.clone()))
    };

    if is_global_override(ast, at, name) {
        return Ok(global());
    }

    let Some(innermost) = ast.enclosing_scope(at) else {
        return Ok(global());
    };

    if is_function(ast, innermost) {
        if let Some(entry) = ast.scope(innermost).and_then(|s| s.locals.get(name)) {
            let site = BindingSite::Local {
                scope: innermost,
                name: name.to_string(),
            };
            return Ok(Some((site, entry.ty.clone())));
        }
    }

    let mut current = ast.enclosing_scope_above(innermost);
    while let Some(outer) = current {
        let holds_name = ast
            .scope(outer)
            .is_some_and(|scope| scope.locals.contains_key(name));

        if is_function(ast, outer) && holds_name {
            return Err(Error::new(
                ErrorImpl::UnsupportedCapture {
                    variable: name.to_string(),
                },
                ast[at].span.start.clone(),
            ));
        }
        current = ast.enclosing_scope_above(outer);
    }

    Ok(global())
}

/// Dotted path of the function and class names enclosing a definition,
/// e.g. `outer.inner` or `Counter.bump`.
pub fn signature_key(ast: &Ast, def: NodeId) -> String {
    let mut names = vec![];
    let mut current = Some(def);

    while let Some(id) = current {
        match &ast[id].kind {
            NodeKind::FunctionDef(function) => names.push(function.name.as_str()),
            NodeKind::ClassDef(class) => names.push(class.name.as_str()),
            _ => {}
        }
        current = ast[id].parent;
    }

    names.reverse();
    names.join(".")
}

/// Resolves a name used as a callee or struct literal.
pub fn resolve_definition(
    ast: &Ast,
    env: &Environment,
    at: NodeId,
    name: &str,
) -> Option<Definition> {
    let mut current = ast.enclosing_scope(at);

    while let Some(scope_id) = current {
        if is_function(ast, scope_id) {
            if let Some(def) = ast.scope(scope_id).and_then(|s| s.definitions.get(name)) {
                return Some(Definition::Function(signature_key(ast, *def)));
            }
        }
        current = ast.enclosing_scope_above(scope_id);
    }

    if env.function(name).is_some() {
        Some(Definition::Function(name.to_string()))
    } else if env.class_def(name).is_some() {
        Some(Definition::Class(name.to_string()))
    } else if env.struct_def(name).is_some() {
        Some(Definition::Struct(name.to_string()))
    } else {
        None
    }
}

/// Adds `name` to the global-override set of the nearest scope of `at`.
pub fn mark_global(ast: &mut Ast, at: NodeId, name: &str) -> Result<(), Error> {
    let position = ast[at].span.start.clone();
    let scope = ast
        .enclosing_scope(at)
        .and_then(|scope_id| ast.scope_mut(scope_id));

    match scope {
        Some(scope) => {
            scope.globals.insert(name.to_string());
            Ok(())
        }
        None => Err(internal_error!(
            ErrorImpl::NoEnclosingScope {
                variable: name.to_string()
            },
            position
        )),
    }
}

/// Number of scope-forming nodes at or above `at`.
pub fn scope_depth(ast: &Ast, at: NodeId) -> usize {
    let mut depth = 0;
    let mut current = ast.enclosing_scope(at);

    while let Some(scope_id) = current {
        depth += 1;
        current = ast.enclosing_scope_above(scope_id);
    }

    depth
}

/// Source lines of the scopes at or above `at`, outermost first, e.g. `3.12`.
/// Only used to name storage.
pub fn scope_path(ast: &Ast, at: NodeId) -> String {
    let mut lines = vec![];
    let mut current = ast.enclosing_scope(at);

    while let Some(scope_id) = current {
        lines.push(ast[scope_id].line().to_string());
        current = ast.enclosing_scope_above(scope_id);
    }

    lines.reverse();
    lines.join(".")
}

/// Current type of a binding.
pub fn binding_type(ast: &Ast, env: &Environment, site: &BindingSite) -> Option<Type> {
    match site {
        BindingSite::Global(name) => env.global(name).map(|entry| entry.ty.clone()),
        BindingSite::Local { scope, name } => ast
            .scope(*scope)
            .and_then(|s| s.locals.get(name))
            .map(|entry| entry.ty.clone()),
    }
}

/// Replaces the type of a binding after widening or container refinement.
pub fn set_binding_type(ast: &mut Ast, env: &mut Environment, site: &BindingSite, ty: Type) {
    match site {
        BindingSite::Global(name) => env.refine_global(name, ty),
        BindingSite::Local { scope, name } => {
            if let Some(entry) = ast.scope_mut(*scope).and_then(|s| s.locals.get_mut(name)) {
                entry.ty = ty;
            }
        }
    }
}
