use std::collections::HashMap;

use crate::{
    ast::{
        ast::{BindingSite, NodeId},
        types::Type,
    },
    errors::errors::ErrorImpl,
};

use super::signature::FunctionSignature;

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalEntry {
    /// Line of the statement that created or last retyped the global.
    pub line: u32,
    pub ty: Type,
}

/// Outcome of a non-forced declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Declared {
    Created(BindingSite),
    /// The name was already bound in the target scope, with this type.
    Exists(BindingSite, Type),
}

/// Program-wide tables outside any scope.
///
/// Passed explicitly through resolution and lowering; nothing here is ambient
/// state, so every test can build its own.
#[derive(Debug, Default)]
pub struct Environment {
    globals: HashMap<String, GlobalEntry>,
    global_order: Vec<String>,
    signatures: HashMap<String, FunctionSignature>,
    signature_order: Vec<String>,
    functions: HashMap<String, NodeId>,
    structs: HashMap<String, NodeId>,
    classes: HashMap<String, NodeId>,
    statements: Vec<NodeId>,
}

impl Environment {
    pub fn new(statements: Vec<NodeId>) -> Self {
        Environment {
            statements,
            ..Environment::default()
        }
    }

    /// Top-level statements in source order.
    pub fn statements(&self) -> &[NodeId] {
        &self.statements
    }

    pub fn global(&self, name: &str) -> Option<&GlobalEntry> {
        self.globals.get(name)
    }

    /// Globals in creation order.
    pub fn globals(&self) -> impl Iterator<Item = (&str, &GlobalEntry)> {
        self.global_order
            .iter()
            .filter_map(|name| self.globals.get(name).map(|entry| (name.as_str(), entry)))
    }

    pub fn declare_global(&mut self, name: &str, ty: Type, line: u32) -> Declared {
        let site = BindingSite::Global(name.to_string());

        match self.globals.get(name) {
            Some(entry) => Declared::Exists(site, entry.ty.clone()),
            None => {
                tracing::trace!(global = name, ty = %ty, line, "global created");
                self.global_order.push(name.to_string());
                self.globals.insert(name.to_string(), GlobalEntry { line, ty });
                Declared::Created(site)
            }
        }
    }

    /// Assigns `ty` to an existing global from a statement at `line`.
    ///
    /// From a line at or before the one that fixed the global the type may not
    /// change at all. From a later line the usual binding widening applies.
    pub fn rebind_global(&mut self, name: &str, ty: &Type, line: u32) -> Result<Type, ErrorImpl> {
        let Some(entry) = self.globals.get_mut(name) else {
            return Err(ErrorImpl::VariableNotDeclared {
                variable: name.to_string(),
            });
        };

        if line <= entry.line {
            return match entry.ty.unify(ty) {
                Some(unified) => {
                    entry.ty = unified.clone();
                    Ok(unified)
                }
                None => Err(ErrorImpl::GlobalRedeclared {
                    variable: name.to_string(),
                    line: entry.line,
                    existing: entry.ty.to_string(),
                    received: ty.to_string(),
                }),
            };
        }

        match entry.ty.widen_binding(ty) {
            Some(widened) => {
                if widened != entry.ty {
                    entry.line = line;
                }
                entry.ty = widened.clone();
                Ok(widened)
            }
            None => Err(ErrorImpl::ReassignmentTypeError {
                variable: name.to_string(),
                expected: entry.ty.to_string(),
                received: ty.to_string(),
            }),
        }
    }

    /// Overwrites a global's type after container refinement.
    pub fn refine_global(&mut self, name: &str, ty: Type) {
        if let Some(entry) = self.globals.get_mut(name) {
            entry.ty = ty;
        }
    }

    pub fn add_signature(&mut self, key: &str, signature: FunctionSignature) -> Result<(), ErrorImpl> {
        if self.signatures.contains_key(key) {
            return Err(ErrorImpl::FunctionAlreadyDeclared {
                function: key.to_string(),
            });
        }

        self.signature_order.push(key.to_string());
        self.signatures.insert(key.to_string(), signature);
        Ok(())
    }

    pub fn signature(&self, key: &str) -> Option<&FunctionSignature> {
        self.signatures.get(key)
    }

    pub fn signature_mut(&mut self, key: &str) -> Option<&mut FunctionSignature> {
        self.signatures.get_mut(key)
    }

    /// Signatures in definition order.
    pub fn signatures(&self) -> impl Iterator<Item = (&str, &FunctionSignature)> {
        self.signature_order
            .iter()
            .filter_map(|key| self.signatures.get(key).map(|sig| (key.as_str(), sig)))
    }

    pub fn remove_signature(&mut self, key: &str) -> Option<FunctionSignature> {
        self.signature_order.retain(|existing| existing != key);
        self.functions.retain(|name, _| name != key);
        self.signatures.remove(key)
    }

    fn check_free_name(&self, name: &str) -> Result<(), ErrorImpl> {
        if self.functions.contains_key(name) {
            return Err(ErrorImpl::FunctionAlreadyDeclared {
                function: name.to_string(),
            });
        }

        if self.structs.contains_key(name) || self.classes.contains_key(name) {
            return Err(ErrorImpl::TypeAlreadyDeclared {
                type_: name.to_string(),
            });
        }

        Ok(())
    }

    /// Functions, structs and classes share one top-level namespace.
    pub fn register_function(&mut self, name: &str, node: NodeId) -> Result<(), ErrorImpl> {
        self.check_free_name(name)?;
        self.functions.insert(name.to_string(), node);
        Ok(())
    }

    pub fn register_struct(&mut self, name: &str, node: NodeId) -> Result<(), ErrorImpl> {
        self.check_free_name(name)?;
        self.structs.insert(name.to_string(), node);
        Ok(())
    }

    pub fn register_class(&mut self, name: &str, node: NodeId) -> Result<(), ErrorImpl> {
        self.check_free_name(name)?;
        self.classes.insert(name.to_string(), node);
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<NodeId> {
        self.functions.get(name).copied()
    }

    pub fn struct_def(&self, name: &str) -> Option<NodeId> {
        self.structs.get(name).copied()
    }

    pub fn class_def(&self, name: &str) -> Option<NodeId> {
        self.classes.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::{Declared, Environment};
    use crate::{ast::types::Type, errors::errors::ErrorImpl};

    #[test]
    fn test_global_retype_at_earlier_line_is_rejected() {
        let mut env = Environment::new(vec![]);
        env.declare_global("x", Type::Int, 5);

        let error = env.rebind_global("x", &Type::Text, 3).unwrap_err();
        assert!(matches!(error, ErrorImpl::GlobalRedeclared { line: 5, .. }));
        assert_eq!(env.rebind_global("x", &Type::Int, 5), Ok(Type::Int));
    }

    #[test]
    fn test_global_widens_from_later_line() {
        let mut env = Environment::new(vec![]);
        env.declare_global("x", Type::Int, 1);

        assert_eq!(env.rebind_global("x", &Type::Float, 2), Ok(Type::Float));
        assert_eq!(env.global("x").map(|e| e.line), Some(2));
        assert!(env.rebind_global("x", &Type::Int, 3).is_err());
    }

    #[test]
    fn test_second_declaration_reports_existing() {
        let mut env = Environment::new(vec![]);

        assert!(matches!(env.declare_global("x", Type::Bool, 1), Declared::Created(_)));
        assert!(matches!(
            env.declare_global("x", Type::Int, 2),
            Declared::Exists(_, Type::Bool)
        ));
    }
}
