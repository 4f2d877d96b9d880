use std::collections::{HashMap, HashSet};

use crate::{
    ast::{
        ast::{Ast, BindingSite, NodeId, NodeKind},
        statements::FunctionDef,
        types::Type,
    },
    errors::{
        diagnostics::Diagnostics,
        errors::{Error, ErrorImpl},
    },
    internal_error,
};

use super::{
    environment::{Declared, Environment},
    expr::{check_index, lookup_field, refine_binding, type_check_expr},
    finalize::{check_resolved, prune_dead_functions},
    scope::{self, signature_key},
    signature::{FunctionSignature, Resolution},
};

/// Bookkeeping for the body walk of one function.
#[derive(Debug)]
pub struct FunctionContext {
    pub key: String,
    /// Every `return` reached during the walk, with the type it produced.
    pub returns: Vec<(NodeId, Type)>,
    /// Recursive calls answered from the in-progress return type.
    pub recursive_calls: Vec<(NodeId, Type)>,
}

/// Widenings found too late in one walk, carried into the next.
#[derive(Debug, Clone, Default)]
pub struct Widenings {
    /// Int bindings that became Float, with the line of the widening store.
    pub sites: HashMap<BindingSite, u32>,
    /// Signatures whose return became Float after a recursive call saw Int.
    pub returns: HashSet<String>,
}

impl Widenings {
    pub fn len(&self) -> usize {
        self.sites.len() + self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct TypeChecker {
    pub ast: Ast,
    pub env: Environment,
    pub diagnostics: Diagnostics,
    pub function_stack: Vec<FunctionContext>,
    pub widenings: Widenings,
}

/// A program whose every live expression carries a concrete type.
#[derive(Debug)]
pub struct TypedProgram {
    pub ast: Ast,
    pub env: Environment,
    /// Signature keys of the functions removed as never called.
    pub pruned: Vec<String>,
}

impl TypeChecker {
    pub fn new(ast: Ast, widenings: Widenings) -> Self {
        let env = Environment::new(ast.module_body().to_vec());

        TypeChecker {
            ast,
            env,
            diagnostics: Diagnostics::new(),
            function_stack: vec![],
            widenings,
        }
    }

    /// The type a store of `ty` from `line` gives the binding at `site`.
    ///
    /// An Int stored before the line that widens the binding is already a
    /// Float store.
    pub fn stored_type(&self, site: &BindingSite, ty: &Type, line: u32) -> Type {
        match self.widenings.sites.get(site) {
            Some(widened_at) if *ty == Type::Int && line < *widened_at => Type::Float,
            _ => ty.clone(),
        }
    }

    fn record_widening(&mut self, site: &BindingSite, line: u32) {
        if !self.widenings.sites.contains_key(site) {
            tracing::debug!(variable = site.name(), line, "binding widened to Float");
            self.widenings.sites.insert(site.clone(), line);
        }
    }

    pub fn error(&self, kind: ErrorImpl, at: NodeId) -> Error {
        Error::new(kind, self.ast[at].span.start.clone())
    }

    pub fn set_type(&mut self, id: NodeId, ty: Type) -> Type {
        self.ast[id].ty = ty.clone();
        ty
    }

    pub fn current_function(&self) -> Option<&FunctionContext> {
        self.function_stack.last()
    }

    /// Rejects types that cannot be stored, passed or printed.
    pub fn expect_value(&self, ty: &Type, at: NodeId) -> Result<(), Error> {
        if ty.is_value() {
            return Ok(());
        }

        let kind = match ty {
            Type::Function(key) => ErrorImpl::NotAValue {
                name: key.clone(),
                kind: String::from("function"),
            },
            Type::Class(name) => ErrorImpl::NotAValue {
                name: name.clone(),
                kind: String::from("class"),
            },
            _ => ErrorImpl::TypeMatchError {
                expected: String::from("a value"),
                received: ty.to_string(),
            },
        };
        Err(self.error(kind, at))
    }
}

/// Resolves names and infers types for a whole program.
///
/// User errors are accumulated statement by statement and returned together.
/// An internal error ends resolution at once and is returned alone.
///
/// A binding widened to Float changes the type of reads already checked as
/// Int, so a walk that widens something new is thrown away and the program
/// is walked again with the widening known from the start. Widenings only
/// accumulate, which bounds the number of walks.
#[tracing::instrument(level = "debug", skip_all)]
pub fn type_check(ast: Ast) -> Result<TypedProgram, Vec<Error>> {
    let mut widenings = Widenings::default();

    loop {
        let mut type_checker = TypeChecker::new(ast.clone(), widenings.clone());
        let body = type_checker.env.statements().to_vec();

        if let Err(error) = type_check_block(&mut type_checker, &body) {
            return Err(vec![error]);
        }

        if type_checker.widenings.len() > widenings.len() {
            widenings = type_checker.widenings;
            tracing::debug!(
                bindings = widenings.sites.len(),
                returns = widenings.returns.len(),
                "walking again with widened types"
            );
            continue;
        }

        if type_checker.diagnostics.has_errors() {
            tracing::debug!(errors = type_checker.diagnostics.len(), "resolution failed");
            return Err(type_checker.diagnostics.into_errors());
        }

        let TypeChecker {
            ast: mut resolved,
            mut env,
            ..
        } = type_checker;
        let pruned = prune_dead_functions(&mut resolved, &mut env);
        check_resolved(&resolved).map_err(|error| vec![error])?;

        return Ok(TypedProgram {
            ast: resolved,
            env,
            pruned,
        });
    }
}

/// Checks each statement, reporting user errors and moving on to the next one.
pub fn type_check_block(type_checker: &mut TypeChecker, body: &[NodeId]) -> Result<(), Error> {
    for stmt in body {
        if let Err(error) = type_check_stmt(type_checker, *stmt) {
            if error.is_internal() {
                return Err(error);
            }
            type_checker.diagnostics.report(error);
        }
    }

    Ok(())
}

pub fn type_check_stmt(type_checker: &mut TypeChecker, id: NodeId) -> Result<(), Error> {
    match type_checker.ast[id].kind.clone() {
        NodeKind::ExprStmt { expr } => {
            let ty = type_check_expr(type_checker, expr)?;
            if ty != Type::Void {
                type_checker.expect_value(&ty, expr)?;
            }
            Ok(())
        }
        NodeKind::Assign { target, value } => type_check_assign(type_checker, id, target, value),
        NodeKind::If {
            branches,
            else_body,
        } => {
            for branch in &branches {
                check_condition(type_checker, branch.condition)?;
                type_check_block(type_checker, &branch.body)?;
            }
            type_check_block(type_checker, &else_body)
        }
        NodeKind::While { condition, body } => {
            check_condition(type_checker, condition)?;
            type_check_block(type_checker, &body)
        }
        NodeKind::For {
            variable,
            end,
            body,
        } => {
            let end_ty = type_check_expr(type_checker, end)?;
            if end_ty != Type::Int {
                return Err(type_checker.error(
                    ErrorImpl::TypeMatchError {
                        expected: Type::Int.to_string(),
                        received: end_ty.to_string(),
                    },
                    end,
                ));
            }

            declare_loop_variable(type_checker, id, &variable)?;
            type_check_block(type_checker, &body)
        }
        NodeKind::Return { value } => type_check_return(type_checker, id, value),
        NodeKind::Global { names } => {
            for name in &names {
                scope::mark_global(&mut type_checker.ast, id, name)?;
            }
            Ok(())
        }
        NodeKind::Print { args } => {
            for arg in args {
                let ty = type_check_expr(type_checker, arg)?;
                type_checker.expect_value(&ty, arg)?;
            }
            Ok(())
        }
        NodeKind::Pass => Ok(()),
        NodeKind::FunctionDef(def) => define_function(type_checker, id, &def),
        NodeKind::ClassDef(class) => {
            type_checker
                .env
                .register_class(&class.name, id)
                .map_err(|kind| type_checker.error(kind, id))?;
            type_check_block(type_checker, &class.body)
        }
        NodeKind::StructDef(def) => {
            type_checker
                .env
                .register_struct(&def.name, id)
                .map_err(|kind| type_checker.error(kind, id))?;
            type_check_block(type_checker, &def.fields)
        }
        _ => Err(internal_error!(
            ErrorImpl::InternalInvariant {
                message: String::from("expression in statement position")
            },
            type_checker.ast[id].span.start.clone()
        )),
    }
}

/// A user error in a condition is reported without skipping the body, whose
/// assignments may widen what the condition reads.
fn check_condition(type_checker: &mut TypeChecker, condition: NodeId) -> Result<(), Error> {
    match expect_condition(type_checker, condition) {
        Err(error) if !error.is_internal() => {
            type_checker.diagnostics.report(error);
            Ok(())
        }
        checked => checked,
    }
}

fn expect_condition(type_checker: &mut TypeChecker, condition: NodeId) -> Result<(), Error> {
    let ty = type_check_expr(type_checker, condition)?;

    if ty != Type::Bool {
        return Err(type_checker.error(
            ErrorImpl::ConditionNotBool {
                received: ty.to_string(),
            },
            condition,
        ));
    }

    Ok(())
}

fn declare_loop_variable(
    type_checker: &mut TypeChecker,
    id: NodeId,
    variable: &str,
) -> Result<(), Error> {
    let declared = scope::declare(
        &mut type_checker.ast,
        &mut type_checker.env,
        id,
        variable,
        Type::Int,
        false,
    )?;

    let line = type_checker.ast[id].line();
    let site = match declared {
        Declared::Created(site) => {
            type_checker.ast[id].need_create = true;
            let ty = type_checker.stored_type(&site, &Type::Int, line);
            if ty != Type::Int {
                scope::set_binding_type(&mut type_checker.ast, &mut type_checker.env, &site, ty);
            }
            site
        }
        Declared::Exists(site, Type::Int) => site,
        Declared::Exists(site, existing)
            if existing == type_checker.stored_type(&site, &Type::Int, line) =>
        {
            site
        }
        Declared::Exists(_, existing) => {
            return Err(type_checker.error(
                ErrorImpl::ReassignmentTypeError {
                    variable: variable.to_string(),
                    expected: existing.to_string(),
                    received: Type::Int.to_string(),
                },
                id,
            ))
        }
    };

    type_checker.ast[id].binding = Some(site);
    Ok(())
}

fn type_check_assign(
    type_checker: &mut TypeChecker,
    id: NodeId,
    target: NodeId,
    value: NodeId,
) -> Result<(), Error> {
    let value_ty = type_check_expr(type_checker, value)?;
    type_checker.expect_value(&value_ty, value)?;

    match type_checker.ast[target].kind.clone() {
        NodeKind::Variable { name } => {
            let line = type_checker.ast[id].line();
            let declared = scope::declare(
                &mut type_checker.ast,
                &mut type_checker.env,
                id,
                &name,
                value_ty.clone(),
                false,
            )?;

            let (site, bound) = match declared {
                Declared::Created(site) => {
                    type_checker.ast[id].need_create = true;
                    let bound = type_checker.stored_type(&site, &value_ty, line);
                    if bound != value_ty {
                        scope::set_binding_type(
                            &mut type_checker.ast,
                            &mut type_checker.env,
                            &site,
                            bound.clone(),
                        );
                    }
                    (site, bound)
                }
                Declared::Exists(site, existing) => {
                    let incoming = type_checker.stored_type(&site, &value_ty, line);
                    let bound = match &site {
                        BindingSite::Global(_) => type_checker
                            .env
                            .rebind_global(&name, &incoming, line)
                            .map_err(|kind| type_checker.error(kind, id))?,
                        BindingSite::Local { .. } => {
                            let Some(widened) = existing.widen_binding(&incoming) else {
                                return Err(type_checker.error(
                                    ErrorImpl::ReassignmentTypeError {
                                        variable: name.clone(),
                                        expected: existing.to_string(),
                                        received: value_ty.to_string(),
                                    },
                                    id,
                                ));
                            };
                            scope::set_binding_type(
                                &mut type_checker.ast,
                                &mut type_checker.env,
                                &site,
                                widened.clone(),
                            );
                            widened
                        }
                    };
                    if existing == Type::Int && bound == Type::Float {
                        type_checker.record_widening(&site, line);
                    }
                    (site, bound)
                }
            };

            type_checker.ast[target].binding = Some(site.clone());
            type_checker.ast[id].binding = Some(site);
            type_checker.set_type(target, bound);
            Ok(())
        }
        NodeKind::Field { object, field } => {
            let object_ty = type_check_expr(type_checker, object)?;

            let field_ty = match lookup_field(type_checker, &object_ty, &field) {
                Some((_, field_ty)) => field_ty,
                None if introduces_field(type_checker, object, &object_ty) => {
                    add_instance_field(type_checker, id, &object_ty, &field, &value_ty)?;
                    value_ty.clone()
                }
                None => {
                    return Err(type_checker.error(
                        ErrorImpl::UnknownField {
                            type_: object_ty.to_string(),
                            field,
                        },
                        target,
                    ))
                }
            };

            if !field_ty.accepts(&value_ty) {
                return Err(type_checker.error(
                    ErrorImpl::FieldTypeMatchError {
                        expected: field_ty.to_string(),
                        received: value_ty.to_string(),
                    },
                    value,
                ));
            }

            let stored = refined(&field_ty, &value_ty);
            if stored != field_ty {
                type_checker.set_type(target, stored);
                refine_binding(type_checker, target);
            } else {
                type_checker.set_type(target, field_ty);
            }
            Ok(())
        }
        NodeKind::Index { object, index } => {
            let object_ty = type_check_expr(type_checker, object)?;
            let index_ty = type_check_expr(type_checker, index)?;
            let element = check_index(type_checker, &object_ty, &index_ty, object, index)?;

            if !element.accepts(&value_ty) {
                return Err(type_checker.error(
                    ErrorImpl::TypeMatchError {
                        expected: element.to_string(),
                        received: value_ty.to_string(),
                    },
                    value,
                ));
            }

            let stored = refined(&element, &value_ty);
            if stored != element {
                let container = match &object_ty {
                    Type::Dict(_) => Type::dict_of(stored.clone()),
                    _ => Type::list_of(stored.clone()),
                };
                type_checker.set_type(object, container);
                refine_binding(type_checker, object);
            }
            type_checker.set_type(target, stored);
            Ok(())
        }
        _ => Err(internal_error!(
            ErrorImpl::InternalInvariant {
                message: String::from("assignment target is not a name, field or index")
            },
            type_checker.ast[target].span.start.clone()
        )),
    }
}

/// Slot type after storing `value` into a slot of type `slot`: container
/// elements left unresolved are filled in, everything else stays.
fn refined(slot: &Type, value: &Type) -> Type {
    if slot.is_fully_resolved() {
        return slot.clone();
    }

    slot.unify(value).unwrap_or_else(|| slot.clone())
}

/// `self.x = ...` inside `__init__` may introduce a field that has no default.
fn introduces_field(type_checker: &TypeChecker, object: NodeId, object_ty: &Type) -> bool {
    let Type::Instance(class) = object_ty else {
        return false;
    };
    let Some(context) = type_checker.current_function() else {
        return false;
    };
    if context.key != format!("{}.__init__", class) {
        return false;
    }

    let receiver = type_checker
        .env
        .signature(&context.key)
        .and_then(|sig| sig.params.first());

    match (&type_checker.ast[object].kind, receiver) {
        (NodeKind::Variable { name }, Some(receiver)) => name == receiver,
        _ => false,
    }
}

fn add_instance_field(
    type_checker: &mut TypeChecker,
    at: NodeId,
    object_ty: &Type,
    field: &str,
    ty: &Type,
) -> Result<(), Error> {
    let line = type_checker.ast[at].line();
    let class = match object_ty {
        Type::Instance(class) => type_checker.env.class_def(class),
        _ => None,
    };

    match class.and_then(|class| type_checker.ast.scope_mut(class)) {
        Some(scope) => {
            tracing::trace!(field, ty = %ty, "instance field introduced by __init__");
            scope.insert_local(field, ty.clone(), line);
            Ok(())
        }
        None => Err(internal_error!(
            ErrorImpl::InternalInvariant {
                message: format!("no class scope for {}", object_ty)
            },
            type_checker.ast[at].span.start.clone()
        )),
    }
}

fn type_check_return(
    type_checker: &mut TypeChecker,
    id: NodeId,
    value: Option<NodeId>,
) -> Result<(), Error> {
    let ty = match value {
        Some(value) => {
            let ty = type_check_expr(type_checker, value)?;
            type_checker.expect_value(&ty, value)?;
            ty
        }
        None => Type::Void,
    };

    let position = type_checker.ast[id].span.start.clone();
    let Some(context) = type_checker.function_stack.last_mut() else {
        return Err(internal_error!(
            ErrorImpl::InternalInvariant {
                message: String::from("return reached outside a function body walk")
            },
            position
        ));
    };

    context.returns.push((id, ty.clone()));
    let key = context.key.clone();

    if ty != Type::Void {
        let recorded = if ty == Type::Int && type_checker.widenings.returns.contains(&key) {
            Type::Float
        } else {
            ty.clone()
        };
        if let Some(signature) = type_checker.env.signature_mut(&key) {
            signature.set_return(recorded);
        }
    }

    type_checker.set_type(id, ty);
    Ok(())
}

fn define_function(
    type_checker: &mut TypeChecker,
    id: NodeId,
    def: &FunctionDef,
) -> Result<(), Error> {
    let key = signature_key(&type_checker.ast, id);
    let already_declared = |type_checker: &TypeChecker| {
        type_checker.error(
            ErrorImpl::FunctionAlreadyDeclared {
                function: key.clone(),
            },
            id,
        )
    };

    if type_checker.env.signature(&key).is_some() {
        return Err(already_declared(type_checker));
    }

    match type_checker.ast.enclosing_scope_above(id) {
        Some(scope_id) => {
            let Some(scope) = type_checker.ast.scope_mut(scope_id) else {
                return Err(already_declared(type_checker));
            };
            if scope.definitions.contains_key(&def.name) {
                return Err(already_declared(type_checker));
            }
            scope.definitions.insert(def.name.clone(), id);
        }
        None => type_checker
            .env
            .register_function(&def.name, id)
            .map_err(|kind| type_checker.error(kind, id))?,
    }

    type_checker
        .env
        .add_signature(&key, FunctionSignature::new(id, def.params.clone()))
        .map_err(|kind| type_checker.error(kind, id))?;

    tracing::debug!(function = %key, params = def.params.len(), "signature pending");
    Ok(())
}

/// Resolves one call against the signature `key`, walking the body if this
/// is the first call to reach it.
pub fn infer_call(
    type_checker: &mut TypeChecker,
    call: NodeId,
    key: &str,
    args: Vec<Type>,
) -> Result<Type, Error> {
    let position = type_checker.ast[call].span.start.clone();
    let Some(signature) = type_checker.env.signature_mut(key) else {
        return Err(internal_error!(
            ErrorImpl::InternalInvariant {
                message: format!("no signature for {}", key)
            },
            position
        ));
    };

    match signature
        .resolve_or_validate(&args)
        .map_err(|kind| Error::new(kind, position))?
    {
        Resolution::Validated(ret) => {
            if let Some(context) = type_checker
                .function_stack
                .iter_mut()
                .find(|context| context.key == key)
            {
                context.recursive_calls.push((call, ret.clone()));
            }
            Ok(ret)
        }
        Resolution::NeedsInference => infer_body(type_checker, key, args),
    }
}

fn infer_body(type_checker: &mut TypeChecker, key: &str, args: Vec<Type>) -> Result<Type, Error> {
    let (def_id, params) = match type_checker.env.signature(key) {
        Some(signature) => (signature.node, signature.params.clone()),
        None => {
            return Err(internal_error!(
                ErrorImpl::InternalInvariant {
                    message: format!("signature {} vanished during inference", key)
                },
                crate::Position::null()
            ))
        }
    };

    tracing::debug!(function = %key, args = ?args, "inferring signature");

    for (name, ty) in params.iter().zip(args) {
        let site = BindingSite::Local {
            scope: def_id,
            name: name.clone(),
        };
        let line = type_checker.ast[def_id].line();
        let ty = type_checker.stored_type(&site, &ty, line);
        scope::declare(
            &mut type_checker.ast,
            &mut type_checker.env,
            def_id,
            name,
            ty,
            true,
        )?;
    }

    let NodeKind::FunctionDef(def) = type_checker.ast[def_id].kind.clone() else {
        return Err(internal_error!(
            ErrorImpl::InternalInvariant {
                message: format!("signature {} does not point at a function", key)
            },
            type_checker.ast[def_id].span.start.clone()
        ));
    };

    if type_checker.widenings.returns.contains(key) {
        if let Some(signature) = type_checker.env.signature_mut(key) {
            signature.set_return(Type::Float);
        }
    }

    type_checker.function_stack.push(FunctionContext {
        key: key.to_string(),
        returns: vec![],
        recursive_calls: vec![],
    });
    let walked = type_check_block(type_checker, &def.body);
    let context = type_checker.function_stack.pop();
    walked?;

    let ret = type_checker
        .env
        .signature(key)
        .and_then(|signature| signature.return_type().cloned())
        .unwrap_or(Type::Void);
    let (returns, recursive_calls) = context
        .map(|context| (context.returns, context.recursive_calls))
        .unwrap_or_default();

    // The last return recorded fixes `ret`. An earlier return may differ only
    // by being an Int under a Float `ret`; any other difference is reported
    // instead of letting the later return silently win.
    for (node, ty) in returns {
        if ty != ret && !ret.accepts(&ty) {
            let error = type_checker.error(
                ErrorImpl::ReturnTypeMismatch {
                    expected: ret.to_string(),
                    received: ty.to_string(),
                },
                node,
            );
            type_checker.diagnostics.report(error);
        }
    }

    for (call, ty) in recursive_calls {
        if ty == ret || !ty.is_value() {
            continue;
        }
        if ty == Type::Int && ret == Type::Float {
            tracing::debug!(function = %key, "recursive call saw the return before it widened");
            type_checker.widenings.returns.insert(key.to_string());
        } else {
            let error = type_checker.error(
                ErrorImpl::ReturnTypeMismatch {
                    expected: ret.to_string(),
                    received: ty.to_string(),
                },
                call,
            );
            type_checker.diagnostics.report(error);
        }
    }

    tracing::debug!(function = %key, ret = %ret, "signature fixed");
    Ok(ret)
}
