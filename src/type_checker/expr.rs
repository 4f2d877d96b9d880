use crate::{
    ast::{
        ast::{NodeId, NodeKind},
        expressions::{BinaryOperator, Builtin, UnaryOperator},
        types::Type,
    },
    errors::errors::{Error, ErrorImpl},
    internal_error,
};

use super::{
    scope::{self, resolve_definition, signature_key, Definition},
    type_checker::{infer_call, TypeChecker},
};

pub fn type_check_expr(type_checker: &mut TypeChecker, id: NodeId) -> Result<Type, Error> {
    let ty = match type_checker.ast[id].kind.clone() {
        NodeKind::IntLiteral(_) => Type::Int,
        NodeKind::FloatLiteral(_) => Type::Float,
        NodeKind::BoolLiteral(_) => Type::Bool,
        NodeKind::StringLiteral(_) => Type::Text,
        NodeKind::Variable { name } => type_check_variable(type_checker, id, &name)?,
        NodeKind::Binary { op, left, right } => {
            let left_ty = type_check_expr(type_checker, left)?;
            let right_ty = type_check_expr(type_checker, right)?;

            binary_type(op, &left_ty, &right_ty).ok_or_else(|| {
                type_checker.error(
                    ErrorImpl::InvalidOperands {
                        operator: op.to_string(),
                        left: left_ty.to_string(),
                        right: right_ty.to_string(),
                    },
                    id,
                )
            })?
        }
        NodeKind::Unary { op, operand } => {
            let operand_ty = type_check_expr(type_checker, operand)?;

            let result = match op {
                UnaryOperator::Not if operand_ty == Type::Bool => Some(Type::Bool),
                UnaryOperator::Negate if operand_ty.is_numeric() => Some(operand_ty.clone()),
                _ => None,
            };

            result.ok_or_else(|| {
                type_checker.error(
                    ErrorImpl::InvalidOperand {
                        operator: op.to_string(),
                        operand: operand_ty.to_string(),
                    },
                    id,
                )
            })?
        }
        NodeKind::Call { callee, args } => type_check_call(type_checker, id, &callee, &args)?,
        NodeKind::MethodCall {
            receiver,
            method,
            args,
        } => type_check_method_call(type_checker, id, receiver, &method, &args)?,
        NodeKind::Field { object, field } => {
            let object_ty = type_check_expr(type_checker, object)?;

            match lookup_field(type_checker, &object_ty, &field) {
                Some((_, field_ty)) => field_ty,
                None => {
                    return Err(type_checker.error(
                        ErrorImpl::UnknownField {
                            type_: object_ty.to_string(),
                            field,
                        },
                        id,
                    ))
                }
            }
        }
        NodeKind::Index { object, index } => {
            let object_ty = type_check_expr(type_checker, object)?;
            let index_ty = type_check_expr(type_checker, index)?;
            let element = check_index(type_checker, &object_ty, &index_ty, object, index)?;

            if !element.is_resolved() {
                return Err(uninferable(type_checker, object));
            }
            element
        }
        NodeKind::List { elements } => {
            let element = homogeneous(type_checker, &elements)?;
            Type::list_of(element)
        }
        NodeKind::Dict { entries } => {
            let mut values = vec![];

            for (key, value) in entries {
                let key_ty = type_check_expr(type_checker, key)?;
                if key_ty != Type::Text {
                    return Err(type_checker.error(
                        ErrorImpl::InvalidDictKey {
                            received: key_ty.to_string(),
                        },
                        key,
                    ));
                }
                values.push(value);
            }

            Type::dict_of(homogeneous(type_checker, &values)?)
        }
        NodeKind::StructLiteral { name, fields } => {
            type_check_struct_literal(type_checker, id, &name, &fields)?
        }
        _ => {
            return Err(internal_error!(
                ErrorImpl::InternalInvariant {
                    message: String::from("statement in expression position")
                },
                type_checker.ast[id].span.start.clone()
            ))
        }
    };

    Ok(type_checker.set_type(id, ty))
}

/// Result type of a binary operator, or `None` if the operands do not fit it.
pub fn binary_type(op: BinaryOperator, left: &Type, right: &Type) -> Option<Type> {
    if op.is_equality() {
        let comparable = matches!(left, Type::Int | Type::Float | Type::Bool | Type::Text);
        return (left == right && comparable).then_some(Type::Bool);
    }

    if op.is_relational() {
        let ordered = matches!(
            (left, right),
            (Type::Int, Type::Int) | (Type::Float, Type::Float)
        );
        return ordered.then_some(Type::Bool);
    }

    if op.is_logical() {
        return (*left == Type::Bool && *right == Type::Bool).then_some(Type::Bool);
    }

    if op == BinaryOperator::Add && *left == Type::Text && *right == Type::Text {
        return Some(Type::Text);
    }

    if !left.is_numeric() || !right.is_numeric() {
        return None;
    }

    if op == BinaryOperator::Divide || left != right {
        Some(Type::Float)
    } else {
        Some(left.clone())
    }
}

fn type_check_variable(type_checker: &mut TypeChecker, id: NodeId, name: &str) -> Result<Type, Error> {
    if let Some((site, ty)) = scope::resolve(&type_checker.ast, &type_checker.env, id, name)? {
        type_checker.ast[id].binding = Some(site);
        return Ok(ty);
    }

    match resolve_definition(&type_checker.ast, &type_checker.env, id, name) {
        Some(Definition::Function(key)) => Ok(Type::Function(key)),
        Some(Definition::Class(class)) => Ok(Type::Class(class)),
        Some(definition) => Err(type_checker.error(
            ErrorImpl::NotAValue {
                name: name.to_string(),
                kind: definition.kind_name().to_string(),
            },
            id,
        )),
        None => Err(type_checker.error(
            ErrorImpl::VariableNotDeclared {
                variable: name.to_string(),
            },
            id,
        )),
    }
}

/// Element type shared by every expression of a container literal. No
/// widening happens here, `[1, 2.0]` is mixed.
fn homogeneous(type_checker: &mut TypeChecker, elements: &[NodeId]) -> Result<Type, Error> {
    let mut element = Type::Unresolved;

    for id in elements {
        let ty = type_check_expr(type_checker, *id)?;
        type_checker.expect_value(&ty, *id)?;

        element = match element.unify(&ty) {
            Some(unified) => unified,
            None => {
                return Err(type_checker.error(
                    ErrorImpl::MixedContainer {
                        expected: element.to_string(),
                        received: ty.to_string(),
                    },
                    *id,
                ))
            }
        };
    }

    Ok(element)
}

fn uninferable(type_checker: &TypeChecker, object: NodeId) -> Error {
    let variable = match &type_checker.ast[object].kind {
        NodeKind::Variable { name } => name.clone(),
        NodeKind::Field { field, .. } => field.clone(),
        _ => String::from("container"),
    };

    type_checker.error(ErrorImpl::UninferableType { variable }, object)
}

/// Definition node and type of a struct or instance field.
pub fn lookup_field(type_checker: &TypeChecker, object_ty: &Type, field: &str) -> Option<(NodeId, Type)> {
    let def = match object_ty {
        Type::Struct(name) => type_checker.env.struct_def(name)?,
        Type::Instance(name) => type_checker.env.class_def(name)?,
        _ => return None,
    };

    let entry = type_checker.ast.scope(def)?.locals.get(field)?;
    Some((def, entry.ty.clone()))
}

/// Checks an index expression and returns the element type, which may still
/// be unresolved for an empty container.
pub fn check_index(
    type_checker: &TypeChecker,
    object_ty: &Type,
    index_ty: &Type,
    object: NodeId,
    index: NodeId,
) -> Result<Type, Error> {
    match object_ty {
        Type::List(element) => {
            if *index_ty != Type::Int {
                return Err(type_checker.error(
                    ErrorImpl::TypeMatchError {
                        expected: Type::Int.to_string(),
                        received: index_ty.to_string(),
                    },
                    index,
                ));
            }
            Ok((**element).clone())
        }
        Type::Dict(value) => {
            if *index_ty != Type::Text {
                return Err(type_checker.error(
                    ErrorImpl::InvalidDictKey {
                        received: index_ty.to_string(),
                    },
                    index,
                ));
            }
            Ok((**value).clone())
        }
        _ => Err(type_checker.error(
            ErrorImpl::NotIndexable {
                type_: object_ty.to_string(),
            },
            object,
        )),
    }
}

/// Writes the type now carried by `node` back into whatever it names: the
/// variable binding or the struct/class field.
pub fn refine_binding(type_checker: &mut TypeChecker, node: NodeId) {
    let ty = type_checker.ast[node].ty.clone();

    match type_checker.ast[node].kind.clone() {
        NodeKind::Variable { .. } => {
            if let Some(site) = type_checker.ast[node].binding.clone() {
                tracing::trace!(variable = site.name(), ty = %ty, "binding refined");
                scope::set_binding_type(&mut type_checker.ast, &mut type_checker.env, &site, ty);
            }
        }
        NodeKind::Field { object, field } => {
            let object_ty = type_checker.ast[object].ty.clone();
            if let Some((def, _)) = lookup_field(type_checker, &object_ty, &field) {
                if let Some(entry) = type_checker
                    .ast
                    .scope_mut(def)
                    .and_then(|scope| scope.locals.get_mut(&field))
                {
                    entry.ty = ty;
                }
            }
        }
        _ => {}
    }
}

fn check_arity(
    type_checker: &TypeChecker,
    id: NodeId,
    expected: usize,
    received: usize,
) -> Result<(), Error> {
    if received > expected {
        Err(type_checker.error(ErrorImpl::UnexpectedArguments { expected, received }, id))
    } else if received < expected {
        Err(type_checker.error(ErrorImpl::MissingArguments { expected, received }, id))
    } else {
        Ok(())
    }
}

fn type_check_args(type_checker: &mut TypeChecker, args: &[NodeId]) -> Result<Vec<Type>, Error> {
    args.iter()
        .map(|arg| type_check_expr(type_checker, *arg))
        .collect()
}

fn type_check_call(
    type_checker: &mut TypeChecker,
    id: NodeId,
    callee: &str,
    args: &[NodeId],
) -> Result<Type, Error> {
    let arg_types = type_check_args(type_checker, args)?;

    match resolve_definition(&type_checker.ast, &type_checker.env, id, callee) {
        Some(Definition::Function(key)) => {
            type_checker.ast[id].target = Some(key.clone());
            infer_call(type_checker, id, &key, arg_types)
        }
        Some(Definition::Class(class)) => construct(type_checker, id, &class, arg_types),
        Some(Definition::Struct(name)) => Err(type_checker.error(ErrorImpl::NotCallable { name }, id)),
        None => {
            if let Some(builtin) = Builtin::from_name(callee) {
                return type_check_builtin(type_checker, id, builtin, &arg_types);
            }

            if scope::resolve(&type_checker.ast, &type_checker.env, id, callee)?.is_some() {
                return Err(type_checker.error(
                    ErrorImpl::NotCallable {
                        name: callee.to_string(),
                    },
                    id,
                ));
            }

            Err(type_checker.error(
                ErrorImpl::FunctionNotDeclared {
                    function: callee.to_string(),
                },
                id,
            ))
        }
    }
}

/// A call to a class builds an instance and runs `__init__` on it when the
/// class defines one.
fn construct(
    type_checker: &mut TypeChecker,
    id: NodeId,
    class: &str,
    args: Vec<Type>,
) -> Result<Type, Error> {
    type_checker.ast[id].target = Some(class.to_string());
    let instance = Type::Instance(class.to_string());

    let init = type_checker
        .env
        .class_def(class)
        .and_then(|def| type_checker.ast.scope(def))
        .and_then(|scope| scope.definitions.get("__init__").copied());

    match init {
        Some(init) => {
            let key = signature_key(&type_checker.ast, init);
            let mut full_args = vec![instance.clone()];
            full_args.extend(args);
            infer_call(type_checker, id, &key, full_args)?;
        }
        None => check_arity(type_checker, id, 0, args.len())?,
    }

    Ok(instance)
}

fn type_check_builtin(
    type_checker: &mut TypeChecker,
    id: NodeId,
    builtin: Builtin,
    args: &[Type],
) -> Result<Type, Error> {
    check_arity(type_checker, id, 1, args.len())?;
    let arg = &args[0];

    let (result, expected) = match builtin {
        Builtin::Len => (
            matches!(arg, Type::Text | Type::List(_) | Type::Dict(_)).then_some(Type::Int),
            "Text, List or Dict",
        ),
        Builtin::Str => (arg.is_value().then_some(Type::Text), "a value"),
        Builtin::Int => (
            matches!(arg, Type::Int | Type::Float | Type::Bool | Type::Text).then_some(Type::Int),
            "Int, Float, Bool or Text",
        ),
        Builtin::Float => (arg.is_numeric().then_some(Type::Float), "Int or Float"),
    };

    result.ok_or_else(|| {
        type_checker.error(
            ErrorImpl::ArgumentTypeMatchError {
                expected: expected.to_string(),
                received: arg.to_string(),
            },
            id,
        )
    })
}

fn type_check_method_call(
    type_checker: &mut TypeChecker,
    id: NodeId,
    receiver: NodeId,
    method: &str,
    args: &[NodeId],
) -> Result<Type, Error> {
    let receiver_ty = type_check_expr(type_checker, receiver)?;
    let arg_types = type_check_args(type_checker, args)?;
    let unknown = |type_checker: &TypeChecker| {
        type_checker.error(
            ErrorImpl::UnknownMethod {
                type_: receiver_ty.to_string(),
                method: method.to_string(),
            },
            id,
        )
    };

    match &receiver_ty {
        Type::Instance(class) => {
            let def = type_checker
                .env
                .class_def(class)
                .and_then(|def| type_checker.ast.scope(def))
                .and_then(|scope| scope.definitions.get(method).copied());
            let Some(def) = def else {
                return Err(unknown(type_checker));
            };

            let key = signature_key(&type_checker.ast, def);
            type_checker.ast[id].target = Some(key.clone());

            let mut full_args = vec![receiver_ty.clone()];
            full_args.extend(arg_types);
            infer_call(type_checker, id, &key, full_args)
        }
        Type::List(element) => match method {
            "append" => {
                check_arity(type_checker, id, 1, arg_types.len())?;
                let arg = &arg_types[0];

                if !element.accepts(arg) {
                    return Err(type_checker.error(
                        ErrorImpl::TypeMatchError {
                            expected: element.to_string(),
                            received: arg.to_string(),
                        },
                        args[0],
                    ));
                }

                if !element.is_fully_resolved() {
                    if let Some(unified) = element.unify(arg) {
                        type_checker.set_type(receiver, Type::list_of(unified));
                        refine_binding(type_checker, receiver);
                    }
                }
                Ok(Type::Void)
            }
            "pop" => {
                check_arity(type_checker, id, 0, arg_types.len())?;
                if !element.is_resolved() {
                    return Err(uninferable(type_checker, receiver));
                }
                Ok((**element).clone())
            }
            "decode" if **element == Type::Int => {
                check_arity(type_checker, id, 0, arg_types.len())?;
                Ok(Type::Text)
            }
            _ => Err(unknown(type_checker)),
        },
        Type::Text if method == "encode" => {
            check_arity(type_checker, id, 0, arg_types.len())?;
            Ok(Type::list_of(Type::Int))
        }
        _ => Err(unknown(type_checker)),
    }
}

fn type_check_struct_literal(
    type_checker: &mut TypeChecker,
    id: NodeId,
    name: &str,
    fields: &[(String, NodeId)],
) -> Result<Type, Error> {
    let struct_ty = Type::Struct(name.to_string());

    if type_checker.env.struct_def(name).is_none() {
        return Err(type_checker.error(
            ErrorImpl::UnknownType {
                type_: name.to_string(),
            },
            id,
        ));
    }

    for (field, value) in fields {
        let value_ty = type_check_expr(type_checker, *value)?;

        let Some((_, field_ty)) = lookup_field(type_checker, &struct_ty, field) else {
            return Err(type_checker.error(
                ErrorImpl::UnknownField {
                    type_: name.to_string(),
                    field: field.clone(),
                },
                *value,
            ));
        };

        if !field_ty.accepts(&value_ty) {
            return Err(type_checker.error(
                ErrorImpl::FieldTypeMatchError {
                    expected: field_ty.to_string(),
                    received: value_ty.to_string(),
                },
                *value,
            ));
        }
    }

    Ok(struct_ty)
}
