use crate::{
    ast::{
        ast::{NodeId, NodeKind, Scope},
        expressions::{BinaryOperator, Builtin, UnaryOperator},
        types::Type,
    },
    errors::errors::{Error, ErrorImpl},
    internal_error,
    ir::ir::{BinaryOp, CastOp, IrType, Predicate, Value},
    runtime::abi::{element_kind, element_suffix, RT_ALLOC, RT_DATA, RT_EXIT, RT_PRINT_ERROR},
    Position,
};

use super::{
    compiler::{ir_type, zero_value, Compiler, FUNCTION_PREFIX},
    refcount::{release_temps_from, retain},
};

/// Converts a scalar to the machine type of the slot or use it flows into.
///
/// Int to Float widening is the conversion the language has; Float to Int
/// is only asked for by `int()`.
pub fn convert(compiler: &mut Compiler, value: Value, to: IrType) -> Result<Value, Error> {
    let from = compiler.builder.value_type(&value);

    match (from, to) {
        (from, to) if from == to => Ok(value),
        (_, IrType::Void) => Ok(value),
        (IrType::I64, IrType::F64) => compiler
            .builder
            .build_cast(CastOp::SiToFp, value, IrType::F64, "widen"),
        (IrType::F64, IrType::I64) => compiler
            .builder
            .build_cast(CastOp::FpToSi, value, IrType::I64, "narrow"),
        (IrType::I1, IrType::I64) => compiler
            .builder
            .build_cast(CastOp::ZExt, value, IrType::I64, "zext"),
        (from, to) => Err(internal_error!(
            ErrorImpl::MalformedIr {
                message: format!("no conversion from {} to {}", from, to)
            },
            Position::null()
        )),
    }
}

/// Brings a value read from storage or returned by a call to the type of
/// the expression. Reads may widen but never narrow.
fn read_as(compiler: &mut Compiler, value: Value, to: IrType) -> Result<Value, Error> {
    let from = compiler.builder.value_type(&value);

    if from == IrType::F64 && to == IrType::I64 {
        return Err(internal_error!(
            ErrorImpl::MalformedIr {
                message: format!("read of {} used as {}", from, to)
            },
            Position::null()
        ));
    }
    convert(compiler, value, to)
}

/// Ends the current block in a runtime failure: the message goes to stderr
/// and the program exits with status 1.
fn gen_trap(compiler: &mut Compiler, message: &str) -> Result<(), Error> {
    let bytes = compiler.module.add_string(message);
    compiler.call_runtime(
        RT_PRINT_ERROR,
        vec![bytes, Value::Int(message.len() as i64)],
        "",
    )?;
    compiler.call_runtime(RT_EXIT, vec![Value::Int(1)], "")?;
    compiler.builder.build_unreachable()
}

/// Continues in a fresh block when `ok` holds and traps otherwise.
fn gen_check(compiler: &mut Compiler, ok: Value, message: &str) -> Result<(), Error> {
    let fail = compiler.create_basic_block("check.fail");
    let pass = compiler.create_basic_block("check.ok");
    compiler.builder.build_cond_br(ok, pass, fail)?;

    compiler.builder.position_at_end(fail);
    gen_trap(compiler, message)?;

    compiler.builder.position_at_end(pass);
    Ok(())
}

/// Traps unless `index` addresses an element of `list`.
pub fn bounds_check(compiler: &mut Compiler, list: Value, index: Value) -> Result<(), Error> {
    let ok = compiler.call_runtime("rt_list_check", vec![list, index], "in_bounds")?;
    gen_check(compiler, ok, "IndexError: list index out of range")
}

fn key_check(compiler: &mut Compiler, dict: Value, key: Value) -> Result<(), Error> {
    let ok = compiler.call_runtime("rt_dict_has", vec![dict, key], "has_key")?;
    gen_check(compiler, ok, "KeyError: key not found")
}

fn element_type(compiler: &Compiler, container: &Type, at: NodeId) -> Result<IrType, Error> {
    match container.element() {
        Some(element) => ir_type(element),
        None => Err(compiler.error(
            ErrorImpl::InternalInvariant {
                message: format!("{} has no elements", container),
            },
            at,
        )),
    }
}

/// Address and machine type of a struct or instance field.
///
/// # Arguments
///
/// * `object` - The record value
/// * `object_ty` - Its resolved type
/// * `field` - The field name
/// * `at` - Node used for the error position
pub fn field_slot(
    compiler: &mut Compiler,
    object: Value,
    object_ty: &Type,
    field: &str,
    at: NodeId,
) -> Result<(Value, IrType), Error> {
    let (_, scope) = compiler.record_scope(object_ty, at)?;
    let (Some(index), Some(entry)) = (scope.field_index(field), scope.locals.get(field)) else {
        return Err(compiler.error(
            ErrorImpl::InternalInvariant {
                message: format!("{} has no field {}", object_ty, field),
            },
            at,
        ));
    };

    let ty = ir_type(&entry.ty)?;
    let data = compiler.call_runtime(RT_DATA, vec![object], "data")?;
    let ptr = compiler
        .builder
        .build_field_addr(data, index as u32, field)?;
    Ok((ptr, ty))
}

/// Prints one `print` argument by its static type.
pub fn gen_print(compiler: &mut Compiler, value: Value, ty: &Type) -> Result<(), Error> {
    match ty {
        Type::Int => compiler.call_runtime("rt_print_int", vec![value], "")?,
        Type::Float => compiler.call_runtime("rt_print_float", vec![value], "")?,
        Type::Bool => compiler.call_runtime("rt_print_bool", vec![value], "")?,
        Type::Text => compiler.call_runtime("rt_print_str", vec![value], "")?,
        Type::List(_) | Type::Dict(_) => {
            let text = compiler.call_runtime("rt_to_str", vec![value], "repr")?;
            compiler.call_runtime("rt_print_str", vec![text], "")?
        }
        Type::Struct(name) | Type::Instance(name) => {
            let text = compiler.static_text(&format!("<{} object>", name))?;
            compiler.call_runtime("rt_print_str", vec![text], "")?
        }
        other => {
            return Err(internal_error!(
                ErrorImpl::InternalInvariant {
                    message: format!("print of {}", other)
                },
                Position::null()
            ))
        }
    };
    Ok(())
}

/// Generates the value of an expression, of the machine type of its node.
pub fn gen_expression(compiler: &mut Compiler, id: NodeId) -> Result<Value, Error> {
    let ast = compiler.ast;
    let node = &ast[id];

    match &node.kind {
        NodeKind::IntLiteral(value) => Ok(Value::Int(*value)),
        NodeKind::FloatLiteral(value) => Ok(Value::Float(*value)),
        NodeKind::BoolLiteral(value) => Ok(Value::Bool(*value)),
        NodeKind::StringLiteral(text) => compiler.static_text(text),
        NodeKind::Variable { name } => {
            let slot = compiler.binding_storage(id)?;
            let value = compiler.builder.build_load(slot.ty, slot.ptr, name)?;
            read_as(compiler, value, ir_type(&node.ty)?)
        }
        NodeKind::Binary { op, left, right } if op.is_logical() => {
            gen_logical(compiler, *op, *left, *right)
        }
        NodeKind::Binary { op, left, right } => {
            let lhs = gen_expression(compiler, *left)?;
            let rhs = gen_expression(compiler, *right)?;
            gen_binary(compiler, *op, lhs, rhs, &ast[*left].ty, &node.ty)
        }
        NodeKind::Unary { op, operand } => {
            let value = gen_expression(compiler, *operand)?;

            match (op, &node.ty) {
                (UnaryOperator::Not, _) => {
                    compiler
                        .builder
                        .build_binary(BinaryOp::Xor, value, Value::Bool(true), "not")
                }
                (UnaryOperator::Negate, Type::Float) => compiler.builder.build_binary(
                    BinaryOp::FMul,
                    value,
                    Value::Float(-1.0),
                    "neg",
                ),
                (UnaryOperator::Negate, _) => {
                    compiler
                        .builder
                        .build_binary(BinaryOp::Sub, Value::Int(0), value, "neg")
                }
            }
        }
        NodeKind::Call { callee, args } => gen_call(compiler, id, callee, args),
        NodeKind::MethodCall {
            receiver,
            method,
            args,
        } => gen_method_call(compiler, id, *receiver, method, args),
        NodeKind::Field { object, field } => {
            let object_value = gen_expression(compiler, *object)?;
            let (ptr, ty) = field_slot(compiler, object_value, &ast[*object].ty, field, id)?;
            let value = compiler.builder.build_load(ty, ptr, field)?;
            read_as(compiler, value, ir_type(&node.ty)?)
        }
        NodeKind::Index { object, index } => {
            let container = gen_expression(compiler, *object)?;
            let key = gen_expression(compiler, *index)?;
            let element = element_type(compiler, &ast[*object].ty, id)?;
            let suffix = element_suffix(element);

            let value = match &ast[*object].ty {
                Type::Dict(_) => {
                    key_check(compiler, container, key)?;
                    compiler.call_runtime(
                        &format!("rt_dict_get_{}", suffix),
                        vec![container, key],
                        "item",
                    )?
                }
                _ => {
                    bounds_check(compiler, container, key)?;
                    compiler.call_runtime(
                        &format!("rt_list_get_{}", suffix),
                        vec![container, key],
                        "item",
                    )?
                }
            };
            read_as(compiler, value, ir_type(&node.ty)?)
        }
        NodeKind::List { elements } => {
            let Type::List(element) = &node.ty else {
                return Err(compiler.error(
                    ErrorImpl::InternalInvariant {
                        message: format!("list literal typed {}", node.ty),
                    },
                    id,
                ));
            };

            let list = compiler.call_runtime(
                "rt_list_new",
                vec![Value::Int(element_kind(element))],
                "list",
            )?;
            for element_id in elements {
                let value = gen_expression(compiler, *element_id)?;
                let ty = ir_type(&ast[*element_id].ty)?;
                if ty == IrType::Ptr {
                    retain(compiler, value)?;
                }
                compiler.call_runtime(
                    &format!("rt_list_push_{}", element_suffix(ty)),
                    vec![list, value],
                    "",
                )?;
            }
            Ok(list)
        }
        NodeKind::Dict { entries } => {
            let Type::Dict(element) = &node.ty else {
                return Err(compiler.error(
                    ErrorImpl::InternalInvariant {
                        message: format!("dict literal typed {}", node.ty),
                    },
                    id,
                ));
            };

            let dict = compiler.call_runtime(
                "rt_dict_new",
                vec![Value::Int(element_kind(element))],
                "dict",
            )?;
            for (key_id, value_id) in entries {
                let key = gen_expression(compiler, *key_id)?;
                let value = gen_expression(compiler, *value_id)?;
                let ty = ir_type(&ast[*value_id].ty)?;
                if ty == IrType::Ptr {
                    retain(compiler, value)?;
                }
                compiler.call_runtime(
                    &format!("rt_dict_set_{}", element_suffix(ty)),
                    vec![dict, key, value],
                    "",
                )?;
            }
            Ok(dict)
        }
        NodeKind::StructLiteral { fields, .. } => {
            let mut provided = vec![];
            for (field, value_id) in fields {
                provided.push((field.as_str(), gen_expression(compiler, *value_id)?));
            }

            let (def, scope) = compiler.record_scope(&node.ty, id)?;
            gen_record(compiler, def, scope, &provided, id)
        }
        _ => Err(compiler.error(
            ErrorImpl::InternalInvariant {
                message: String::from("statement in expression position"),
            },
            id,
        )),
    }
}

/// `and`/`or` evaluate their right side only when the left does not decide.
fn gen_logical(
    compiler: &mut Compiler,
    op: BinaryOperator,
    left: NodeId,
    right: NodeId,
) -> Result<Value, Error> {
    let result = compiler.builder.build_entry_alloca(IrType::I1, "logical")?;
    let lhs = gen_expression(compiler, left)?;
    compiler.builder.build_store(result, lhs)?;

    let rhs_block = compiler.create_basic_block("logical.rhs");
    let end_block = compiler.create_basic_block("logical.end");
    match op {
        BinaryOperator::And => compiler.builder.build_cond_br(lhs, rhs_block, end_block)?,
        _ => compiler.builder.build_cond_br(lhs, end_block, rhs_block)?,
    }

    compiler.builder.position_at_end(rhs_block);
    let mark = compiler.temps.len();
    let rhs = gen_expression(compiler, right)?;
    compiler.builder.build_store(result, rhs)?;
    // Temporaries of the right side do not exist on the short-circuit path.
    release_temps_from(compiler, mark)?;
    compiler.builder.build_br(end_block)?;

    compiler.builder.position_at_end(end_block);
    compiler.builder.build_load(IrType::I1, result, "logical.value")
}

fn gen_binary(
    compiler: &mut Compiler,
    op: BinaryOperator,
    lhs: Value,
    rhs: Value,
    operand: &Type,
    result: &Type,
) -> Result<Value, Error> {
    if op.is_equality() || op.is_relational() {
        return gen_comparison(compiler, op, lhs, rhs, operand);
    }

    if *result == Type::Text {
        return compiler.call_runtime("rt_str_concat", vec![lhs, rhs], "concat");
    }

    if *result == Type::Int {
        return match op {
            BinaryOperator::Add => compiler.builder.build_binary(BinaryOp::Add, lhs, rhs, "add"),
            BinaryOperator::Subtract => compiler.builder.build_binary(BinaryOp::Sub, lhs, rhs, "sub"),
            BinaryOperator::Multiply => compiler.builder.build_binary(BinaryOp::Mul, lhs, rhs, "mul"),
            BinaryOperator::FloorDivide => {
                compiler.call_runtime("rt_int_floordiv", vec![lhs, rhs], "floordiv")
            }
            BinaryOperator::Modulo => compiler.call_runtime("rt_int_mod", vec![lhs, rhs], "mod"),
            _ => Err(invalid_operator(op, result)),
        };
    }

    let lhs = convert(compiler, lhs, IrType::F64)?;
    let rhs = convert(compiler, rhs, IrType::F64)?;
    match op {
        BinaryOperator::Add => compiler.builder.build_binary(BinaryOp::FAdd, lhs, rhs, "fadd"),
        BinaryOperator::Subtract => compiler.builder.build_binary(BinaryOp::FSub, lhs, rhs, "fsub"),
        BinaryOperator::Multiply => compiler.builder.build_binary(BinaryOp::FMul, lhs, rhs, "fmul"),
        BinaryOperator::Divide => compiler.builder.build_binary(BinaryOp::FDiv, lhs, rhs, "fdiv"),
        BinaryOperator::FloorDivide => {
            compiler.call_runtime("rt_float_floordiv", vec![lhs, rhs], "floordiv")
        }
        BinaryOperator::Modulo => compiler.call_runtime("rt_float_mod", vec![lhs, rhs], "mod"),
        _ => Err(invalid_operator(op, result)),
    }
}

fn invalid_operator(op: BinaryOperator, ty: &Type) -> Error {
    internal_error!(
        ErrorImpl::InternalInvariant {
            message: format!("operator {} lowered for {}", op, ty)
        },
        Position::null()
    )
}

fn gen_comparison(
    compiler: &mut Compiler,
    op: BinaryOperator,
    lhs: Value,
    rhs: Value,
    operand: &Type,
) -> Result<Value, Error> {
    if *operand == Type::Text {
        let equal = compiler.call_runtime("rt_str_eq", vec![lhs, rhs], "str_eq")?;
        return match op {
            BinaryOperator::Equal => Ok(equal),
            _ => compiler
                .builder
                .build_binary(BinaryOp::Xor, equal, Value::Bool(true), "str_ne"),
        };
    }

    let float = *operand == Type::Float;
    let pred = match (op, float) {
        (BinaryOperator::Equal, false) => Predicate::Eq,
        (BinaryOperator::NotEqual, false) => Predicate::Ne,
        (BinaryOperator::Less, false) => Predicate::Slt,
        (BinaryOperator::LessEqual, false) => Predicate::Sle,
        (BinaryOperator::Greater, false) => Predicate::Sgt,
        (BinaryOperator::GreaterEqual, false) => Predicate::Sge,
        (BinaryOperator::Equal, true) => Predicate::Oeq,
        (BinaryOperator::NotEqual, true) => Predicate::One,
        (BinaryOperator::Less, true) => Predicate::Olt,
        (BinaryOperator::LessEqual, true) => Predicate::Ole,
        (BinaryOperator::Greater, true) => Predicate::Ogt,
        (BinaryOperator::GreaterEqual, true) => Predicate::Oge,
        _ => return Err(invalid_operator(op, operand)),
    };

    compiler.builder.build_compare(pred, lhs, rhs, "cmp")
}

/// Lowers the arguments of a user function call, converted to the fixed
/// parameter types.
fn gen_args(
    compiler: &mut Compiler,
    key: &str,
    mut values: Vec<Value>,
    args: &[NodeId],
    at: NodeId,
) -> Result<(Vec<Value>, IrType), Error> {
    let env = compiler.env;
    let Some(signature) = env.signature(key) else {
        return Err(compiler.error(
            ErrorImpl::InternalInvariant {
                message: format!("call to pruned or unknown function {}", key),
            },
            at,
        ));
    };
    let (Some(params), Some(ret)) = (signature.param_types(), signature.return_type()) else {
        return Err(compiler.error(
            ErrorImpl::InternalInvariant {
                message: format!("call to {} before its signature is fixed", key),
            },
            at,
        ));
    };

    for arg in args {
        values.push(gen_expression(compiler, *arg)?);
    }

    let mut converted = vec![];
    for (value, param) in values.into_iter().zip(params) {
        converted.push(convert(compiler, value, ir_type(param)?)?);
    }

    Ok((converted, ir_type(ret)?))
}

/// Calls a lowered user function. A heap result arrives owned and becomes a
/// temporary of the statement.
fn gen_user_call(
    compiler: &mut Compiler,
    key: &str,
    args: Vec<Value>,
    ret: IrType,
    result_ty: &Type,
) -> Result<Value, Error> {
    let result = compiler.builder.build_call(
        &format!("{}{}", FUNCTION_PREFIX, key),
        args,
        ret,
        "call",
    )?;

    if ret == IrType::Void {
        return Ok(result);
    }
    if ret == IrType::Ptr {
        compiler.temps.push(result);
    }
    read_as(compiler, result, ir_type(result_ty)?)
}

fn gen_call(
    compiler: &mut Compiler,
    id: NodeId,
    callee: &str,
    args: &[NodeId],
) -> Result<Value, Error> {
    let (ast, env) = (compiler.ast, compiler.env);
    let node = &ast[id];

    match &node.target {
        Some(key) if env.signature(key).is_some() => {
            let (values, ret) = gen_args(compiler, key, vec![], args, id)?;
            gen_user_call(compiler, key, values, ret, &node.ty)
        }
        Some(class) if env.class_def(class).is_some() => construct(compiler, id, class, args),
        _ => match Builtin::from_name(callee) {
            Some(builtin) => {
                let [arg] = args else {
                    return Err(compiler.error(
                        ErrorImpl::InternalInvariant {
                            message: format!("{} lowered with {} arguments", callee, args.len()),
                        },
                        id,
                    ));
                };
                let value = gen_expression(compiler, *arg)?;
                gen_builtin(compiler, builtin, value, &ast[*arg].ty)
            }
            None => Err(compiler.error(
                ErrorImpl::InternalInvariant {
                    message: format!("call to {} was never resolved", callee),
                },
                id,
            )),
        },
    }
}

fn gen_builtin(
    compiler: &mut Compiler,
    builtin: Builtin,
    value: Value,
    arg: &Type,
) -> Result<Value, Error> {
    match (builtin, arg) {
        (Builtin::Len, Type::Text) => compiler.call_runtime("rt_str_len", vec![value], "len"),
        (Builtin::Len, Type::Dict(_)) => compiler.call_runtime("rt_dict_len", vec![value], "len"),
        (Builtin::Len, _) => compiler.call_runtime("rt_list_len", vec![value], "len"),
        (Builtin::Str, Type::Int) => compiler.call_runtime("rt_str_from_int", vec![value], "str"),
        (Builtin::Str, Type::Float) => {
            compiler.call_runtime("rt_str_from_float", vec![value], "str")
        }
        (Builtin::Str, Type::Bool) => compiler.call_runtime("rt_str_from_bool", vec![value], "str"),
        (Builtin::Str, Type::Text) => Ok(value),
        (Builtin::Str, Type::Struct(name) | Type::Instance(name)) => {
            compiler.static_text(&format!("<{} object>", name))
        }
        (Builtin::Str, _) => compiler.call_runtime("rt_to_str", vec![value], "str"),
        (Builtin::Int, Type::Text) => compiler.call_runtime("rt_str_to_int", vec![value], "int"),
        (Builtin::Int, _) => convert(compiler, value, IrType::I64),
        (Builtin::Float, _) => convert(compiler, value, IrType::F64),
    }
}

fn gen_method_call(
    compiler: &mut Compiler,
    id: NodeId,
    receiver: NodeId,
    method: &str,
    args: &[NodeId],
) -> Result<Value, Error> {
    let ast = compiler.ast;
    let node = &ast[id];
    let receiver_ty = &ast[receiver].ty;
    let object = gen_expression(compiler, receiver)?;

    match (receiver_ty, method) {
        (Type::Instance(_), _) => {
            let Some(key) = &node.target else {
                return Err(compiler.error(
                    ErrorImpl::InternalInvariant {
                        message: format!("method {} was never resolved", method),
                    },
                    id,
                ));
            };
            let (values, ret) = gen_args(compiler, key, vec![object], args, id)?;
            gen_user_call(compiler, key, values, ret, &node.ty)
        }
        (Type::List(element), "append") => {
            let [arg] = args else {
                return Err(compiler.error(
                    ErrorImpl::InternalInvariant {
                        message: String::from("append lowered without one argument"),
                    },
                    id,
                ));
            };
            let value = gen_expression(compiler, *arg)?;
            let ty = ir_type(element)?;
            let value = convert(compiler, value, ty)?;
            if ty == IrType::Ptr {
                retain(compiler, value)?;
            }
            compiler.call_runtime(
                &format!("rt_list_push_{}", element_suffix(ty)),
                vec![object, value],
                "",
            )
        }
        (Type::List(element), "pop") => {
            let ok = compiler.call_runtime("rt_list_check", vec![object, Value::Int(-1)], "nonempty")?;
            gen_check(compiler, ok, "IndexError: pop from empty list")?;

            let ty = ir_type(element)?;
            let value = compiler.call_runtime(
                &format!("rt_list_pop_{}", element_suffix(ty)),
                vec![object],
                "pop",
            )?;
            if ty == IrType::Ptr {
                compiler.temps.push(value);
            }
            Ok(value)
        }
        (Type::List(_), "decode") => compiler.call_runtime("rt_str_decode", vec![object], "decoded"),
        (Type::Text, "encode") => compiler.call_runtime("rt_str_encode", vec![object], "encoded"),
        _ => Err(compiler.error(
            ErrorImpl::InternalInvariant {
                message: format!("{} has no method {}", receiver_ty, method),
            },
            id,
        )),
    }
}

/// Default expressions of a class or struct body, by field. The last
/// assignment to a field wins.
fn field_defaults(compiler: &Compiler, def: NodeId) -> Vec<(String, NodeId)> {
    let ast = compiler.ast;
    let body = match &ast[def].kind {
        NodeKind::ClassDef(class) => &class.body,
        NodeKind::StructDef(record) => &record.fields,
        _ => return vec![],
    };

    let mut defaults: Vec<(String, NodeId)> = vec![];
    for stmt in body {
        if let NodeKind::Assign { target, value } = &ast[*stmt].kind {
            if let NodeKind::Variable { name } = &ast[*target].kind {
                defaults.retain(|(field, _)| field != name);
                defaults.push((name.clone(), *value));
            }
        }
    }
    defaults
}

/// Allocates a record and stores every field: the provided value, else the
/// body's default, else the zero value of the field type.
///
/// The record is returned fresh; the caller decides who owns it.
fn gen_record(
    compiler: &mut Compiler,
    def: NodeId,
    scope: &Scope,
    provided: &[(&str, Value)],
    at: NodeId,
) -> Result<Value, Error> {
    let defaults = field_defaults(compiler, def);

    let mut types = vec![];
    for field in &scope.local_order {
        match scope.locals.get(field) {
            Some(entry) => types.push(ir_type(&entry.ty)?),
            None => {
                return Err(compiler.error(
                    ErrorImpl::InternalInvariant {
                        message: format!("field {} has no type", field),
                    },
                    at,
                ))
            }
        }
    }

    let ptr_mask = types
        .iter()
        .enumerate()
        .filter(|(index, ty)| **ty == IrType::Ptr && *index < 64)
        .fold(0i64, |mask, (index, _)| mask | (1 << index));
    let object = compiler.call_runtime(
        RT_ALLOC,
        vec![Value::Int(types.len() as i64), Value::Int(ptr_mask)],
        "object",
    )?;
    let data = compiler.call_runtime(RT_DATA, vec![object], "data")?;

    for (index, (field, ty)) in scope.local_order.iter().zip(&types).enumerate() {
        let value = match provided.iter().find(|(name, _)| *name == field.as_str()) {
            Some((_, value)) => *value,
            None => match defaults.iter().find(|(name, _)| name == field) {
                Some((_, default)) => gen_expression(compiler, *default)?,
                None => zero_value(*ty),
            },
        };

        let value = convert(compiler, value, *ty)?;
        if *ty == IrType::Ptr && value != Value::Null {
            retain(compiler, value)?;
        }
        let ptr = compiler.builder.build_field_addr(data, index as u32, field)?;
        compiler.builder.build_store(ptr, value)?;
    }

    Ok(object)
}

/// Calling a class allocates the instance, stores the defaults, takes
/// ownership of it as a temporary and runs `__init__` on it.
fn construct(
    compiler: &mut Compiler,
    id: NodeId,
    class: &str,
    args: &[NodeId],
) -> Result<Value, Error> {
    let ast = compiler.ast;
    let (def, scope) = compiler.record_scope(&Type::Instance(class.to_string()), id)?;
    let object = gen_record(compiler, def, scope, &[], id)?;

    retain(compiler, object)?;
    compiler.temps.push(object);

    if let Some(init) = scope.definitions.get("__init__") {
        let key = crate::type_checker::scope::signature_key(ast, *init);
        let (values, ret) = gen_args(compiler, &key, vec![object], args, id)?;
        let result = compiler.builder.build_call(
            &format!("{}{}", FUNCTION_PREFIX, key),
            values,
            ret,
            "init",
        )?;
        if ret == IrType::Ptr {
            compiler.temps.push(result);
        }
    }

    Ok(object)
}
