use crate::{
    ast::{
        ast::{NodeId, NodeKind},
        statements::Branch,
        types::Type,
    },
    errors::errors::{Error, ErrorImpl},
    ir::ir::{BinaryOp, IrType, Predicate, Value},
    runtime::abi::{element_suffix, RT_RECLAIM},
};

use super::{
    compiler::{ir_type, Compiler},
    expr::{bounds_check, convert, field_slot, gen_expression, gen_print},
    refcount::{release_slots, release_temps, retain, store},
};

pub fn gen_block(compiler: &mut Compiler, body: &[NodeId]) -> Result<(), Error> {
    for stmt in body {
        gen_statement(compiler, *stmt)?;
    }
    Ok(())
}

pub fn gen_statement(compiler: &mut Compiler, id: NodeId) -> Result<(), Error> {
    let ast = compiler.ast;

    match &ast[id].kind {
        NodeKind::ExprStmt { expr } => {
            gen_expression(compiler, *expr)?;
            release_temps(compiler)
        }
        NodeKind::Assign { target, value } => {
            gen_assign(compiler, *target, *value)?;
            release_temps(compiler)
        }
        NodeKind::If {
            branches,
            else_body,
        } => gen_if(compiler, branches, else_body),
        NodeKind::While { condition, body } => {
            let cond_block = compiler.create_basic_block("while.cond");
            let body_block = compiler.create_basic_block("while.body");
            let end_block = compiler.create_basic_block("while.end");
            compiler.builder.build_br(cond_block)?;

            compiler.builder.position_at_end(cond_block);
            let condition = gen_expression(compiler, *condition)?;
            release_temps(compiler)?;
            compiler
                .builder
                .build_cond_br(condition, body_block, end_block)?;

            compiler.builder.position_at_end(body_block);
            gen_block(compiler, body)?;
            if !compiler.builder.is_terminated() {
                reclaim_in_main(compiler)?;
                compiler.builder.build_br(cond_block)?;
            }

            compiler.builder.position_at_end(end_block);
            Ok(())
        }
        NodeKind::For { end, body, .. } => gen_for(compiler, id, *end, body),
        NodeKind::Return { value } => gen_return(compiler, id, *value),
        NodeKind::Print { args } => {
            for (index, arg) in args.iter().enumerate() {
                if index > 0 {
                    compiler.call_runtime("rt_print_sep", vec![], "")?;
                }
                let value = gen_expression(compiler, *arg)?;
                gen_print(compiler, value, &ast[*arg].ty)?;
            }
            compiler.call_runtime("rt_print_newline", vec![], "")?;
            release_temps(compiler)
        }
        // Definitions are lowered from their signatures, class and struct
        // bodies at each construction.
        NodeKind::Global { .. }
        | NodeKind::Pass
        | NodeKind::FunctionDef(_)
        | NodeKind::ClassDef(_)
        | NodeKind::StructDef(_) => Ok(()),
        _ => Err(compiler.error(
            ErrorImpl::InternalInvariant {
                message: String::from("expression in statement position"),
            },
            id,
        )),
    }
}

fn gen_assign(compiler: &mut Compiler, target: NodeId, value: NodeId) -> Result<(), Error> {
    let ast = compiler.ast;
    let result = gen_expression(compiler, value)?;

    match &ast[target].kind {
        NodeKind::Variable { .. } => {
            let slot = compiler.binding_storage(target)?;
            let result = convert(compiler, result, slot.ty)?;
            store(compiler, slot.ptr, result, slot.ty)
        }
        NodeKind::Field { object, field } => {
            let object_value = gen_expression(compiler, *object)?;
            let (ptr, ty) = field_slot(compiler, object_value, &ast[*object].ty, field, target)?;
            let result = convert(compiler, result, ty)?;
            store(compiler, ptr, result, ty)
        }
        NodeKind::Index { object, index } => {
            let container = gen_expression(compiler, *object)?;
            let key = gen_expression(compiler, *index)?;
            let element = ir_type(&ast[target].ty)?;
            let result = convert(compiler, result, element)?;

            if element == IrType::Ptr {
                retain(compiler, result)?;
            }

            let name = match &ast[*object].ty {
                Type::Dict(_) => format!("rt_dict_set_{}", element_suffix(element)),
                _ => {
                    bounds_check(compiler, container, key)?;
                    format!("rt_list_set_{}", element_suffix(element))
                }
            };
            compiler.call_runtime(&name, vec![container, key, result], "")?;
            Ok(())
        }
        _ => Err(compiler.error(
            ErrorImpl::InternalInvariant {
                message: String::from("assignment target is not a name, field or index"),
            },
            target,
        )),
    }
}

/// A loop in `main` reclaims unowned fresh blocks once per iteration.
fn reclaim_in_main(compiler: &mut Compiler) -> Result<(), Error> {
    if compiler.function.is_none() {
        compiler.call_runtime(RT_RECLAIM, vec![], "")?;
    }
    Ok(())
}

/// `if`/`elif` arms test in order; every arm that falls through joins at
/// one block.
fn gen_if(compiler: &mut Compiler, branches: &[Branch], else_body: &[NodeId]) -> Result<(), Error> {
    let end_block = compiler.create_basic_block("if.end");

    for branch in branches {
        let condition = gen_expression(compiler, branch.condition)?;
        release_temps(compiler)?;

        let then_block = compiler.create_basic_block("if.then");
        let next_block = compiler.create_basic_block("if.next");
        compiler
            .builder
            .build_cond_br(condition, then_block, next_block)?;

        compiler.builder.position_at_end(then_block);
        gen_block(compiler, &branch.body)?;
        if !compiler.builder.is_terminated() {
            compiler.builder.build_br(end_block)?;
        }

        compiler.builder.position_at_end(next_block);
    }

    gen_block(compiler, else_body)?;
    if !compiler.builder.is_terminated() {
        compiler.builder.build_br(end_block)?;
    }

    compiler.builder.position_at_end(end_block);
    Ok(())
}

/// `for v in range(end)` counts a hidden induction slot from 0 and copies
/// it into `v` at the top of every iteration, so assigning `v` in the body
/// does not change the iteration count. `end` is evaluated before each test.
fn gen_for(compiler: &mut Compiler, id: NodeId, end: NodeId, body: &[NodeId]) -> Result<(), Error> {
    let variable = compiler.binding_storage(id)?;
    let counter = compiler.builder.build_entry_alloca(IrType::I64, "for.i")?;
    compiler.builder.build_store(counter, Value::Int(0))?;

    let cond_block = compiler.create_basic_block("for.cond");
    let body_block = compiler.create_basic_block("for.body");
    let step_block = compiler.create_basic_block("for.step");
    let end_block = compiler.create_basic_block("for.end");
    compiler.builder.build_br(cond_block)?;

    compiler.builder.position_at_end(cond_block);
    let current = compiler
        .builder
        .build_load(IrType::I64, counter, "for.current")?;
    let limit = gen_expression(compiler, end)?;
    release_temps(compiler)?;
    let more = compiler
        .builder
        .build_compare(Predicate::Slt, current, limit, "for.more")?;
    compiler
        .builder
        .build_cond_br(more, body_block, end_block)?;

    compiler.builder.position_at_end(body_block);
    let value = convert(compiler, current, variable.ty)?;
    compiler.builder.build_store(variable.ptr, value)?;
    gen_block(compiler, body)?;
    if !compiler.builder.is_terminated() {
        compiler.builder.build_br(step_block)?;
    }

    compiler.builder.position_at_end(step_block);
    reclaim_in_main(compiler)?;
    let current = compiler
        .builder
        .build_load(IrType::I64, counter, "for.current")?;
    let next = compiler
        .builder
        .build_binary(BinaryOp::Add, current, Value::Int(1), "for.next")?;
    compiler.builder.build_store(counter, next)?;
    compiler.builder.build_br(cond_block)?;

    compiler.builder.position_at_end(end_block);
    Ok(())
}

/// The returned value is retained for the caller before the function's
/// own slots are released.
fn gen_return(compiler: &mut Compiler, id: NodeId, value: Option<NodeId>) -> Result<(), Error> {
    let Some(ret) = compiler.function.as_ref().map(|function| function.ret) else {
        return Err(compiler.error(
            ErrorImpl::InternalInvariant {
                message: String::from("return lowered outside a function"),
            },
            id,
        ));
    };

    let result = match value {
        Some(value) if ret != IrType::Void => {
            let result = gen_expression(compiler, value)?;
            let result = convert(compiler, result, ret)?;
            if ret == IrType::Ptr {
                retain(compiler, result)?;
            }
            Some(result)
        }
        Some(value) => {
            gen_expression(compiler, value)?;
            None
        }
        None if ret != IrType::Void => Some(super::compiler::zero_value(ret)),
        None => None,
    };

    release_temps(compiler)?;
    release_slots(compiler)?;
    compiler.builder.build_return(result)?;

    let after = compiler.create_basic_block("after.return");
    compiler.builder.position_at_end(after);
    Ok(())
}
