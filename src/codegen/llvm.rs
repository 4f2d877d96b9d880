use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    path::Path,
};

use inkwell::{
    basic_block::BasicBlock,
    builder::Builder,
    context::Context,
    module::{Linkage, Module},
    types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType, PointerType},
    values::{
        BasicMetadataValueEnum, BasicValue, BasicValueEnum, FloatValue, FunctionValue, GlobalValue,
        IntValue, PointerValue,
    },
    AddressSpace, FloatPredicate, IntPredicate,
};

use crate::{
    errors::errors::{Error, ErrorImpl},
    internal_error,
    ir::ir::{
        self, BinaryOp, BlockId, CastOp, InstId, Instruction, IrType, Predicate, Terminator, Value,
    },
    Position,
};

fn backend_error(error: impl Debug) -> Error {
    internal_error!(
        ErrorImpl::BackendError {
            message: format!("{:?}", error)
        },
        Position::null()
    )
}

fn malformed(message: String) -> Error {
    internal_error!(ErrorImpl::MalformedIr { message }, Position::null())
}

/// Holds the LLVM state while one IR module is translated.
///
/// Every heap value and every address is carried as `i8*`; loads, stores
/// and field addresses cast to the typed pointer they need.
pub struct Codegen<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,

    globals: Vec<GlobalValue<'ctx>>,
    strings: Vec<GlobalValue<'ctx>>,
    /// Results of the instructions of the function being translated.
    values: HashMap<InstId, BasicValueEnum<'ctx>>,
    blocks: HashMap<BlockId, BasicBlock<'ctx>>,
}

impl<'ctx> Codegen<'ctx> {
    pub fn new(context: &'ctx Context, name: &str) -> Self {
        Codegen {
            context,
            module: context.create_module(name),
            builder: context.create_builder(),
            globals: vec![],
            strings: vec![],
            values: HashMap::new(),
            blocks: HashMap::new(),
        }
    }

    fn byte_ptr(&self) -> PointerType<'ctx> {
        self.context.i8_type().ptr_type(AddressSpace::default())
    }

    /// Converts an IR type to an LLVM basic type. `Void` has none.
    pub fn convert_type(&self, ty: IrType) -> Option<BasicTypeEnum<'ctx>> {
        match ty {
            IrType::I1 => Some(self.context.bool_type().into()),
            IrType::I32 => Some(self.context.i32_type().into()),
            IrType::I64 => Some(self.context.i64_type().into()),
            IrType::F64 => Some(self.context.f64_type().into()),
            IrType::Ptr => Some(self.byte_ptr().into()),
            IrType::Void => None,
        }
    }

    fn basic_type(&self, ty: IrType) -> Result<BasicTypeEnum<'ctx>, Error> {
        self.convert_type(ty)
            .ok_or_else(|| malformed(String::from("void used as a value type")))
    }

    fn function_type(&self, params: &[IrType], ret: IrType) -> Result<FunctionType<'ctx>, Error> {
        let params = params
            .iter()
            .map(|ty| self.basic_type(*ty).map(BasicMetadataTypeEnum::from))
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(match self.convert_type(ret) {
            Some(ret) => ret.fn_type(&params, false),
            None => self.context.void_type().fn_type(&params, false),
        })
    }

    fn zero(&self, ty: IrType) -> Result<BasicValueEnum<'ctx>, Error> {
        Ok(match ty {
            IrType::I1 => self.context.bool_type().const_zero().into(),
            IrType::I32 => self.context.i32_type().const_zero().into(),
            IrType::I64 => self.context.i64_type().const_zero().into(),
            IrType::F64 => self.context.f64_type().const_zero().into(),
            IrType::Ptr => self.byte_ptr().const_null().into(),
            IrType::Void => return Err(malformed(String::from("void global"))),
        })
    }

    /// Declares externs, globals, static strings and every function
    /// before any body refers to them.
    fn declare(&mut self, module: &ir::Module) -> Result<(), Error> {
        for decl in &module.externs {
            let ty = self.function_type(&decl.params, decl.ret)?;
            self.module
                .add_function(&decl.name, ty, Some(Linkage::External));
        }

        for global in &module.globals {
            let ty = self.basic_type(global.ty)?;
            let value = self
                .module
                .add_global(ty, Some(AddressSpace::default()), &global.name);
            value.set_initializer(&self.zero(global.ty)?);
            self.globals.push(value);
        }

        for (index, text) in module.strings.iter().enumerate() {
            let bytes = self.context.const_string(text.as_bytes(), false);
            let ty = self.context.i8_type().array_type(text.len() as u32);
            let value = self
                .module
                .add_global(ty, Some(AddressSpace::default()), &format!(".str.{}", index));
            value.set_initializer(&bytes);
            value.set_constant(true);
            value.set_linkage(Linkage::Private);
            self.strings.push(value);
        }

        for function in &module.functions {
            let params = function.params.iter().map(|(_, ty)| *ty).collect::<Vec<_>>();
            let ty = self.function_type(&params, function.ret)?;
            let value = self.module.add_function(&function.name, ty, None);

            for (index, (name, _)) in function.params.iter().enumerate() {
                if let Some(param) = value.get_nth_param(index as u32) {
                    param.set_name(name);
                }
            }
        }

        Ok(())
    }

    fn operand(
        &self,
        function: FunctionValue<'ctx>,
        value: &Value,
    ) -> Result<BasicValueEnum<'ctx>, Error> {
        let context = self.context;
        Ok(match value {
            Value::Int(value) => context.i64_type().const_int(*value as u64, true).into(),
            Value::I32(value) => context
                .i32_type()
                .const_int(*value as i64 as u64, true)
                .into(),
            Value::Float(value) => context.f64_type().const_float(*value).into(),
            Value::Bool(value) => context.bool_type().const_int(*value as u64, false).into(),
            Value::Null => self.byte_ptr().const_null().into(),
            Value::Inst(id) => *self
                .values
                .get(id)
                .ok_or_else(|| malformed(format!("%{} used before its definition", id.0)))?,
            Value::Param(index) => function
                .get_nth_param(*index)
                .ok_or_else(|| malformed(format!("parameter {} out of range", index)))?,
            Value::Global(id) => {
                let global = self
                    .globals
                    .get(id.0 as usize)
                    .ok_or_else(|| malformed(format!("unknown global {}", id.0)))?;
                self.builder
                    .build_pointer_cast(global.as_pointer_value(), self.byte_ptr(), "")
                    .map_err(backend_error)?
                    .into()
            }
            Value::Str(id) => {
                let string = self
                    .strings
                    .get(id.0 as usize)
                    .ok_or_else(|| malformed(format!("unknown string {}", id.0)))?;
                self.builder
                    .build_pointer_cast(string.as_pointer_value(), self.byte_ptr(), "")
                    .map_err(backend_error)?
                    .into()
            }
        })
    }

    fn int_operand(
        &self,
        function: FunctionValue<'ctx>,
        value: &Value,
    ) -> Result<IntValue<'ctx>, Error> {
        match self.operand(function, value)? {
            BasicValueEnum::IntValue(value) => Ok(value),
            BasicValueEnum::PointerValue(value) => self
                .builder
                .build_ptr_to_int(value, self.context.i64_type(), "addr")
                .map_err(backend_error),
            other => Err(malformed(format!("{:?} is not an integer", other))),
        }
    }

    fn float_operand(
        &self,
        function: FunctionValue<'ctx>,
        value: &Value,
    ) -> Result<FloatValue<'ctx>, Error> {
        match self.operand(function, value)? {
            BasicValueEnum::FloatValue(value) => Ok(value),
            other => Err(malformed(format!("{:?} is not a float", other))),
        }
    }

    fn address(
        &self,
        function: FunctionValue<'ctx>,
        value: &Value,
        pointee: BasicTypeEnum<'ctx>,
    ) -> Result<PointerValue<'ctx>, Error> {
        match self.operand(function, value)? {
            BasicValueEnum::PointerValue(ptr) => self
                .builder
                .build_pointer_cast(ptr, pointee.ptr_type(AddressSpace::default()), "")
                .map_err(backend_error),
            other => Err(malformed(format!("{:?} is not an address", other))),
        }
    }

    fn translate_instruction(
        &mut self,
        source: &ir::Function,
        function: FunctionValue<'ctx>,
        id: InstId,
    ) -> Result<(), Error> {
        let data = source.inst(id);
        let name = data.name.as_str();
        let builder = &self.builder;

        let result: Option<BasicValueEnum<'ctx>> = match &data.inst {
            Instruction::Alloca { ty } => {
                let slot = builder
                    .build_alloca(self.basic_type(*ty)?, name)
                    .map_err(backend_error)?;
                Some(
                    builder
                        .build_pointer_cast(slot, self.byte_ptr(), "")
                        .map_err(backend_error)?
                        .into(),
                )
            }
            Instruction::Load { ty, ptr } => {
                let ty = self.basic_type(*ty)?;
                let ptr = self.address(function, ptr, ty)?;
                Some(builder.build_load(ty, ptr, name).map_err(backend_error)?)
            }
            Instruction::Store { value, ptr } => {
                let ty = self.basic_type(source.value_type(value))?;
                let value = self.operand(function, value)?;
                let ptr = self.address(function, ptr, ty)?;
                builder.build_store(ptr, value).map_err(backend_error)?;
                None
            }
            Instruction::Binary { op, lhs, rhs } => Some(match op {
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Xor => {
                    let lhs = self.int_operand(function, lhs)?;
                    let rhs = self.int_operand(function, rhs)?;
                    match op {
                        BinaryOp::Add => builder.build_int_add(lhs, rhs, name),
                        BinaryOp::Sub => builder.build_int_sub(lhs, rhs, name),
                        BinaryOp::Mul => builder.build_int_mul(lhs, rhs, name),
                        _ => builder.build_xor(lhs, rhs, name),
                    }
                    .map_err(backend_error)?
                    .into()
                }
                _ => {
                    let lhs = self.float_operand(function, lhs)?;
                    let rhs = self.float_operand(function, rhs)?;
                    match op {
                        BinaryOp::FAdd => builder.build_float_add(lhs, rhs, name),
                        BinaryOp::FSub => builder.build_float_sub(lhs, rhs, name),
                        BinaryOp::FMul => builder.build_float_mul(lhs, rhs, name),
                        _ => builder.build_float_div(lhs, rhs, name),
                    }
                    .map_err(backend_error)?
                    .into()
                }
            }),
            Instruction::Compare { pred, lhs, rhs } if pred.is_float() => {
                let lhs = self.float_operand(function, lhs)?;
                let rhs = self.float_operand(function, rhs)?;
                let pred = match pred {
                    Predicate::Oeq => FloatPredicate::OEQ,
                    Predicate::One => FloatPredicate::ONE,
                    Predicate::Olt => FloatPredicate::OLT,
                    Predicate::Ole => FloatPredicate::OLE,
                    Predicate::Ogt => FloatPredicate::OGT,
                    _ => FloatPredicate::OGE,
                };
                Some(
                    builder
                        .build_float_compare(pred, lhs, rhs, name)
                        .map_err(backend_error)?
                        .into(),
                )
            }
            Instruction::Compare { pred, lhs, rhs } => {
                let lhs = self.int_operand(function, lhs)?;
                let rhs = self.int_operand(function, rhs)?;
                let pred = match pred {
                    Predicate::Eq => IntPredicate::EQ,
                    Predicate::Ne => IntPredicate::NE,
                    Predicate::Slt => IntPredicate::SLT,
                    Predicate::Sle => IntPredicate::SLE,
                    Predicate::Sgt => IntPredicate::SGT,
                    _ => IntPredicate::SGE,
                };
                Some(
                    builder
                        .build_int_compare(pred, lhs, rhs, name)
                        .map_err(backend_error)?
                        .into(),
                )
            }
            Instruction::Cast { op, value, .. } => Some(match op {
                CastOp::SiToFp => builder
                    .build_signed_int_to_float(
                        self.int_operand(function, value)?,
                        self.context.f64_type(),
                        name,
                    )
                    .map_err(backend_error)?
                    .into(),
                CastOp::FpToSi => builder
                    .build_float_to_signed_int(
                        self.float_operand(function, value)?,
                        self.context.i64_type(),
                        name,
                    )
                    .map_err(backend_error)?
                    .into(),
                CastOp::ZExt => builder
                    .build_int_z_extend(
                        self.int_operand(function, value)?,
                        self.context.i64_type(),
                        name,
                    )
                    .map_err(backend_error)?
                    .into(),
            }),
            Instruction::FieldAddr { base, index } => {
                let slot_type = self.context.i64_type();
                let base = self.address(function, base, slot_type.into())?;
                let index = slot_type.const_int(*index as u64, false);
                // SAFETY: record data holds one 8-byte slot per field and
                // lowering only addresses declared fields.
                let field = unsafe { builder.build_in_bounds_gep(slot_type, base, &[index], name) }
                    .map_err(backend_error)?;
                Some(
                    builder
                        .build_pointer_cast(field, self.byte_ptr(), "")
                        .map_err(backend_error)?
                        .into(),
                )
            }
            Instruction::Call { callee, args, ret } => {
                let Some(target) = self.module.get_function(callee) else {
                    return Err(malformed(format!("call to undeclared {}", callee)));
                };
                let args = args
                    .iter()
                    .map(|arg| self.operand(function, arg).map(BasicMetadataValueEnum::from))
                    .collect::<Result<Vec<_>, Error>>()?;
                // Void results cannot carry a name.
                let name = if *ret == IrType::Void { "" } else { name };
                let call = builder
                    .build_call(target, &args, name)
                    .map_err(backend_error)?;
                call.try_as_basic_value().left()
            }
        };

        if let Some(result) = result {
            self.values.insert(id, result);
        }
        Ok(())
    }

    fn translate_terminator(
        &self,
        function: FunctionValue<'ctx>,
        terminator: &Terminator,
    ) -> Result<(), Error> {
        let block = |id: &BlockId| {
            self.blocks
                .get(id)
                .copied()
                .ok_or_else(|| malformed(format!("unknown block {}", id.0)))
        };

        match terminator {
            Terminator::Br(target) => {
                self.builder
                    .build_unconditional_branch(block(target)?)
                    .map_err(backend_error)?;
            }
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.int_operand(function, cond)?;
                self.builder
                    .build_conditional_branch(cond, block(then_block)?, block(else_block)?)
                    .map_err(backend_error)?;
            }
            Terminator::Ret(Some(value)) => {
                let value = self.operand(function, value)?;
                self.builder
                    .build_return(Some(&value as &dyn BasicValue))
                    .map_err(backend_error)?;
            }
            Terminator::Ret(None) => {
                self.builder.build_return(None).map_err(backend_error)?;
            }
            Terminator::Unreachable => {
                self.builder.build_unreachable().map_err(backend_error)?;
            }
        }
        Ok(())
    }

    /// Translates the blocks of one function, dominators first.
    fn translate_function(&mut self, source: &ir::Function) -> Result<(), Error> {
        let Some(function) = self.module.get_function(&source.name) else {
            return Err(malformed(format!("function {} was not declared", source.name)));
        };

        self.values.clear();
        self.blocks.clear();
        for (index, block) in source.blocks.iter().enumerate() {
            let value = self.context.append_basic_block(function, &block.name);
            self.blocks.insert(BlockId(index as u32), value);
        }

        for id in block_order(source) {
            let block = source.block(id);
            let Some(terminator) = &block.terminator else {
                return Err(malformed(format!("block {} has no terminator", block.name)));
            };

            self.builder.position_at_end(self.blocks[&id]);
            for inst in &block.instructions {
                self.translate_instruction(source, function, *inst)?;
            }
            self.translate_terminator(function, terminator)?;
        }

        Ok(())
    }

    /// Translates a whole IR module and verifies the result.
    pub fn translate(&mut self, module: &ir::Module) -> Result<(), Error> {
        self.declare(module)?;
        for function in &module.functions {
            self.translate_function(function)?;
        }

        self.module.verify().map_err(|message| {
            internal_error!(
                ErrorImpl::BackendError {
                    message: message.to_string()
                },
                Position::null()
            )
        })
    }
}

/// Reverse postorder from the entry, then the blocks nothing branches to,
/// so every value is translated before the blocks it dominates.
fn block_order(function: &ir::Function) -> Vec<BlockId> {
    fn successors(function: &ir::Function, id: BlockId) -> Vec<BlockId> {
        match &function.block(id).terminator {
            Some(Terminator::Br(target)) => vec![*target],
            Some(Terminator::CondBr {
                then_block,
                else_block,
                ..
            }) => vec![*then_block, *else_block],
            _ => vec![],
        }
    }

    let mut visited = HashSet::new();
    let mut postorder = vec![];
    let mut stack = vec![(function.entry(), false)];

    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            postorder.push(id);
            continue;
        }
        if !visited.insert(id) {
            continue;
        }
        stack.push((id, true));
        for next in successors(function, id).into_iter().rev() {
            if !visited.contains(&next) {
                stack.push((next, false));
            }
        }
    }

    postorder.reverse();
    for index in 0..function.blocks.len() {
        let id = BlockId(index as u32);
        if !visited.contains(&id) {
            postorder.push(id);
        }
    }
    postorder
}

/// Translates `module` and returns the textual LLVM IR.
pub fn emit_llvm_ir(module: &ir::Module) -> Result<String, Error> {
    let context = Context::create();
    let mut codegen = Codegen::new(&context, &module.name);
    codegen.translate(module)?;

    tracing::debug!(functions = module.functions.len(), "llvm module verified");
    Ok(codegen.module.print_to_string().to_string())
}

/// Translates `module` and writes the textual LLVM IR to `path`.
pub fn write_llvm_ir(module: &ir::Module, path: &Path) -> Result<(), Error> {
    let context = Context::create();
    let mut codegen = Codegen::new(&context, &module.name);
    codegen.translate(module)?;

    codegen.module.print_to_file(path).map_err(|message| {
        internal_error!(
            ErrorImpl::BackendError {
                message: message.to_string()
            },
            Position::null()
        )
    })
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::emit_llvm_ir;
    use crate::{
        compiler::compiler::compile, lexer::lexer::tokenize, parser::parser::parse,
        type_checker::type_checker::type_check,
    };

    fn llvm_text(source: &str) -> String {
        let tokens = tokenize(source.to_string(), Some("test.sp".to_string())).unwrap();
        let ast = parse(tokens, Rc::new("test.sp".to_string())).unwrap();
        let program = type_check(ast).unwrap();
        let module = compile(&program, "test.sp").unwrap();
        emit_llvm_ir(&module).unwrap()
    }

    #[test]
    fn test_translates_functions_and_runtime_calls() {
        let text = llvm_text("def add(a, b):\n    return a + b\nprint(add(1, 2.5))\n");

        assert!(text.contains("define double @sp.add(i64 %a, double %b)"));
        assert!(text.contains("define i32 @main()"));
        assert!(text.contains("declare void @rt_print_float(double)"));
    }

    #[test]
    fn test_heap_values_verify() {
        let text = llvm_text("s = \"a\" + \"b\"\nxs = [s]\nprint(xs[0])\n");

        assert!(text.contains("@rt_retain"));
        assert!(text.contains("@g.s = global i8* null"));
    }
}
