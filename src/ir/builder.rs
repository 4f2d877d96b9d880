//! Instruction builder, shaped after the inkwell `Builder`.
//!
//! One builder owns the function it is filling. Instructions go to the end
//! of the block the builder is positioned at; `build_entry_alloca` places a
//! stack slot at the top of the entry block instead so that it dominates
//! every use.

use std::collections::HashMap;

use crate::{
    errors::errors::{Error, ErrorImpl},
    internal_error, Position,
};

use super::ir::{
    BinaryOp, Block, BlockId, CastOp, Function, InstData, InstId, Instruction, IrType, Predicate,
    Terminator, Value,
};

pub struct Builder {
    function: Function,
    current: Option<BlockId>,
    entry_allocas: usize,
    names: HashMap<String, usize>,
}

fn malformed(message: String) -> Error {
    internal_error!(ErrorImpl::MalformedIr { message }, Position::null())
}

impl Builder {
    pub fn new(name: &str, params: Vec<(String, IrType)>, ret: IrType) -> Self {
        Builder {
            function: Function {
                name: name.to_string(),
                params,
                ret,
                blocks: vec![],
                insts: vec![],
            },
            current: None,
            entry_allocas: 0,
            names: HashMap::new(),
        }
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn param(&self, index: u32) -> Value {
        Value::Param(index)
    }

    pub fn value_type(&self, value: &Value) -> IrType {
        self.function.value_type(value)
    }

    pub fn append_basic_block(&mut self, name: &str) -> BlockId {
        let name = self.unique_name(name);
        self.function.blocks.push(Block {
            name,
            instructions: vec![],
            terminator: None,
        });
        BlockId(self.function.blocks.len() as u32 - 1)
    }

    pub fn position_at_end(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    pub fn get_insert_block(&self) -> Option<BlockId> {
        self.current
    }

    /// Whether the current block already ends in a terminator.
    pub fn is_terminated(&self) -> bool {
        self.current
            .is_some_and(|block| self.function.block(block).terminator.is_some())
    }

    fn unique_name(&mut self, name: &str) -> String {
        let count = self.names.entry(name.to_string()).or_insert(0);
        *count += 1;

        if *count == 1 {
            name.to_string()
        } else {
            format!("{}.{}", name, *count - 1)
        }
    }

    fn push(&mut self, inst: Instruction, ty: IrType, name: &str) -> Result<Value, Error> {
        let Some(block) = self.current else {
            return Err(malformed(format!(
                "instruction built in {} before positioning",
                self.function.name
            )));
        };
        if self.function.block(block).terminator.is_some() {
            return Err(malformed(format!(
                "instruction appended after terminator in {}",
                self.function.name
            )));
        }

        let id = self.insert(inst, ty, name);
        self.function.blocks[block.0 as usize].instructions.push(id);
        Ok(Value::Inst(id))
    }

    fn insert(&mut self, inst: Instruction, ty: IrType, name: &str) -> InstId {
        let name = if ty == IrType::Void {
            String::new()
        } else {
            self.unique_name(name)
        };

        self.function.insts.push(InstData { inst, ty, name });
        InstId(self.function.insts.len() as u32 - 1)
    }

    pub fn build_entry_alloca(&mut self, ty: IrType, name: &str) -> Result<Value, Error> {
        if self.function.blocks.is_empty() {
            return Err(malformed(format!(
                "alloca in {} before the entry block exists",
                self.function.name
            )));
        }

        let id = self.insert(Instruction::Alloca { ty }, IrType::Ptr, name);
        self.function.blocks[0]
            .instructions
            .insert(self.entry_allocas, id);
        self.entry_allocas += 1;
        Ok(Value::Inst(id))
    }

    pub fn build_load(&mut self, ty: IrType, ptr: Value, name: &str) -> Result<Value, Error> {
        self.push(Instruction::Load { ty, ptr }, ty, name)
    }

    pub fn build_store(&mut self, ptr: Value, value: Value) -> Result<(), Error> {
        self.push(Instruction::Store { value, ptr }, IrType::Void, "")?;
        Ok(())
    }

    pub fn build_binary(
        &mut self,
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
        name: &str,
    ) -> Result<Value, Error> {
        let ty = self.value_type(&lhs);
        self.push(Instruction::Binary { op, lhs, rhs }, ty, name)
    }

    pub fn build_compare(
        &mut self,
        pred: Predicate,
        lhs: Value,
        rhs: Value,
        name: &str,
    ) -> Result<Value, Error> {
        self.push(Instruction::Compare { pred, lhs, rhs }, IrType::I1, name)
    }

    pub fn build_cast(&mut self, op: CastOp, value: Value, to: IrType, name: &str) -> Result<Value, Error> {
        self.push(Instruction::Cast { op, value, to }, to, name)
    }

    pub fn build_field_addr(&mut self, base: Value, index: u32, name: &str) -> Result<Value, Error> {
        self.push(Instruction::FieldAddr { base, index }, IrType::Ptr, name)
    }

    pub fn build_call(
        &mut self,
        callee: &str,
        args: Vec<Value>,
        ret: IrType,
        name: &str,
    ) -> Result<Value, Error> {
        self.push(
            Instruction::Call {
                callee: callee.to_string(),
                args,
                ret,
            },
            ret,
            name,
        )
    }

    fn terminate(&mut self, terminator: Terminator) -> Result<(), Error> {
        let Some(block) = self.current else {
            return Err(malformed(format!(
                "terminator built in {} before positioning",
                self.function.name
            )));
        };

        let slot = &mut self.function.blocks[block.0 as usize].terminator;
        if slot.is_some() {
            return Err(malformed(format!(
                "block {} of {} terminated twice",
                block.0, self.function.name
            )));
        }

        *slot = Some(terminator);
        Ok(())
    }

    pub fn build_br(&mut self, target: BlockId) -> Result<(), Error> {
        self.terminate(Terminator::Br(target))
    }

    pub fn build_cond_br(
        &mut self,
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    ) -> Result<(), Error> {
        self.terminate(Terminator::CondBr {
            cond,
            then_block,
            else_block,
        })
    }

    pub fn build_return(&mut self, value: Option<Value>) -> Result<(), Error> {
        self.terminate(Terminator::Ret(value))
    }

    pub fn build_unreachable(&mut self) -> Result<(), Error> {
        self.terminate(Terminator::Unreachable)
    }

    /// Hands out the finished function. Every block must be terminated.
    pub fn finish(self) -> Result<Function, Error> {
        if let Some(block) = self
            .function
            .blocks
            .iter()
            .find(|block| block.terminator.is_none())
        {
            return Err(malformed(format!(
                "block {} of {} has no terminator",
                block.name, self.function.name
            )));
        }

        Ok(self.function)
    }
}
