use std::ops::Index;

/// Machine-level types of the IR. Every heap value is an opaque `Ptr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    I1,
    I32,
    I64,
    F64,
    Ptr,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrId(pub u32);

/// An operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    I32(i32),
    Float(f64),
    Bool(bool),
    Null,
    /// Result of an instruction of the enclosing function.
    Inst(InstId),
    Param(u32),
    /// Address of a module global.
    Global(GlobalId),
    /// Address of the bytes of a static string.
    Str(StrId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    FAdd,
    FSub,
    FMul,
    FDiv,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    SiToFp,
    FpToSi,
    ZExt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Alloca { ty: IrType },
    Load { ty: IrType, ptr: Value },
    Store { value: Value, ptr: Value },
    Binary { op: BinaryOp, lhs: Value, rhs: Value },
    Compare { pred: Predicate, lhs: Value, rhs: Value },
    Cast { op: CastOp, value: Value, to: IrType },
    /// Address of the `index`th 8-byte slot after `base`.
    FieldAddr { base: Value, index: u32 },
    Call { callee: String, args: Vec<Value>, ret: IrType },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Br(BlockId),
    CondBr {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    Ret(Option<Value>),
    Unreachable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstData {
    pub inst: Instruction,
    pub ty: IrType,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub instructions: Vec<InstId>,
    pub terminator: Option<Terminator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<(String, IrType)>,
    pub ret: IrType,
    pub blocks: Vec<Block>,
    pub insts: Vec<InstData>,
}

impl Function {
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn inst(&self, id: InstId) -> &InstData {
        &self.insts[id.0 as usize]
    }

    /// Instructions in block order, the way they execute straight through.
    pub fn instructions(&self) -> impl Iterator<Item = &InstData> {
        self.blocks
            .iter()
            .flat_map(|block| block.instructions.iter().map(|id| self.inst(*id)))
    }

    pub fn value_type(&self, value: &Value) -> IrType {
        match value {
            Value::Int(_) => IrType::I64,
            Value::I32(_) => IrType::I32,
            Value::Float(_) => IrType::F64,
            Value::Bool(_) => IrType::I1,
            Value::Null | Value::Global(_) | Value::Str(_) => IrType::Ptr,
            Value::Inst(id) => self.inst(*id).ty,
            Value::Param(index) => self
                .params
                .get(*index as usize)
                .map(|(_, ty)| *ty)
                .unwrap_or(IrType::Void),
        }
    }

    /// Calls to `callee` anywhere in the function.
    pub fn calls_to<'a>(&'a self, callee: &'a str) -> impl Iterator<Item = &'a [Value]> + 'a {
        self.instructions().filter_map(move |data| match &data.inst {
            Instruction::Call { callee: name, args, .. } if name == callee => Some(args.as_slice()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternDecl {
    pub name: String,
    pub params: Vec<IrType>,
    pub ret: IrType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: IrType,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub name: String,
    pub externs: Vec<ExternDecl>,
    pub globals: Vec<Global>,
    pub strings: Vec<String>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Module {
            name: name.to_string(),
            ..Module::default()
        }
    }

    pub fn add_global(&mut self, name: &str, ty: IrType) -> Value {
        self.globals.push(Global {
            name: name.to_string(),
            ty,
        });
        Value::Global(GlobalId(self.globals.len() as u32 - 1))
    }

    /// Interns a static string and returns its address.
    pub fn add_string(&mut self, text: &str) -> Value {
        let index = match self.strings.iter().position(|existing| existing == text) {
            Some(index) => index,
            None => {
                self.strings.push(text.to_string());
                self.strings.len() - 1
            }
        };
        Value::Str(StrId(index as u32))
    }

    pub fn declare_extern(&mut self, decl: ExternDecl) {
        if self.externs.iter().all(|existing| existing.name != decl.name) {
            self.externs.push(decl);
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name == name)
    }

    pub fn extern_decl(&self, name: &str) -> Option<&ExternDecl> {
        self.externs.iter().find(|decl| decl.name == name)
    }
}

impl Index<GlobalId> for Module {
    type Output = Global;

    fn index(&self, id: GlobalId) -> &Self::Output {
        &self.globals[id.0 as usize]
    }
}
