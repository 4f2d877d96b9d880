use std::fmt::{self, Display, Formatter};

use super::ir::{
    BinaryOp, BlockId, CastOp, Function, Instruction, IrType, Module, Predicate, Terminator, Value,
};

impl Display for IrType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            IrType::I1 => "i1",
            IrType::I32 => "i32",
            IrType::I64 => "i64",
            IrType::F64 => "double",
            IrType::Ptr => "ptr",
            IrType::Void => "void",
        };
        write!(f, "{}", name)
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::FAdd => "fadd",
            BinaryOp::FSub => "fsub",
            BinaryOp::FMul => "fmul",
            BinaryOp::FDiv => "fdiv",
            BinaryOp::Xor => "xor",
        };
        write!(f, "{}", name)
    }
}

impl Predicate {
    pub fn is_float(self) -> bool {
        matches!(
            self,
            Predicate::Oeq
                | Predicate::One
                | Predicate::Olt
                | Predicate::Ole
                | Predicate::Ogt
                | Predicate::Oge
        )
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Predicate::Eq => "eq",
            Predicate::Ne => "ne",
            Predicate::Slt => "slt",
            Predicate::Sle => "sle",
            Predicate::Sgt => "sgt",
            Predicate::Sge => "sge",
            Predicate::Oeq => "oeq",
            Predicate::One => "one",
            Predicate::Olt => "olt",
            Predicate::Ole => "ole",
            Predicate::Ogt => "ogt",
            Predicate::Oge => "oge",
        };
        write!(f, "{}", name)
    }
}

impl Display for CastOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            CastOp::SiToFp => "sitofp",
            CastOp::FpToSi => "fptosi",
            CastOp::ZExt => "zext",
        };
        write!(f, "{}", name)
    }
}

fn escape(text: &str) -> String {
    text.bytes()
        .map(|byte| match byte {
            b' '..=b'~' if byte != b'"' && byte != b'\\' => (byte as char).to_string(),
            _ => format!("\\{:02X}", byte),
        })
        .collect()
}

struct Operand<'a> {
    value: &'a Value,
    function: &'a Function,
    module: &'a Module,
}

impl Display for Operand<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Int(value) => write!(f, "{}", value),
            Value::I32(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{:?}", value),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Null => write!(f, "null"),
            Value::Inst(id) => write!(f, "%{}", self.function.inst(*id).name),
            Value::Param(index) => match self.function.params.get(*index as usize) {
                Some((name, _)) => write!(f, "%{}", name),
                None => write!(f, "%arg{}", index),
            },
            Value::Global(id) => write!(f, "@{}", self.module[*id].name),
            Value::Str(id) => write!(f, "@.str.{}", id.0),
        }
    }
}

fn typed(value: &Value, function: &Function, module: &Module) -> String {
    format!(
        "{} {}",
        function.value_type(value),
        Operand {
            value,
            function,
            module
        }
    )
}

fn write_function(f: &mut Formatter<'_>, function: &Function, module: &Module) -> fmt::Result {
    let params = function
        .params
        .iter()
        .map(|(name, ty)| format!("{} %{}", ty, name))
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(f, "define {} @{}({}) {{", function.ret, function.name, params)?;

    let operand = |value: &Value| {
        Operand {
            value,
            function,
            module,
        }
        .to_string()
    };
    let label = |block: &BlockId| format!("%{}", function.block(*block).name);

    for (index, block) in function.blocks.iter().enumerate() {
        if index > 0 {
            writeln!(f)?;
        }
        writeln!(f, "{}:", block.name)?;

        for id in &block.instructions {
            let data = function.inst(*id);
            let body = match &data.inst {
                Instruction::Alloca { ty } => format!("alloca {}", ty),
                Instruction::Load { ty, ptr } => format!("load {}, ptr {}", ty, operand(ptr)),
                Instruction::Store { value, ptr } => {
                    format!("store {}, ptr {}", typed(value, function, module), operand(ptr))
                }
                Instruction::Binary { op, lhs, rhs } => format!(
                    "{} {}, {}",
                    op,
                    typed(lhs, function, module),
                    operand(rhs)
                ),
                Instruction::Compare { pred, lhs, rhs } => format!(
                    "{} {} {}, {}",
                    if pred.is_float() { "fcmp" } else { "icmp" },
                    pred,
                    typed(lhs, function, module),
                    operand(rhs)
                ),
                Instruction::Cast { op, value, to } => {
                    format!("{} {} to {}", op, typed(value, function, module), to)
                }
                Instruction::FieldAddr { base, index } => {
                    format!("getelementptr i64, ptr {}, i64 {}", operand(base), index)
                }
                Instruction::Call { callee, args, ret } => format!(
                    "call {} @{}({})",
                    ret,
                    callee,
                    args.iter()
                        .map(|arg| typed(arg, function, module))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            };

            if data.ty == IrType::Void {
                writeln!(f, "  {}", body)?;
            } else {
                writeln!(f, "  %{} = {}", data.name, body)?;
            }
        }

        match &block.terminator {
            Some(Terminator::Br(target)) => writeln!(f, "  br label {}", label(target))?,
            Some(Terminator::CondBr {
                cond,
                then_block,
                else_block,
            }) => writeln!(
                f,
                "  br i1 {}, label {}, label {}",
                operand(cond),
                label(then_block),
                label(else_block)
            )?,
            Some(Terminator::Ret(Some(value))) => {
                writeln!(f, "  ret {}", typed(value, function, module))?
            }
            Some(Terminator::Ret(None)) => writeln!(f, "  ret void")?,
            Some(Terminator::Unreachable) => writeln!(f, "  unreachable")?,
            None => writeln!(f, "  ; missing terminator")?,
        }
    }

    writeln!(f, "}}")
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;

        for (index, text) in self.strings.iter().enumerate() {
            writeln!(
                f,
                "@.str.{} = private constant [{} x i8] c\"{}\"",
                index,
                text.len(),
                escape(text)
            )?;
        }
        for global in &self.globals {
            writeln!(f, "@{} = global {} zeroinitializer", global.name, global.ty)?;
        }
        if !self.strings.is_empty() || !self.globals.is_empty() {
            writeln!(f)?;
        }

        for decl in &self.externs {
            let params = decl
                .params
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "declare {} @{}({})", decl.ret, decl.name, params)?;
        }

        for function in &self.functions {
            writeln!(f)?;
            write_function(f, function, self)?;
        }

        Ok(())
    }
}
