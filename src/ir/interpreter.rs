//! Executes an IR module against the reference runtime.
//!
//! This is what `serpentc --run` and the end to end tests use. Program output
//! is captured instead of written to the terminal, and the heap counters are
//! handed back so reference count balance can be checked after the run.

use std::collections::BTreeMap;

use crate::{
    errors::errors::{Error, ErrorImpl},
    internal_error,
    runtime::{
        abi::{RT_EXIT, RT_PRINT_ERROR},
        heap::{
            float_floor_div, float_mod, floor_div, floor_mod, format_float, ElementKind, Handle,
            Heap, HeapError, HeapStats, Payload, Word,
        },
    },
    Position,
};

use super::ir::{
    BinaryOp, CastOp, Function, InstId, Instruction, IrType, Module, Predicate, Terminator, Value,
};

const MAX_CALL_DEPTH: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Address {
    Stack(usize),
    Global(usize),
    /// Slot `index` of a record block.
    Field(Handle, usize),
    Static(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Val {
    Int(i64),
    I32(i32),
    Float(f64),
    Bool(bool),
    Null,
    Ref(Handle),
    Addr(Address),
    Void,
}

/// Why execution stopped early.
enum Stop {
    Exit(i32),
    Fault(Error),
}

type Exec<T> = Result<T, Stop>;

/// The observable result of running a program.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub stats: HeapStats,
    /// Blocks still allocated when the program ended.
    pub live_blocks: usize,
    /// How often each runtime function was called.
    pub runtime_calls: BTreeMap<String, usize>,
}

impl Execution {
    pub fn calls(&self, name: &str) -> usize {
        self.runtime_calls.get(name).copied().unwrap_or(0)
    }
}

fn fault(message: String) -> Stop {
    Stop::Fault(internal_error!(
        ErrorImpl::MalformedIr { message },
        Position::null()
    ))
}

fn heap_fault(error: HeapError) -> Stop {
    Stop::Fault(internal_error!(
        ErrorImpl::HeapFault {
            message: error.to_string()
        },
        Position::null()
    ))
}

fn zero(ty: IrType) -> Val {
    match ty {
        IrType::I1 => Val::Bool(false),
        IrType::I32 => Val::I32(0),
        IrType::I64 => Val::Int(0),
        IrType::F64 => Val::Float(0.0),
        IrType::Ptr => Val::Null,
        IrType::Void => Val::Void,
    }
}

fn to_word(value: Val) -> Exec<Word> {
    match value {
        Val::Int(value) => Ok(Word::Int(value)),
        Val::Float(value) => Ok(Word::Float(value)),
        Val::Bool(value) => Ok(Word::Bool(value)),
        Val::Ref(handle) => Ok(Word::Ref(handle)),
        Val::Null => Ok(Word::Null),
        other => Err(fault(format!("{:?} cannot be stored in a heap slot", other))),
    }
}

fn from_word(word: Word) -> Val {
    match word {
        Word::Int(value) => Val::Int(value),
        Word::Float(value) => Val::Float(value),
        Word::Bool(value) => Val::Bool(value),
        Word::Ref(handle) => Val::Ref(handle),
        Word::Null => Val::Null,
    }
}

pub struct Interpreter<'m> {
    module: &'m Module,
    heap: Heap,
    stack: Vec<Val>,
    globals: Vec<Val>,
    stdout: String,
    stderr: String,
    depth: usize,
    runtime_calls: BTreeMap<String, usize>,
}

/// Runs `main` of `module` to completion.
///
/// A trap of the program itself, like a failed index, ends the run with a
/// nonzero exit code and is not an `Err`. Malformed IR and reference count
/// violations are internal errors.
#[tracing::instrument(level = "debug", skip_all, fields(module = %module.name))]
pub fn run(module: &Module) -> Result<Execution, Error> {
    let mut interpreter = Interpreter::new(module);

    let exit_code = match interpreter.run_main() {
        Ok(code) => code,
        Err(Stop::Exit(code)) => code,
        Err(Stop::Fault(error)) => return Err(error),
    };

    tracing::debug!(exit_code, stats = ?interpreter.heap.stats(), "program finished");

    Ok(Execution {
        stdout: interpreter.stdout,
        stderr: interpreter.stderr,
        exit_code,
        stats: interpreter.heap.stats(),
        live_blocks: interpreter.heap.live_blocks(),
        runtime_calls: interpreter.runtime_calls,
    })
}

impl<'m> Interpreter<'m> {
    pub fn new(module: &'m Module) -> Self {
        Interpreter {
            module,
            heap: Heap::new(),
            stack: vec![],
            globals: module.globals.iter().map(|global| zero(global.ty)).collect(),
            stdout: String::new(),
            stderr: String::new(),
            depth: 0,
            runtime_calls: BTreeMap::new(),
        }
    }

    fn run_main(&mut self) -> Exec<i32> {
        let Some(main) = self.module.function("main") else {
            return Err(fault(String::from("module has no main function")));
        };

        match self.call_function(main, vec![])? {
            Val::I32(code) => Ok(code),
            Val::Void => Ok(0),
            other => Err(fault(format!("main returned {:?}", other))),
        }
    }

    fn call_function(&mut self, function: &'m Function, args: Vec<Val>) -> Exec<Val> {
        if args.len() != function.params.len() {
            return Err(fault(format!(
                "{} called with {} arguments, takes {}",
                function.name,
                args.len(),
                function.params.len()
            )));
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(self.trap(String::from("RecursionError: maximum recursion depth exceeded")));
        }

        self.depth += 1;
        let frame = self.stack.len();
        let mut registers = vec![Val::Void; function.insts.len()];
        let mut block = function.entry();

        let result = loop {
            let current = function.block(block);

            for id in &current.instructions {
                let value = self.execute(function, &registers, &args, *id)?;
                registers[id.0 as usize] = value;
            }

            match &current.terminator {
                Some(Terminator::Br(target)) => block = *target,
                Some(Terminator::CondBr {
                    cond,
                    then_block,
                    else_block,
                }) => {
                    block = match self.eval(cond, &registers, &args) {
                        Val::Bool(true) => *then_block,
                        Val::Bool(false) => *else_block,
                        other => return Err(fault(format!("branch on {:?}", other))),
                    }
                }
                Some(Terminator::Ret(value)) => {
                    break value
                        .as_ref()
                        .map(|value| self.eval(value, &registers, &args))
                        .unwrap_or(Val::Void)
                }
                Some(Terminator::Unreachable) => {
                    return Err(fault(format!("reached unreachable in {}", function.name)))
                }
                None => {
                    return Err(fault(format!(
                        "block {} of {} has no terminator",
                        current.name, function.name
                    )))
                }
            }
        };

        self.stack.truncate(frame);
        self.depth -= 1;
        Ok(result)
    }

    fn eval(&self, value: &Value, registers: &[Val], args: &[Val]) -> Val {
        match value {
            Value::Int(value) => Val::Int(*value),
            Value::I32(value) => Val::I32(*value),
            Value::Float(value) => Val::Float(*value),
            Value::Bool(value) => Val::Bool(*value),
            Value::Null => Val::Null,
            Value::Inst(id) => registers.get(id.0 as usize).copied().unwrap_or(Val::Void),
            Value::Param(index) => args.get(*index as usize).copied().unwrap_or(Val::Void),
            Value::Global(id) => Val::Addr(Address::Global(id.0 as usize)),
            Value::Str(id) => Val::Addr(Address::Static(id.0 as usize)),
        }
    }

    fn execute(
        &mut self,
        function: &'m Function,
        registers: &[Val],
        args: &[Val],
        id: InstId,
    ) -> Exec<Val> {
        let data = function.inst(id);
        let eval = |value: &Value| self.eval(value, registers, args);

        match &data.inst {
            Instruction::Alloca { ty } => {
                self.stack.push(zero(*ty));
                Ok(Val::Addr(Address::Stack(self.stack.len() - 1)))
            }
            Instruction::Load { ptr, .. } => {
                let address = address(eval(ptr))?;
                self.read(address)
            }
            Instruction::Store { value, ptr } => {
                let value = eval(value);
                let address = address(eval(ptr))?;
                self.write(address, value)?;
                Ok(Val::Void)
            }
            Instruction::Binary { op, lhs, rhs } => binary(*op, eval(lhs), eval(rhs)),
            Instruction::Compare { pred, lhs, rhs } => compare(*pred, eval(lhs), eval(rhs)),
            Instruction::Cast { op, value, .. } => match (op, eval(value)) {
                (CastOp::SiToFp, Val::Int(value)) => Ok(Val::Float(value as f64)),
                (CastOp::FpToSi, Val::Float(value)) => Ok(Val::Int(value as i64)),
                (CastOp::ZExt, Val::Bool(value)) => Ok(Val::Int(value as i64)),
                (op, value) => Err(fault(format!("{:?} applied to {:?}", op, value))),
            },
            Instruction::FieldAddr { base, index } => match eval(base) {
                Val::Addr(Address::Field(handle, offset)) => Ok(Val::Addr(Address::Field(
                    handle,
                    offset + *index as usize,
                ))),
                other => Err(fault(format!("field address of {:?}", other))),
            },
            Instruction::Call { callee, args: call_args, .. } => {
                let values: Vec<Val> = call_args.iter().map(eval).collect();

                match self.module.function(callee) {
                    Some(target) => self.call_function(target, values),
                    None => self.call_runtime(callee, values),
                }
            }
        }
    }

    fn read(&self, address: Address) -> Exec<Val> {
        match address {
            Address::Stack(index) => self
                .stack
                .get(index)
                .copied()
                .ok_or_else(|| fault(format!("stack slot {} out of range", index))),
            Address::Global(index) => self
                .globals
                .get(index)
                .copied()
                .ok_or_else(|| fault(format!("global {} out of range", index))),
            Address::Field(handle, index) => self
                .heap
                .field(handle, index)
                .map(from_word)
                .map_err(heap_fault),
            Address::Static(index) => Err(fault(format!("load from static string {}", index))),
        }
    }

    fn write(&mut self, address: Address, value: Val) -> Exec<()> {
        let slot = match address {
            Address::Stack(index) => self.stack.get_mut(index),
            Address::Global(index) => self.globals.get_mut(index),
            Address::Field(handle, index) => {
                let word = to_word(value)?;
                return self
                    .heap
                    .set_field(handle, index, word)
                    .map_err(heap_fault);
            }
            Address::Static(index) => {
                return Err(fault(format!("store to static string {}", index)))
            }
        };

        match slot {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(fault(format!("store to {:?} out of range", address))),
        }
    }

    /// Prints the message of a failing program and exits with status 1.
    fn trap(&mut self, message: String) -> Stop {
        self.stderr.push_str(&message);
        self.stderr.push('\n');
        Stop::Exit(1)
    }

    fn heap_result<T>(&mut self, result: Result<T, HeapError>) -> Exec<T> {
        match result {
            Ok(value) => Ok(value),
            Err(HeapError::Trap(message)) => Err(self.trap(message)),
            Err(error) => Err(heap_fault(error)),
        }
    }

    fn static_text(&self, value: Val, len: Val) -> Exec<String> {
        match (value, len) {
            (Val::Addr(Address::Static(index)), Val::Int(len)) => self
                .module
                .strings
                .get(index)
                .and_then(|text| text.get(..len as usize))
                .map(str::to_string)
                .ok_or_else(|| fault(format!("static string {} out of range", index))),
            other => Err(fault(format!("{:?} is not a static string", other))),
        }
    }

    fn text(&self, value: Val) -> Exec<String> {
        let handle = handle(value, "text helper")?;
        self.heap
            .text(handle)
            .map(str::to_string)
            .map_err(heap_fault)
    }

    fn new_text(&mut self, text: String) -> Val {
        Val::Ref(self.heap.alloc_text(text))
    }

    fn call_runtime(&mut self, name: &str, args: Vec<Val>) -> Exec<Val> {
        *self.runtime_calls.entry(name.to_string()).or_insert(0) += 1;
        let arg = |index: usize| args.get(index).copied().unwrap_or(Val::Void);

        match name {
            "rt_alloc" => {
                let fields = int(arg(0))?;
                Ok(Val::Ref(self.heap.alloc_record(fields.max(0) as usize)))
            }
            "rt_retain" => {
                let handle = handle(arg(0), name)?;
                let result = self.heap.retain(handle);
                self.heap_result(result).map(|count| Val::Int(count as i64))
            }
            "rt_release" => {
                let handle = handle(arg(0), name)?;
                let result = self.heap.release(handle);
                self.heap_result(result).map(|count| Val::Int(count as i64))
            }
            "rt_data" => Ok(Val::Addr(Address::Field(handle(arg(0), name)?, 0))),
            "rt_reclaim" => {
                let result = self.heap.reclaim();
                self.heap_result(result).map(|_| Val::Void)
            }
            "rt_str_from_static" => {
                let text = self.static_text(arg(0), arg(1))?;
                Ok(self.new_text(text))
            }
            "rt_str_concat" => {
                let text = self.text(arg(0))? + &self.text(arg(1))?;
                Ok(self.new_text(text))
            }
            "rt_str_eq" => Ok(Val::Bool(self.text(arg(0))? == self.text(arg(1))?)),
            "rt_str_len" => Ok(Val::Int(self.text(arg(0))?.chars().count() as i64)),
            "rt_str_from_int" => {
                let text = int(arg(0))?.to_string();
                Ok(self.new_text(text))
            }
            "rt_str_from_float" => {
                let text = format_float(float(arg(0))?);
                Ok(self.new_text(text))
            }
            "rt_str_from_bool" => {
                let text = String::from(if boolean(arg(0))? { "True" } else { "False" });
                Ok(self.new_text(text))
            }
            "rt_str_to_int" => {
                let text = self.text(arg(0))?;
                match text.trim().parse::<i64>() {
                    Ok(value) => Ok(Val::Int(value)),
                    Err(_) => Err(self.trap(format!(
                        "ValueError: invalid literal for int() with base 10: '{}'",
                        text
                    ))),
                }
            }
            "rt_to_str" => {
                let handle = handle(arg(0), name)?;
                let result = self.heap.display(Word::Ref(handle), false);
                let text = self.heap_result(result)?;
                Ok(self.new_text(text))
            }
            "rt_str_encode" => {
                let elements = self
                    .text(arg(0))?
                    .bytes()
                    .map(|byte| Word::Int(byte as i64))
                    .collect();
                Ok(Val::Ref(self.heap.alloc(Payload::List {
                    kind: ElementKind::Int,
                    elements,
                })))
            }
            "rt_str_decode" => {
                let handle = handle(arg(0), name)?;
                let result = self.heap.list(handle).cloned();
                let bytes = self
                    .heap_result(result)?
                    .into_iter()
                    .map(|word| match word {
                        Word::Int(byte) => Ok(byte as u8),
                        other => Err(fault(format!("decode of {:?}", other))),
                    })
                    .collect::<Exec<Vec<u8>>>()?;

                match String::from_utf8(bytes) {
                    Ok(text) => Ok(self.new_text(text)),
                    Err(_) => Err(self.trap(String::from(
                        "UnicodeDecodeError: invalid utf-8 byte sequence",
                    ))),
                }
            }
            "rt_list_new" => Ok(Val::Ref(self.heap.alloc(Payload::List {
                kind: ElementKind::from_code(int(arg(0))?),
                elements: vec![],
            }))),
            "rt_list_len" => {
                let handle = handle(arg(0), name)?;
                let result = self.heap.list(handle).map(|elements| elements.len() as i64);
                self.heap_result(result).map(Val::Int)
            }
            "rt_list_check" => {
                let handle = handle(arg(0), name)?;
                let result = self.heap.list_check(handle, int(arg(1))?);
                self.heap_result(result).map(Val::Bool)
            }
            "rt_dict_new" => Ok(Val::Ref(self.heap.alloc(Payload::Dict {
                kind: ElementKind::from_code(int(arg(0))?),
                entries: vec![],
            }))),
            "rt_dict_len" => {
                let handle = handle(arg(0), name)?;
                let result = self.heap.dict(handle).map(|entries| entries.len() as i64);
                self.heap_result(result).map(Val::Int)
            }
            "rt_dict_has" => {
                let handle = handle(arg(0), name)?;
                let key = self.text(arg(1))?;
                let result = self.heap.dict_get(handle, &key).map(|word| word.is_some());
                self.heap_result(result).map(Val::Bool)
            }
            "rt_int_floordiv" => {
                let result = floor_div(int(arg(0))?, int(arg(1))?);
                self.heap_result(result).map(Val::Int)
            }
            "rt_int_mod" => {
                let result = floor_mod(int(arg(0))?, int(arg(1))?);
                self.heap_result(result).map(Val::Int)
            }
            "rt_float_floordiv" => {
                let result = float_floor_div(float(arg(0))?, float(arg(1))?);
                self.heap_result(result).map(Val::Float)
            }
            "rt_float_mod" => {
                let result = float_mod(float(arg(0))?, float(arg(1))?);
                self.heap_result(result).map(Val::Float)
            }
            "rt_print_int" => {
                self.stdout.push_str(&int(arg(0))?.to_string());
                Ok(Val::Void)
            }
            "rt_print_float" => {
                self.stdout.push_str(&format_float(float(arg(0))?));
                Ok(Val::Void)
            }
            "rt_print_bool" => {
                self.stdout
                    .push_str(if boolean(arg(0))? { "True" } else { "False" });
                Ok(Val::Void)
            }
            "rt_print_str" => {
                let text = self.text(arg(0))?;
                self.stdout.push_str(&text);
                Ok(Val::Void)
            }
            "rt_print_sep" => {
                self.stdout.push(' ');
                Ok(Val::Void)
            }
            "rt_print_newline" => {
                self.stdout.push('\n');
                Ok(Val::Void)
            }
            RT_PRINT_ERROR => {
                let message = self.static_text(arg(0), arg(1))?;
                self.stderr.push_str(&message);
                self.stderr.push('\n');
                Ok(Val::Void)
            }
            RT_EXIT => Err(Stop::Exit(int(arg(0))? as i32)),
            _ => self.call_container_helper(name, &args),
        }
    }

    /// The typed `rt_list_*` and `rt_dict_*` helpers. Heap slots are tagged,
    /// so the suffix only matters to a native runtime.
    fn call_container_helper(&mut self, name: &str, args: &[Val]) -> Exec<Val> {
        let arg = |index: usize| args.get(index).copied().unwrap_or(Val::Void);
        let Some((operation, _)) = name.rsplit_once('_') else {
            return Err(fault(format!("call to undefined function {}", name)));
        };

        match operation {
            "rt_list_get" => {
                let result = self.heap.list_get(handle(arg(0), name)?, int(arg(1))?);
                self.heap_result(result).map(from_word)
            }
            "rt_list_set" => {
                let word = to_word(arg(2))?;
                let result = self.heap.list_set(handle(arg(0), name)?, int(arg(1))?, word);
                self.heap_result(result).map(|_| Val::Void)
            }
            "rt_list_push" => {
                let word = to_word(arg(1))?;
                let result = self.heap.list_push(handle(arg(0), name)?, word);
                self.heap_result(result).map(|_| Val::Void)
            }
            "rt_list_pop" => {
                let result = self.heap.list_pop(handle(arg(0), name)?);
                self.heap_result(result).map(from_word)
            }
            "rt_dict_get" => {
                let handle = handle(arg(0), name)?;
                let key = self.text(arg(1))?;
                let result = self.heap.dict_get(handle, &key);
                match self.heap_result(result)? {
                    Some(word) => Ok(from_word(word)),
                    None => Err(fault(format!("unchecked lookup of missing key {:?}", key))),
                }
            }
            "rt_dict_set" => {
                let handle = handle(arg(0), name)?;
                let key = self.text(arg(1))?;
                let word = to_word(arg(2))?;
                let result = self.heap.dict_set(handle, &key, word);
                self.heap_result(result).map(|_| Val::Void)
            }
            _ => Err(fault(format!("call to undefined function {}", name))),
        }
    }
}

fn address(value: Val) -> Exec<Address> {
    match value {
        Val::Addr(address) => Ok(address),
        other => Err(fault(format!("{:?} is not an address", other))),
    }
}

fn handle(value: Val, user: &str) -> Exec<Handle> {
    match value {
        Val::Ref(handle) => Ok(handle),
        Val::Null => Err(Stop::Fault(internal_error!(
            ErrorImpl::HeapFault {
                message: format!("null pointer passed to {}", user)
            },
            Position::null()
        ))),
        other => Err(fault(format!("{:?} passed to {} as a block", other, user))),
    }
}

fn int(value: Val) -> Exec<i64> {
    match value {
        Val::Int(value) => Ok(value),
        other => Err(fault(format!("expected i64, found {:?}", other))),
    }
}

fn float(value: Val) -> Exec<f64> {
    match value {
        Val::Float(value) => Ok(value),
        other => Err(fault(format!("expected double, found {:?}", other))),
    }
}

fn boolean(value: Val) -> Exec<bool> {
    match value {
        Val::Bool(value) => Ok(value),
        other => Err(fault(format!("expected i1, found {:?}", other))),
    }
}

fn binary(op: BinaryOp, lhs: Val, rhs: Val) -> Exec<Val> {
    match (op, lhs, rhs) {
        (BinaryOp::Add, Val::Int(a), Val::Int(b)) => Ok(Val::Int(a.wrapping_add(b))),
        (BinaryOp::Sub, Val::Int(a), Val::Int(b)) => Ok(Val::Int(a.wrapping_sub(b))),
        (BinaryOp::Mul, Val::Int(a), Val::Int(b)) => Ok(Val::Int(a.wrapping_mul(b))),
        (BinaryOp::FAdd, Val::Float(a), Val::Float(b)) => Ok(Val::Float(a + b)),
        (BinaryOp::FSub, Val::Float(a), Val::Float(b)) => Ok(Val::Float(a - b)),
        (BinaryOp::FMul, Val::Float(a), Val::Float(b)) => Ok(Val::Float(a * b)),
        (BinaryOp::FDiv, Val::Float(a), Val::Float(b)) => Ok(Val::Float(a / b)),
        (BinaryOp::Xor, Val::Bool(a), Val::Bool(b)) => Ok(Val::Bool(a ^ b)),
        (BinaryOp::Xor, Val::Int(a), Val::Int(b)) => Ok(Val::Int(a ^ b)),
        (op, lhs, rhs) => Err(fault(format!("{} applied to {:?} and {:?}", op, lhs, rhs))),
    }
}

fn compare(pred: Predicate, lhs: Val, rhs: Val) -> Exec<Val> {
    let result = match (lhs, rhs) {
        (Val::Int(a), Val::Int(b)) => match pred {
            Predicate::Eq => a == b,
            Predicate::Ne => a != b,
            Predicate::Slt => a < b,
            Predicate::Sle => a <= b,
            Predicate::Sgt => a > b,
            Predicate::Sge => a >= b,
            _ => return Err(fault(format!("{} on integers", pred))),
        },
        (Val::Float(a), Val::Float(b)) => match pred {
            Predicate::Oeq => a == b,
            Predicate::One => a != b && !a.is_nan() && !b.is_nan(),
            Predicate::Olt => a < b,
            Predicate::Ole => a <= b,
            Predicate::Ogt => a > b,
            Predicate::Oge => a >= b,
            _ => return Err(fault(format!("{} on floats", pred))),
        },
        (Val::Bool(a), Val::Bool(b)) => match pred {
            Predicate::Eq => a == b,
            Predicate::Ne => a != b,
            _ => return Err(fault(format!("{} on booleans", pred))),
        },
        (a @ (Val::Ref(_) | Val::Null), b @ (Val::Ref(_) | Val::Null)) => match pred {
            Predicate::Eq => a == b,
            Predicate::Ne => a != b,
            _ => return Err(fault(format!("{} on pointers", pred))),
        },
        (a, b) => return Err(fault(format!("{} applied to {:?} and {:?}", pred, a, b))),
    };

    Ok(Val::Bool(result))
}
