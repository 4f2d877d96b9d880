//! Main lowering module.
//!
//! This module contains the core Compiler structure and drives lowering of a
//! typed program into an IR module. It owns the module being built, the
//! builder of the function being filled and the storage of every binding
//! visible to that function.

use std::collections::HashMap;

use crate::{
    ast::{
        ast::{Ast, BindingSite, NodeId, NodeKind, Scope},
        types::Type,
    },
    errors::errors::{Error, ErrorImpl},
    internal_error,
    ir::{
        builder::Builder,
        ir::{IrType, Module, Value},
    },
    runtime::abi,
    type_checker::{
        environment::Environment, scope::scope_path, type_checker::TypedProgram,
    },
    Position,
};

use super::{
    refcount::{release_globals, release_slots},
    stmt::gen_block,
};

/// Prefix of every lowered user function, so that no user name can collide
/// with `main` or a runtime function.
pub const FUNCTION_PREFIX: &str = "sp.";
const GLOBAL_PREFIX: &str = "g.";

/// A stack slot or module global holding a binding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Storage {
    pub ptr: Value,
    pub ty: IrType,
}

/// The function currently being lowered.
#[derive(Debug, Clone)]
pub struct FunctionState {
    pub key: String,
    pub ret: IrType,
}

/// The main lowering structure that holds the state of the lowering process.
///
/// This structure manages:
/// - The IR module and the builder of the current function
/// - Storage of globals and of the current function's locals
/// - The heap slots released at every exit of the current function
/// - Owned temporaries of the statement being lowered
pub struct Compiler<'p> {
    /// The typed program being lowered
    pub ast: &'p Ast,
    pub env: &'p Environment,

    /// The IR module being built
    pub module: Module,
    /// The builder of the function being filled
    pub builder: Builder,

    /// Module globals by variable name
    pub globals: HashMap<String, Storage>,
    /// Stack slots of the current function
    pub locals: HashMap<BindingSite, Storage>,
    /// Heap-typed stack slots of the current function, in creation order
    pub heap_slots: Vec<Value>,
    /// Owned temporaries of the current statement, released at its end
    pub temps: Vec<Value>,

    /// `None` while lowering `main`
    pub function: Option<FunctionState>,
}

/// Maps a resolved type onto its machine type.
///
/// # Arguments
///
/// * `ty` - The type assigned by the resolver
///
/// # Returns
///
/// The IR type, or an internal error for types that never reach lowering.
pub fn ir_type(ty: &Type) -> Result<IrType, Error> {
    match ty {
        Type::Int => Ok(IrType::I64),
        Type::Float => Ok(IrType::F64),
        Type::Bool => Ok(IrType::I1),
        Type::Void => Ok(IrType::Void),
        ty if ty.is_heap() => Ok(IrType::Ptr),
        Type::Unresolved => Err(internal_error!(
            ErrorImpl::UnresolvedType {
                context: String::from("lowering")
            },
            Position::null()
        )),
        other => Err(internal_error!(
            ErrorImpl::InternalInvariant {
                message: format!("{} has no machine representation", other)
            },
            Position::null()
        )),
    }
}

/// The value a fresh slot of this type holds.
pub fn zero_value(ty: IrType) -> Value {
    match ty {
        IrType::I1 => Value::Bool(false),
        IrType::I32 => Value::I32(0),
        IrType::F64 => Value::Float(0.0),
        IrType::Ptr => Value::Null,
        IrType::I64 | IrType::Void => Value::Int(0),
    }
}

impl<'p> Compiler<'p> {
    /// Creates a new Compiler for a typed program.
    ///
    /// # Arguments
    ///
    /// * `program` - The resolved, pruned program
    /// * `file_name` - Name of the file being compiled (used for module naming)
    pub fn new(program: &'p TypedProgram, file_name: &str) -> Self {
        Compiler {
            ast: &program.ast,
            env: &program.env,
            module: Module::new(file_name),
            builder: Builder::new("", vec![], IrType::Void),
            globals: HashMap::new(),
            locals: HashMap::new(),
            heap_slots: vec![],
            temps: vec![],
            function: None,
        }
    }

    pub fn error(&self, kind: ErrorImpl, at: NodeId) -> Error {
        internal_error!(kind, self.ast[at].span.start.clone())
    }

    /// Storage of a binding.
    ///
    /// # Arguments
    ///
    /// * `site` - Where the resolver bound the variable
    /// * `at` - Node used for the error position
    ///
    /// # Returns
    ///
    /// The slot or global, or a `MissingStorage` internal error.
    pub fn storage(&self, site: &BindingSite, at: NodeId) -> Result<Storage, Error> {
        let storage = match site {
            BindingSite::Global(name) => self.globals.get(name),
            BindingSite::Local { .. } => self.locals.get(site),
        };

        storage.copied().ok_or_else(|| {
            self.error(
                ErrorImpl::MissingStorage {
                    variable: site.name().to_string(),
                },
                at,
            )
        })
    }

    /// Binding storage of a variable, assignment or loop node.
    pub fn binding_storage(&self, id: NodeId) -> Result<Storage, Error> {
        match &self.ast[id].binding {
            Some(site) => self.storage(site, id),
            None => Err(self.error(
                ErrorImpl::MissingStorage {
                    variable: match &self.ast[id].kind {
                        NodeKind::Variable { name } => name.clone(),
                        NodeKind::For { variable, .. } => variable.clone(),
                        _ => String::from("<binding>"),
                    },
                },
                id,
            )),
        }
    }

    /// Declares a runtime function on first use and calls it.
    ///
    /// # Arguments
    ///
    /// * `name` - Runtime function name from `runtime::abi`
    /// * `args` - Arguments, already of the parameter types
    /// * `result` - Name of the result value
    pub fn call_runtime(&mut self, name: &str, args: Vec<Value>, result: &str) -> Result<Value, Error> {
        let Some(decl) = abi::declaration(name) else {
            return Err(internal_error!(
                ErrorImpl::MalformedIr {
                    message: format!("{} is not a runtime function", name)
                },
                Position::null()
            ));
        };

        let ret = decl.ret;
        self.module.declare_extern(decl);
        self.builder.build_call(name, args, ret, result)
    }

    /// Static bytes of `text` as a fresh runtime string.
    pub fn static_text(&mut self, text: &str) -> Result<Value, Error> {
        let bytes = self.module.add_string(text);
        self.call_runtime(
            "rt_str_from_static",
            vec![bytes, Value::Int(text.len() as i64)],
            "str",
        )
    }

    /// Definition node and scope of a struct or class type.
    pub fn record_scope(&self, ty: &Type, at: NodeId) -> Result<(NodeId, &'p Scope), Error> {
        let ast = self.ast;
        let def = match ty {
            Type::Struct(name) => self.env.struct_def(name),
            Type::Instance(name) => self.env.class_def(name),
            _ => None,
        };

        match def.and_then(|def| ast.scope(def).map(|scope| (def, scope))) {
            Some(record) => Ok(record),
            None => Err(self.error(
                ErrorImpl::InternalInvariant {
                    message: format!("{} is not a record type", ty)
                },
                at,
            )),
        }
    }

    /// Creates a new basic block in the current function.
    pub fn create_basic_block(&mut self, name: &str) -> crate::ir::ir::BlockId {
        self.builder.append_basic_block(name)
    }

    /// Creates the module globals, one for every global binding, typed with
    /// the binding's final type.
    fn create_globals(&mut self) -> Result<(), Error> {
        let env = self.env;
        for (name, entry) in env.globals() {
            let ty = ir_type(&entry.ty)?;
            let ptr = self
                .module
                .add_global(&format!("{}{}", GLOBAL_PREFIX, name), ty);

            tracing::trace!(global = name, ty = %ty, "storage created");
            self.globals.insert(name.to_string(), Storage { ptr, ty });
        }

        Ok(())
    }

    /// Starts a new function and positions the builder in its entry block.
    ///
    /// # Arguments
    ///
    /// * `name` - IR name of the function
    /// * `params` - Parameter names and types
    /// * `ret` - Return type
    fn create_function(&mut self, name: &str, params: Vec<(String, IrType)>, ret: IrType) {
        self.builder = Builder::new(name, params, ret);
        self.locals.clear();
        self.heap_slots.clear();
        self.temps.clear();

        let entry = self.create_basic_block("entry");
        self.builder.position_at_end(entry);
    }

    /// Hands the finished function to the module.
    fn finish_function(&mut self) -> Result<(), Error> {
        let builder = std::mem::replace(&mut self.builder, Builder::new("", vec![], IrType::Void));
        let function = builder.finish()?;

        tracing::debug!(
            function = %function.name,
            blocks = function.blocks.len(),
            instructions = function.insts.len(),
            "function lowered"
        );
        self.module.functions.push(function);
        Ok(())
    }

    /// Lowers the function behind one fixed signature.
    ///
    /// Every local of the function gets an entry-block slot up front; heap
    /// slots start null so that the releases at each exit are always safe.
    /// Parameters are then copied into their slots.
    fn lower_function(&mut self, key: &str) -> Result<(), Error> {
        let (ast, env) = (self.ast, self.env);
        let Some(signature) = env.signature(key) else {
            return Ok(());
        };
        let (Some(param_types), Some(ret)) = (signature.param_types(), signature.return_type())
        else {
            tracing::debug!(function = key, "skipping function without a fixed signature");
            return Ok(());
        };

        let def = signature.node;
        let NodeKind::FunctionDef(function) = &ast[def].kind else {
            return Err(self.error(
                ErrorImpl::InternalInvariant {
                    message: format!("signature {} does not point at a function", key)
                },
                def,
            ));
        };

        let params = signature
            .params
            .iter()
            .zip(param_types)
            .map(|(name, ty)| Ok((name.clone(), ir_type(ty)?)))
            .collect::<Result<Vec<_>, Error>>()?;
        let ret = ir_type(ret)?;

        self.create_function(&format!("{}{}", FUNCTION_PREFIX, key), params.clone(), ret);
        self.function = Some(FunctionState {
            key: key.to_string(),
            ret,
        });

        let Some(scope) = ast.scope(def) else {
            return Err(self.error(
                ErrorImpl::InternalInvariant {
                    message: format!("function {} has no scope", key)
                },
                def,
            ));
        };
        let path = scope_path(ast, def);

        for name in &scope.local_order {
            let Some(entry) = scope.locals.get(name) else {
                continue;
            };
            let ty = ir_type(&entry.ty)?;
            let ptr = self
                .builder
                .build_entry_alloca(ty, &format!("{}.{}", name, path))?;

            if ty == IrType::Ptr {
                self.builder.build_store(ptr, Value::Null)?;
                self.heap_slots.push(ptr);
            }

            tracing::trace!(function = key, variable = %name, ty = %ty, "storage created");
            let site = BindingSite::Local {
                scope: def,
                name: name.clone(),
            };
            self.locals.insert(site, Storage { ptr, ty });
        }

        for (index, (name, ty)) in params.iter().enumerate() {
            let site = BindingSite::Local {
                scope: def,
                name: name.clone(),
            };
            let slot = self.storage(&site, def)?;
            let value = super::expr::convert(self, Value::Param(index as u32), slot.ty)?;

            if *ty == IrType::Ptr {
                super::refcount::retain(self, value)?;
            }
            self.builder.build_store(slot.ptr, value)?;
        }

        gen_block(self, &function.body)?;

        if !self.builder.is_terminated() {
            release_slots(self)?;
            let value = (ret != IrType::Void).then(|| zero_value(ret));
            self.builder.build_return(value)?;
        }

        self.function = None;
        self.finish_function()
    }

    /// Lowers the module body into `main`.
    ///
    /// Fresh blocks no owner has taken are reclaimed after every top-level
    /// statement and on every loop iteration; heap globals are released
    /// before returning.
    fn lower_main(&mut self) -> Result<(), Error> {
        let ast = self.ast;
        self.create_function("main", vec![], IrType::I32);

        for stmt in ast.module_body() {
            gen_block(self, std::slice::from_ref(stmt))?;

            if !self.builder.is_terminated() {
                self.call_runtime(abi::RT_RECLAIM, vec![], "")?;
            }
        }

        if !self.builder.is_terminated() {
            release_globals(self)?;
            self.builder.build_return(Some(Value::I32(0)))?;
        }

        self.finish_function()
    }

    /// Lowers the whole program.
    ///
    /// Functions are lowered in definition order, followed by `main`.
    fn compile(&mut self) -> Result<(), Error> {
        self.create_globals()?;

        let env = self.env;
        for (key, _) in env.signatures() {
            self.lower_function(key)?;
        }

        self.lower_main()
    }
}

/// Lowers a typed program into an IR module.
///
/// # Arguments
///
/// * `program` - The resolved, pruned program
/// * `file_name` - Name of the file being compiled (for module naming)
///
/// # Returns
///
/// The finished module, or the internal error that stopped lowering.
#[tracing::instrument(level = "debug", skip(program))]
pub fn compile(program: &TypedProgram, file_name: &str) -> Result<Module, Error> {
    let mut compiler = Compiler::new(program, file_name);
    compiler.compile()?;

    tracing::debug!(
        functions = compiler.module.functions.len(),
        externs = compiler.module.externs.len(),
        "module lowered"
    );
    Ok(compiler.module)
}
