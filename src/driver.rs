//! The compilation pipeline as one call: lex, parse, resolve, lower and
//! optionally run.

use std::{fmt::Write, rc::Rc, time::Instant};

use crate::{
    ast::ast::Ast,
    compiler::compiler::compile,
    display_error,
    errors::errors::Error,
    ir::{
        interpreter::{run, Execution},
        ir::Module,
    },
    lexer::{lexer::tokenize, tokens::Token},
    parser::parser::parse,
    type_checker::type_checker::{type_check, TypedProgram},
};

/// What the compiler writes out instead of running the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Emit {
    Tokens,
    Ast,
    Ir,
    Llvm,
}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Name used in positions and as the module name.
    pub file_name: String,
    pub emit: Option<Emit>,
}

impl CompileOptions {
    pub fn new(file_name: &str) -> Self {
        CompileOptions {
            file_name: file_name.to_string(),
            emit: None,
        }
    }
}

pub fn lex_source(source: &str, options: &CompileOptions) -> Result<Vec<Token>, Vec<Error>> {
    let start = Instant::now();
    let tokens =
        tokenize(source.to_string(), Some(options.file_name.clone())).map_err(|error| vec![error])?;

    tracing::debug!(tokens = tokens.len(), elapsed = ?start.elapsed(), "tokenized");
    Ok(tokens)
}

pub fn parse_source(source: &str, options: &CompileOptions) -> Result<Ast, Vec<Error>> {
    let tokens = lex_source(source, options)?;

    let start = Instant::now();
    let ast = parse(tokens, Rc::new(options.file_name.clone())).map_err(|error| vec![error])?;

    tracing::debug!(nodes = ast.len(), elapsed = ?start.elapsed(), "parsed");
    Ok(ast)
}

pub fn check_source(source: &str, options: &CompileOptions) -> Result<TypedProgram, Vec<Error>> {
    let ast = parse_source(source, options)?;

    let start = Instant::now();
    let program = type_check(ast)?;

    tracing::debug!(
        pruned = program.pruned.len(),
        elapsed = ?start.elapsed(),
        "type checked"
    );
    Ok(program)
}

/// Runs every phase up to a finished IR module.
pub fn compile_source(source: &str, options: &CompileOptions) -> Result<Module, Vec<Error>> {
    let total = Instant::now();
    let program = check_source(source, options)?;

    let start = Instant::now();
    let module = compile(&program, &options.file_name).map_err(|error| vec![error])?;

    tracing::debug!(
        functions = module.functions.len(),
        elapsed = ?start.elapsed(),
        total = ?total.elapsed(),
        "lowered"
    );
    Ok(module)
}

/// Compiles and executes a program against the reference runtime.
pub fn run_source(source: &str, options: &CompileOptions) -> Result<Execution, Vec<Error>> {
    let module = compile_source(source, options)?;

    let start = Instant::now();
    let execution = run(&module).map_err(|error| vec![error])?;

    tracing::debug!(
        exit_code = execution.exit_code,
        live_blocks = execution.live_blocks,
        elapsed = ?start.elapsed(),
        "executed"
    );
    Ok(execution)
}

/// The text form of a front-end phase, or of the IR.
///
/// `Emit::Llvm` needs the `llvm` feature and is handled by `codegen`.
pub fn emit_text(source: &str, options: &CompileOptions, emit: Emit) -> Result<String, Vec<Error>> {
    match emit {
        Emit::Tokens => {
            let mut out = String::new();
            for token in lex_source(source, options)? {
                let _ = writeln!(out, "{}", token);
            }
            Ok(out)
        }
        Emit::Ast => Ok(format!("{:#?}\n", parse_source(source, options)?)),
        Emit::Ir | Emit::Llvm => Ok(compile_source(source, options)?.to_string()),
    }
}

/// Renders every error with its source excerpt.
pub fn render_errors(errors: &[Error], source: &str) -> String {
    errors
        .iter()
        .map(|error| display_error(error, source))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_source_captures_output() {
        let options = CompileOptions::new("main.sp");
        let execution = run_source("print(1 + 2)\n", &options).unwrap();

        assert_eq!(execution.stdout, "3\n");
        assert_eq!(execution.exit_code, 0);
    }

    #[test]
    fn test_errors_render_with_file_name() {
        let source = "x = 1\ny = x + \"a\"\n";
        let options = CompileOptions::new("main.sp");
        let errors = compile_source(source, &options).unwrap_err();

        let rendered = render_errors(&errors, source);
        assert!(rendered.starts_with("Error: InvalidOperands"));
        assert!(rendered.contains("-> main.sp"));
    }

    #[test]
    fn test_emit_ir_text() {
        let options = CompileOptions::new("main.sp");
        let text = emit_text("x = 1\n", &options, Emit::Ir).unwrap();

        assert!(text.contains("@g.x = global i64"));
        assert!(text.contains("define i32 @main()"));
    }
}
