use std::{
    fs,
    path::{Path, PathBuf},
    process,
};

use clap::Parser;
use serpent::driver::{self, CompileOptions, Emit};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compiler for the serpent language.
#[derive(Parser)]
#[command(name = "serpentc", version, about)]
struct Cli {
    /// Source file to compile
    file: PathBuf,

    /// Write this representation instead of running the program
    #[arg(long, value_enum)]
    emit: Option<Emit>,

    /// Output path for `--emit`; printed to stdout when absent
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Run the program after emitting
    #[arg(long)]
    run: bool,
}

fn init_tracing() {
    // Silent unless RUST_LOG is set.
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let source = match fs::read_to_string(&cli.file) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("error: cannot read {}: {}", cli.file.display(), error);
            process::exit(2);
        }
    };
    let file_name = cli
        .file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| String::from("main.sp"));

    let options = CompileOptions {
        file_name,
        emit: cli.emit,
    };

    if let Some(emit) = options.emit {
        if let Err(message) = emit_output(&source, &options, emit, cli.output.as_deref()) {
            eprint!("{}", message);
            process::exit(1);
        }
        if !cli.run {
            return;
        }
    }

    match driver::run_source(&source, &options) {
        Ok(execution) => {
            print!("{}", execution.stdout);
            eprint!("{}", execution.stderr);
            process::exit(execution.exit_code);
        }
        Err(errors) => {
            eprint!("{}", driver::render_errors(&errors, &source));
            process::exit(1);
        }
    }
}

fn emit_output(
    source: &str,
    options: &CompileOptions,
    emit: Emit,
    output: Option<&Path>,
) -> Result<(), String> {
    let text = match emit {
        Emit::Llvm => emit_llvm(source, options)?,
        other => driver::emit_text(source, options, other)
            .map_err(|errors| driver::render_errors(&errors, source))?,
    };

    match output {
        Some(path) => fs::write(path, text)
            .map_err(|error| format!("error: cannot write {}: {}\n", path.display(), error)),
        None => {
            print!("{}", text);
            Ok(())
        }
    }
}

#[cfg(feature = "llvm")]
fn emit_llvm(source: &str, options: &CompileOptions) -> Result<String, String> {
    let module = driver::compile_source(source, options)
        .map_err(|errors| driver::render_errors(&errors, source))?;

    serpent::codegen::llvm::emit_llvm_ir(&module)
        .map_err(|error| serpent::display_error(&error, source))
}

#[cfg(not(feature = "llvm"))]
fn emit_llvm(_source: &str, _options: &CompileOptions) -> Result<String, String> {
    Err(String::from(
        "error: serpentc was built without the `llvm` feature\n",
    ))
}
