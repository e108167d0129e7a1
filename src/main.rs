use btl::cli::{Cli, Command, CompileArgs, OutputFormat};
use btl::{ast, compile, debugger, parser, trace, vm, CompilationResult};
use anyhow::Context;
use clap::Parser as ClapParser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn read_source(args: &CompileArgs) -> anyhow::Result<String> {
    std::fs::read_to_string(&args.file).with_context(|| format!("failed to read {}", args.file))
}

fn run_compile(args: CompileArgs) -> anyhow::Result<bool> {
    let src = read_source(&args)?;
    let (environment, data) = args.configure()?;
    match compile(&src, &data, &environment) {
        CompilationResult::Success(success) => {
            match args.format {
                OutputFormat::Hex => println!("0x{}", hex::encode(&success.bytecode)),
                OutputFormat::Asm => println!("{}", vm::disassemble_bytecode(&success.bytecode)),
            }
            Ok(true)
        }
        CompilationResult::Failure(failure) => {
            for error in &failure.errors {
                error.report(&args.file, &src)?;
            }
            Ok(false)
        }
    }
}

fn run_trace(args: CompileArgs) -> anyhow::Result<bool> {
    let src = read_source(&args)?;
    let (environment, data) = args.configure()?;
    let result = compile(&src, &data, &environment);
    let Some(reduce) = result.reduce() else {
        for error in result.errors() {
            error.report(&args.file, &src)?;
        }
        return Ok(false);
    };
    let lines = trace::trace_script(&src, reduce, &environment);
    print!("{}", debugger::render_trace(&src, &lines, !args.no_color));
    for error in result.errors() {
        error.report(&args.file, &src)?;
    }
    Ok(result.is_success())
}

fn run_disassemble(bytecode: &str) -> anyhow::Result<bool> {
    let bytecode = bytecode.trim();
    let bytes = hex::decode(bytecode.strip_prefix("0x").unwrap_or(bytecode))?;
    println!("{}", vm::disassemble_bytecode(&bytes));
    Ok(true)
}

fn run_ast(file: &str) -> anyhow::Result<bool> {
    let src = std::fs::read_to_string(file).with_context(|| format!("failed to read {file}"))?;
    match parser::parse(&src) {
        Ok(script) => {
            ast::print_script(&script);
            Ok(true)
        }
        Err(error) => {
            error.report(file, &src)?;
            Ok(false)
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "btl=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Cli::parse();
    let succeeded = match args.command {
        Command::Compile(args) => run_compile(args)?,
        Command::Trace(args) => run_trace(args)?,
        Command::Disassemble { bytecode } => run_disassemble(&bytecode)?,
        Command::Ast { file } => run_ast(&file)?,
    };
    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
