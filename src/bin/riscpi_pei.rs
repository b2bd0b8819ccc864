//! Prologue/epilogue insertion driver.
//!
//! Reads textual machine IR from a file (or stdin with `-`), lowers the frame of every
//! function for the selected RISCPI subtarget and prints the result.

use bumpalo::Bump;
use clap::Parser;
use riscpi::core::{CodegenError, CodegenResult, CompilationSession, PrologEpilogInserter};
use riscpi::target::{TargetMachine, TargetOptions, TargetRegistry};
use riscpi::test_mir::{parse_module, MirPrinter};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser, Debug)]
#[command(name = "riscpi-pei", version, about = "Insert prologues and epilogues into RISCPI machine IR")]
struct Cli {
    /// Input machine IR file, or `-` for stdin
    input: PathBuf,
    /// Target triple
    #[arg(long, default_value = "riscpi-unknown-none")]
    triple: String,
    /// CPU name (empty selects generic)
    #[arg(long, default_value = "")]
    mcpu: String,
    /// Comma-separated feature string, e.g. `+mul,-fpu`
    #[arg(long, default_value = "")]
    mattr: String,
    /// Keep a frame pointer in every function
    #[arg(long)]
    disable_fp_elim: bool,
    /// Only lower and print this function
    #[arg(long)]
    function: Option<String>,
    /// Annotate each function with its computed frame layout
    #[arg(long)]
    frame_summary: bool,
    /// Print lowering statistics to stderr
    #[arg(long)]
    stats: bool,
    /// Print the resolved subtarget configuration to stderr
    #[arg(long)]
    print_config: bool,
}

fn read_input(path: &Path) -> CodegenResult<String> {
    if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn run(cli: &Cli) -> CodegenResult<String> {
    let options = TargetOptions {
        disable_fp_elim: cli.disable_fp_elim,
        ..TargetOptions::default()
    };
    let registry = TargetRegistry::builtin();
    let tm = TargetMachine::new(&registry, &cli.triple, options)?;
    let subtarget = tm.create_subtarget(&cli.mcpu, &cli.mattr);

    if cli.print_config {
        let config = subtarget.config();
        eprintln!("target:   {}", tm.target().name);
        eprintln!("triple:   {}", tm.triple());
        eprintln!("cpu:      {}", config.cpu());
        eprintln!("features: {}", config.feature_string());
    }

    let text = read_input(&cli.input)?;
    let mut functions = parse_module(&text, subtarget.instr_info(), subtarget.register_info())?;
    if let Some(name) = &cli.function {
        functions.retain(|mf| &mf.name == name);
        if functions.is_empty() {
            return Err(CodegenError::FunctionNotFound { name: name.clone() });
        }
    }

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    PrologEpilogInserter::new(subtarget.as_ref()).run_module(&mut functions, &session);

    if cli.stats {
        eprintln!("{}", session.stats());
    }

    Ok(MirPrinter::new(subtarget.register_info())
        .with_frame_summary(cli.frame_summary)
        .print_module(&functions))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
