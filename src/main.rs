use std::path::PathBuf;
use std::process::exit;

use clap::Parser;

use ls8::loader;
use ls8::machine::Machine;

/// LS-8 emulator: run a pre-assembled binary program image.
#[derive(Parser)]
#[clap(name = "ls8", version)]
struct Args {
    /// Path to the .ls8 program image
    program: PathBuf,

    /// Log a trace line for every cycle
    #[clap(long)]
    trace: bool,

    /// Stop with an error after this many cycles
    #[clap(long)]
    max_cycles: Option<usize>,
}

fn main() {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.trace {
        logger.filter_module("ls8", log::LevelFilter::Trace);
    }
    logger.init();

    let mem = match loader::load_file(&args.program) {
        Ok(mem) => mem,
        Err(e) => {
            eprintln!("ls8: {}: {}", args.program.display(), e);
            exit(1);
        }
    };

    let mut machine = Machine::new(mem);
    if let Some(limit) = args.max_cycles {
        machine = machine.with_cycle_limit(limit);
    }
    if let Err(e) = machine.run() {
        eprintln!("ls8: {}", e);
        exit(2);
    }
}
