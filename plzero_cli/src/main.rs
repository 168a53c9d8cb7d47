use std::{fs, io, path::PathBuf};

use anyhow::Context;
use clap::Parser;

/// Compile a program and run it on the built-in stack machine.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Source file to compile and run
    source: PathBuf,
    /// Print the compiled instruction listing before running
    #[arg(long)]
    list: bool,
    /// Stop after compiling; do not execute
    #[arg(long)]
    no_run: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let source = fs::read_to_string(&args.source)
        .with_context(|| format!("reading {}", args.source.display()))?;
    let code = plzero::compile(&source)
        .with_context(|| format!("compiling {}", args.source.display()))?;

    if args.list {
        for (position, inst) in code.iter().enumerate() {
            println!("{position}: {inst}");
        }
    }
    if !args.no_run {
        plzero::execute(&code, io::stdout().lock())?;
    }

    Ok(())
}
