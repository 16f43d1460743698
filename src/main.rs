use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process;

use teallift::{encode, format_dot, format_program, lift_source, LiftOptions};

#[derive(Parser)]
#[command(
    name = "teallift",
    version,
    about = "Lift TEAL stack assembly into an SSA control-flow graph"
)]
struct Cli {
    /// Input .teal file
    input: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = Emit::Text)]
    emit: Emit,
    /// Write output to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Collapse branches with compile-time constant conditions into plain
    /// jumps
    #[arg(long)]
    fold_const_branches: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Emit {
    /// Block listing with named values
    Text,
    /// Block-oriented interchange JSON
    Json,
    /// Graphviz control-flow graph
    Dot,
}

fn main() {
    let cli = Cli::parse();

    let source = match std::fs::read_to_string(&cli.input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", cli.input.display(), e);
            process::exit(1);
        }
    };
    let filename = cli.input.display().to_string();

    let options = LiftOptions {
        fold_constant_branches: cli.fold_const_branches,
    };
    let lifted = match lift_source(&source, &filename, options) {
        Ok(lifted) => lifted,
        Err(_) => process::exit(1),
    };

    let program = encode(&lifted);
    let rendered = match cli.emit {
        Emit::Text => format_program(&program),
        Emit::Json => match serde_json::to_string_pretty(&program) {
            Ok(json) => json,
            Err(e) => {
                eprintln!("error: cannot serialize program: {e}");
                process::exit(1);
            }
        },
        Emit::Dot => format_dot(&program),
    };

    match cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, rendered) {
                eprintln!("error: cannot write '{}': {}", path.display(), e);
                process::exit(1);
            }
        }
        None => print!("{rendered}"),
    }
}
