//! Quill CLI: check, dump, and run scripts.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Input or compile error
//! - 3: Runtime error

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quill")]
#[command(about = "Run Quill scripts", long_about = None)]
struct Cli {
    /// Log frames, calls and closures to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and run a script
    Run {
        file: PathBuf,
        /// Maximum number of nested calls
        #[arg(long, default_value_t = quill_vm::machine::MAX_FRAMES)]
        max_frames: usize,
    },
    /// Compile a script and report errors without running it
    Check { file: PathBuf },
    /// Print the compiled form of a script
    Dump { file: PathBuf },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Run { file, max_frames } => commands::run(file, *max_frames),
        Commands::Check { file } => commands::check(file),
        Commands::Dump { file } => commands::dump(file),
    };

    if let Err(code) = result {
        process::exit(code);
    }
}
