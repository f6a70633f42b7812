mod commands;
mod shell;
mod shexpr;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

#[derive(Parser)]
#[command(name = "fspx", version, about = "FSP compiler and LTS analyzer")]
struct Cli {
    /// Input FSP source file, or a compiled image (`.ltsx`)
    input: PathBuf,

    /// Write the compiled image to this file
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Run deadlock analysis on every published process
    #[arg(short = 'd', long)]
    deadlock: bool,

    /// Check every progress property against every published process
    #[arg(short = 'p', long)]
    progress: bool,

    /// Emit a GraphViz `.gv` file per published process
    #[arg(short = 'g', long)]
    graphviz: bool,

    /// Print a JSON summary of the analyses
    #[arg(long)]
    json: bool,

    /// Start the interactive shell after compilation
    #[arg(short = 's', long)]
    shell: bool,

    /// Run a shell script after compilation
    #[arg(long)]
    script: Option<PathBuf>,

    /// Maximum process-reference nesting depth
    #[arg(long, default_value_t = 1000)]
    max_depth: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let params = commands::BatchParams {
        input: cli.input,
        output: cli.output,
        deadlock: cli.deadlock,
        progress: cli.progress,
        graphviz: cli.graphviz,
        json: cli.json,
        shell: cli.shell,
        script: cli.script,
        max_depth: cli.max_depth,
    };
    commands::run(params)
}
