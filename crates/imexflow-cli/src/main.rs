//! imexflow command-line interface.

mod cases;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use imexflow_projection::ProblemParameters;

use crate::cases::Case;

#[derive(Parser)]
#[command(name = "imexflow")]
#[command(about = "Variable-step IMEX projection solver for incompressible flow", long_about = None)]
#[command(version)]
struct Cli {
    /// Benchmark case to run
    #[arg(value_enum, default_value_t = Case::Cavity)]
    case: Case,

    /// JSON parameter file (the defaults of the case if omitted)
    #[arg(short, long, value_name = "FILE")]
    parameters: Option<PathBuf>,

    /// Cells per direction of the unit square
    #[arg(short = 'n', long, default_value_t = 16)]
    cells: usize,

    /// Write the default parameters of the case to FILE and exit
    #[arg(long, value_name = "FILE")]
    write_template: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    if let Some(ref path) = cli.write_template {
        write_template(path, cli.case)?;
        println!("Wrote {} parameters to {}", cli.case, path.display());
        return Ok(());
    }

    let params = match cli.parameters {
        Some(ref path) => read_parameters(path)?,
        None => cli.case.default_parameters(),
    };

    if cli.verbose {
        println!("Case: {}", cli.case);
        println!("Problem type: {:?}", params.problem_type);
        println!("Cells: {} x {}", cli.cells, cli.cells);
        println!(
            "Convective term: {:?}, {:?}",
            params.navier_stokes.convective_term_weak_form,
            params.navier_stokes.convective_term_time_discretization
        );
        println!(
            "Time interval: [{}, {}], initial step {}{}",
            params.time_stepping.start_time,
            params.time_stepping.end_time,
            params.time_stepping.initial_step_size,
            if params.time_stepping.adaptive_time_stepping {
                " (adaptive)"
            } else {
                ""
            }
        );
        println!();
    }

    cli.case.run(params, cli.cells)
}

fn read_parameters(path: &Path) -> Result<ProblemParameters> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read parameters: {}", path.display()))?;
    let params: ProblemParameters = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse parameters: {}", path.display()))?;
    params
        .validate()
        .with_context(|| format!("Invalid parameters in {}", path.display()))?;
    Ok(params)
}

fn write_template(path: &Path, case: Case) -> Result<()> {
    let json = serde_json::to_string_pretty(&case.default_parameters())?;
    fs::write(path, json + "\n")
        .with_context(|| format!("Failed to write template: {}", path.display()))
}
