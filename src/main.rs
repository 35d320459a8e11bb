mod datatypes;
mod deck;
mod error;
mod experiment;
mod geometry;
mod post_processor;
mod solver;

use clap::Parser;

use crate::error::AmberError;
use crate::solver::FastCap;

/// Monte Carlo driver for electrostatic asymmetry between a randomly
/// placed particle pair and two fixed electrodes.
#[derive(Parser)]
#[command(name = "amber", version)]
struct Cli {
    /// Experiment input file (json)
    input: String,

    /// File to write the recorded samples to
    #[arg(short, long, default_value = "samples.txt")]
    output: String,

    /// Capacitance solver binary to invoke
    #[arg(long, default_value = "fastcap")]
    solver: String,
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), AmberError> {
    let config = experiment::load_config(&cli.input)?;
    let solver = FastCap::new(&cli.solver);

    let samples = experiment::run(&config, &solver, &mut rand::thread_rng())?;

    post_processor::write_samples(&samples, &cli.output)?;
    post_processor::print_summary(&samples);

    Ok(())
}
