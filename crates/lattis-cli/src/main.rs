//! Lattis command-line interface.
//!
//! Inspect explicit tight-binding systems described in TOML files:
//! ```sh
//! lattis-cli inspect system.toml --param t=1.0
//! lattis-cli lead lead.toml --json out/lead.json
//! lattis-cli validate system.toml
//! ```

mod config;
mod runner;

use clap::{Args, Parser, Subcommand};
use lattis_core::Params;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lattis-cli")]
#[command(about = "Lattis: tight-binding system inspection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the summary, site ranges and Hamiltonian of a finite system.
    Inspect(CommonArgs),
    /// Print the cell Hamiltonian and inter-cell hopping of a lead.
    Lead(CommonArgs),
    /// Report which declared discrete symmetries the Hamiltonian breaks.
    Validate(CommonArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// Path to the system description.
    config: PathBuf,
    /// Parameter value, as `name=value`. May be repeated.
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, f64)>,
    /// Also write the results to this JSON file.
    #[arg(long)]
    json: Option<PathBuf>,
}

fn parse_param(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", s))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value for '{}': {}", name, e))?;
    Ok((name.trim().to_string(), value))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let (args, action): (CommonArgs, fn(&runner::Built, &Params) -> anyhow::Result<runner::Report>) =
        match cli.command {
            Commands::Inspect(args) => (args, runner::inspect),
            Commands::Lead(args) => (args, runner::lead),
            Commands::Validate(args) => (args, runner::validate),
        };

    let config = config::load_config(&args.config)?;
    log::debug!("loaded {} sites from {}", config.sites.len(), args.config.display());
    let built = runner::build(&config)?;

    let mut params = Params::new();
    for (name, value) in &args.params {
        params.insert(name, *value);
    }
    let report = action(&built, &params)?;

    if let Some(path) = &args.json {
        runner::write_json(&report, path)?;
    }
    Ok(())
}
