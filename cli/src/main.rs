mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::{boundaries, init_config, join, pipeline, probe};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

pub fn run() -> anyhow::Result<()> {
    use clap::Parser;

    let cli = Cli::parse();
    init_logging(cli.verbose);
    match &cli.command {
        Commands::InitConfig(args) => init_config::run(&cli, args),
        Commands::Boundaries(args) => boundaries::run(&cli, args),
        Commands::Probe(args) => probe::run(&cli, args),
        Commands::Run(args) => pipeline::run(&cli, args),
        Commands::Join(args) => join::run(&cli, args),
    }
}

fn main() -> anyhow::Result<()> { run() }
