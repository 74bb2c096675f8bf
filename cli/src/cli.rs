use std::path::PathBuf;

/// Country soil baselines from depth-layered rasters
#[derive(clap::Parser, Debug)]
#[command(name = "soilbase", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Write the default configuration as JSON
    InitConfig(InitConfigArgs),

    /// Resolve the country boundary set and cache it
    Boundaries(BoundariesArgs),

    /// Run the source selector for one variable
    Probe(ProbeArgs),

    /// Run the full pipeline
    Run(RunArgs),

    /// Join an existing baseline CSV onto a table
    Join(JoinArgs),
}

#[derive(clap::Args, Debug)]
pub struct ConfigArg {
    /// Pipeline configuration (JSON); built-in defaults when omitted
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct InitConfigArgs {
    /// Where to write the configuration
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,

    /// Starting configuration
    #[arg(long, default_value = "default", value_parser = clap::builder::PossibleValuesParser::new(soilbase::PROFILES))]
    pub profile: String,
}

#[derive(clap::Args, Debug)]
pub struct BoundariesArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Country codes to require, e.g. AT,BE,UK (defaults to the configured targets)
    #[arg(long, value_delimiter = ',')]
    pub codes: Vec<String>,
}

#[derive(clap::Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Variable key, e.g. ph_h2o
    pub variable: String,

    /// Depth label, e.g. 0-5cm
    #[arg(short, long)]
    pub depth: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Also write the run report as JSON
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub report: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct JoinArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Per-country baseline CSV
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub baseline: PathBuf,

    /// Table to enrich
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub input: PathBuf,

    /// Enriched output table
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub output: PathBuf,

    /// Country code column of the input (defaults to the configured key)
    #[arg(long)]
    pub key: Option<String>,
}
