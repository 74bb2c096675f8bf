pub mod boundaries;
pub mod init_config;
pub mod join;
pub mod pipeline;
pub mod probe;

use anyhow::{Context, Result};
use soilbase::PipelineConfig;

use crate::cli::ConfigArg;

/// The configuration named by `-c`, or the defaults.
pub(crate) fn load_config(arg: &ConfigArg) -> Result<PipelineConfig> {
    match &arg.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading configuration {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}
