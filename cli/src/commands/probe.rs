use anyhow::Result;
use soilbase::{Error, Pipeline};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::ProbeArgs) -> Result<()> {
    let config = super::load_config(&args.config)?;
    let pipeline = Pipeline::with_http(config)?;
    let selector = pipeline.selector();

    match selector.select_source(&args.variable, args.depth.as_deref()) {
        Ok(handle) => {
            println!("[probe] {} ({} tier, {} cells)", handle.location, handle.tier, handle.cell_count);
            Ok(())
        }
        Err(Error::SourceUnavailable { variable, depth, attempts }) => {
            for attempt in &attempts {
                println!("[probe] failed: {attempt}");
            }
            Err(Error::SourceUnavailable { variable, depth, attempts }.into())
        }
        Err(e) => Err(e.into()),
    }
}
