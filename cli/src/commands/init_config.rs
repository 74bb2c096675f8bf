use anyhow::{bail, Result};
use soilbase::PipelineConfig;

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::InitConfigArgs) -> Result<()> {
    if args.path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", args.path.display());
    }
    PipelineConfig::profile(&args.profile)?.write_json_file(&args.path)?;
    println!("[init-config] wrote {} ({} profile)", args.path.display(), args.profile);
    Ok(())
}
