use std::{collections::BTreeSet, sync::Arc};

use anyhow::Result;
use soilbase::{BoundaryResolver, Error, HttpFetcher};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::BoundariesArgs) -> Result<()> {
    let config = super::load_config(&args.config)?;
    let codes: BTreeSet<String> = if args.codes.is_empty() {
        config.target_codes.iter().cloned().collect()
    } else {
        args.codes.iter().map(|c| c.trim().to_uppercase()).collect()
    };

    let fetcher = HttpFetcher::new(config.http.timeout(), &config.http.user_agent)?;
    let resolver = BoundaryResolver::new(config.boundaries.clone(), Arc::new(fetcher));

    match resolver.resolve_boundaries(&codes) {
        Ok(set) => {
            println!("[boundaries] {} countries in {}", set.len(), config.boundaries.cache_path.display());
            Ok(())
        }
        Err(Error::BoundaryResolution { missing, partial }) => {
            println!("[boundaries] {} countries resolved, missing: {}", partial.len(), missing.join(", "));
            Err(Error::BoundaryResolution { missing, partial }.into())
        }
        Err(e) => Err(e.into()),
    }
}
