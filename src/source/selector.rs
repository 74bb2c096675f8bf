use std::{collections::BTreeMap, sync::Arc};

use tracing::{info, warn};

use crate::common::Fetch;
use crate::config::{PipelineConfig, VariableSpec};
use crate::error::{Error, Result};
use crate::source::{
    CatalogSearch, DirectRemote, GeoTiffOpener, LocalFile, RasterHandle, RasterOpener, SourceRequest,
    SourceStrategy,
};

/// Maps each variable to its priority chain of source strategies.
pub struct SourceSelector {
    chains: BTreeMap<String, Vec<Box<dyn SourceStrategy>>>,
    opener: Box<dyn RasterOpener>,
}

impl SourceSelector {
    pub fn new(opener: Box<dyn RasterOpener>) -> Self {
        Self { chains: BTreeMap::new(), opener }
    }

    /// Chains for every configured variable, opening GeoTIFFs through `fetcher`.
    pub fn from_config(config: &PipelineConfig, fetcher: Arc<dyn Fetch>) -> Self {
        let mut selector = Self::new(Box::new(GeoTiffOpener::new(fetcher.clone())));
        for spec in &config.variables {
            selector = selector.with_chain(&spec.key, chain_for(spec, fetcher.clone()));
        }
        selector
    }

    /// Replace the chain for `variable`.
    pub fn with_chain(mut self, variable: &str, chain: Vec<Box<dyn SourceStrategy>>) -> Self {
        self.chains.insert(variable.to_string(), chain);
        self
    }

    pub fn opener(&self) -> &dyn RasterOpener {
        self.opener.as_ref()
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }

    /// Walk the chain for `variable` and return the first candidate whose open probe succeeds.
    pub fn select_source(&self, variable: &str, depth: Option<&str>) -> Result<RasterHandle> {
        let chain = self.chains.get(variable)
            .ok_or_else(|| Error::Config(format!("no sources configured for variable {variable}")))?;

        let request = SourceRequest { variable, depth };
        let mut attempts = Vec::new();
        for strategy in chain {
            if let Some(handle) = strategy.attempt(&request, self.opener.as_ref(), &mut attempts) {
                info!(variable, depth, tier = %handle.tier, location = %handle.location, cells = handle.cell_count, "selected raster source");
                return Ok(handle);
            }
        }

        warn!(variable, depth, attempts = attempts.len(), "every source candidate failed");
        Err(Error::SourceUnavailable {
            variable: variable.to_string(),
            depth: depth.map(str::to_string),
            attempts,
        })
    }
}

fn chain_for(spec: &VariableSpec, fetcher: Arc<dyn Fetch>) -> Vec<Box<dyn SourceStrategy>> {
    let mut chain: Vec<Box<dyn SourceStrategy>> = Vec::new();
    if let Some(path) = &spec.local {
        chain.push(Box::new(LocalFile { path: path.clone() }));
    }
    chain.push(Box::new(DirectRemote { candidates: spec.direct.clone() }));
    if let Some(url) = &spec.catalog {
        chain.push(Box::new(CatalogSearch {
            url: url.clone(),
            depth_patterns: spec.depth_patterns.clone(),
            fetcher,
        }));
    }
    chain
}
