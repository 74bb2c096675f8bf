use std::{collections::HashSet, path::Path, sync::Arc};

use tracing::{debug, warn};

use crate::common::Fetch;
use crate::source::catalog::{depth_variants, preference_regex, AssetCandidate, CatalogDocument};
use crate::source::{RasterHandle, RasterOpener, SourceTier};

/// What the selector is looking for.
#[derive(Debug, Clone, Copy)]
pub struct SourceRequest<'a> {
    pub variable: &'a str,
    pub depth: Option<&'a str>,
}

/// One step of a priority chain.
///
/// Each failed candidate appends a `location: reason` line to `trail`.
pub trait SourceStrategy {
    fn tier(&self) -> SourceTier;

    fn attempt(
        &self,
        request: &SourceRequest<'_>,
        opener: &dyn RasterOpener,
        trail: &mut Vec<String>,
    ) -> Option<RasterHandle>;
}

/// Substitute `{variable}` and `{depth}`. A `{depth}` template without a depth yields `None`.
pub(crate) fn expand_template(template: &str, request: &SourceRequest<'_>) -> Option<String> {
    let expanded = template.replace("{variable}", request.variable);
    if expanded.contains("{depth}") {
        return request.depth.map(|d| expanded.replace("{depth}", d));
    }
    Some(expanded)
}

fn probe(location: &str, tier: SourceTier, opener: &dyn RasterOpener, trail: &mut Vec<String>) -> Option<RasterHandle> {
    match opener.probe(location) {
        Ok(0) => {
            trail.push(format!("{tier} {location}: raster has no cells"));
            None
        }
        Ok(cell_count) => Some(RasterHandle { location: location.to_string(), tier, cell_count }),
        Err(e) => {
            debug!(location, %tier, error = %format!("{e:#}"), "open probe failed");
            trail.push(format!("{tier} {location}: {e:#}"));
            None
        }
    }
}

/// A configured file on disk, used only if it exists and opens.
pub struct LocalFile {
    pub path: String,
}

impl SourceStrategy for LocalFile {
    fn tier(&self) -> SourceTier { SourceTier::Local }

    fn attempt(&self, request: &SourceRequest<'_>, opener: &dyn RasterOpener, trail: &mut Vec<String>) -> Option<RasterHandle> {
        let path = expand_template(&self.path, request)?;
        if !Path::new(&path).exists() {
            trail.push(format!("{} {path}: file not found", self.tier()));
            return None;
        }
        probe(&path, self.tier(), opener, trail)
    }
}

/// An ordered list of remote raster addresses; first to open wins.
pub struct DirectRemote {
    pub candidates: Vec<String>,
}

impl SourceStrategy for DirectRemote {
    fn tier(&self) -> SourceTier { SourceTier::DirectRemote }

    fn attempt(&self, request: &SourceRequest<'_>, opener: &dyn RasterOpener, trail: &mut Vec<String>) -> Option<RasterHandle> {
        self.candidates.iter()
            .filter_map(|template| expand_template(template, request))
            .find_map(|location| probe(&location, self.tier(), opener, trail))
    }
}

/// Raster assets discovered through a catalog record and, failing that, its child items.
pub struct CatalogSearch {
    pub url: String,
    /// Near-surface markers preferred when picking among assets.
    pub depth_patterns: Vec<String>,
    pub fetcher: Arc<dyn Fetch>,
}

impl CatalogSearch {
    fn fetch_document(&self, url: &str, trail: &mut Vec<String>) -> Option<CatalogDocument> {
        let parsed = self.fetcher.fetch(url).and_then(|bytes| CatalogDocument::parse(&bytes));
        match parsed {
            Ok(doc) => Some(doc),
            Err(e) => {
                trail.push(format!("{} {url}: {e:#}", self.tier()));
                None
            }
        }
    }

    /// Direct assets of the record, or those of its `item` children when it has none.
    pub(crate) fn candidates(&self, trail: &mut Vec<String>) -> Vec<AssetCandidate> {
        let Some(doc) = self.fetch_document(&self.url, trail) else { return Vec::new() };
        let direct = doc.raster_assets(&self.url);
        if !direct.is_empty() {
            return direct;
        }
        doc.child_links(&self.url).iter()
            .filter_map(|child| Some(self.fetch_document(child, trail)?.raster_assets(child)))
            .flatten()
            .collect()
    }
}

impl SourceStrategy for CatalogSearch {
    fn tier(&self) -> SourceTier { SourceTier::Catalog }

    fn attempt(&self, request: &SourceRequest<'_>, opener: &dyn RasterOpener, trail: &mut Vec<String>) -> Option<RasterHandle> {
        let candidates = self.candidates(trail);
        if candidates.is_empty() {
            trail.push(format!("{} {}: no raster assets", self.tier(), self.url));
            return None;
        }

        let passes = [
            request.depth.map(depth_variants).and_then(|v| preference_regex(&v)),
            preference_regex(&self.depth_patterns),
        ];

        let mut tried = HashSet::new();
        for re in passes.iter().flatten() {
            for asset in candidates.iter().filter(|a| re.is_match(&a.title) || re.is_match(&a.href)) {
                if !tried.insert(asset.href.as_str()) {
                    continue;
                }
                if let Some(handle) = probe(&asset.href, self.tier(), opener, trail) {
                    return Some(handle);
                }
            }
        }

        warn!(variable = request.variable, url = %self.url, "no depth-preferred catalog asset opened, trying the rest");
        candidates.iter()
            .filter(|a| tried.insert(a.href.as_str()))
            .find_map(|a| probe(&a.href, self.tier(), opener, trail))
    }
}
