use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, bail, Context};
use geo::MultiPolygon;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::boundary::{reprojection, BoundarySet, CountryPolygon};
use crate::common::{download_file, ensure_parent_exists, extract_zip, find_file, is_remote, Fetch};
use crate::config::BoundaryConfig;
use crate::error::{Error, Result};
use crate::geom::dissolve;
use crate::io::{property_string, read_geojson, read_shapefile, FeatureCollection};

/// ISO alpha-2 fields that also identify a country in the secondary dataset.
const ISO_FIELDS: [&str; 2] = ["ISO_A2", "ISO_A2_EH"];

/// Builds and caches the country boundary set.
pub struct BoundaryResolver {
    config: BoundaryConfig,
    fetcher: Arc<dyn Fetch>,
}

impl BoundaryResolver {
    pub fn new(config: BoundaryConfig, fetcher: Arc<dyn Fetch>) -> Self {
        Self { config, fetcher }
    }

    /// Load or build the boundary set and make sure every code in `targets` is present.
    ///
    /// Codes missing from the primary dataset are looked up by name in the secondary one.
    /// The cache is rewritten only when it was built or augmented in this call. When codes
    /// are still missing afterwards, the error carries everything that was resolved.
    pub fn resolve_boundaries(&self, targets: &BTreeSet<String>) -> Result<BoundarySet> {
        let cache = &self.config.cache_path;
        let (mut set, mut changed) = if cache.exists() {
            info!(path = %cache.display(), "loading cached boundaries");
            (BoundarySet::read_cache(cache)?, false)
        } else {
            (self.build_from_primary()?, true)
        };

        let missing = set.missing(targets);
        if !missing.is_empty() {
            info!(codes = %missing.join(","), "codes missing from primary boundaries, trying secondary source");
            match self.fill_from_secondary(&mut set, &missing) {
                Ok(added) => changed |= !added.is_empty(),
                Err(e) => warn!(error = %format!("{e:#}"), "secondary boundary source unusable"),
            }
        }

        if changed {
            set.write_cache(cache)?;
            info!(path = %cache.display(), countries = set.len(), "boundary cache written");
        }

        let missing = set.missing(targets);
        if missing.is_empty() {
            Ok(set)
        } else {
            warn!(codes = %missing.join(","), "boundary resolution incomplete");
            Err(Error::BoundaryResolution { missing, partial: Box::new(set) })
        }
    }

    /// Country-level polygons of the primary dataset.
    fn build_from_primary(&self) -> anyhow::Result<BoundarySet> {
        let path = self.localize(&self.config.primary, self.config.primary_local.as_deref())?;
        let mut collection = read_geojson(&path)?;

        let level_field = &self.config.level_field;
        if !collection.features.iter().any(|f| f.properties.contains_key(level_field)) {
            bail!("[boundary::resolver] primary boundaries have no {level_field} field");
        }
        let level = self.config.level;
        collection.features.retain(|f| {
            property_string(&f.properties, level_field)
                .and_then(|v| v.parse::<f64>().ok())
                .is_some_and(|v| v == level as f64)
        });

        let code_field = self.config.code_fields.iter()
            .find(|field| collection.features.iter().any(|f| f.properties.contains_key(*field)))
            .ok_or_else(|| anyhow!(
                "[boundary::resolver] none of the code fields {:?} is present", self.config.code_fields
            ))?
            .clone();

        let set = BoundarySet::from_features(collection, &code_field)?;
        info!(countries = set.len(), field = %code_field, "built country boundaries from primary source");
        Ok(set)
    }

    /// Add polygons for `missing` codes from the secondary dataset. Returns the codes added.
    fn fill_from_secondary(&self, set: &mut BoundarySet, missing: &[String]) -> anyhow::Result<Vec<String>> {
        let path = self.localize(&self.config.secondary, self.config.secondary_local.as_deref())?;
        let collection = read_vector(&path)?;
        let to_wgs84 = reprojection(collection.crs.as_ref())?;

        let mut added = Vec::new();
        for code in missing {
            let Some(geometry) = self.find_by_name(&collection, code) else {
                warn!(code = %code, "no secondary polygon matches any accepted name");
                continue;
            };
            let geometry = match &to_wgs84 {
                Some(t) => t.apply_multipolygon(&geometry)?,
                None => geometry,
            };
            if set.insert(CountryPolygon { country_code: code.clone(), geometry }) {
                info!(code = %code, "added polygon from secondary source");
                added.push(code.clone());
            }
        }
        Ok(added)
    }

    /// Geometry of the features named like `code`: the first name field with any match wins,
    /// then the ISO alpha-2 fields.
    fn find_by_name(&self, collection: &FeatureCollection, code: &str) -> Option<MultiPolygon<f64>> {
        let aliases: BTreeSet<String> = self.config.aliases.get(code)
            .into_iter()
            .flatten()
            .map(|a| a.trim().to_lowercase())
            .collect();

        let matching = |field: &str, accept: &dyn Fn(&str) -> bool| {
            let parts: Vec<MultiPolygon<f64>> = collection.features.iter()
                .filter(|f| property_string(&f.properties, field).is_some_and(|v| accept(&v)))
                .map(|f| f.geometry.clone())
                .collect();
            (!parts.is_empty()).then(|| dissolve(parts))
        };

        let by_alias = |v: &str| aliases.contains(&v.to_lowercase());
        let by_iso = |v: &str| v.eq_ignore_ascii_case(code);

        self.config.name_fields.iter()
            .find_map(|field| {
                let found = matching(field.as_str(), &by_alias);
                if found.is_some() {
                    debug!(code, field = %field, "secondary name match");
                }
                found
            })
            .or_else(|| ISO_FIELDS.iter().find_map(|field| matching(*field, &by_iso)))
    }

    /// Path of `location` on disk, downloading remote locations once.
    fn localize(&self, location: &str, local: Option<&Path>) -> anyhow::Result<PathBuf> {
        if !is_remote(location) {
            return Ok(PathBuf::from(location));
        }
        let target = match local {
            Some(path) => path.to_path_buf(),
            None => {
                let name = location.rsplit('/').next().filter(|n| !n.is_empty()).unwrap_or("boundaries.geojson");
                self.config.cache_path.parent().unwrap_or(Path::new(".")).join(name)
            }
        };
        if !target.exists() {
            info!(url = location, path = %target.display(), "downloading boundary dataset");
            ensure_parent_exists(&target)?;
            download_file(self.fetcher.as_ref(), location, &target)
                .with_context(|| format!("[boundary::resolver] Failed to download {location}"))?;
        }
        Ok(target)
    }
}

/// Read a zipped shapefile, a shapefile or a GeoJSON file.
fn read_vector(path: &Path) -> anyhow::Result<FeatureCollection> {
    let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("zip") => {
            let scratch = TempDir::new().context("[boundary::resolver] Failed to create temp dir")?;
            extract_zip(path, scratch.path())?;
            let hint = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            let shp = find_file(scratch.path(), "shp", hint)
                .or_else(|| find_file(scratch.path(), "shp", ""));
            match shp {
                Some(shp) => read_shapefile(&shp),
                None => {
                    let geojson = find_file(scratch.path(), "geojson", "")
                        .ok_or_else(|| anyhow!("[boundary::resolver] no shapefile in {}", path.display()))?;
                    read_geojson(&geojson)
                }
            }
        }
        Some("shp") => read_shapefile(path),
        _ => read_geojson(path),
    }
}
