use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use anyhow::{Context, Result};
use geo::MultiPolygon;
use serde_json::{Map, Value};

use crate::geom::{dissolve, Crs, CrsTransform};
use crate::io::{property_string, read_geojson, write_geojson, FeatureCollection};

/// Property holding the country code in the boundary cache.
pub(crate) const CODE_PROPERTY: &str = "CNTR_CODE";

/// One country: an uppercase ISO-2 style code and its geometry in EPSG:4326.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryPolygon {
    pub country_code: String,
    pub geometry: MultiPolygon<f64>,
}

/// Country polygons keyed by code; at most one per code, iterated in code order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundarySet {
    polygons: BTreeMap<String, CountryPolygon>,
}

/// Trimmed uppercase form of a country code.
pub(crate) fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

impl BoundarySet {
    /// Group polygons by code, dissolving parts that share a code.
    pub fn from_polygons(polygons: impl IntoIterator<Item = CountryPolygon>) -> Self {
        let mut grouped: BTreeMap<String, Vec<MultiPolygon<f64>>> = BTreeMap::new();
        for p in polygons {
            grouped.entry(normalize_code(&p.country_code)).or_default().push(p.geometry);
        }
        let polygons = grouped.into_iter()
            .map(|(code, parts)| {
                let geometry = dissolve(parts);
                (code.clone(), CountryPolygon { country_code: code, geometry })
            })
            .filter(|(_, p)| !p.geometry.0.is_empty())
            .collect();
        Self { polygons }
    }

    /// Add a polygon unless its code is already present. Returns whether it was added.
    pub fn insert(&mut self, polygon: CountryPolygon) -> bool {
        let code = normalize_code(&polygon.country_code);
        if self.polygons.contains_key(&code) || polygon.geometry.0.is_empty() {
            return false;
        }
        self.polygons.insert(code.clone(), CountryPolygon { country_code: code, geometry: polygon.geometry });
        true
    }

    pub fn get(&self, code: &str) -> Option<&CountryPolygon> {
        self.polygons.get(&normalize_code(code))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.polygons.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CountryPolygon> {
        self.polygons.values()
    }

    pub fn len(&self) -> usize { self.polygons.len() }

    pub fn is_empty(&self) -> bool { self.polygons.is_empty() }

    /// Codes of `targets` that have no polygon, in sorted order.
    pub fn missing(&self, targets: &BTreeSet<String>) -> Vec<String> {
        targets.iter()
            .map(|c| normalize_code(c))
            .filter(|c| !self.polygons.contains_key(c))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Only the polygons whose code is in `codes`.
    pub fn subset(&self, codes: &BTreeSet<String>) -> BoundarySet {
        let wanted: BTreeSet<String> = codes.iter().map(|c| normalize_code(c)).collect();
        let polygons = self.polygons.iter()
            .filter(|(code, _)| wanted.contains(*code))
            .map(|(code, p)| (code.clone(), p.clone()))
            .collect();
        BoundarySet { polygons }
    }

    /// Build from a feature collection, reading codes from `code_field` and
    /// reprojecting to EPSG:4326 when the collection declares another frame.
    pub(crate) fn from_features(collection: FeatureCollection, code_field: &str) -> Result<Self> {
        let to_wgs84 = reprojection(collection.crs.as_ref())?;
        let mut polygons = Vec::with_capacity(collection.features.len());
        for feature in collection.features {
            let Some(code) = property_string(&feature.properties, code_field).filter(|c| !c.is_empty()) else {
                continue;
            };
            let geometry = match &to_wgs84 {
                Some(t) => t.apply_multipolygon(&feature.geometry)
                    .with_context(|| format!("[boundary::set] Failed to reproject {code}"))?,
                None => feature.geometry,
            };
            polygons.push(CountryPolygon { country_code: code, geometry });
        }
        Ok(Self::from_polygons(polygons))
    }

    /// Load a cached boundary file (GeoJSON with a `CNTR_CODE` property).
    pub fn read_cache(path: &Path) -> Result<Self> {
        let collection = read_geojson(path)?;
        Self::from_features(collection, CODE_PROPERTY)
            .with_context(|| format!("[boundary::set] Failed to load cache {}", path.display()))
    }

    /// Write as GeoJSON in EPSG:4326 with only the code property.
    pub fn write_cache(&self, path: &Path) -> Result<()> {
        let features = self.iter().map(|p| {
            let mut properties = Map::new();
            properties.insert(CODE_PROPERTY.to_string(), Value::String(p.country_code.clone()));
            (properties, &p.geometry)
        });
        write_geojson(path, &Crs::WGS84, features)
    }
}

/// Transform into EPSG:4326, or `None` when the frame is already geographic WGS84 or undeclared.
pub(crate) fn reprojection(crs: Option<&Crs>) -> Result<Option<CrsTransform>> {
    match crs {
        Some(crs) if *crs != Crs::WGS84 => Ok(Some(CrsTransform::new(crs, &Crs::WGS84)?)),
        _ => Ok(None),
    }
}
