use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::{json, Map, Value};

use crate::geom::{close_ring, Crs};

/// One areal feature: its attribute map and geometry.
#[derive(Debug, Clone)]
pub(crate) struct VectorFeature {
    pub(crate) properties: Map<String, Value>,
    pub(crate) geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FeatureCollection {
    /// Frame declared by the document's `crs` member, if any.
    pub(crate) crs: Option<Crs>,
    pub(crate) features: Vec<VectorFeature>,
}

/// Read a GeoJSON FeatureCollection from `path`.
pub(crate) fn read_geojson(path: &Path) -> Result<FeatureCollection> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("[io::geojson] Failed to read {}", path.display()))?;
    read_geojson_bytes(&bytes)
        .with_context(|| format!("[io::geojson] Failed to parse {}", path.display()))
}

/// Parse a GeoJSON FeatureCollection. Only Polygon and MultiPolygon features are kept.
pub(crate) fn read_geojson_bytes(bytes: &[u8]) -> Result<FeatureCollection> {
    let value: Value = serde_json::from_slice(bytes).context("[io::geojson] invalid JSON")?;
    if value["type"].as_str() != Some("FeatureCollection") {
        bail!("[io::geojson] expected a FeatureCollection");
    }

    let crs = value["crs"]["properties"]["name"].as_str().and_then(Crs::parse);

    let mut features = Vec::new();
    for feature in value["features"].as_array().into_iter().flatten() {
        let geometry = &feature["geometry"];
        let coords = geometry["coordinates"].as_array();
        let parsed = match (geometry["type"].as_str(), coords) {
            (Some("Polygon"), Some(rings)) => MultiPolygon(vec![parse_polygon(rings)?]),
            (Some("MultiPolygon"), Some(polys)) => MultiPolygon(polys.iter()
                .map(|p| p.as_array()
                    .ok_or_else(|| anyhow!("[io::geojson] MultiPolygon member is not an array"))
                    .and_then(|rings| parse_polygon(rings)))
                .collect::<Result<Vec<_>>>()?),
            _ => continue,
        };
        if parsed.0.is_empty() {
            continue;
        }
        let properties = feature["properties"].as_object().cloned().unwrap_or_default();
        features.push(VectorFeature { properties, geometry: parsed });
    }

    Ok(FeatureCollection { crs, features })
}

fn parse_polygon(rings: &[Value]) -> Result<Polygon<f64>> {
    let mut rings = rings.iter().map(|ring| {
        ring.as_array()
            .ok_or_else(|| anyhow!("[io::geojson] ring is not an array"))
            .and_then(|r| parse_ring(r))
    });
    let exterior = rings.next()
        .ok_or_else(|| anyhow!("[io::geojson] polygon has no exterior ring"))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_ring(coords: &[Value]) -> Result<LineString<f64>> {
    let mut points = coords.iter()
        .map(|pair| {
            let x = pair[0].as_f64().ok_or_else(|| anyhow!("[io::geojson] x must be a number"))?;
            let y = pair[1].as_f64().ok_or_else(|| anyhow!("[io::geojson] y must be a number"))?;
            Ok(Coord { x, y })
        })
        .collect::<Result<Vec<_>>>()?;
    close_ring(&mut points);
    Ok(LineString(points))
}

fn ring_coords(ring: &LineString<f64>) -> Vec<[f64; 2]> {
    ring.coords().map(|c| [c.x, c.y]).collect()
}

fn multipolygon_json(mp: &MultiPolygon<f64>) -> Value {
    let polygons: Vec<Vec<Vec<[f64; 2]>>> = mp.0.iter()
        .map(|poly| std::iter::once(poly.exterior())
            .chain(poly.interiors())
            .map(ring_coords)
            .collect())
        .collect();
    json!({ "type": "MultiPolygon", "coordinates": polygons })
}

/// Serialize features as a GeoJSON FeatureCollection with an explicit `crs` member.
pub(crate) fn write_geojson_bytes<'a>(
    crs: &Crs,
    features: impl IntoIterator<Item = (Map<String, Value>, &'a MultiPolygon<f64>)>,
) -> Result<Vec<u8>> {
    let features: Vec<Value> = features.into_iter()
        .map(|(properties, geometry)| json!({
            "type": "Feature",
            "properties": properties,
            "geometry": multipolygon_json(geometry),
        }))
        .collect();

    let mut collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    if let Some(urn) = crs.urn() {
        collection["crs"] = json!({ "type": "name", "properties": { "name": urn } });
    }

    serde_json::to_vec(&collection).context("[io::geojson] Failed to serialize GeoJSON")
}

pub(crate) fn write_geojson<'a>(
    path: &Path,
    crs: &Crs,
    features: impl IntoIterator<Item = (Map<String, Value>, &'a MultiPolygon<f64>)>,
) -> Result<()> {
    let bytes = write_geojson_bytes(crs, features)?;
    crate::common::ensure_parent_exists(path)?;
    std::fs::write(path, bytes)
        .with_context(|| format!("[io::geojson] Failed to write {}", path.display()))
}

/// Read a property as a trimmed string, accepting numbers as well.
pub(crate) fn property_string(properties: &Map<String, Value>, key: &str) -> Option<String> {
    match properties.get(key)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
