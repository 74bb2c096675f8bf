use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Number, Value};
use shapefile::{dbase::{FieldValue, Record}, Reader, Shape};

use crate::geom::shp_to_geo;
use crate::io::{FeatureCollection, VectorFeature};

/// Reads polygon shapes + attribute records from a `.shp` file.
/// Non-polygon shapes are skipped; attributes become JSON properties.
pub(crate) fn read_shapefile(path: &Path) -> Result<FeatureCollection> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("[io::shp] Failed to open shapefile: {}", path.display()))?;

    let mut features = Vec::with_capacity(reader.shape_count()?);
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.context("[io::shp] Error reading shape+record")?;
        let Shape::Polygon(polygon) = shape else { continue };
        let geometry = shp_to_geo(&polygon);
        if geometry.0.is_empty() {
            continue;
        }
        features.push(VectorFeature { properties: record_to_properties(record), geometry });
    }

    // Shapefile CRS lives in a sidecar .prj; the datasets used here are EPSG:4326.
    Ok(FeatureCollection { crs: None, features })
}

fn record_to_properties(record: Record) -> Map<String, Value> {
    record.into_iter()
        .map(|(field, value)| {
            let value = match value {
                FieldValue::Character(Some(s)) => Value::String(s),
                FieldValue::Memo(s) => Value::String(s),
                FieldValue::Numeric(Some(n)) => number(n),
                FieldValue::Float(Some(n)) => number(n as f64),
                FieldValue::Double(n) | FieldValue::Currency(n) => number(n),
                FieldValue::Integer(n) => Value::Number(n.into()),
                FieldValue::Logical(Some(b)) => Value::Bool(b),
                _ => Value::Null,
            };
            (field, value)
        })
        .collect()
}

fn number(n: f64) -> Value {
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}
