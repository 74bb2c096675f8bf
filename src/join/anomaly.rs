use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::baseline::CountryBaseline;

/// Inclusive range of physically plausible values for one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlausibilityBounds {
    pub min: f64,
    pub max: f64,
}

impl PlausibilityBounds {
    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// A value outside its column's plausible range, kept for manual review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub country_code: String,
    /// Set for row-level values of the joined table; baseline values have no year.
    pub year: Option<i64>,
    pub column: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

/// Baseline values outside `bounds`, in column then country order.
pub fn flag_anomalies(baseline: &CountryBaseline, bounds: &BTreeMap<String, PlausibilityBounds>) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    for column in baseline.columns() {
        let Some(range) = bounds.get(column) else { continue };
        for code in baseline.codes() {
            let Some(value) = baseline.get(code, column) else { continue };
            if !range.contains(value) {
                anomalies.push(Anomaly {
                    country_code: code.to_string(),
                    year: None,
                    column: column.clone(),
                    value,
                    min: range.min,
                    max: range.max,
                });
            }
        }
    }
    anomalies
}
