use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, Context, Result};
use polars::prelude::{DataFrame, DataType, Float64Chunked, Int64Chunked, IntoSeries, StringChunked};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::baseline::CountryBaseline;
use crate::io::parse_locale_number;
use crate::join::{flag_anomalies, Anomaly, PlausibilityBounds};

/// Year column coerced to integers when present.
pub const YEAR_COLUMN: &str = "year";
/// Price column parsed from locale-formatted text when read as strings.
pub const PRICE_COLUMN: &str = "price_eur_tonne";

/// Rows listed individually in a report.
const MISSING_PAIR_LIMIT: usize = 20;

/// A joined row that lacks at least one baseline value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingRow {
    pub year: Option<i64>,
    pub key: Option<String>,
}

/// Coverage and plausibility of one join.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinReport {
    pub total_rows: usize,
    /// Rows with at least one absent baseline column.
    pub missing_count: usize,
    /// Distinct keys with no baseline row.
    pub missing_keys: Vec<String>,
    /// The first missing rows, in table order.
    pub missing_pairs: Vec<MissingRow>,
    pub anomalies: Vec<Anomaly>,
    /// Rows whose `year` was present but not a whole number, now null.
    #[serde(default)]
    pub coerced_years: usize,
}

/// Trim and uppercase the key column, coerce `year` to integers and parse a
/// text `price_eur_tonne` as a locale-formatted number.
pub fn normalize_table(df: DataFrame, key_column: &str) -> Result<DataFrame> {
    normalize(df, key_column).map(|(df, _)| df)
}

/// [`normalize_table`], also returning how many years were coerced to null.
fn normalize(mut df: DataFrame, key_column: &str) -> Result<(DataFrame, usize)> {
    let key = df.column(key_column)
        .map_err(|_| anyhow!("[join] table has no {key_column:?} column"))?
        .cast(&DataType::String)?;
    let normalized: StringChunked = key.str()?
        .into_iter()
        .map(|k| k.map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty()))
        .collect();
    df.replace_or_add(key_column.into(), normalized.into_series())?;

    let coerced_years = coerce_years(&mut df)?;

    if let Ok(price) = df.column(PRICE_COLUMN) {
        if price.dtype() == &DataType::String {
            let parsed: Float64Chunked = price.str()?
                .into_iter()
                .map(|p| p.and_then(parse_locale_number))
                .collect();
            df.replace_or_add(PRICE_COLUMN.into(), parsed.into_series())?;
        }
    }

    Ok((df, coerced_years))
}

/// Cast `year` to integers. Values that are not whole numbers become null;
/// returns how many.
fn coerce_years(df: &mut DataFrame) -> Result<usize> {
    let Ok(year) = df.column(YEAR_COLUMN) else { return Ok(0) };
    if year.dtype() == &DataType::Int64 {
        return Ok(0);
    }
    let present = year.len() - year.null_count();
    let as_int: Int64Chunked = year.cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .map(|y| y.filter(|y| y.fract() == 0.0).map(|y| y as i64))
        .collect();
    let coerced = present.saturating_sub(as_int.len() - as_int.null_count());
    df.replace_or_add(YEAR_COLUMN.into(), as_int.into_series())?;

    if coerced > 0 {
        warn!(rows = coerced, column = YEAR_COLUMN, "values that are not whole years set to null");
    }
    Ok(coerced)
}

/// Left-join `baseline` onto `df` by `key_column`, broadcasting each country's
/// values to all of its rows.
///
/// Every input row is kept. Baseline columns are appended after the input's
/// columns, or replaced in place when the table already has them, so joining
/// twice gives the same columns.
pub fn join_baseline(
    df: DataFrame,
    baseline: &CountryBaseline,
    key_column: &str,
    bounds: &BTreeMap<String, PlausibilityBounds>,
) -> Result<(DataFrame, JoinReport)> {
    let (mut df, coerced_years) = normalize(df, key_column)?;

    let keys_column = df.column(key_column)?.clone();
    let keys = keys_column.str()?;
    let years = year_values(&df)?;

    let mut row_missing = vec![false; df.height()];
    for column in baseline.columns() {
        let values = baseline.lookup(column, keys.into_iter());
        for (flag, v) in row_missing.iter_mut().zip(&values) {
            *flag |= v.is_none();
        }
        let values: Float64Chunked = values.into_iter().collect();
        df.replace_or_add(column.as_str().into(), values.into_series())
            .with_context(|| format!("[join] Failed to add column {column}"))?;
    }

    let missing_keys: BTreeSet<String> = keys.into_iter()
        .flatten()
        .filter(|k| !baseline.contains(k))
        .map(str::to_string)
        .collect();

    let missing_pairs = row_missing.iter()
        .enumerate()
        .filter(|(_, missing)| **missing)
        .take(MISSING_PAIR_LIMIT)
        .map(|(i, _)| MissingRow {
            year: years.get(i).copied().flatten(),
            key: keys.get(i).map(str::to_string),
        })
        .collect();

    let mut anomalies = flag_anomalies(baseline, bounds);
    anomalies.extend(row_anomalies(&df, baseline, key_column, bounds, &years)?);

    let report = JoinReport {
        total_rows: df.height(),
        missing_count: row_missing.iter().filter(|m| **m).count(),
        missing_keys: missing_keys.into_iter().collect(),
        missing_pairs,
        anomalies,
        coerced_years,
    };

    if report.missing_count > 0 {
        warn!(rows = report.missing_count, keys = %report.missing_keys.join(","), "rows without baseline values");
    }
    info!(rows = report.total_rows, columns = df.width(), anomalies = report.anomalies.len(), "joined baseline");
    Ok((df, report))
}

fn year_values(df: &DataFrame) -> Result<Vec<Option<i64>>> {
    match df.column(YEAR_COLUMN) {
        Ok(year) => Ok(year.cast(&DataType::Int64)?.i64()?.into_iter().collect()),
        Err(_) => Ok(vec![None; df.height()]),
    }
}

/// Bounded columns of the table itself (not baseline columns) checked row by row.
fn row_anomalies(
    df: &DataFrame,
    baseline: &CountryBaseline,
    key_column: &str,
    bounds: &BTreeMap<String, PlausibilityBounds>,
    years: &[Option<i64>],
) -> Result<Vec<Anomaly>> {
    let keys = df.column(key_column)?.str()?.clone();
    let mut anomalies = Vec::new();
    for (column, range) in bounds {
        if baseline.columns().contains(column) {
            continue;
        }
        let Ok(values) = df.column(column) else { continue };
        let Ok(values) = values.cast(&DataType::Float64) else { continue };
        for (i, value) in values.f64()?.into_iter().enumerate() {
            let Some(value) = value.filter(|v| !range.contains(*v)) else { continue };
            anomalies.push(Anomaly {
                country_code: keys.get(i).unwrap_or_default().to_string(),
                year: years.get(i).copied().flatten(),
                column: column.clone(),
                value,
                min: range.min,
                max: range.max,
            });
        }
    }
    Ok(anomalies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::read_csv_bytes;
    use crate::zonal::ZonalResult;

    fn baseline() -> CountryBaseline {
        let result = |code: &str, v: Option<f64>| ZonalResult {
            country_code: code.into(), variable_key: "x".into(), mean_value: v, cell_count: 1,
        };
        let mut baseline = CountryBaseline::new();
        baseline.add_results("soil_ph_h2o", &[result("AT", Some(6.5)), result("BE", Some(5.75)), result("UK", None)]);
        baseline.add_results("soil_clay_pct", &[result("AT", Some(21.0)), result("BE", Some(140.0))]);
        baseline
    }

    fn bounds() -> BTreeMap<String, PlausibilityBounds> {
        BTreeMap::from([
            ("soil_clay_pct".to_string(), PlausibilityBounds { min: 0.0, max: 100.0 }),
            ("avg_temp_c".to_string(), PlausibilityBounds { min: -5.0, max: 35.0 }),
        ])
    }

    const TABLE: &[u8] = b"year;geo;product;price_eur_tonne;avg_temp_c\n\
        2000;at;wheat;4 733,9;9.5\n\
        2001; AT ;wheat;250;48.0\n\
        2000;XX;wheat;1.234,5;10\n\
        2001;BE;barley;:;11\n";

    #[test]
    fn unmatched_rows_are_kept_with_absent_values() {
        let df = read_csv_bytes(TABLE, &["geo"]).unwrap();
        let (out, report) = join_baseline(df, &baseline(), "geo", &bounds()).unwrap();

        assert_eq!(out.height(), 4);
        let names: Vec<&str> = out.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, ["year", "geo", "product", "price_eur_tonne", "avg_temp_c", "soil_ph_h2o", "soil_clay_pct"]);

        let geo: Vec<Option<&str>> = out.column("geo").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(geo, [Some("AT"), Some("AT"), Some("XX"), Some("BE")]);

        let ph: Vec<Option<f64>> = out.column("soil_ph_h2o").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(ph, [Some(6.5), Some(6.5), None, Some(5.75)]);

        assert_eq!(report.total_rows, 4);
        assert_eq!(report.missing_count, 1);
        assert_eq!(report.missing_keys, ["XX"]);
        assert_eq!(report.missing_pairs, [MissingRow { year: Some(2000), key: Some("XX".into()) }]);
    }

    #[test]
    fn joining_twice_keeps_the_same_columns() {
        let df = read_csv_bytes(TABLE, &["geo"]).unwrap();
        let (once, first) = join_baseline(df, &baseline(), "geo", &bounds()).unwrap();
        let (twice, second) = join_baseline(once.clone(), &baseline(), "geo", &bounds()).unwrap();

        assert_eq!(once.get_column_names(), twice.get_column_names());
        assert!(once.equals_missing(&twice));
        assert_eq!(first, second);
    }

    #[test]
    fn locale_prices_and_years_are_normalized() {
        let df = read_csv_bytes(TABLE, &["geo"]).unwrap();
        let df = normalize_table(df, "geo").unwrap();

        let price: Vec<Option<f64>> = df.column(PRICE_COLUMN).unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(price, [Some(4733.9), Some(250.0), Some(1234.5), None]);
        assert_eq!(df.column(YEAR_COLUMN).unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn unparseable_years_are_nulled_and_counted() {
        let table = b"year,geo,price_eur_tonne\n2000,AT,1\n2000Q1,AT,2\n2001.5,BE,3\n,BE,4\n";
        let df = read_csv_bytes(table, &["geo"]).unwrap();
        let (out, report) = join_baseline(df, &baseline(), "geo", &bounds()).unwrap();

        let years: Vec<Option<i64>> = out.column(YEAR_COLUMN).unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(years, [Some(2000), None, None, None]);
        // the empty cell was already absent
        assert_eq!(report.coerced_years, 2);
    }

    #[test]
    fn anomalies_cover_baseline_and_table_columns() {
        let df = read_csv_bytes(TABLE, &["geo"]).unwrap();
        let (_, report) = join_baseline(df, &baseline(), "geo", &bounds()).unwrap();

        assert_eq!(report.anomalies.len(), 2);
        let clay = &report.anomalies[0];
        assert_eq!((clay.country_code.as_str(), clay.column.as_str(), clay.year), ("BE", "soil_clay_pct", None));
        let temp = &report.anomalies[1];
        assert_eq!((temp.country_code.as_str(), temp.column.as_str(), temp.year, temp.value), ("AT", "avg_temp_c", Some(2001), 48.0));
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let df = read_csv_bytes(b"year,country\n2000,AT\n", &[]).unwrap();
        assert!(join_baseline(df, &baseline(), "geo", &bounds()).is_err());
    }
}
