use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

use anyhow::{bail, Context, Result};
use polars::prelude::{Column, DataFrame, DataType};

use crate::boundary::normalize_code;
use crate::io::{read_csv, write_csv};
use crate::zonal::ZonalResult;

/// Country code column of the baseline table.
pub const KEY_COLUMN: &str = "CNTR_CODE";

/// Wide per-country table: one row per code, one column per variable.
///
/// A missing entry is an absent value; absent and zero stay distinct through CSV.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountryBaseline {
    columns: Vec<String>,
    rows: BTreeMap<String, BTreeMap<String, f64>>,
}

impl CountryBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a row exists for every code, even if no value ever arrives.
    pub fn seed_codes<'a>(&mut self, codes: impl IntoIterator<Item = &'a str>) {
        for code in codes {
            self.rows.entry(normalize_code(code)).or_default();
        }
    }

    /// Outer-join one set of zonal results as `column`, replacing any previous values.
    pub fn add_results(&mut self, column: &str, results: &[ZonalResult]) {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
        for row in self.rows.values_mut() {
            row.remove(column);
        }
        for result in results {
            let row = self.rows.entry(normalize_code(&result.country_code)).or_default();
            if let Some(v) = result.mean_value {
                row.insert(column.to_string(), v);
            }
        }
    }

    /// Rename columns via `map` (old -> new); unknown names are ignored.
    pub fn rename_columns(&mut self, map: &HashMap<String, String>) {
        for column in &mut self.columns {
            if let Some(new) = map.get(column.as_str()) {
                *column = new.clone();
            }
        }
        for row in self.rows.values_mut() {
            *row = std::mem::take(row).into_iter()
                .map(|(k, v)| (map.get(&k).cloned().unwrap_or(k), v))
                .collect();
        }
    }

    pub fn get(&self, code: &str, column: &str) -> Option<f64> {
        self.rows.get(&normalize_code(code))?.get(column).copied()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rows.contains_key(&normalize_code(code))
    }

    pub fn columns(&self) -> &[String] { &self.columns }

    /// Codes in sorted order.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize { self.rows.len() }

    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    /// Values of `column` for each of `codes`.
    pub(crate) fn lookup<'a>(&self, column: &str, codes: impl IntoIterator<Item = Option<&'a str>>) -> Vec<Option<f64>> {
        codes.into_iter()
            .map(|code| code.and_then(|c| self.get(c, column)))
            .collect()
    }

    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let codes: Vec<&str> = self.codes().collect();
        let mut columns = vec![Column::new(KEY_COLUMN.into(), codes.clone())];
        for name in &self.columns {
            let values = self.lookup(name, codes.iter().map(|c| Some(*c)));
            columns.push(Column::new(name.as_str().into(), values));
        }
        DataFrame::new(columns).context("[baseline] Failed to assemble baseline table")
    }

    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let keys = df.column(KEY_COLUMN)
            .with_context(|| format!("[baseline] missing {KEY_COLUMN} column"))?
            .cast(&DataType::String)?;
        let keys = keys.str()?;

        let mut baseline = Self::new();
        baseline.seed_codes(keys.into_iter().flatten());
        if baseline.len() != keys.len() - keys.null_count() {
            bail!("[baseline] duplicate country codes in baseline table");
        }

        for column in df.get_columns().iter().filter(|c| c.name().as_str() != KEY_COLUMN) {
            let name = column.name().to_string();
            let values = column.cast(&DataType::Float64)
                .with_context(|| format!("[baseline] column {name} is not numeric"))?;
            let values = values.f64()?;
            baseline.columns.push(name.clone());
            for (code, value) in keys.into_iter().zip(values) {
                if let (Some(code), Some(value)) = (code, value) {
                    if let Some(row) = baseline.rows.get_mut(&normalize_code(code)) {
                        row.insert(name.clone(), value);
                    }
                }
            }
        }
        Ok(baseline)
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut df = self.to_dataframe()?;
        write_csv(&mut df, path)
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let df = read_csv(path, &[KEY_COLUMN])?;
        Self::from_dataframe(&df)
            .with_context(|| format!("[baseline] Failed to load {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(code: &str, variable: &str, mean_value: Option<f64>) -> ZonalResult {
        ZonalResult { country_code: code.into(), variable_key: variable.into(), mean_value, cell_count: 1 }
    }

    fn sample() -> CountryBaseline {
        let mut baseline = CountryBaseline::new();
        baseline.seed_codes(["AT", "BE", "UK", "EL"]);
        baseline.add_results("ph_h2o_0_30cm", &[result("AT", "ph", Some(6.25)), result("BE", "ph", Some(0.0)), result("UK", "ph", None)]);
        baseline.add_results("soc_0_30cm", &[result("AT", "soc", Some(41.125)), result("DE", "soc", Some(-1.5))]);
        baseline
    }

    #[test]
    fn results_are_outer_joined() {
        let baseline = sample();
        assert_eq!(baseline.codes().collect::<Vec<_>>(), vec!["AT", "BE", "DE", "EL", "UK"]);
        assert_eq!(baseline.get("at", "ph_h2o_0_30cm"), Some(6.25));
        assert_eq!(baseline.get("BE", "ph_h2o_0_30cm"), Some(0.0));
        assert_eq!(baseline.get("UK", "ph_h2o_0_30cm"), None);
        assert_eq!(baseline.get("DE", "ph_h2o_0_30cm"), None);
        assert_eq!(baseline.get("DE", "soc_0_30cm"), Some(-1.5));
        assert_eq!(baseline.get("EL", "soc_0_30cm"), None);
    }

    #[test]
    fn re_adding_a_column_replaces_it() {
        let mut baseline = sample();
        baseline.add_results("soc_0_30cm", &[result("BE", "soc", Some(3.0))]);
        assert_eq!(baseline.columns(), ["ph_h2o_0_30cm", "soc_0_30cm"]);
        assert_eq!(baseline.get("AT", "soc_0_30cm"), None);
        assert_eq!(baseline.get("BE", "soc_0_30cm"), Some(3.0));
    }

    #[test]
    fn renaming_moves_values() {
        let mut baseline = sample();
        let map = HashMap::from([("ph_h2o_0_30cm".to_string(), "soil_ph_h2o".to_string())]);
        baseline.rename_columns(&map);
        assert_eq!(baseline.columns(), ["soil_ph_h2o", "soc_0_30cm"]);
        assert_eq!(baseline.get("AT", "soil_ph_h2o"), Some(6.25));
        assert_eq!(baseline.get("AT", "ph_h2o_0_30cm"), None);
    }

    #[test]
    fn csv_round_trip_keeps_absent_cells_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/baseline.csv");
        let baseline = sample();
        baseline.write_csv(&path).unwrap();

        let back = CountryBaseline::read_csv(&path).unwrap();
        assert_eq!(back, baseline);
        assert_eq!(back.get("BE", "ph_h2o_0_30cm"), Some(0.0));
        assert_eq!(back.get("EL", "ph_h2o_0_30cm"), None);
    }

    #[test]
    fn all_absent_column_survives_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.csv");
        let mut baseline = CountryBaseline::new();
        baseline.seed_codes(["AT", "BE"]);
        baseline.add_results("cec", &[]);
        baseline.write_csv(&path).unwrap();

        let back = CountryBaseline::read_csv(&path).unwrap();
        assert_eq!(back.columns(), ["cec"]);
        assert_eq!(back.get("AT", "cec"), None);
    }
}
