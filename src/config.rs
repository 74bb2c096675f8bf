use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::join::PlausibilityBounds;
use crate::raster::DepthWeight;

const SOILGRIDS_URL: &str = "https://files.isric.org/soilgrids/latest/data/{sub}/{sub}_{depth}_mean.tif";

const OPENLANDMAP_MIRRORS: [&str; 2] = [
    "https://openlandmap.s3.eu-central-1.wasabisys.com/soil",
    "https://storage.googleapis.com/openlandmap/soil",
];
const OPENLANDMAP_STAC: &str = "https://stac.openlandmap.org";

/// Near-surface markers preferred among catalog assets.
pub const DEFAULT_DEPTH_PATTERNS: [&str; 5] = ["0-5", "0cm", "sl1", "top", "0_5"];

/// Where country polygons come from and how they are recognised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Resolved boundary set, reused across runs.
    pub cache_path: PathBuf,
    /// Multi-level boundary dataset (URL or path, GeoJSON).
    pub primary: String,
    /// Where a downloaded primary is kept; defaults to the cache directory.
    pub primary_local: Option<PathBuf>,
    pub level_field: String,
    pub level: i64,
    /// Candidate country-code fields, first present wins.
    pub code_fields: Vec<String>,
    /// Fallback dataset (URL or path, zipped shapefile or GeoJSON).
    pub secondary: String,
    pub secondary_local: Option<PathBuf>,
    pub name_fields: Vec<String>,
    /// Accepted lowercase names per country code.
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            cache_path: PathBuf::from("data/boundaries/nuts0_2024.geojson"),
            primary: "https://gisco-services.ec.europa.eu/distribution/v2/nuts/geojson/NUTS_RG_60M_2024_4326.geojson".into(),
            primary_local: None,
            level_field: "LEVL_CODE".into(),
            level: 0,
            code_fields: strings(&["CNTR_CODE", "cntr_code", "CNTRCODE", "ISO2", "ISO2_CODE", "CNTR_ID"]),
            secondary: "https://naturalearth.s3.amazonaws.com/50m_cultural/ne_50m_admin_0_countries.zip".into(),
            secondary_local: Some(PathBuf::from("data/boundaries/ne_50m_admin_0_countries.zip")),
            name_fields: strings(&["ADMIN", "NAME", "NAME_EN", "SOVEREIGNT", "ADM0_A3"]),
            aliases: BTreeMap::from([
                ("UK".to_string(), strings(&[
                    "united kingdom", "uk", "gb", "great britain",
                    "united kingdom of great britain and northern ireland",
                ])),
                ("EL".to_string(), strings(&["greece"])),
            ]),
        }
    }
}

/// One physical quantity: where its depth layers live and what its output column is called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub key: String,
    /// Output column in the baseline; the composite name when empty.
    #[serde(default)]
    pub column: String,
    /// Empty for a single undepthed layer.
    #[serde(default)]
    pub depths: Vec<DepthWeight>,
    #[serde(default)]
    pub local: Option<String>,
    #[serde(default)]
    pub direct: Vec<String>,
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default = "default_depth_patterns")]
    pub depth_patterns: Vec<String>,
    /// Multiplier from stored units to physical units.
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_depth_patterns() -> Vec<String> {
    DEFAULT_DEPTH_PATTERNS.iter().map(|s| s.to_string()).collect()
}

fn default_scale() -> f64 { 1.0 }

impl VariableSpec {
    fn soilgrids(key: &str, sub: &str, column: &str, scale: f64) -> Self {
        Self {
            key: key.into(),
            column: column.into(),
            depths: vec![
                DepthWeight::new("0-5cm", 5.0),
                DepthWeight::new("5-15cm", 10.0),
                DepthWeight::new("15-30cm", 15.0),
            ],
            local: Some("data/rasters/{variable}_{depth}.tif".into()),
            direct: vec![SOILGRIDS_URL.replace("{sub}", sub)],
            catalog: None,
            depth_patterns: default_depth_patterns(),
            scale,
        }
    }

    /// A single 0-5cm OpenLandMap layer: local file, two COG mirrors, then the STAC collection.
    fn openlandmap(key: &str, column: &str, local: &str, file: &str, collection: &str, scale: f64) -> Self {
        Self {
            key: key.into(),
            column: column.into(),
            depths: vec![DepthWeight::new("0-5cm", 5.0)],
            local: Some(local.into()),
            direct: OPENLANDMAP_MIRRORS.iter().map(|mirror| format!("{mirror}/{file}")).collect(),
            catalog: Some(format!("{OPENLANDMAP_STAC}/{collection}/collection.json")),
            depth_patterns: default_depth_patterns(),
            scale,
        }
    }

    fn openlandmap_set() -> Vec<Self> {
        vec![
            // pH is stored as pH x 10; SOC content is already g/kg.
            Self::openlandmap(
                "olm_ph_h2o", "ph_h2o", "data/rasters/ph_h2o_0_5cm.tif",
                "ph/ph_h2o_sl1_250m.tif", "ph.h2o_usda.4c1a2a", 0.1,
            ),
            Self::openlandmap(
                "olm_soc_gkg", "soc_gkg", "data/rasters/soc_0_5cm.tif",
                "soc/soc_content_sl1_250m_gkg.tif", "organic.carbon_usda.6a1c", 1.0,
            ),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            user_agent: concat!("soilbase/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}

/// A table to enrich with the baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZonalConfig {
    /// Count every cell touching a polygon, not just those whose center is inside.
    pub all_touched: bool,
    /// Compute statistics from a temporary GeoTIFF copy of each composite.
    pub materialize: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub boundaries: BoundaryConfig,
    pub target_codes: Vec<String>,
    pub variables: Vec<VariableSpec>,
    /// Plausible range per output column.
    pub bounds: BTreeMap<String, PlausibilityBounds>,
    pub http: HttpConfig,
    pub joins: Vec<JoinJob>,
    pub join_key: String,
    pub baseline_output: PathBuf,
    /// When set, each composite is also written here as `<name>.tif`.
    pub intermediate_dir: Option<PathBuf>,
    pub zonal: ZonalConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let target_codes = [
            "AT", "BE", "BG", "CY", "CZ", "DE", "DK", "EE", "EL", "ES", "FI", "FR", "HR", "HU", "IE",
            "IT", "LT", "LU", "LV", "MT", "NL", "PL", "PT", "RO", "SE", "SI", "SK", "UK",
        ];
        let mut variables = vec![
            VariableSpec::soilgrids("ph_h2o", "phh2o", "soil_ph_h2o", 0.1),
            VariableSpec::soilgrids("soc", "soc", "soil_soc_gkg", 0.1),
            VariableSpec::soilgrids("cec", "cec", "soil_cec_cmolkg", 0.1),
            VariableSpec::soilgrids("bd", "bdod", "soil_bd_gcm3", 0.01),
            VariableSpec::soilgrids("clay", "clay", "soil_clay_pct", 0.1),
            VariableSpec::soilgrids("silt", "silt", "soil_silt_pct", 0.1),
            VariableSpec::soilgrids("sand", "sand", "soil_sand_pct", 0.1),
            VariableSpec::soilgrids("cfvol", "cfvo", "soil_cf_vol_pct", 0.1),
        ];
        variables.extend(VariableSpec::openlandmap_set());
        let bounds = default_bounds();
        let joins = default_joins();

        Self {
            boundaries: BoundaryConfig::default(),
            target_codes: target_codes.iter().map(|c| c.to_string()).collect(),
            variables,
            bounds,
            http: HttpConfig::default(),
            joins,
            join_key: "geo".into(),
            baseline_output: PathBuf::from("soilgrids_country_baseline_0_30cm.csv"),
            intermediate_dir: None,
            zonal: ZonalConfig::default(),
        }
    }
}

fn default_bounds() -> BTreeMap<String, PlausibilityBounds> {
    [
        ("soil_ph_h2o", 3.0, 10.0),
        ("soil_soc_gkg", 0.0, 600.0),
        ("soil_cec_cmolkg", 0.0, 150.0),
        ("soil_bd_gcm3", 0.1, 2.5),
        ("soil_clay_pct", 0.0, 100.0),
        ("soil_silt_pct", 0.0, 100.0),
        ("soil_sand_pct", 0.0, 100.0),
        ("soil_cf_vol_pct", 0.0, 100.0),
        ("ph_h2o", 3.0, 10.0),
        ("soc_gkg", 0.0, 600.0),
        ("avg_temp_c", -5.0, 35.0),
    ]
    .into_iter()
    .map(|(column, min, max)| (column.to_string(), PlausibilityBounds { min, max }))
    .collect()
}

fn default_joins() -> Vec<JoinJob> {
    ["all_products_prices_6cats_2000_2024", "top_products_prices_6cats_2000_2024"]
        .into_iter()
        .map(|stem| JoinJob {
            input: PathBuf::from(format!("{stem}.csv")),
            output: PathBuf::from(format!("{stem}_with_soil.csv")),
        })
        .collect()
}

/// Named starting configurations for `init-config`.
pub const PROFILES: [&str; 2] = ["default", "openlandmap"];

impl PipelineConfig {
    /// Near-surface pH and organic carbon from OpenLandMap only.
    pub fn openlandmap() -> Self {
        Self {
            variables: VariableSpec::openlandmap_set(),
            baseline_output: PathBuf::from("soil_quality_country_openlandmap.csv"),
            ..Self::default()
        }
    }

    pub fn profile(name: &str) -> Result<Self> {
        match name {
            "default" => Ok(Self::default()),
            "openlandmap" => Ok(Self::openlandmap()),
            _ => Err(Error::Config(format!("unknown profile {name}, expected one of {}", PROFILES.join(", ")))),
        }
    }

    /// Read and validate a JSON configuration. Missing members take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("[config] Failed to read {}", path.display()))?;
        let config: Self = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn write_json_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).context("[config] Failed to serialize configuration")?;
        crate::common::ensure_parent_exists(path)?;
        std::fs::write(path, json)
            .with_context(|| format!("[config] Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn variable(&self, key: &str) -> Option<&VariableSpec> {
        self.variables.iter().find(|v| v.key == key)
    }

    /// Output column for a variable composite named `composite`.
    pub fn column_for(&self, spec: &VariableSpec, composite: &str) -> String {
        if spec.column.is_empty() { composite.to_string() } else { spec.column.clone() }
    }

    pub fn validate(&self) -> Result<()> {
        let mut keys = HashSet::new();
        let mut columns = HashSet::new();
        for spec in &self.variables {
            if spec.key.trim().is_empty() {
                return Err(Error::Config("variable with an empty key".into()));
            }
            if !keys.insert(spec.key.as_str()) {
                return Err(Error::Config(format!("duplicate variable key {}", spec.key)));
            }
            if !spec.column.is_empty() && !columns.insert(spec.column.as_str()) {
                return Err(Error::Config(format!("duplicate output column {}", spec.column)));
            }
            if let Some(d) = spec.depths.iter().find(|d| !(d.thickness > 0.0) || !d.thickness.is_finite()) {
                return Err(Error::Config(format!(
                    "depth {} of {} must have a positive thickness, got {}", d.depth_label, spec.key, d.thickness
                )));
            }
            if !spec.scale.is_finite() || spec.scale == 0.0 {
                return Err(Error::Config(format!("scale of {} must be finite and non-zero", spec.key)));
            }
            if spec.local.is_none() && spec.direct.is_empty() && spec.catalog.is_none() {
                return Err(Error::Config(format!("variable {} has no source candidates", spec.key)));
            }
        }
        for (column, b) in &self.bounds {
            if !(b.min <= b.max) {
                return Err(Error::Config(format!("bounds for {column} are inverted ({} > {})", b.min, b.max)));
            }
        }
        if self.join_key.trim().is_empty() {
            return Err(Error::Config("join key column must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.target_codes.len(), 28);
        assert_eq!(config.variables.len(), 10);

        let ph = config.variable("ph_h2o").unwrap();
        assert_eq!(ph.direct, vec!["https://files.isric.org/soilgrids/latest/data/phh2o/phh2o_{depth}_mean.tif"]);
        assert_eq!(ph.depths.iter().map(|d| d.thickness).sum::<f64>(), 30.0);
        assert_eq!(config.bounds["avg_temp_c"], PlausibilityBounds { min: -5.0, max: 35.0 });
    }

    #[test]
    fn defaults_reach_every_source_tier() {
        let config = PipelineConfig::default();
        let full = config.variables.iter()
            .filter(|v| v.local.is_some() && !v.direct.is_empty() && v.catalog.is_some())
            .map(|v| v.key.as_str())
            .collect::<Vec<_>>();
        assert_eq!(full, vec!["olm_ph_h2o", "olm_soc_gkg"]);

        let soc = config.variable("olm_soc_gkg").unwrap();
        assert_eq!(soc.local.as_deref(), Some("data/rasters/soc_0_5cm.tif"));
        assert_eq!(soc.direct, vec![
            "https://openlandmap.s3.eu-central-1.wasabisys.com/soil/soc/soc_content_sl1_250m_gkg.tif",
            "https://storage.googleapis.com/openlandmap/soil/soc/soc_content_sl1_250m_gkg.tif",
        ]);
        assert_eq!(
            soc.catalog.as_deref(),
            Some("https://stac.openlandmap.org/organic.carbon_usda.6a1c/collection.json")
        );
        assert!(config.bounds.contains_key("soc_gkg"));
    }

    #[test]
    fn openlandmap_profile_keeps_only_its_layers() {
        let config = PipelineConfig::profile("openlandmap").unwrap();
        config.validate().unwrap();
        let columns = config.variables.iter().map(|v| v.column.as_str()).collect::<Vec<_>>();
        assert_eq!(columns, vec!["ph_h2o", "soc_gkg"]);
        assert_eq!(config.baseline_output, PathBuf::from("soil_quality_country_openlandmap.csv"));
        assert_eq!(config.variable("olm_ph_h2o").unwrap().scale, 0.1);

        assert_eq!(PipelineConfig::profile("default").unwrap(), PipelineConfig::default());
        assert!(matches!(PipelineConfig::profile("isric"), Err(Error::Config(_))));
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{
            "target_codes": ["AT"],
            "variables": [{ "key": "ph", "direct": ["https://x/{depth}.tif"] }]
        }"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.target_codes, vec!["AT"]);
        assert_eq!(config.variables[0].scale, 1.0);
        assert_eq!(config.variables[0].depth_patterns.len(), 5);
        assert_eq!(config.join_key, "geo");
        assert_eq!(config.boundaries.level_field, "LEVL_CODE");
    }

    #[test]
    fn written_config_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/cfg.json");
        let config = PipelineConfig::default();
        config.write_json_file(&path).unwrap();
        assert_eq!(PipelineConfig::from_json_file(&path).unwrap(), config);
    }

    #[test]
    fn validation_rejects_bad_settings() {
        let mut config = PipelineConfig::default();
        config.variables[1].depths[0].thickness = 0.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PipelineConfig::default();
        config.variables[2].key = "ph_h2o".into();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PipelineConfig::default();
        config.bounds.insert("x".into(), PlausibilityBounds { min: 2.0, max: 1.0 });
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PipelineConfig::default();
        config.variables[0].local = None;
        config.variables[0].direct.clear();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
