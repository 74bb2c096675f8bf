use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::baseline::CountryBaseline;
use crate::boundary::{BoundaryResolver, BoundarySet};
use crate::common::{Fetch, HttpFetcher};
use crate::config::{PipelineConfig, VariableSpec};
use crate::error::{Error, Result};
use crate::io::{read_csv, write_csv};
use crate::join::{join_baseline, JoinReport, PlausibilityBounds};
use crate::raster::{composite_name, DepthCompositor, RasterLayer};
use crate::source::{RasterHandle, SourceSelector};
use crate::zonal::{zonal_means, zonal_means_materialized, ZonalOptions, ZonalResult};

/// What happened to one variable during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableOutcome {
    pub variable: String,
    pub column: String,
    /// Source chosen for each depth layer, in depth order.
    pub sources: Vec<RasterHandle>,
    /// Countries that received a value.
    pub countries_with_value: usize,
    /// Set when the variable could not be computed; its column is then all absent.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub report: JoinReport,
}

/// Everything a run produced besides its files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub boundary_count: usize,
    /// Target codes no boundary source could supply.
    pub boundary_gaps: Vec<String>,
    pub variables: Vec<VariableOutcome>,
    pub baseline_rows: usize,
    pub baseline_columns: usize,
    pub baseline_output: PathBuf,
    pub joins: Vec<JoinOutcome>,
}

impl PipelineReport {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).context("[pipeline] Failed to serialize report")?;
        crate::common::ensure_parent_exists(path)?;
        std::fs::write(path, json)
            .with_context(|| format!("[pipeline] Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Variables that failed.
    pub fn failures(&self) -> impl Iterator<Item = &VariableOutcome> {
        self.variables.iter().filter(|v| v.error.is_some())
    }
}

/// Boundaries, then one composite and zonal pass per variable, then the joins.
pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Arc<dyn Fetch>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, fetcher: Arc<dyn Fetch>) -> Self {
        Self { config, fetcher }
    }

    /// A pipeline fetching over HTTP with the configured timeout.
    pub fn with_http(config: PipelineConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.http.timeout(), &config.http.user_agent)?;
        Ok(Self::new(config, Arc::new(fetcher)))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn selector(&self) -> SourceSelector {
        SourceSelector::from_config(&self.config, self.fetcher.clone())
    }

    fn targets(&self) -> BTreeSet<String> {
        self.config.target_codes.iter().cloned().collect()
    }

    /// Resolve the target countries. An incomplete resolution is not fatal:
    /// the resolved subset is returned together with the missing codes.
    pub fn resolve_boundaries(&self) -> Result<(BoundarySet, Vec<String>)> {
        let resolver = BoundaryResolver::new(self.config.boundaries.clone(), self.fetcher.clone());
        let targets = self.targets();
        let (all, gaps) = match resolver.resolve_boundaries(&targets) {
            Ok(set) => (set, Vec::new()),
            Err(Error::BoundaryResolution { missing, partial }) => {
                warn!(codes = %missing.join(","), "continuing without some countries");
                (*partial, missing)
            }
            Err(e) => return Err(e),
        };
        let set = if targets.is_empty() { all } else { all.subset(&targets) };
        Ok((set, gaps))
    }

    /// Composite and aggregate every configured variable over `boundaries`.
    ///
    /// A failing variable is recorded in its outcome and leaves an all-absent column.
    pub fn build_baseline(&self, boundaries: &BoundarySet, gaps: &[String]) -> (CountryBaseline, Vec<VariableOutcome>) {
        let selector = self.selector();
        let compositor = DepthCompositor::new(&selector);

        let mut baseline = CountryBaseline::new();
        baseline.seed_codes(boundaries.codes());
        baseline.seed_codes(gaps.iter().map(String::as_str));

        let mut outcomes = Vec::with_capacity(self.config.variables.len());
        for spec in &self.config.variables {
            let column = self.config.column_for(spec, &composite_name(&spec.key, &spec.depths));
            let outcome = match self.aggregate_variable(&compositor, spec, boundaries) {
                Ok((sources, results)) => {
                    baseline.add_results(&column, &results);
                    VariableOutcome {
                        variable: spec.key.clone(),
                        countries_with_value: results.iter().filter(|r| r.mean_value.is_some()).count(),
                        column,
                        sources,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(variable = %spec.key, error = %e, "variable skipped");
                    baseline.add_results(&column, &[]);
                    VariableOutcome {
                        variable: spec.key.clone(),
                        column,
                        sources: Vec::new(),
                        countries_with_value: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        (baseline, outcomes)
    }

    fn aggregate_variable(
        &self,
        compositor: &DepthCompositor<'_>,
        spec: &VariableSpec,
        boundaries: &BoundarySet,
    ) -> Result<(Vec<RasterHandle>, Vec<ZonalResult>)> {
        let (mut layer, sources) = compositor.composite_with_sources(&spec.key, &spec.depths)?;
        layer.scale(spec.scale);

        if let Some(dir) = &self.config.intermediate_dir {
            self.write_intermediate(dir, &layer);
        }

        let options = ZonalOptions { all_touched: self.config.zonal.all_touched };
        let results = if self.config.zonal.materialize {
            zonal_means_materialized(&layer, boundaries.iter(), options)?
        } else {
            zonal_means(&layer, boundaries.iter(), options)?
        };
        info!(
            variable = %spec.key,
            countries = results.len(),
            with_value = results.iter().filter(|r| r.mean_value.is_some()).count(),
            "zonal means computed"
        );
        Ok((sources, results))
    }

    fn write_intermediate(&self, dir: &Path, layer: &RasterLayer) {
        let path = dir.join(format!("{}.tif", layer.name));
        match layer.write_geotiff(&path) {
            Ok(()) => info!(path = %path.display(), "wrote composite"),
            Err(e) => warn!(path = %path.display(), error = %format!("{e:#}"), "failed to write composite"),
        }
    }

    /// Join `baseline` onto every configured table.
    pub fn run_joins(&self, baseline: &CountryBaseline) -> Result<Vec<JoinOutcome>> {
        self.config.joins.iter()
            .map(|job| {
                let report = join_files(baseline, &job.input, &job.output, &self.config.join_key, &self.config.bounds)?;
                Ok(JoinOutcome { input: job.input.clone(), output: job.output.clone(), report })
            })
            .collect()
    }

    /// Run every stage and write the baseline and enriched tables.
    pub fn run(&self) -> Result<PipelineReport> {
        self.config.validate()?;

        let (boundaries, boundary_gaps) = self.resolve_boundaries()?;
        info!(countries = boundaries.len(), gaps = boundary_gaps.len(), "boundaries ready");

        let (baseline, variables) = self.build_baseline(&boundaries, &boundary_gaps);
        let baseline_output = self.config.baseline_output.clone();
        baseline.write_csv(&baseline_output)?;
        info!(path = %baseline_output.display(), rows = baseline.len(), "wrote country baseline");

        let joins = self.run_joins(&baseline)?;

        Ok(PipelineReport {
            boundary_count: boundaries.len(),
            boundary_gaps,
            variables,
            baseline_rows: baseline.len(),
            baseline_columns: baseline.columns().len(),
            baseline_output,
            joins,
        })
    }
}

/// Read `input`, join `baseline` onto it by `key` and write the result to `output`.
pub fn join_files(
    baseline: &CountryBaseline,
    input: &Path,
    output: &Path,
    key: &str,
    bounds: &BTreeMap<String, PlausibilityBounds>,
) -> Result<JoinReport> {
    let df = read_csv(input, &[key])?;
    let (mut joined, report) = join_baseline(df, baseline, key, bounds)
        .with_context(|| format!("[pipeline] Failed to join {}", input.display()))?;
    write_csv(&mut joined, output)?;
    info!(input = %input.display(), output = %output.display(), rows = report.total_rows, "wrote enriched table");
    Ok(report)
}
