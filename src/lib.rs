#![doc = "Country-level soil baselines: boundary resolution, raster source selection, depth compositing, zonal means and tabular joins"]
mod baseline;
mod boundary;
mod common;
mod config;
mod error;
mod geom;
mod io;
mod join;
mod pipeline;
mod raster;
mod source;
mod zonal;

#[doc(inline)]
pub use error::{Error, Result};

#[doc(inline)]
pub use common::{Fetch, HttpFetcher};

#[doc(inline)]
pub use geom::Crs;

#[doc(inline)]
pub use boundary::{BoundaryResolver, BoundarySet, CountryPolygon};

#[doc(inline)]
pub use source::{
    CatalogSearch, DirectRemote, GeoTiffOpener, LocalFile, RasterHandle, RasterOpener, SourceRequest, SourceSelector,
    SourceStrategy, SourceTier,
};

#[doc(inline)]
pub use raster::{
    align_to_reference, composite_name, same_grid, weighted_composite, DepthCompositor, DepthWeight, GeoTransform,
    InverseTransform, RasterLayer,
};

#[doc(inline)]
pub use zonal::{zonal_means, zonal_means_materialized, ZonalOptions, ZonalResult};

#[doc(inline)]
pub use baseline::{CountryBaseline, KEY_COLUMN};

#[doc(inline)]
pub use join::{
    flag_anomalies, join_baseline, normalize_table, Anomaly, JoinReport, MissingRow, PlausibilityBounds, PRICE_COLUMN,
    YEAR_COLUMN,
};

#[doc(inline)]
pub use config::{
    BoundaryConfig, HttpConfig, JoinJob, PipelineConfig, VariableSpec, ZonalConfig, DEFAULT_DEPTH_PATTERNS, PROFILES,
};

#[doc(inline)]
pub use pipeline::{join_files, JoinOutcome, Pipeline, PipelineReport, VariableOutcome};
