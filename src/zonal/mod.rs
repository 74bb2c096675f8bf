mod materialize;
mod stats;

pub use materialize::zonal_means_materialized;
pub use stats::{zonal_means, ZonalOptions, ZonalResult};
