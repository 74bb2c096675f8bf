mod crs;
mod polygon;

pub use crs::Crs;
pub(crate) use crs::CrsTransform;
pub(crate) use polygon::*;
