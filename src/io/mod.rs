mod csv;
mod geojson;
mod geotiff;
mod shp;

pub(crate) use csv::*;
pub(crate) use geojson::*;
pub(crate) use geotiff::*;
pub(crate) use shp::*;
