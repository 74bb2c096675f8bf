mod resolver;
mod set;

pub use resolver::BoundaryResolver;
pub use set::{BoundarySet, CountryPolygon};
pub(crate) use set::{normalize_code, reprojection};
