mod align;
mod composite;
mod layer;
mod transform;

pub use align::{align_to_reference, same_grid};
pub use composite::{composite_name, weighted_composite, DepthCompositor};
pub use layer::{DepthWeight, RasterLayer};
pub use transform::{GeoTransform, InverseTransform};
