mod catalog;
mod handle;
mod opener;
mod selector;
mod strategy;

pub use handle::{RasterHandle, SourceTier};
pub use opener::{GeoTiffOpener, RasterOpener};
pub use selector::SourceSelector;
pub use strategy::{CatalogSearch, DirectRemote, LocalFile, SourceRequest, SourceStrategy};
