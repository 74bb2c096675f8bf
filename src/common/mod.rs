mod download;
mod fs;

pub use download::{Fetch, HttpFetcher};
pub(crate) use download::*;
pub(crate) use fs::*;
