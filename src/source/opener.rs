use std::{fs::File, io::{BufReader, Cursor}, sync::Arc};

use anyhow::{Context, Result};

use crate::common::{is_remote, read_location, Fetch};
use crate::io::probe_geotiff;
use crate::raster::RasterLayer;

/// Opens raster locations, either fully or just far enough to count cells.
pub trait RasterOpener {
    /// Open `location` and return its cell count without decoding pixels.
    fn probe(&self, location: &str) -> Result<u64>;

    /// Open and decode `location` into a masked layer.
    fn open(&self, location: &str) -> Result<RasterLayer>;
}

/// GeoTIFF opener over local paths and remote addresses.
///
/// Remote probes download the whole file; the handle keeps only the location,
/// so a later `open` fetches it again.
pub struct GeoTiffOpener {
    fetcher: Arc<dyn Fetch>,
}

impl GeoTiffOpener {
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        Self { fetcher }
    }
}

impl RasterOpener for GeoTiffOpener {
    fn probe(&self, location: &str) -> Result<u64> {
        let (width, height) = if is_remote(location) {
            let bytes = self.fetcher.fetch(location)?;
            probe_geotiff(Cursor::new(bytes))?
        } else {
            let file = File::open(location)
                .with_context(|| format!("[source::opener] Failed to open {location}"))?;
            probe_geotiff(BufReader::new(file))?
        };
        Ok(u64::from(width) * u64::from(height))
    }

    fn open(&self, location: &str) -> Result<RasterLayer> {
        let bytes = read_location(self.fetcher.as_ref(), location)?;
        RasterLayer::from_geotiff_bytes(bytes, location)
    }
}
