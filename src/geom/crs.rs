use std::fmt;

use anyhow::{anyhow, bail, Result};
use geo::{Coord, MapCoords, MultiPolygon};
use proj4rs::{proj::Proj as Proj4, transform::transform};
use serde::{Deserialize, Serialize};

/// A coordinate reference frame, identified by EPSG code where possible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Crs {
    Epsg(u32),
    Proj4(String),
}

impl Crs {
    /// The canonical geographic frame every boundary is expressed in.
    pub const WGS84: Crs = Crs::Epsg(4326);

    /// Interrupted Goode Homolosine on WGS84, the frame of the SoilGrids 250 m grids.
    /// It has no EPSG code; GeoTIFFs declare it as user-defined.
    pub fn homolosine() -> Crs {
        Crs::Proj4("+proj=igh +lon_0=0 +x_0=0 +y_0=0 +datum=WGS84 +units=m +no_defs +type=crs".into())
    }

    /// Parse `EPSG:xxxx`, OGC URNs (`urn:ogc:def:crs:EPSG::xxxx`, `...:OGC:1.3:CRS84`)
    /// or a raw PROJ.4 string.
    pub fn parse(name: &str) -> Option<Crs> {
        let name = name.trim();
        if name.starts_with('+') {
            return Some(Crs::Proj4(name.to_string()));
        }
        let upper = name.to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Some(Crs::WGS84);
        }
        if !upper.contains("EPSG") {
            return None;
        }
        upper.rsplit(':').next()
            .and_then(|code| code.parse::<u32>().ok())
            .map(Crs::Epsg)
    }

    pub fn epsg(&self) -> Option<u32> {
        match self {
            Crs::Epsg(code) => Some(*code),
            Crs::Proj4(_) => None,
        }
    }

    pub fn is_geographic(&self) -> bool {
        match self {
            Crs::Epsg(code) => matches!(code, 4326 | 4258 | 4269 | 4937 | 4979),
            Crs::Proj4(s) => s.contains("+proj=longlat") || s.contains("+proj=latlong"),
        }
    }

    /// OGC URN used for GeoJSON `crs` members.
    pub fn urn(&self) -> Option<String> {
        self.epsg().map(|code| format!("urn:ogc:def:crs:EPSG::{code}"))
    }

    /// PROJ.4 definition for this frame.
    pub fn proj4(&self) -> Result<String> {
        let def = match self {
            Crs::Proj4(s) => return Ok(s.clone()),
            Crs::Epsg(4326) | Crs::Epsg(4979) => "+proj=longlat +datum=WGS84 +no_defs +type=crs".to_string(),
            Crs::Epsg(4258) => "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs +type=crs".to_string(),
            Crs::Epsg(4269) | Crs::Epsg(4937) => "+proj=longlat +datum=NAD83 +no_defs +type=crs".to_string(),
            Crs::Epsg(3035) => "+proj=laea +lat_0=52 +lon_0=10 +x_0=4321000 +y_0=3210000 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs +type=crs".to_string(),
            Crs::Epsg(3857) => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +nadgrids=@null +no_defs +type=crs".to_string(),
            Crs::Epsg(code @ 32601..=32660) => format!("+proj=utm +zone={} +datum=WGS84 +units=m +no_defs +type=crs", code - 32600),
            Crs::Epsg(code @ 32701..=32760) => format!("+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs +type=crs", code - 32700),
            Crs::Epsg(code) => bail!("no PROJ.4 definition known for EPSG:{code}"),
        };
        Ok(def)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{code}"),
            Crs::Proj4(s) => f.write_str(s),
        }
    }
}

/// Point transformation between two frames (degrees in and out for geographic frames).
pub(crate) struct CrsTransform {
    from: Proj4,
    to: Proj4,
    from_geographic: bool,
    to_geographic: bool,
}

impl CrsTransform {
    pub(crate) fn new(from: &Crs, to: &Crs) -> Result<Self> {
        let build = |crs: &Crs| -> Result<Proj4> {
            let def = crs.proj4()?;
            Proj4::from_proj_string(&def)
                .map_err(|e| anyhow!("failed to build PROJ.4 for {crs}: {e:?}"))
        };
        Ok(Self {
            from: build(from)?,
            to: build(to)?,
            from_geographic: from.is_geographic(),
            to_geographic: to.is_geographic(),
        })
    }

    pub(crate) fn apply(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let mut point = if self.from_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        transform(&self.from, &self.to, &mut point)
            .map_err(|e| anyhow!("CRS transform failed at ({x}, {y}): {e:?}"))?;
        let out = if self.to_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };
        if !out.0.is_finite() || !out.1.is_finite() {
            bail!("CRS transform produced a non-finite point at ({x}, {y})");
        }
        Ok(out)
    }

    pub(crate) fn apply_multipolygon(&self, mp: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        mp.try_map_coords(|c: Coord<f64>| {
            self.apply(c.x, c.y).map(|(x, y)| Coord { x, y })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn parse_names() {
        assert_eq!(Crs::parse("EPSG:4326"), Some(Crs::WGS84));
        assert_eq!(Crs::parse("urn:ogc:def:crs:EPSG::3035"), Some(Crs::Epsg(3035)));
        assert_eq!(Crs::parse("urn:ogc:def:crs:OGC:1.3:CRS84"), Some(Crs::WGS84));
        assert_eq!(Crs::parse("+proj=longlat +datum=WGS84"), Some(Crs::Proj4("+proj=longlat +datum=WGS84".into())));
        assert_eq!(Crs::parse("local grid"), None);
    }

    #[test]
    fn geographic_flags() {
        assert!(Crs::WGS84.is_geographic());
        assert!(!Crs::Epsg(3035).is_geographic());
        assert!(Crs::Proj4("+proj=longlat +ellps=GRS80".into()).is_geographic());
    }

    #[test]
    fn mercator_round_trip() {
        let fwd = CrsTransform::new(&Crs::WGS84, &Crs::Epsg(3857)).unwrap();
        let inv = CrsTransform::new(&Crs::Epsg(3857), &Crs::WGS84).unwrap();

        let (x, y) = fwd.apply(10.0, 50.0).unwrap();
        assert_abs_diff_eq!(x, 1_113_194.9, epsilon = 1.0);

        let (lon, lat) = inv.apply(x, y).unwrap();
        assert_abs_diff_eq!(lon, 10.0, epsilon = 1e-7);
        assert_abs_diff_eq!(lat, 50.0, epsilon = 1e-7);
    }
}
