//! GeoTIFF decoding and encoding on top of the pure-Rust `tiff` crate.
//!
//! Georeferencing is taken from ModelPixelScale + ModelTiepoint, or from
//! ModelTransformation when present; the frame comes from the GeoKeyDirectory.

use std::io::{Read, Seek, Write};

use anyhow::{anyhow, bail, Context, Result};
use tiff::{
    decoder::{Decoder, DecodingResult},
    encoder::{colortype, TiffEncoder},
    tags::Tag,
};

use crate::geom::Crs;
use crate::raster::GeoTransform;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GEO_ASCII_PARAMS: u16 = 34737;
const GDAL_NODATA: u16 = 42113;

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_GEOG_CITATION: u16 = 2049;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;
const KEY_PCS_CITATION: u16 = 3073;

const MODEL_PROJECTED: u16 = 1;
const MODEL_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

#[inline]
fn tag(code: u16) -> Tag { Tag::from_u16_exhaustive(code) }

/// A decoded single-band raster with its georeferencing.
#[derive(Debug, Clone)]
pub(crate) struct DecodedRaster {
    pub(crate) width: usize,
    pub(crate) height: usize,
    /// Row-major cell values.
    pub(crate) values: Vec<f64>,
    pub(crate) transform: GeoTransform,
    pub(crate) crs: Option<Crs>,
    pub(crate) no_data: Option<f64>,
}

/// Open the image directory and return its dimensions without decoding pixels.
pub(crate) fn probe_geotiff<R: Read + Seek>(reader: R) -> Result<(u32, u32)> {
    let mut decoder = Decoder::new(reader).context("[io::geotiff] not a TIFF")?;
    let (width, height) = decoder.dimensions().context("[io::geotiff] missing dimensions")?;
    if width == 0 || height == 0 {
        bail!("[io::geotiff] empty image ({width}x{height})");
    }
    Ok((width, height))
}

fn find_f64s<R: Read + Seek>(decoder: &mut Decoder<R>, code: u16) -> Result<Option<Vec<f64>>> {
    Ok(decoder.find_tag(tag(code))?.map(|v| v.into_f64_vec()).transpose()?)
}

/// GeoKeyDirectory contents: inline short values and citations from GeoAsciiParams.
#[derive(Debug, Default)]
struct GeoKeys {
    shorts: Vec<(u16, u16)>,
    ascii: Vec<(u16, String)>,
}

impl GeoKeys {
    fn short(&self, id: u16) -> Option<u16> {
        self.shorts.iter().find(|(k, _)| *k == id).map(|(_, v)| *v)
    }

    fn citations(&self) -> impl Iterator<Item = &str> {
        self.ascii.iter().map(|(_, text)| text.as_str())
    }
}

fn read_geo_keys<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoKeys> {
    let Some(value) = decoder.find_tag(tag(GEO_KEY_DIRECTORY))? else { return Ok(GeoKeys::default()) };
    let raw = value.into_u32_vec()?;
    let params = decoder.find_tag(tag(GEO_ASCII_PARAMS))?
        .map(|v| v.into_string())
        .transpose()?
        .unwrap_or_default();

    let mut keys = GeoKeys::default();
    for entry in raw.get(4..).unwrap_or(&[]).chunks_exact(4) {
        let (id, location) = (entry[0] as u16, entry[1] as u16);
        let (count, offset) = (entry[2] as usize, entry[3] as usize);
        match location {
            0 => keys.shorts.push((id, entry[3] as u16)),
            GEO_ASCII_PARAMS => {
                if let Some(text) = params.get(offset..offset + count) {
                    keys.ascii.push((id, text.trim_end_matches(['|', '\0']).trim().to_string()));
                }
            }
            _ => {}
        }
    }
    Ok(keys)
}

/// Frame declared by the GeoKeys. `None` only for rasters without a usable
/// geographic declaration; a projected raster must resolve or fail.
fn frame_from_keys(keys: &GeoKeys) -> Result<Option<Crs>> {
    let epsg = |id: u16| keys.short(id)
        .filter(|&code| code != 0 && code != USER_DEFINED)
        .map(|code| Crs::Epsg(u32::from(code)));
    let cited = keys.citations()
        .find(|c| c.starts_with("+proj="))
        .map(|c| Crs::Proj4(c.to_string()));

    let projected = keys.short(KEY_MODEL_TYPE) == Some(MODEL_PROJECTED)
        || keys.short(KEY_PROJECTED_CS_TYPE).is_some();
    if !projected {
        return Ok(epsg(KEY_GEOGRAPHIC_TYPE).or(cited));
    }
    if let Some(crs) = epsg(KEY_PROJECTED_CS_TYPE).or(cited) {
        return Ok(Some(crs));
    }
    if keys.citations().any(|c| c.to_ascii_lowercase().contains("homolosine")) {
        return Ok(Some(Crs::homolosine()));
    }
    let names: Vec<&str> = keys.citations().filter(|c| !c.is_empty()).collect();
    bail!(
        "[io::geotiff] projected raster with an unrecognised user-defined frame{}",
        if names.is_empty() { String::new() } else { format!(" ({})", names.join("; ")) }
    )
}

fn transform_from_tags(
    scale: Option<Vec<f64>>,
    tiepoint: Option<Vec<f64>>,
    matrix: Option<Vec<f64>>,
) -> Result<GeoTransform> {
    if let Some(m) = matrix.filter(|m| m.len() >= 16) {
        return Ok(GeoTransform {
            origin_x: m[3], pixel_width: m[0], row_rotation: m[1],
            origin_y: m[7], col_rotation: m[4], pixel_height: m[5],
        });
    }
    match (scale, tiepoint) {
        (Some(s), Some(tp)) if s.len() >= 2 && tp.len() >= 6 => Ok(GeoTransform {
            origin_x: tp[3] - tp[0] * s[0],
            pixel_width: s[0],
            row_rotation: 0.0,
            origin_y: tp[4] + tp[1] * s[1],
            col_rotation: 0.0,
            pixel_height: -s[1],
        }),
        _ => bail!("[io::geotiff] raster has no georeferencing tags"),
    }
}

fn samples_to_f64(result: DecodingResult) -> Result<Vec<f64>> {
    let values = match result {
        DecodingResult::U8(b) => b.into_iter().map(f64::from).collect(),
        DecodingResult::U16(b) => b.into_iter().map(f64::from).collect(),
        DecodingResult::U32(b) => b.into_iter().map(f64::from).collect(),
        DecodingResult::U64(b) => b.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(b) => b.into_iter().map(f64::from).collect(),
        DecodingResult::I16(b) => b.into_iter().map(f64::from).collect(),
        DecodingResult::I32(b) => b.into_iter().map(f64::from).collect(),
        DecodingResult::I64(b) => b.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(b) => b.into_iter().map(f64::from).collect(),
        DecodingResult::F64(b) => b,
        #[allow(unreachable_patterns)]
        _ => bail!("[io::geotiff] unsupported sample format"),
    };
    Ok(values)
}

/// Decode the first band of a GeoTIFF.
pub(crate) fn decode_geotiff<R: Read + Seek>(reader: R) -> Result<DecodedRaster> {
    let mut decoder = Decoder::new(reader).context("[io::geotiff] not a TIFF")?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let scale = find_f64s(&mut decoder, MODEL_PIXEL_SCALE)?;
    let tiepoint = find_f64s(&mut decoder, MODEL_TIEPOINT)?;
    let matrix = find_f64s(&mut decoder, MODEL_TRANSFORMATION)?;
    let mut transform = transform_from_tags(scale, tiepoint, matrix)?;

    let keys = read_geo_keys(&mut decoder)?;
    let pixel_is_point = keys.shorts.iter().any(|&(k, v)| k == KEY_RASTER_TYPE && v == RASTER_PIXEL_IS_POINT);
    if pixel_is_point {
        let corner = transform.apply(-0.5, -0.5);
        transform.origin_x = corner.x;
        transform.origin_y = corner.y;
    }
    let crs = frame_from_keys(&keys)?;

    let no_data = match decoder.find_tag(tag(GDAL_NODATA))? {
        Some(value) => {
            let text = value.into_string()?;
            let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            Some(text.parse::<f64>()
                .map_err(|_| anyhow!("[io::geotiff] unparseable GDAL_NODATA value {text:?}"))?)
        }
        None => None,
    };

    let samples = samples_to_f64(decoder.read_image().context("[io::geotiff] failed to decode pixels")?)?;
    let cells = width * height;
    if cells == 0 || samples.len() < cells {
        bail!("[io::geotiff] decoded {} samples for a {width}x{height} image", samples.len());
    }
    let stride = samples.len() / cells;
    let values = if stride == 1 { samples } else { samples.into_iter().step_by(stride).take(cells).collect() };

    Ok(DecodedRaster { width, height, values, transform, crs, no_data })
}

/// GeoKeyDirectory for `crs`, plus the GeoAsciiParams it refers to.
///
/// Frames without a 16-bit EPSG code are written as user-defined with their
/// PROJ.4 definition as citation, which `frame_from_keys` reads back.
fn geo_key_directory(crs: &Crs) -> (Vec<u16>, Option<String>) {
    let (model, type_key, citation_key) = if crs.is_geographic() {
        (MODEL_GEOGRAPHIC, KEY_GEOGRAPHIC_TYPE, KEY_GEOG_CITATION)
    } else {
        (MODEL_PROJECTED, KEY_PROJECTED_CS_TYPE, KEY_PCS_CITATION)
    };
    let mut keys: Vec<[u16; 4]> = vec![
        [KEY_MODEL_TYPE, 0, 1, model],
        [KEY_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA],
    ];
    let mut ascii = None;
    match crs.epsg().and_then(|code| u16::try_from(code).ok()) {
        Some(code) => keys.push([type_key, 0, 1, code]),
        None => {
            keys.push([type_key, 0, 1, USER_DEFINED]);
            if let Ok(def) = crs.proj4() {
                let text = format!("{def}|");
                keys.push([citation_key, GEO_ASCII_PARAMS, text.len() as u16, 0]);
                ascii = Some(text);
            }
        }
    }
    keys.sort_by_key(|k| k[0]);

    let mut out = vec![1, 1, 0, keys.len() as u16];
    out.extend(keys.into_iter().flatten());
    (out, ascii)
}

/// Encode a single-band 64-bit float GeoTIFF. Absent cells are expected as NaN,
/// which is declared as the no-data value.
pub(crate) fn encode_geotiff<W: Write + Seek>(
    writer: &mut W,
    width: usize,
    height: usize,
    values: &[f64],
    transform: &GeoTransform,
    crs: &Crs,
) -> Result<()> {
    let (keys, ascii) = geo_key_directory(crs);
    encode_geotiff_with_keys(writer, width, height, values, transform, &keys, ascii.as_deref())
}

/// As [`encode_geotiff`], with a raw GeoKeyDirectory and GeoAsciiParams.
pub(crate) fn encode_geotiff_with_keys<W: Write + Seek>(
    writer: &mut W,
    width: usize,
    height: usize,
    values: &[f64],
    transform: &GeoTransform,
    geo_keys: &[u16],
    geo_ascii: Option<&str>,
) -> Result<()> {
    if values.len() != width * height {
        bail!("[io::geotiff] {} values for a {width}x{height} image", values.len());
    }
    let mut encoder = TiffEncoder::new(writer).context("[io::geotiff] failed to start TIFF")?;
    let mut image = encoder.new_image::<colortype::Gray64Float>(width as u32, height as u32)?;
    {
        let dir = image.encoder();
        if transform.is_rotated() {
            let t = transform;
            let matrix = [
                t.pixel_width, t.row_rotation, 0.0, t.origin_x,
                t.col_rotation, t.pixel_height, 0.0, t.origin_y,
                0.0, 0.0, 0.0, 0.0,
                0.0, 0.0, 0.0, 1.0,
            ];
            dir.write_tag(tag(MODEL_TRANSFORMATION), &matrix[..])?;
        } else {
            let scale = [transform.pixel_width, -transform.pixel_height, 0.0];
            let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
            dir.write_tag(tag(MODEL_PIXEL_SCALE), &scale[..])?;
            dir.write_tag(tag(MODEL_TIEPOINT), &tiepoint[..])?;
        }
        dir.write_tag(tag(GEO_KEY_DIRECTORY), geo_keys)?;
        if let Some(text) = geo_ascii {
            dir.write_tag(tag(GEO_ASCII_PARAMS), text)?;
        }
        dir.write_tag(tag(GDAL_NODATA), "nan")?;
    }
    image.write_data(values).context("[io::geotiff] failed to write pixels")?;
    Ok(())
}
