use ndarray::{Array2, Zip};
use regex::Regex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::raster::{align_to_reference, DepthWeight, RasterLayer};
use crate::source::{RasterHandle, SourceSelector};

/// Thickness-weighted mean of aligned grids.
///
/// The denominator is cell-local: only layers defined at a cell contribute their
/// weight, and a cell undefined in every layer stays undefined.
pub fn weighted_composite(layers: &[(Array2<Option<f64>>, f64)]) -> Result<Array2<Option<f64>>> {
    let Some(((first, _), rest)) = layers.split_first() else {
        return Err(Error::Config("cannot composite an empty list of layers".into()));
    };
    if let Some((grid, _)) = rest.iter().find(|(g, _)| g.dim() != first.dim()) {
        return Err(Error::GridAlignment {
            layer: format!("{:?}", grid.dim()),
            reason: format!("shape differs from reference {:?}", first.dim()),
        });
    }

    let mut sum = Array2::<f64>::zeros(first.dim());
    let mut weight = Array2::<f64>::zeros(first.dim());
    for (grid, w) in layers {
        Zip::from(&mut sum).and(&mut weight).and(grid).for_each(|s, tw, v| {
            if let Some(v) = v {
                *s += v * w;
                *tw += w;
            }
        });
    }

    Ok(Zip::from(&sum).and(&weight).map_collect(|&s, &w| (w > 0.0).then(|| s / w)))
}

/// Name of a composite, e.g. `ph_h2o_0_30cm` for `0-5cm .. 15-30cm`.
pub fn composite_name(variable_key: &str, depths: &[DepthWeight]) -> String {
    let (Some(first), Some(last)) = (depths.first(), depths.last()) else {
        return variable_key.to_string();
    };

    let range = Regex::new(r"^(\d+)\s*[-_]\s*(\d+)\s*([A-Za-z]*)$").ok();
    let parse = |label: &str| {
        range.as_ref()?.captures(label.trim())
            .map(|c| (c[1].to_string(), c[2].to_string(), c[3].to_string()))
    };

    match (parse(&first.depth_label), parse(&last.depth_label)) {
        (Some((top, _, _)), Some((_, bottom, unit))) => format!("{variable_key}_{top}_{bottom}{unit}"),
        _ => {
            let labels: Vec<String> = depths.iter()
                .map(|d| d.depth_label.replace(['-', ' '], "_"))
                .collect();
            format!("{variable_key}_{}", labels.join("_"))
        }
    }
}

/// Builds one composite layer per variable from its depth layers.
pub struct DepthCompositor<'a> {
    selector: &'a SourceSelector,
}

impl<'a> DepthCompositor<'a> {
    pub fn new(selector: &'a SourceSelector) -> Self {
        Self { selector }
    }

    /// Select, load, align and combine every depth layer of `variable_key`.
    pub fn composite(&self, variable_key: &str, depths: &[DepthWeight]) -> Result<RasterLayer> {
        self.composite_with_sources(variable_key, depths).map(|(layer, _)| layer)
    }

    /// As [`composite`](Self::composite), also returning the handle chosen for each depth.
    ///
    /// An empty `depths` list means the variable has a single undepthed layer.
    pub fn composite_with_sources(
        &self,
        variable_key: &str,
        depths: &[DepthWeight],
    ) -> Result<(RasterLayer, Vec<RasterHandle>)> {
        if let Some(bad) = depths.iter().find(|d| !(d.thickness > 0.0) || !d.thickness.is_finite()) {
            return Err(Error::Config(format!(
                "depth {} of {variable_key} has non-positive thickness {}", bad.depth_label, bad.thickness
            )));
        }

        if depths.is_empty() {
            let handle = self.selector.select_source(variable_key, None)?;
            let mut layer = self.load(&handle, variable_key, None)?;
            layer.name = variable_key.to_string();
            return Ok((layer, vec![handle]));
        }

        let mut handles = Vec::with_capacity(depths.len());
        let mut layers = Vec::with_capacity(depths.len());
        for depth in depths {
            let handle = self.selector.select_source(variable_key, Some(&depth.depth_label))?;
            layers.push(self.load(&handle, variable_key, Some(&depth.depth_label))?);
            handles.push(handle);
        }

        let mut layers = layers.into_iter();
        let Some(mut reference) = layers.next() else {
            return Err(Error::Config(format!("no depth layers loaded for {variable_key}")));
        };

        let mut weighted = Vec::with_capacity(depths.len());
        weighted.push((reference.grid.clone(), depths[0].thickness));
        for (layer, depth) in layers.zip(&depths[1..]) {
            weighted.push((align_to_reference(&reference, &layer)?, depth.thickness));
        }

        reference.grid = weighted_composite(&weighted)?;
        reference.name = composite_name(variable_key, depths);
        reference.variable_key = variable_key.to_string();
        reference.depth_label = None;
        reference.no_data = None;

        info!(
            variable = variable_key,
            name = %reference.name,
            layers = depths.len(),
            defined = reference.defined_count(),
            "composited depth layers"
        );
        Ok((reference, handles))
    }

    fn load(&self, handle: &RasterHandle, variable_key: &str, depth: Option<&str>) -> Result<RasterLayer> {
        debug!(variable = variable_key, depth, location = %handle.location, tier = %handle.tier, "loading layer");
        let mut layer = self.selector.opener().open(&handle.location)?;
        layer.variable_key = variable_key.to_string();
        layer.depth_label = depth.map(str::to_string);
        Ok(layer)
    }
}
