use std::collections::BTreeMap;

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;

/// The subset of a catalog record the selector reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct CatalogDocument {
    #[serde(default)]
    pub(crate) assets: BTreeMap<String, CatalogAsset>,
    #[serde(default)]
    pub(crate) links: Vec<CatalogLink>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CatalogAsset {
    #[serde(default)]
    pub(crate) href: String,
    #[serde(default)]
    pub(crate) title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CatalogLink {
    #[serde(default)]
    pub(crate) rel: String,
    #[serde(default)]
    pub(crate) href: String,
}

/// A raster asset found in a catalog, with its address resolved to absolute form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AssetCandidate {
    /// Lowercased title, or the asset key when untitled.
    pub(crate) title: String,
    pub(crate) href: String,
}

impl CatalogDocument {
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("[source::catalog] invalid catalog document")
    }

    /// Assets whose address looks like a raster, in key order.
    pub(crate) fn raster_assets(&self, base: &str) -> Vec<AssetCandidate> {
        self.assets.iter()
            .filter(|(_, asset)| looks_like_raster(&asset.href))
            .map(|(key, asset)| AssetCandidate {
                title: asset.title.as_deref().unwrap_or(key).to_lowercase(),
                href: resolve_href(base, &asset.href),
            })
            .collect()
    }

    /// Absolute addresses of `item`/`items` links.
    pub(crate) fn child_links(&self, base: &str) -> Vec<String> {
        self.links.iter()
            .filter(|link| matches!(link.rel.as_str(), "item" | "items") && !link.href.is_empty())
            .map(|link| resolve_href(base, &link.href))
            .collect()
    }
}

fn looks_like_raster(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    [".tif", ".tiff", ".vrt", "/cog"].iter().any(|ext| lower.ends_with(ext))
}

/// Resolve `href` against `base`; falls back to `href` unchanged when either does not parse.
pub(crate) fn resolve_href(base: &str, href: &str) -> String {
    Url::parse(base)
        .and_then(|b| b.join(href))
        .map(String::from)
        .unwrap_or_else(|_| href.to_string())
}

/// Case-insensitive literal alternation over `patterns`; `None` when there are none.
pub(crate) fn preference_regex<S: AsRef<str>>(patterns: &[S]) -> Option<Regex> {
    if patterns.is_empty() {
        return None;
    }
    let alternation = patterns.iter()
        .map(|p| regex::escape(p.as_ref()))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i){alternation}")).ok()
}

/// Spellings of a depth label as it may appear in asset names.
pub(crate) fn depth_variants(label: &str) -> Vec<String> {
    let mut variants = vec![label.to_string()];
    for alt in [label.replace('-', "_"), label.replace('_', "-")] {
        if !variants.contains(&alt) {
            variants.push(alt);
        }
    }
    variants
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "assets": {
            "b_thumb": { "href": "thumb.png", "title": "Preview" },
            "a_top": { "href": "ph_0-5cm.tif", "title": "pH 0-5 cm" },
            "c_deep": { "href": "https://data.example.org/ph_sl4.TIF" }
        },
        "links": [
            { "rel": "self", "href": "collection.json" },
            { "rel": "item", "href": "items/ph_1.json" },
            { "rel": "items", "href": "https://other.example.org/all.json" }
        ]
    }"#;

    #[test]
    fn raster_assets_are_filtered_and_resolved() {
        let doc = CatalogDocument::parse(DOC.as_bytes()).unwrap();
        let assets = doc.raster_assets("https://stac.example.org/ph/collection.json");
        assert_eq!(assets, vec![
            AssetCandidate { title: "ph 0-5 cm".into(), href: "https://stac.example.org/ph/ph_0-5cm.tif".into() },
            AssetCandidate { title: "c_deep".into(), href: "https://data.example.org/ph_sl4.TIF".into() },
        ]);
    }

    #[test]
    fn only_item_links_are_followed() {
        let doc = CatalogDocument::parse(DOC.as_bytes()).unwrap();
        assert_eq!(doc.child_links("https://stac.example.org/ph/collection.json"), vec![
            "https://stac.example.org/ph/items/ph_1.json".to_string(),
            "https://other.example.org/all.json".to_string(),
        ]);
    }

    #[test]
    fn missing_members_default_to_empty() {
        let doc = CatalogDocument::parse(b"{}").unwrap();
        assert!(doc.assets.is_empty() && doc.links.is_empty());
        assert!(CatalogDocument::parse(b"[1,2]").is_err());
    }

    #[test]
    fn preference_patterns_are_literal_and_case_insensitive() {
        let re = preference_regex(&["0-5", "sl1", "a.b"]).unwrap();
        assert!(re.is_match("PH_SL1_250m.tif"));
        assert!(re.is_match("soc_0-5cm"));
        assert!(!re.is_match("axb"));
        assert!(preference_regex::<&str>(&[]).is_none());
    }

    #[test]
    fn depth_label_spellings() {
        assert_eq!(depth_variants("0-5cm"), vec!["0-5cm", "0_5cm"]);
        assert_eq!(depth_variants("top"), vec!["top"]);
    }
}
