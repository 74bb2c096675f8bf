mod common;

use std::sync::Arc;

use common::{geotiff_bytes, layer, write_layer, MapFetcher};
use ndarray::Array2;
use serde_json::json;
use soilbase::{
    CatalogSearch, DirectRemote, Error, GeoTiffOpener, LocalFile, SourceSelector, SourceStrategy, SourceTier,
};

const CATALOG: &str = "https://catalog.test/collections/soc/collection.json";

fn raster(value: f64, rows: usize, cols: usize) -> Vec<u8> {
    geotiff_bytes(&layer(Array2::from_elem((rows, cols), Some(value)), 0.0, 10.0, 1.0))
}

fn selector(fetcher: Arc<MapFetcher>, chain: Vec<Box<dyn SourceStrategy>>) -> SourceSelector {
    SourceSelector::new(Box::new(GeoTiffOpener::new(fetcher))).with_chain("soc", chain)
}

fn catalog_search(fetcher: &Arc<MapFetcher>) -> Box<dyn SourceStrategy> {
    Box::new(CatalogSearch {
        url: CATALOG.into(),
        depth_patterns: soilbase::DEFAULT_DEPTH_PATTERNS.iter().map(|s| s.to_string()).collect(),
        fetcher: fetcher.clone(),
    })
}

#[test]
fn every_tier_failing_reports_each_attempt() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("soc_0-5cm.tif"), b"not a tiff").unwrap();

    let catalog = json!({
        "assets": {
            "thumbnail": { "href": "thumb.png", "title": "Preview" },
            "metadata": { "href": "meta.xml" },
        }
    });
    let fetcher = Arc::new(MapFetcher::new().with(CATALOG, serde_json::to_vec(&catalog).unwrap()));
    let chain: Vec<Box<dyn SourceStrategy>> = vec![
        Box::new(LocalFile { path: format!("{}/{{variable}}_{{depth}}.tif", dir.path().display()) }),
        Box::new(DirectRemote { candidates: Vec::new() }),
        catalog_search(&fetcher),
    ];

    match selector(fetcher, chain).select_source("soc", Some("0-5cm")) {
        Err(Error::SourceUnavailable { variable, depth, attempts }) => {
            assert_eq!(variable, "soc");
            assert_eq!(depth.as_deref(), Some("0-5cm"));
            assert_eq!(attempts.len(), 2);
            assert!(attempts[0].starts_with("local "));
            assert!(attempts[1].contains("no raster assets"));
        }
        other => panic!("expected SourceUnavailable, got {other:?}"),
    }
}

#[test]
fn readable_local_file_wins() {
    let dir = tempfile::tempdir().unwrap();
    write_layer(
        &dir.path().join("soc_5-15cm.tif"),
        &layer(Array2::from_elem((3, 4), Some(12.0)), 0.0, 3.0, 1.0),
    );

    let fetcher = Arc::new(MapFetcher::new());
    let chain: Vec<Box<dyn SourceStrategy>> = vec![
        Box::new(LocalFile { path: format!("{}/{{variable}}_{{depth}}.tif", dir.path().display()) }),
        Box::new(DirectRemote { candidates: vec!["https://never.test/{depth}.tif".into()] }),
    ];

    let handle = selector(fetcher.clone(), chain).select_source("soc", Some("5-15cm")).unwrap();
    assert_eq!(handle.tier, SourceTier::Local);
    assert_eq!(handle.cell_count, 12);
    assert!(handle.location.ends_with("soc_5-15cm.tif"));
    assert_eq!(fetcher.call_count(), 0);
}

#[test]
fn direct_candidates_are_tried_in_order() {
    let fetcher = Arc::new(MapFetcher::new().with("https://mirror.test/soc_0-5cm.tif", raster(1.0, 2, 5)));
    let chain: Vec<Box<dyn SourceStrategy>> = vec![
        Box::new(LocalFile { path: "/nonexistent/soc_{depth}.tif".into() }),
        Box::new(DirectRemote {
            candidates: vec![
                "https://primary.test/{variable}_{depth}.tif".into(),
                "https://mirror.test/{variable}_{depth}.tif".into(),
            ],
        }),
    ];

    let handle = selector(fetcher, chain).select_source("soc", Some("0-5cm")).unwrap();
    assert_eq!(handle.tier, SourceTier::DirectRemote);
    assert_eq!(handle.location, "https://mirror.test/soc_0-5cm.tif");
    assert_eq!(handle.cell_count, 10);
}

#[test]
fn catalog_prefers_the_requested_depth_among_child_items() {
    let collection = json!({
        "links": [
            { "rel": "self", "href": "collection.json" },
            { "rel": "item", "href": "items/deep.json" },
            { "rel": "item", "href": "items/top.json" },
        ]
    });
    let deep = json!({ "assets": { "a": { "href": "soc_30-60cm_mean.tif", "title": "SOC 30-60cm" } } });
    let top = json!({ "assets": { "b": { "href": "soc_0_5cm_mean.tif" } } });

    let fetcher = Arc::new(
        MapFetcher::new()
            .with(CATALOG, serde_json::to_vec(&collection).unwrap())
            .with("https://catalog.test/collections/soc/items/deep.json", serde_json::to_vec(&deep).unwrap())
            .with("https://catalog.test/collections/soc/items/top.json", serde_json::to_vec(&top).unwrap())
            .with("https://catalog.test/collections/soc/items/soc_30-60cm_mean.tif", raster(1.0, 2, 2))
            .with("https://catalog.test/collections/soc/items/soc_0_5cm_mean.tif", raster(2.0, 3, 3)),
    );

    let handle = selector(fetcher.clone(), vec![catalog_search(&fetcher)])
        .select_source("soc", Some("0-5cm"))
        .unwrap();
    assert_eq!(handle.tier, SourceTier::Catalog);
    assert_eq!(handle.location, "https://catalog.test/collections/soc/items/soc_0_5cm_mean.tif");
    assert_eq!(handle.cell_count, 9);
}

#[test]
fn catalog_falls_back_to_any_openable_asset() {
    let catalog = json!({
        "assets": {
            "a_broken": { "href": "https://data.test/broken.tif" },
            "b_mean": { "href": "https://data.test/soc_mean.tif" },
        }
    });
    let fetcher = Arc::new(
        MapFetcher::new()
            .with(CATALOG, serde_json::to_vec(&catalog).unwrap())
            .with("https://data.test/broken.tif", b"garbage".to_vec())
            .with("https://data.test/soc_mean.tif", raster(3.0, 1, 7)),
    );

    let handle = selector(fetcher.clone(), vec![catalog_search(&fetcher)])
        .select_source("soc", Some("60-100cm"))
        .unwrap();
    assert_eq!(handle.location, "https://data.test/soc_mean.tif");
    assert_eq!(handle.cell_count, 7);
}

#[test]
fn unknown_variable_is_a_configuration_error() {
    let fetcher = Arc::new(MapFetcher::new());
    let err = selector(fetcher, Vec::new()).select_source("clay", None).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
